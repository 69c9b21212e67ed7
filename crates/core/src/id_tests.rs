// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::collections::HashMap;

#[test]
fn id_hash_map_lookup_by_str() {
    let mut map = HashMap::new();
    map.insert(NodeId::new("sh"), 42);
    assert_eq!(map.get("sh"), Some(&42));
}

#[test]
fn id_display_and_eq() {
    let id = SessionId::new("default");
    assert_eq!(id.to_string(), "default");
    assert_eq!(id, "default");
    assert_eq!(id.as_str(), "default");
}

#[test]
fn run_id_generate_is_unique_and_prefixed() {
    let a = RunId::generate();
    let b = RunId::generate();
    assert_ne!(a, b);
    assert!(a.as_str().starts_with("run-"));
    assert_eq!(a.as_str().len(), "run-".len() + 19);
}

#[test]
fn generate_token_uses_prefix() {
    let tok = generate_token("grun-");
    assert!(tok.starts_with("grun-"));
    assert_ne!(tok, generate_token("grun-"));
}

#[test]
fn id_serde_round_trip() {
    let id = GraphId::new("pipeline");
    let json = serde_json::to_string(&id).unwrap();
    assert_eq!(json, "\"pipeline\"");
    let back: GraphId = serde_json::from_str(&json).unwrap();
    assert_eq!(back, id);
}
