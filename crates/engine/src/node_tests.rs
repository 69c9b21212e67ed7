// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::function::FunctionNode;
use crate::graph::Step;
use crate::session::{Session, SessionConfig};
use nerve_core::system_clock;
use serde_json::json;
use std::sync::Arc;

fn test_ctx() -> ExecutionContext {
    let config = SessionConfig { history_enabled: false, ..SessionConfig::default() };
    ExecutionContext::new(Session::new("default", config, system_clock()).unwrap())
}

fn constant(id: &str, value: serde_json::Value) -> Node {
    let v = value.clone();
    Node::Function(Arc::new(FunctionNode::new(id, move |_ctx| {
        let v = v.clone();
        async move { Ok(v) }
    })))
}

#[tokio::test]
async fn function_node_dispatch() {
    let node = constant("one", json!(1));
    assert_eq!(node.kind(), "function");
    assert!(!node.is_persistent());
    assert_eq!(node.state(), NodeState::Ready);
    assert_eq!(node.execute(&test_ctx()).await.unwrap(), json!(1));
}

#[tokio::test]
async fn graph_node_returns_a_nested_object() {
    let graph = crate::graph::Graph::new("inner");
    graph.add_step(Step::new("x", constant("x-node", json!(10))));
    let node = Node::Graph(Arc::new(graph));
    assert_eq!(node.kind(), "graph");
    assert!(!node.is_persistent());
    let result = node.execute(&test_ctx()).await.unwrap();
    assert_eq!(result, json!({ "x": 10 }));
}

#[tokio::test]
async fn terminal_only_operations_refuse_other_variants() {
    let node = constant("fn", json!(null));
    assert!(matches!(
        node.run_command("ls").await,
        Err(EngineError::Validation(_))
    ));
    assert!(matches!(node.write_data(b"x").await, Err(EngineError::Validation(_))));
    assert!(matches!(node.interrupt().await, Err(EngineError::Validation(_))));
    assert!(matches!(node.read_tail(5).await, Err(EngineError::Validation(_))));
    assert!(node.history_path().is_none());
}

#[tokio::test]
async fn execute_stream_falls_back_for_non_streaming_nodes() {
    let node = constant("fn", json!("v"));
    assert!(!node.supports_stream());
    let (tx, mut rx) = tokio::sync::mpsc::channel(4);
    let result = node.execute_stream(&test_ctx(), tx).await.unwrap();
    assert_eq!(result, json!("v"));
    assert!(rx.recv().await.is_none());
}

#[tokio::test]
async fn stop_is_a_no_op_for_ephemeral_nodes() {
    let node = constant("fn", json!(null));
    node.stop().await.unwrap();
    node.stop().await.unwrap();
}
