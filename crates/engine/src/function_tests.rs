// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::session::{Session, SessionConfig};
use nerve_core::system_clock;
use serde_json::json;

fn test_ctx() -> ExecutionContext {
    let config = SessionConfig { history_enabled: false, ..SessionConfig::default() };
    ExecutionContext::new(Session::new("default", config, system_clock()).unwrap())
}

#[tokio::test]
async fn call_passes_the_context_and_returns_the_value() {
    let node = FunctionNode::new("upper", |ctx: ExecutionContext| async move {
        let input = ctx.input_text();
        Ok(Value::String(input.to_uppercase()))
    });
    let ctx = test_ctx().with_input(Some(json!("hi")));
    assert_eq!(node.call(&ctx).await.unwrap(), json!("HI"));
}

#[tokio::test]
async fn call_propagates_the_callables_error() {
    let node = FunctionNode::new("boom", |_ctx: ExecutionContext| async move {
        Err::<Value, _>(EngineError::Internal("boom".to_string()))
    });
    let err = node.call(&test_ctx()).await.unwrap_err();
    assert!(matches!(err, EngineError::Internal(_)));
}

#[tokio::test]
async fn upstream_results_are_visible_to_the_callable() {
    let node = FunctionNode::new("sum", |ctx: ExecutionContext| async move {
        let a = ctx.upstream.get("a").and_then(|v| v.as_i64()).unwrap_or(0);
        Ok(json!(a + 1))
    });
    let mut upstream = indexmap::IndexMap::new();
    upstream.insert("a".to_string(), json!(41));
    let ctx = test_ctx().with_upstream(upstream);
    assert_eq!(node.call(&ctx).await.unwrap(), json!(42));
}
