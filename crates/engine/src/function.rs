// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Function nodes: stateless callables taking an execution context.

use crate::context::ExecutionContext;
use futures_util::future::BoxFuture;
use nerve_core::{EngineError, NodeId};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;

type BoxedNodeFn =
    Arc<dyn Fn(ExecutionContext) -> BoxFuture<'static, Result<Value, EngineError>> + Send + Sync>;

/// Ephemeral node wrapping an async callable. No history, no state machine.
#[derive(Clone)]
pub struct FunctionNode {
    id: NodeId,
    func: BoxedNodeFn,
}

impl std::fmt::Debug for FunctionNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionNode").field("id", &self.id).finish_non_exhaustive()
    }
}

impl FunctionNode {
    pub fn new<F, Fut>(id: impl Into<NodeId>, func: F) -> Self
    where
        F: Fn(ExecutionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, EngineError>> + Send + 'static,
    {
        Self {
            id: id.into(),
            func: Arc::new(move |ctx| Box::pin(func(ctx))),
        }
    }

    pub fn id(&self) -> &NodeId {
        &self.id
    }

    /// Invoke the wrapped callable. Fails with whatever the callable raises.
    pub async fn call(&self, ctx: &ExecutionContext) -> Result<Value, EngineError> {
        (self.func)(ctx.clone()).await
    }
}

#[cfg(test)]
#[path = "function_tests.rs"]
mod tests;
