// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-step error policy: retries, timeouts, skip, fallback.

use crate::context::ExecutionContext;
use crate::node::Node;
use nerve_core::EngineError;
use serde_json::Value;
use std::time::Duration;

/// What to do after the final failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OnError {
    /// Rethrow the error.
    #[default]
    Fail,
    /// Same as fail once the retry budget is spent.
    Retry,
    /// Return `fallback_value` instead.
    Skip,
    /// Execute `fallback_node` once (never retried); without one, return
    /// `fallback_value`.
    Fallback,
}

/// Error handling for one step. Attempts = `retry_count + 1`; timeout and
/// general failure are treated symmetrically.
#[derive(Clone)]
pub struct ErrorPolicy {
    pub on_error: OnError,
    pub retry_count: u32,
    pub retry_delay_ms: u64,
    pub retry_backoff: f64,
    pub timeout_ms: Option<u64>,
    pub fallback_value: Option<Value>,
    pub fallback_node: Option<Node>,
}

impl Default for ErrorPolicy {
    fn default() -> Self {
        Self {
            on_error: OnError::Fail,
            retry_count: 0,
            retry_delay_ms: 0,
            retry_backoff: 1.0,
            timeout_ms: None,
            fallback_value: None,
            fallback_node: None,
        }
    }
}

impl ErrorPolicy {
    pub fn retry(retry_count: u32, retry_delay_ms: u64) -> Self {
        Self { on_error: OnError::Retry, retry_count, retry_delay_ms, ..Self::default() }
    }

    pub fn skip(fallback_value: Value) -> Self {
        Self {
            on_error: OnError::Skip,
            fallback_value: Some(fallback_value),
            ..Self::default()
        }
    }
}

/// Run a node under a policy.
///
/// Cancellation and budget violations abort immediately; they are never
/// retried and never converted by skip/fallback.
pub async fn run_with_policy(
    node: &Node,
    ctx: &ExecutionContext,
    policy: Option<&ErrorPolicy>,
) -> Result<Value, EngineError> {
    let default_policy = ErrorPolicy::default();
    let policy = policy.unwrap_or(&default_policy);

    let mut last_err: Option<EngineError> = None;
    for attempt in 0..=policy.retry_count {
        ctx.check_cancelled()?;

        let attempt_result = match policy.timeout_ms {
            Some(ms) => {
                let limit = Duration::from_millis(ms);
                match tokio::time::timeout(limit, node.execute(ctx)).await {
                    Ok(result) => result,
                    Err(_) => Err(EngineError::Timeout(limit)),
                }
            }
            None => node.execute(ctx).await,
        };

        match attempt_result {
            Ok(value) => return Ok(value),
            Err(e @ EngineError::Cancelled) => return Err(e),
            Err(e @ EngineError::BudgetExceeded { .. }) => return Err(e),
            Err(e) => {
                tracing::debug!(
                    node_id = %node.id(),
                    attempt,
                    error = %e,
                    "step attempt failed"
                );
                last_err = Some(e);
                if attempt < policy.retry_count {
                    let delay =
                        policy.retry_delay_ms as f64 * policy.retry_backoff.powi(attempt as i32);
                    tokio::time::sleep(Duration::from_millis(delay as u64)).await;
                }
            }
        }
    }

    let err = last_err.unwrap_or_else(|| EngineError::Internal("no attempts ran".to_string()));
    match policy.on_error {
        OnError::Fail | OnError::Retry => Err(err),
        OnError::Skip => Ok(policy.fallback_value.clone().unwrap_or(Value::Null)),
        OnError::Fallback => match &policy.fallback_node {
            Some(fallback) => fallback.execute(ctx).await,
            None => Ok(policy.fallback_value.clone().unwrap_or(Value::Null)),
        },
    }
}

#[cfg(test)]
#[path = "policy_tests.rs"]
mod tests;
