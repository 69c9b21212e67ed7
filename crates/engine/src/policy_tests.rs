// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::function::FunctionNode;
use crate::session::{Session, SessionConfig};
use nerve_core::system_clock;
use serde_json::json;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

fn test_ctx() -> ExecutionContext {
    let config = SessionConfig { history_enabled: false, ..SessionConfig::default() };
    ExecutionContext::new(Session::new("default", config, system_clock()).unwrap())
}

/// Node that fails until the `succeed_on`-th attempt (1-based), counting
/// attempts into `counter`.
fn flaky(counter: Arc<AtomicU32>, succeed_on: u32) -> Node {
    Node::Function(Arc::new(FunctionNode::new("flaky", move |_ctx| {
        let counter = Arc::clone(&counter);
        async move {
            let attempt = counter.fetch_add(1, Ordering::SeqCst) + 1;
            if attempt >= succeed_on {
                Ok(json!("ok"))
            } else {
                Err(EngineError::Internal(format!("attempt {}", attempt)))
            }
        }
    })))
}

fn always_failing(counter: Arc<AtomicU32>) -> Node {
    flaky(counter, u32::MAX)
}

#[tokio::test]
async fn success_on_first_attempt_skips_the_policy() {
    let counter = Arc::new(AtomicU32::new(0));
    let node = flaky(Arc::clone(&counter), 1);
    let result = run_with_policy(&node, &test_ctx(), None).await.unwrap();
    assert_eq!(result, json!("ok"));
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn retry_then_succeed() {
    // Fails once, succeeds on the second attempt.
    let counter = Arc::new(AtomicU32::new(0));
    let node = flaky(Arc::clone(&counter), 2);
    let policy = ErrorPolicy {
        on_error: OnError::Fallback,
        retry_count: 1,
        retry_delay_ms: 0,
        fallback_value: Some(json!("F")),
        ..ErrorPolicy::default()
    };
    let result = run_with_policy(&node, &test_ctx(), Some(&policy)).await.unwrap();
    assert_eq!(result, json!("ok"));
    assert_eq!(counter.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn retries_exhausted_falls_back_to_the_value() {
    // Still failing after retries yields the fallback value.
    let counter = Arc::new(AtomicU32::new(0));
    let node = always_failing(Arc::clone(&counter));
    let policy = ErrorPolicy {
        on_error: OnError::Fallback,
        retry_count: 1,
        retry_delay_ms: 0,
        fallback_value: Some(json!("F")),
        ..ErrorPolicy::default()
    };
    let result = run_with_policy(&node, &test_ctx(), Some(&policy)).await.unwrap();
    assert_eq!(result, json!("F"));
    assert_eq!(counter.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn persistently_failing_step_runs_exactly_retry_count_plus_one_attempts() {
    let counter = Arc::new(AtomicU32::new(0));
    let node = always_failing(Arc::clone(&counter));
    let policy = ErrorPolicy::retry(3, 0);
    let err = run_with_policy(&node, &test_ctx(), Some(&policy)).await.unwrap_err();
    assert!(matches!(err, EngineError::Internal(_)));
    assert_eq!(counter.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn skip_returns_the_fallback_value_without_retrying() {
    let counter = Arc::new(AtomicU32::new(0));
    let node = always_failing(Arc::clone(&counter));
    let policy = ErrorPolicy::skip(json!("skipped"));
    let result = run_with_policy(&node, &test_ctx(), Some(&policy)).await.unwrap();
    assert_eq!(result, json!("skipped"));
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn fallback_node_runs_once_and_is_never_retried() {
    let counter = Arc::new(AtomicU32::new(0));
    let fallback_calls = Arc::new(AtomicU32::new(0));
    let fb_counter = Arc::clone(&fallback_calls);
    let fallback = Node::Function(Arc::new(FunctionNode::new("fb", move |_ctx| {
        let fb_counter = Arc::clone(&fb_counter);
        async move {
            fb_counter.fetch_add(1, Ordering::SeqCst);
            Ok(json!("from-fallback"))
        }
    })));
    let node = always_failing(Arc::clone(&counter));
    let policy = ErrorPolicy {
        on_error: OnError::Fallback,
        retry_count: 2,
        retry_delay_ms: 0,
        fallback_node: Some(fallback),
        ..ErrorPolicy::default()
    };
    let result = run_with_policy(&node, &test_ctx(), Some(&policy)).await.unwrap();
    assert_eq!(result, json!("from-fallback"));
    assert_eq!(counter.load(Ordering::SeqCst), 3);
    assert_eq!(fallback_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn per_attempt_timeout_counts_as_a_failure() {
    let node = Node::Function(Arc::new(FunctionNode::new("slow", |_ctx| async move {
        tokio::time::sleep(std::time::Duration::from_secs(30)).await;
        Ok(json!("late"))
    })));
    let policy = ErrorPolicy {
        on_error: OnError::Skip,
        timeout_ms: Some(20),
        fallback_value: Some(json!("T")),
        ..ErrorPolicy::default()
    };
    let result = run_with_policy(&node, &test_ctx(), Some(&policy)).await.unwrap();
    assert_eq!(result, json!("T"));
}

#[tokio::test]
async fn cancellation_is_not_retried_and_not_converted() {
    let counter = Arc::new(AtomicU32::new(0));
    let node = always_failing(Arc::clone(&counter));
    let ctx = test_ctx();
    ctx.cancel.cancel();
    let policy = ErrorPolicy {
        on_error: OnError::Skip,
        retry_count: 5,
        fallback_value: Some(json!("nope")),
        ..ErrorPolicy::default()
    };
    let err = run_with_policy(&node, &ctx, Some(&policy)).await.unwrap_err();
    assert!(matches!(err, EngineError::Cancelled));
    assert_eq!(counter.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn backoff_scales_the_delay() {
    // Two retries with 10ms base and 2x backoff: delays 10ms then 20ms.
    let counter = Arc::new(AtomicU32::new(0));
    let node = always_failing(Arc::clone(&counter));
    let policy = ErrorPolicy {
        on_error: OnError::Retry,
        retry_count: 2,
        retry_delay_ms: 10,
        retry_backoff: 2.0,
        ..ErrorPolicy::default()
    };
    let started = std::time::Instant::now();
    let _ = run_with_policy(&node, &test_ctx(), Some(&policy)).await;
    assert!(started.elapsed() >= std::time::Duration::from_millis(30));
    assert_eq!(counter.load(Ordering::SeqCst), 3);
}
