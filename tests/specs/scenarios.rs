// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The six end-to-end scenarios.

use nerve_core::{system_clock, Budget, EngineError, RunState};
use nerve_engine::{
    ErrorPolicy, ExecutionContext, NodeConfig, OnError, Session, SessionConfig, Step, StepEvent,
    WorkflowContext,
};
use nerve_history::HistoryReader;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tempfile::tempdir;

fn session_without_history() -> Arc<Session> {
    let config = SessionConfig { history_enabled: false, ..SessionConfig::default() };
    Session::new("default", config, system_clock()).unwrap()
}

#[tokio::test]
async fn s1_function_node_returns_the_uppercased_input() {
    let dir = tempdir().unwrap();
    let config = SessionConfig {
        history_enabled: true,
        history_base: dir.path().to_path_buf(),
        ..SessionConfig::default()
    };
    let session = Session::new("default", config, system_clock()).unwrap();
    let node = session
        .create_function("upper", |ctx: ExecutionContext| async move {
            Ok(json!(ctx.input_text().to_uppercase()))
        })
        .unwrap();

    let ctx = ExecutionContext::new(Arc::clone(&session)).with_input(Some(json!("hi")));
    assert_eq!(node.execute(&ctx).await.unwrap(), json!("HI"));

    // Function nodes have no history file.
    assert!(!dir.path().join("nerve").join("upper.jsonl").exists());
}

#[tokio::test]
async fn s2_terminal_send_with_null_parser() {
    let dir = tempdir().unwrap();
    let config = SessionConfig {
        history_enabled: true,
        history_base: dir.path().to_path_buf(),
        ..SessionConfig::default()
    };
    let session = Session::new("default", config, system_clock()).unwrap();
    let node = session
        .create_node("sh", NodeConfig::command(["bash", "-i"]))
        .await
        .unwrap();

    let ctx = ExecutionContext::new(Arc::clone(&session))
        .with_input(Some(json!("printf done")));
    let value = node.execute(&ctx).await.unwrap();
    let content = value["sections"][0]["content"].as_str().unwrap();
    assert!(content.contains("done"), "response missing echo: {:?}", content);

    let reader = HistoryReader::new(node.history_path().unwrap().clone());
    let ops: Vec<String> = reader
        .get_all()
        .unwrap()
        .iter()
        .map(|e| e.record.op().to_string())
        .collect();
    assert_eq!(ops, ["run", "read", "read", "send"]);

    session.stop().await;
}

#[tokio::test]
async fn s3_linear_graph_threads_results() {
    let session = session_without_history();
    session
        .create_function("a", |_ctx| async move { Ok(json!(1)) })
        .unwrap();
    session
        .create_function("b", |ctx: ExecutionContext| async move {
            let a = ctx.upstream.get("a").and_then(|v| v.as_i64()).unwrap_or(0);
            Ok(json!(a + 1))
        })
        .unwrap();

    let graph = session.create_graph("linear").unwrap();
    graph.add_step(Step::referencing("a", "a"));
    graph.add_step(Step::referencing("b", "b").depends_on(&["a"]));

    let results = graph
        .execute(&ExecutionContext::new(Arc::clone(&session)))
        .await
        .unwrap();
    assert_eq!(results.get("a"), Some(&json!(1)));
    assert_eq!(results.get("b"), Some(&json!(2)));
}

#[tokio::test]
async fn s4_retry_then_fallback() {
    let session = session_without_history();
    let counter = Arc::new(AtomicU32::new(0));
    let attempts = Arc::clone(&counter);
    session
        .create_function("flaky", move |_ctx| {
            let attempts = Arc::clone(&attempts);
            async move {
                let n = attempts.fetch_add(1, Ordering::SeqCst) + 1;
                if n >= 2 {
                    Ok(json!("ok"))
                } else {
                    Err(EngineError::Internal(format!("attempt {}", n)))
                }
            }
        })
        .unwrap();

    let policy = ErrorPolicy {
        on_error: OnError::Fallback,
        retry_count: 1,
        retry_delay_ms: 0,
        fallback_value: Some(json!("F")),
        ..ErrorPolicy::default()
    };
    let graph = session.create_graph("retrying").unwrap();
    graph.add_step(Step::referencing("work", "flaky").error_policy(policy.clone()));

    let results = graph
        .execute(&ExecutionContext::new(Arc::clone(&session)))
        .await
        .unwrap();
    assert_eq!(results.get("work"), Some(&json!("ok")));
    assert_eq!(counter.load(Ordering::SeqCst), 2);

    // A node that keeps failing lands on the fallback value instead.
    session
        .create_function("doomed", |_ctx| async move {
            Err::<Value, _>(EngineError::Internal("always".to_string()))
        })
        .unwrap();
    let graph = session.create_graph("fallback").unwrap();
    graph.add_step(Step::referencing("work", "doomed").error_policy(policy));
    let results = graph
        .execute(&ExecutionContext::new(Arc::clone(&session)))
        .await
        .unwrap();
    assert_eq!(results.get("work"), Some(&json!("F")));
}

#[tokio::test]
async fn s5_budget_stops_the_third_step() {
    let session = session_without_history();
    for id in ["a", "b", "c"] {
        session
            .create_function(id, |_ctx| async move { Ok(json!("step")) })
            .unwrap();
    }
    let graph = session.create_graph("budgeted").unwrap();
    graph.add_step(Step::referencing("a", "a"));
    graph.add_step(Step::referencing("b", "b").depends_on(&["a"]));
    graph.add_step(Step::referencing("c", "c").depends_on(&["b"]));

    let ctx = ExecutionContext::new(Arc::clone(&session)).with_budget(Budget::max_steps(2));
    let (tx, mut rx) = tokio::sync::mpsc::channel(16);
    let err = graph.execute_stream(&ctx, tx).await.unwrap_err();
    assert!(matches!(err, EngineError::BudgetExceeded { .. }));

    let mut completed = Vec::new();
    while let Some(event) = rx.recv().await {
        if let StepEvent::StepComplete { step_id, .. } = event {
            completed.push(step_id);
        }
    }
    assert_eq!(completed, vec!["a", "b"]);
}

#[tokio::test]
async fn s6_workflow_gate_round_trip() {
    let session = session_without_history();
    session
        .create_workflow("ask", |ctx: WorkflowContext| async move {
            ctx.gate("ok?", None, Some(vec!["yes".to_string(), "no".to_string()]))
                .await
        })
        .unwrap();
    let run = session
        .execute_workflow("ask", None, serde_json::Map::new())
        .unwrap();

    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
    while run.state() != RunState::Waiting {
        assert!(std::time::Instant::now() < deadline);
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }

    run.answer_gate(json!("yes")).unwrap();
    assert_eq!(run.wait().await.unwrap(), json!("yes"));

    // Answering again is rejected: the run is no longer waiting.
    let err = run.answer_gate(json!("again")).unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
}
