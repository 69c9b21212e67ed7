// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cross-component invariants exercised end to end.

use nerve_core::{system_clock, CancelToken, Event, NodeState};
use nerve_daemon::{Command, CommandLine, Engine, EngineConfig, EventSink, MemorySink};
use nerve_engine::{ExecutionContext, NodeConfig, Session, SessionConfig, Step};
use nerve_history::HistoryReader;
use serde_json::json;
use std::sync::Arc;
use tempfile::tempdir;

#[tokio::test]
async fn history_seqs_are_dense_across_every_operation() {
    let dir = tempdir().unwrap();
    let config = SessionConfig {
        history_enabled: true,
        history_base: dir.path().to_path_buf(),
        ..SessionConfig::default()
    };
    let session = Session::new("default", config, system_clock()).unwrap();
    let node = session
        .create_node("sh", NodeConfig::command(["cat"]))
        .await
        .unwrap();

    node.write_data(b"raw\n").await.unwrap();
    node.run_command("printf hi").await.unwrap();
    let ctx = ExecutionContext::new(Arc::clone(&session)).with_input(Some(json!("ping")));
    node.execute(&ctx).await.unwrap();
    node.interrupt().await.unwrap();
    let path = node.history_path().unwrap().clone();
    session.stop().await;

    let entries = HistoryReader::new(path).get_all().unwrap();
    assert!(!entries.is_empty());
    assert_eq!(entries[0].seq, 1);
    for pair in entries.windows(2) {
        assert_eq!(pair[1].seq, pair[0].seq + 1, "gap between history entries");
    }
    assert_eq!(entries.last().unwrap().record.op(), "close");
}

#[tokio::test]
async fn node_stop_is_idempotent_after_completion() {
    let config = SessionConfig { history_enabled: false, ..SessionConfig::default() };
    let session = Session::new("default", config, system_clock()).unwrap();
    let node = session
        .create_node("sh", NodeConfig::command(["cat"]))
        .await
        .unwrap();
    node.stop().await.unwrap();
    node.stop().await.unwrap();
    assert_eq!(node.state(), NodeState::Stopped);
}

#[test]
fn cancel_token_is_idempotent_and_shared() {
    let token = CancelToken::new();
    let clone = token.clone();
    token.cancel();
    token.cancel();
    assert!(clone.is_cancelled());
}

#[tokio::test]
async fn clean_validation_implies_execution_succeeds_structurally() {
    let config = SessionConfig { history_enabled: false, ..SessionConfig::default() };
    let session = Session::new("default", config, system_clock()).unwrap();
    for id in ["a", "b", "c", "d"] {
        session
            .create_function(id, |_ctx| async move { Ok(json!("v")) })
            .unwrap();
    }
    let graph = session.create_graph("diamond").unwrap();
    graph.add_step(Step::referencing("a", "a"));
    graph.add_step(Step::referencing("b", "b").depends_on(&["a"]));
    graph.add_step(Step::referencing("c", "c").depends_on(&["a"]));
    graph.add_step(Step::referencing("d", "d").depends_on(&["b", "c"]));

    assert!(graph.validate().is_empty());
    let results = graph
        .execute(&ExecutionContext::new(Arc::clone(&session)))
        .await
        .unwrap();
    assert_eq!(results.len(), 4);
    let order: Vec<&str> = results.keys().map(|s| s.as_str()).collect();
    assert_eq!(order, ["a", "b", "c", "d"]);
}

#[tokio::test]
async fn empty_graph_run_emits_only_graph_lifecycle_events() {
    let sink = Arc::new(MemorySink::new());
    let config = EngineConfig { history_enabled: false, ..EngineConfig::default() };
    let engine = Engine::new(config, Arc::clone(&sink) as Arc<dyn EventSink>).unwrap();
    engine.default_session().create_graph("empty").unwrap();

    let response = engine
        .handle(Command::RunGraph {
            session_id: None,
            graph_id: "empty".to_string(),
            budget: None,
            trace: false,
        })
        .await;
    assert!(response.success);
    assert_eq!(response.data.unwrap()["results"], json!({}));

    let names: Vec<&str> = sink
        .names()
        .into_iter()
        .filter(|n| n.starts_with("graph:") || n.starts_with("step:"))
        .collect();
    assert_eq!(names, ["graph:started", "graph:completed"]);
}

#[tokio::test]
async fn zero_response_timeout_times_out_without_hanging() {
    let sink = Arc::new(MemorySink::new());
    let config = EngineConfig { history_enabled: false, ..EngineConfig::default() };
    let engine = Engine::new(config, Arc::clone(&sink) as Arc<dyn EventSink>).unwrap();
    let create = Command::CreateNode {
        session_id: None,
        node_id: "sh".to_string(),
        command: CommandLine::Line("cat".to_string()),
        backend: None,
        cwd: None,
        pane_id: None,
        history: None,
        ready_timeout_secs: None,
        response_timeout_secs: None,
        default_parser: None,
    };
    assert!(engine.handle(create).await.success);

    // The claude parser never sees its prompt in cat output.
    let response = engine
        .handle(Command::ExecuteInput {
            session_id: None,
            node_id: "sh".to_string(),
            input: "x".to_string(),
            parser: Some("claude".to_string()),
            timeout_secs: Some(0),
            stream: false,
        })
        .await;
    assert!(!response.success);
    assert!(response.error.unwrap().contains("timed out"));
    engine.handle(Command::Shutdown).await;
}

#[tokio::test]
async fn node_monitor_reports_stop_through_the_sink() {
    let sink = Arc::new(MemorySink::new());
    let config = EngineConfig { history_enabled: false, ..EngineConfig::default() };
    let engine = Engine::new(config, Arc::clone(&sink) as Arc<dyn EventSink>).unwrap();
    let create = Command::CreateNode {
        session_id: None,
        node_id: "sh".to_string(),
        command: CommandLine::Line("cat".to_string()),
        backend: None,
        cwd: None,
        pane_id: None,
        history: None,
        ready_timeout_secs: None,
        response_timeout_secs: None,
        default_parser: None,
    };
    assert!(engine.handle(create).await.success);
    engine
        .handle(Command::StopNode { session_id: None, node_id: "sh".to_string() })
        .await;

    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
    loop {
        let stopped = sink
            .events()
            .iter()
            .any(|e| matches!(e, Event::NodeStopped { .. }));
        if stopped {
            break;
        }
        assert!(
            std::time::Instant::now() < deadline,
            "monitor never reported the stop"
        );
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
}
