// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use nerve_core::{system_clock, NodeState, RunState};
use serde_json::json;
use tempfile::tempdir;

fn test_session() -> Arc<Session> {
    let config = SessionConfig { history_enabled: false, ..SessionConfig::default() };
    Session::new("default", config, system_clock()).unwrap()
}

fn session_with_history(base: &std::path::Path) -> Arc<Session> {
    let config = SessionConfig {
        history_enabled: true,
        history_base: base.to_path_buf(),
        ..SessionConfig::default()
    };
    Session::new("default", config, system_clock()).unwrap()
}

#[test]
fn session_id_is_validated() {
    let err = Session::new("Not Valid", SessionConfig::default(), system_clock()).unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
}

#[test]
fn function_nodes_register_and_reject_duplicates() {
    let session = test_session();
    session
        .create_function("upper", |_ctx| async move { Ok(json!(1)) })
        .unwrap();
    assert!(session.get_node("upper").is_some());

    let err = session
        .create_function("upper", |_ctx| async move { Ok(json!(2)) })
        .unwrap_err();
    assert!(matches!(err, EngineError::AlreadyExists(_)));
}

#[test]
fn invalid_node_id_fails_before_registration() {
    let session = test_session();
    let err = session
        .create_function("Bad Name", |_ctx| async move { Ok(json!(1)) })
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
    assert!(session.list_nodes().is_empty());
}

#[tokio::test]
async fn create_node_spawn_failure_leaves_no_partial_node() {
    let session = test_session();
    let config = NodeConfig::command(["definitely-not-a-binary-xyz"]);
    match session.create_node("sh", config).await {
        // portable-pty may surface exec failure at spawn or via early exit;
        // either way the registry must hold no half-started node when it
        // errors.
        Err(_) => assert!(session.get_node("sh").is_none()),
        Ok(node) => {
            tokio::time::sleep(std::time::Duration::from_millis(500)).await;
            assert!(node.state() == NodeState::Ready || node.state() == NodeState::Stopped);
            session.delete_node("sh").await;
        }
    }
}

#[tokio::test]
async fn create_node_registers_a_ready_terminal() {
    let session = test_session();
    let node = session
        .create_node("sh", NodeConfig::command(["cat"]))
        .await
        .unwrap();
    assert_eq!(node.kind(), "terminal");
    assert_eq!(node.state(), NodeState::Ready);
    assert!(session.get_node("sh").is_some());
    assert!(session.delete_node("sh").await);
    assert!(session.get_node("sh").is_none());
}

#[tokio::test]
async fn create_node_without_command_is_a_validation_error() {
    let session = test_session();
    let err = session
        .create_node("sh", NodeConfig::default())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
}

#[tokio::test]
async fn pane_backend_requires_a_pane_id() {
    let session = test_session();
    let config = NodeConfig {
        backend: BackendKind::Pane,
        ..NodeConfig::command(["cat"])
    };
    let err = session.create_node("pane", config).await.unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
}

#[tokio::test]
async fn node_history_lands_under_server_name() {
    let dir = tempdir().unwrap();
    let session = session_with_history(dir.path());
    let node = session
        .create_node("sh", NodeConfig::command(["cat"]))
        .await
        .unwrap();
    let path = node.history_path().unwrap().clone();
    assert!(path.starts_with(dir.path().join("nerve")));
    assert!(path.ends_with("sh.jsonl"));
    assert!(path.exists());
    session.stop().await;
}

#[tokio::test]
async fn delete_node_reports_existence() {
    let session = test_session();
    assert!(!session.delete_node("ghost").await);
    session
        .create_function("f", |_ctx| async move { Ok(json!(1)) })
        .unwrap();
    assert!(session.delete_node("f").await);
}

#[test]
fn graphs_register_and_delete() {
    let session = test_session();
    session.create_graph("pipeline").unwrap();
    assert!(session.get_graph("pipeline").is_some());
    let err = session.create_graph("pipeline").unwrap_err();
    assert!(matches!(err, EngineError::AlreadyExists(_)));
    assert!(session.delete_graph("pipeline"));
    assert!(!session.delete_graph("pipeline"));
}

#[tokio::test]
async fn stop_cancels_non_terminal_runs_and_clears_registries() {
    let session = test_session();
    session
        .create_workflow("ask", |ctx: WorkflowContext| async move {
            let answer = ctx.gate("pending?", None, None).await?;
            Ok(answer)
        })
        .unwrap();
    let run = session
        .execute_workflow("ask", None, serde_json::Map::new())
        .unwrap();

    // Let the run reach the gate.
    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
    while run.state() != RunState::Waiting {
        assert!(std::time::Instant::now() < deadline);
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }

    session.stop().await;
    let err = run.wait().await.unwrap_err();
    assert!(matches!(err, EngineError::Cancelled));
    assert!(session.list_nodes().is_empty());
    assert!(session.list_graphs().is_empty());
    assert!(session.list_workflows().is_empty());
    assert!(session.list_runs().is_empty());
}

#[test]
fn describe_counts_the_registries() {
    let session = test_session();
    session
        .create_function("f", |_ctx| async move { Ok(json!(1)) })
        .unwrap();
    session.create_graph("g").unwrap();
    let summary = session.describe();
    assert_eq!(summary["id"], "default");
    assert_eq!(summary["nodes"], 1);
    assert_eq!(summary["graphs"], 1);
    assert_eq!(summary["server_name"], "nerve");
}

#[tokio::test]
async fn execute_workflow_requires_a_registered_workflow() {
    let session = test_session();
    let err = session
        .execute_workflow("ghost", None, serde_json::Map::new())
        .unwrap_err();
    assert!(matches!(err, EngineError::NotFound(_)));
}
