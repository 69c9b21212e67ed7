// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Command dispatch.

use crate::events::EventSink;
use crate::monitor::spawn_state_monitor;
use crate::protocol::{Command, Response};
use indexmap::IndexMap;
use nerve_adapters::ParserKind;
use nerve_core::id::generate_token;
use nerve_core::{
    system_clock, CancelToken, Clock, EngineError, Event, ExecutionTrace, GraphId, NodeId,
    SessionId,
};
use nerve_engine::{
    BackendKind, ExecutionContext, Node, NodeConfig, Session, SessionConfig, StepEvent,
    WorkflowRun,
};
use nerve_history::{HistoryReader, DEFAULT_BASE_DIR};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Id of the session used when a command names none.
pub const DEFAULT_SESSION_ID: &str = "default";

/// Engine construction surface.
#[derive(Clone)]
pub struct EngineConfig {
    /// Filesystem namespace for history files.
    pub server_name: String,
    /// Default for sessions and nodes that do not choose explicitly.
    pub history_enabled: bool,
    pub history_base: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            server_name: "nerve".to_string(),
            history_enabled: true,
            history_base: PathBuf::from(DEFAULT_BASE_DIR),
        }
    }
}

/// Process-wide command dispatcher and event emitter.
///
/// Owns the sessions (one default, more on demand), tracks running graphs
/// by an opaque token for out-of-band cancellation, and converts every
/// handler error into a failure response plus an `error` event. The engine
/// itself never crashes on a command.
pub struct Engine {
    config: EngineConfig,
    clock: Arc<dyn Clock>,
    sink: Arc<dyn EventSink>,
    sessions: Mutex<IndexMap<String, Arc<Session>>>,
    running_graphs: Mutex<HashMap<String, CancelToken>>,
    shutdown: AtomicBool,
}

impl Engine {
    pub fn new(config: EngineConfig, sink: Arc<dyn EventSink>) -> Result<Arc<Self>, EngineError> {
        Self::with_clock(config, sink, system_clock())
    }

    pub fn with_clock(
        config: EngineConfig,
        sink: Arc<dyn EventSink>,
        clock: Arc<dyn Clock>,
    ) -> Result<Arc<Self>, EngineError> {
        let engine = Self {
            config,
            clock,
            sink,
            sessions: Mutex::new(IndexMap::new()),
            running_graphs: Mutex::new(HashMap::new()),
            shutdown: AtomicBool::new(false),
        };
        let default = engine.build_session(DEFAULT_SESSION_ID, None, None, Vec::new())?;
        engine
            .sessions
            .lock()
            .insert(DEFAULT_SESSION_ID.to_string(), default);
        Ok(Arc::new(engine))
    }

    fn build_session(
        &self,
        id: &str,
        name: Option<String>,
        description: Option<String>,
        tags: Vec<String>,
    ) -> Result<Arc<Session>, EngineError> {
        Session::new(
            id,
            SessionConfig {
                name,
                description,
                tags,
                server_name: self.config.server_name.clone(),
                history_enabled: self.config.history_enabled,
                history_base: self.config.history_base.clone(),
            },
            Arc::clone(&self.clock),
        )
    }

    /// The default session, for embedding the engine as a library.
    pub fn default_session(&self) -> Arc<Session> {
        self.session(DEFAULT_SESSION_ID)
            .unwrap_or_else(|| unreachable!("default session always registered"))
    }

    pub fn session(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.lock().get(id).cloned()
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Dispatch one command, converting any failure into an error response
    /// and an `error` event.
    pub async fn handle(&self, command: Command) -> Response {
        let name = command.name();
        match self.dispatch(command).await {
            Ok(data) => Response::ok(data),
            Err(e) => {
                tracing::warn!(command = name, error = %e, "command failed");
                self.sink.emit(Event::Error { message: e.to_string() });
                Response::err(e.to_string())
            }
        }
    }

    async fn dispatch(&self, command: Command) -> Result<Value, EngineError> {
        match command {
            Command::Ping => Ok(json!({ "ok": true })),

            Command::Shutdown => self.handle_shutdown().await,

            Command::CreateSession { session_id, name, description, tags } => {
                {
                    let sessions = self.sessions.lock();
                    if sessions.contains_key(&session_id) {
                        return Err(EngineError::AlreadyExists(format!(
                            "session {}",
                            session_id
                        )));
                    }
                }
                let session = self.build_session(&session_id, name, description, tags)?;
                self.sessions.lock().insert(session_id.clone(), session);
                self.sink.emit(Event::SessionCreated {
                    session_id: SessionId::new(&session_id),
                });
                Ok(json!({ "session_id": session_id }))
            }

            Command::DeleteSession { session_id } => {
                if session_id == DEFAULT_SESSION_ID {
                    return Err(EngineError::Validation(
                        "the default session cannot be deleted".to_string(),
                    ));
                }
                let session = self
                    .sessions
                    .lock()
                    .shift_remove(&session_id)
                    .ok_or_else(|| EngineError::NotFound(format!("session {}", session_id)))?;
                session.stop().await;
                self.sink.emit(Event::SessionDeleted {
                    session_id: SessionId::new(&session_id),
                });
                Ok(json!({ "deleted": true }))
            }

            Command::ListSessions => {
                let sessions: Vec<Value> =
                    self.sessions.lock().values().map(|s| s.describe()).collect();
                Ok(json!({ "sessions": sessions }))
            }

            Command::GetSession { session_id } => {
                let session = self.resolve_session(session_id.as_deref())?;
                Ok(json!({ "session": session.describe() }))
            }

            Command::CreateNode {
                session_id,
                node_id,
                command,
                backend,
                cwd,
                pane_id,
                history,
                ready_timeout_secs,
                response_timeout_secs,
                default_parser,
            } => {
                let session = self.resolve_session(session_id.as_deref())?;
                let mut config = NodeConfig::command(command.to_argv());
                config.backend = parse_opt::<BackendKind>(backend.as_deref())?.unwrap_or_default();
                config.cwd = cwd;
                config.pane_id = pane_id;
                config.history = history;
                config.default_parser =
                    parse_opt::<ParserKind>(default_parser.as_deref())?.unwrap_or_default();
                if let Some(secs) = ready_timeout_secs {
                    config.ready_timeout = Duration::from_secs(secs);
                }
                if let Some(secs) = response_timeout_secs {
                    config.response_timeout = Duration::from_secs(secs);
                }

                let node = session.create_node(&node_id, config).await?;
                self.sink.emit(Event::NodeCreated {
                    session_id: session.id().clone(),
                    node_id: NodeId::new(&node_id),
                });
                spawn_state_monitor(session.id().clone(), node, Arc::clone(&self.sink));
                Ok(json!({ "node_id": node_id }))
            }

            Command::StopNode { session_id, node_id } => {
                let session = self.resolve_session(session_id.as_deref())?;
                if !session.delete_node(&node_id).await {
                    return Err(EngineError::NotFound(format!("node {}", node_id)));
                }
                Ok(json!({ "stopped": true }))
            }

            Command::ListNodes { session_id } => {
                let session = self.resolve_session(session_id.as_deref())?;
                let nodes: Vec<Value> = session.list_nodes().iter().map(node_summary).collect();
                Ok(json!({ "nodes": nodes }))
            }

            Command::GetNode { session_id, node_id } => {
                let session = self.resolve_session(session_id.as_deref())?;
                let node = self.require_node(&session, &node_id)?;
                Ok(json!({ "node": node_summary(&node) }))
            }

            Command::ExecuteInput {
                session_id,
                node_id,
                input,
                parser,
                timeout_secs,
                stream,
            } => {
                let session = self.resolve_session(session_id.as_deref())?;
                let node = self.require_node(&session, &node_id)?;
                self.sink.emit(Event::NodeBusy {
                    session_id: session.id().clone(),
                    node_id: node.id().clone(),
                });
                let ctx = ExecutionContext::new(Arc::clone(&session))
                    .with_input(Some(Value::String(input)))
                    .with_parser(parse_opt::<ParserKind>(parser.as_deref())?)
                    .with_timeout(timeout_secs.map(Duration::from_secs));

                let value = if stream {
                    let (tx, mut rx) = mpsc::channel::<String>(64);
                    let sink = Arc::clone(&self.sink);
                    let chunk_node_id = node.id().clone();
                    let forward = async move {
                        while let Some(chunk) = rx.recv().await {
                            sink.emit(Event::OutputChunk {
                                node_id: chunk_node_id.clone(),
                                chunk,
                            });
                        }
                    };
                    let (result, ()) = tokio::join!(node.execute_stream(&ctx, tx), forward);
                    result?
                } else {
                    let value = node.execute(&ctx).await?;
                    self.sink.emit(Event::OutputParsed {
                        node_id: node.id().clone(),
                        response: value.clone(),
                    });
                    value
                };
                Ok(json!({ "response": value }))
            }

            Command::RunCommand { session_id, node_id, command } => {
                let session = self.resolve_session(session_id.as_deref())?;
                let node = self.require_node(&session, &node_id)?;
                node.run_command(&command).await?;
                Ok(json!({}))
            }

            Command::WriteData { session_id, node_id, data } => {
                let session = self.resolve_session(session_id.as_deref())?;
                let node = self.require_node(&session, &node_id)?;
                node.write_data(data.as_bytes()).await?;
                Ok(json!({}))
            }

            Command::SendInterrupt { session_id, node_id } => {
                let session = self.resolve_session(session_id.as_deref())?;
                let node = self.require_node(&session, &node_id)?;
                node.interrupt().await?;
                Ok(json!({}))
            }

            Command::GetBuffer { session_id, node_id, lines } => {
                let session = self.resolve_session(session_id.as_deref())?;
                let node = self.require_node(&session, &node_id)?;
                let buffer = node.read_tail(lines.unwrap_or(100)).await?;
                Ok(json!({ "buffer": buffer }))
            }

            Command::GetHistory { session_id, node_id, last, op } => {
                let session = self.resolve_session(session_id.as_deref())?;
                let node = self.require_node(&session, &node_id)?;
                let path = node.history_path().ok_or_else(|| {
                    EngineError::Validation(format!("history disabled for node {}", node_id))
                })?;
                let reader = HistoryReader::new(path.clone());
                let mut entries = match op {
                    Some(op) => reader.get_by_op(&op),
                    None => reader.get_all(),
                }
                .map_err(|e| EngineError::Internal(e.to_string()))?;
                if let Some(n) = last {
                    let skip = entries.len().saturating_sub(n);
                    entries = entries.split_off(skip);
                }
                let entries =
                    serde_json::to_value(entries).map_err(|e| EngineError::Internal(e.to_string()))?;
                Ok(json!({ "entries": entries }))
            }

            Command::CreateGraph { session_id, graph_id } => {
                let session = self.resolve_session(session_id.as_deref())?;
                session.create_graph(&graph_id)?;
                self.sink.emit(Event::GraphCreated {
                    session_id: session.id().clone(),
                    graph_id: GraphId::new(&graph_id),
                });
                Ok(json!({ "graph_id": graph_id }))
            }

            Command::DeleteGraph { session_id, graph_id } => {
                let session = self.resolve_session(session_id.as_deref())?;
                if !session.delete_graph(&graph_id) {
                    return Err(EngineError::NotFound(format!("graph {}", graph_id)));
                }
                self.sink.emit(Event::GraphDeleted {
                    session_id: session.id().clone(),
                    graph_id: GraphId::new(&graph_id),
                });
                Ok(json!({ "deleted": true }))
            }

            Command::ListGraphs { session_id } => {
                let session = self.resolve_session(session_id.as_deref())?;
                let graphs: Vec<Value> = session
                    .list_graphs()
                    .iter()
                    .map(|g| json!({ "graph_id": g.id().as_str(), "steps": g.len() }))
                    .collect();
                Ok(json!({ "graphs": graphs }))
            }

            Command::RunGraph { session_id, graph_id, budget, trace } => {
                self.handle_run_graph(session_id, graph_id, budget, trace).await
            }

            Command::CancelGraph { token } => {
                let cancel = self
                    .running_graphs
                    .lock()
                    .remove(&token)
                    .ok_or_else(|| EngineError::NotFound(format!("graph run {}", token)))?;
                cancel.cancel();
                Ok(json!({ "cancelled": true }))
            }

            Command::ExecuteWorkflow { session_id, workflow_id, input, params } => {
                let session = self.resolve_session(session_id.as_deref())?;
                let params = params.into_iter().collect();
                let run = session.execute_workflow(&workflow_id, input, params)?;
                self.sink.emit(Event::WorkflowStarted {
                    session_id: session.id().clone(),
                    run_id: run.id().clone(),
                });
                self.watch_run(session.id().clone(), run.clone());
                Ok(json!({ "run_id": run.id().as_str() }))
            }

            Command::ListWorkflows { session_id } => {
                let session = self.resolve_session(session_id.as_deref())?;
                let ids: Vec<String> = session
                    .list_workflows()
                    .iter()
                    .map(|w| w.id().to_string())
                    .collect();
                Ok(json!({ "workflows": ids }))
            }

            Command::GetWorkflowRun { session_id, run_id } => {
                let session = self.resolve_session(session_id.as_deref())?;
                let run = session
                    .get_run(&run_id)
                    .ok_or_else(|| EngineError::NotFound(format!("run {}", run_id)))?;
                Ok(json!({ "run": run_summary(&run) }))
            }

            Command::ListWorkflowRuns { session_id } => {
                let session = self.resolve_session(session_id.as_deref())?;
                let runs: Vec<Value> = session.list_runs().iter().map(run_summary).collect();
                Ok(json!({ "runs": runs }))
            }

            Command::AnswerGate { session_id, run_id, answer } => {
                let session = self.resolve_session(session_id.as_deref())?;
                let run = session
                    .get_run(&run_id)
                    .ok_or_else(|| EngineError::NotFound(format!("run {}", run_id)))?;
                run.answer_gate(answer)?;
                Ok(json!({ "answered": true }))
            }

            Command::CancelWorkflow { session_id, run_id } => {
                let session = self.resolve_session(session_id.as_deref())?;
                let run = session
                    .get_run(&run_id)
                    .ok_or_else(|| EngineError::NotFound(format!("run {}", run_id)))?;
                run.cancel();
                Ok(json!({ "cancelled": true }))
            }
        }
    }

    async fn handle_shutdown(&self) -> Result<Value, EngineError> {
        self.shutdown.store(true, Ordering::SeqCst);
        let sessions: Vec<Arc<Session>> = self.sessions.lock().values().cloned().collect();
        for session in sessions {
            session.stop().await;
        }
        for (_, cancel) in self.running_graphs.lock().drain() {
            cancel.cancel();
        }
        self.sink.emit(Event::ServerShutdown);
        Ok(json!({ "ok": true }))
    }

    async fn handle_run_graph(
        &self,
        session_id: Option<String>,
        graph_id: String,
        budget: Option<nerve_core::Budget>,
        trace: bool,
    ) -> Result<Value, EngineError> {
        let session = self.resolve_session(session_id.as_deref())?;
        let graph = session
            .get_graph(&graph_id)
            .ok_or_else(|| EngineError::NotFound(format!("graph {}", graph_id)))?;

        let token = generate_token("grun-");
        let cancel = CancelToken::new();
        self.running_graphs.lock().insert(token.clone(), cancel.clone());
        self.sink.emit(Event::GraphStarted {
            session_id: session.id().clone(),
            graph_id: GraphId::new(&graph_id),
            token: token.clone(),
        });

        let mut ctx = ExecutionContext::new(Arc::clone(&session)).with_cancel(cancel);
        if let Some(budget) = budget {
            ctx = ctx.with_budget(budget);
        }
        let trace_handle = trace.then(|| {
            Arc::new(parking_lot::Mutex::new(ExecutionTrace::new(graph_id.clone())))
        });
        if let Some(handle) = &trace_handle {
            ctx = ctx.with_trace(Arc::clone(handle));
        }

        let (tx, mut rx) = mpsc::channel::<StepEvent>(64);
        let sink = Arc::clone(&self.sink);
        let event_graph_id = GraphId::new(&graph_id);
        let forward = async move {
            while let Some(event) = rx.recv().await {
                sink.emit(step_event_to_event(&event_graph_id, event));
            }
        };
        let (result, ()) = tokio::join!(graph.execute_stream(&ctx, tx), forward);
        self.running_graphs.lock().remove(&token);

        match result {
            Ok(results) => {
                self.sink.emit(Event::GraphCompleted {
                    session_id: session.id().clone(),
                    graph_id: GraphId::new(&graph_id),
                    token: token.clone(),
                    status: "completed".to_string(),
                    error: None,
                });
                let mut data = serde_json::Map::new();
                data.insert("token".to_string(), json!(token));
                let mut object = serde_json::Map::new();
                for (step_id, value) in results {
                    object.insert(step_id, value);
                }
                data.insert("results".to_string(), Value::Object(object));
                if let Some(handle) = trace_handle {
                    let mut trace = handle.lock().clone();
                    trace.status = "completed".to_string();
                    data.insert(
                        "trace".to_string(),
                        serde_json::to_value(trace)
                            .map_err(|e| EngineError::Internal(e.to_string()))?,
                    );
                }
                Ok(Value::Object(data))
            }
            Err(e) => {
                self.sink.emit(Event::GraphCompleted {
                    session_id: session.id().clone(),
                    graph_id: GraphId::new(&graph_id),
                    token,
                    status: "failed".to_string(),
                    error: Some(e.to_string()),
                });
                Err(e)
            }
        }
    }

    fn watch_run(&self, session_id: SessionId, run: WorkflowRun) {
        let sink = Arc::clone(&self.sink);
        tokio::spawn(async move {
            let _ = run.wait().await;
            sink.emit(Event::WorkflowFinished {
                session_id,
                run_id: run.id().clone(),
                status: run.state().to_string(),
            });
        });
    }

    fn resolve_session(&self, session_id: Option<&str>) -> Result<Arc<Session>, EngineError> {
        let id = session_id.unwrap_or(DEFAULT_SESSION_ID);
        self.session(id)
            .ok_or_else(|| EngineError::NotFound(format!("session {}", id)))
    }

    fn require_node(&self, session: &Arc<Session>, node_id: &str) -> Result<Node, EngineError> {
        session
            .get_node(node_id)
            .ok_or_else(|| EngineError::NotFound(format!("node {}", node_id)))
    }
}

fn node_summary(node: &Node) -> Value {
    json!({
        "node_id": node.id().as_str(),
        "kind": node.kind(),
        "state": node.state().to_string(),
        "persistent": node.is_persistent(),
    })
}

fn run_summary(run: &WorkflowRun) -> Value {
    json!({
        "run_id": run.id().as_str(),
        "workflow_id": run.workflow_id().as_str(),
        "state": run.state().to_string(),
        "result": run.result(),
        "error": run.error(),
        "pending_gate": run.pending_gate(),
        "events": run.events(),
    })
}

fn step_event_to_event(graph_id: &GraphId, event: StepEvent) -> Event {
    match event {
        StepEvent::StepStart { step_id, node_id } => Event::StepStarted {
            graph_id: graph_id.clone(),
            step_id,
            node_id: NodeId::new(node_id),
        },
        StepEvent::StepChunk { node_id, chunk, .. } => Event::OutputChunk {
            node_id: NodeId::new(node_id),
            chunk,
        },
        StepEvent::StepComplete { step_id, node_id, .. } => Event::StepCompleted {
            graph_id: graph_id.clone(),
            step_id,
            node_id: NodeId::new(node_id),
        },
        StepEvent::StepError { step_id, node_id, error } => Event::StepFailed {
            graph_id: graph_id.clone(),
            step_id,
            node_id: NodeId::new(node_id),
            error,
        },
    }
}

fn parse_opt<T: std::str::FromStr<Err = String>>(
    value: Option<&str>,
) -> Result<Option<T>, EngineError> {
    value
        .map(|s| s.parse::<T>().map_err(EngineError::Validation))
        .transpose()
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
