// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session registry: the lifecycle owner for nodes, graphs, workflows, and
//! workflow runs.

use crate::agent::AgentNode;
use crate::function::FunctionNode;
use crate::graph::Graph;
use crate::node::Node;
use crate::terminal::{TerminalNode, DEFAULT_READY_TIMEOUT, DEFAULT_RESPONSE_TIMEOUT};
use crate::workflow::{Workflow, WorkflowContext, WorkflowRun};
use indexmap::IndexMap;
use nerve_adapters::backend::{PaneBackend, PtyBackend};
use nerve_adapters::ParserKind;
use nerve_core::{validate_name, Clock, EngineError, SessionId};
use nerve_history::{HistoryWriter, DEFAULT_BASE_DIR};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Which terminal backend a node is built on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendKind {
    /// Direct PTY fork with an accumulating buffer.
    #[default]
    Pty,
    /// Attached tmux pane, re-captured on each read.
    Pane,
    /// Wrapped target CLI over an inner PTY shell.
    Agent,
}

impl std::str::FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pty" => Ok(BackendKind::Pty),
            "pane" => Ok(BackendKind::Pane),
            "agent" => Ok(BackendKind::Agent),
            other => Err(format!("unknown backend: {:?}", other)),
        }
    }
}

/// Construction options for a terminal-backed node.
#[derive(Clone)]
pub struct NodeConfig {
    pub command: Vec<String>,
    pub backend: BackendKind,
    pub cwd: Option<PathBuf>,
    pub env: Vec<(String, String)>,
    /// Pane backend only.
    pub pane_id: Option<String>,
    /// None falls back to the session's default.
    pub history: Option<bool>,
    pub ready_timeout: Duration,
    pub response_timeout: Duration,
    pub default_parser: ParserKind,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            command: Vec::new(),
            backend: BackendKind::Pty,
            cwd: None,
            env: Vec::new(),
            pane_id: None,
            history: None,
            ready_timeout: DEFAULT_READY_TIMEOUT,
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
            default_parser: ParserKind::Null,
        }
    }
}

impl NodeConfig {
    pub fn command(command: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            command: command.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }
}

/// Session-level options.
#[derive(Clone)]
pub struct SessionConfig {
    pub name: Option<String>,
    pub description: Option<String>,
    pub tags: Vec<String>,
    /// Filesystem namespace under the history base directory.
    pub server_name: String,
    pub history_enabled: bool,
    pub history_base: PathBuf,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            name: None,
            description: None,
            tags: Vec::new(),
            server_name: "nerve".to_string(),
            history_enabled: true,
            history_base: PathBuf::from(DEFAULT_BASE_DIR),
        }
    }
}

/// In-memory container and factory for nodes, graphs, workflows, and runs.
///
/// Nodes auto-register on creation. Deleting the session stops every node
/// and cancels every non-terminal workflow run.
pub struct Session {
    id: SessionId,
    config: SessionConfig,
    created_at_ms: u64,
    clock: Arc<dyn Clock>,
    nodes: Mutex<IndexMap<String, Node>>,
    graphs: Mutex<IndexMap<String, Arc<Graph>>>,
    workflows: Mutex<IndexMap<String, Workflow>>,
    runs: Mutex<IndexMap<String, WorkflowRun>>,
}

impl Session {
    pub fn new(
        id: impl Into<SessionId>,
        config: SessionConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Arc<Self>, EngineError> {
        let id = id.into();
        validate_name("session id", id.as_str())?;
        validate_name("server name", &config.server_name)?;
        Ok(Arc::new(Self {
            created_at_ms: clock.epoch_ms(),
            id,
            config,
            clock,
            nodes: Mutex::new(IndexMap::new()),
            graphs: Mutex::new(IndexMap::new()),
            workflows: Mutex::new(IndexMap::new()),
            runs: Mutex::new(IndexMap::new()),
        }))
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn server_name(&self) -> &str {
        &self.config.server_name
    }

    pub fn history_base(&self) -> &PathBuf {
        &self.config.history_base
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Summary for session queries.
    pub fn describe(&self) -> Value {
        json!({
            "id": self.id.as_str(),
            "name": self.config.name,
            "description": self.config.description,
            "tags": self.config.tags,
            "server_name": self.config.server_name,
            "created_at": self.created_at_ms,
            "nodes": self.nodes.lock().len(),
            "graphs": self.graphs.lock().len(),
            "workflows": self.workflows.lock().len(),
            "workflow_runs": self.runs.lock().len(),
        })
    }

    // -- node factories --

    /// Create, start, and register a terminal-backed node.
    ///
    /// The node is READY on return. A history-writer creation failure logs a
    /// warning and the node proceeds without history; a spawn failure leaves
    /// the session without a partial node.
    pub async fn create_node(&self, id: &str, config: NodeConfig) -> Result<Node, EngineError> {
        validate_name("node id", id)?;
        if self.nodes.lock().contains_key(id) {
            return Err(EngineError::AlreadyExists(format!("node {}", id)));
        }

        let history_enabled = config.history.unwrap_or(self.config.history_enabled);
        let writer = if history_enabled {
            match HistoryWriter::create(&self.config.history_base, &self.config.server_name, id) {
                Ok(writer) => Some(writer),
                Err(e) => {
                    tracing::warn!(
                        node_id = %id,
                        error = %e,
                        "history writer creation failed; node continues without history"
                    );
                    None
                }
            }
        } else {
            None
        };

        let node = match config.backend {
            BackendKind::Pty => {
                if config.command.is_empty() {
                    return Err(EngineError::Validation(format!(
                        "node {} requires a command",
                        id
                    )));
                }
                let backend = Arc::new(PtyBackend::new(
                    config.command.clone(),
                    config.cwd.clone(),
                    config.env.clone(),
                ));
                let terminal = TerminalNode::new(
                    id,
                    backend,
                    config.command.join(" "),
                    config.default_parser,
                    writer,
                    config.ready_timeout,
                    config.response_timeout,
                    Arc::clone(&self.clock),
                );
                terminal.start().await?;
                Node::Terminal(Arc::new(terminal))
            }
            BackendKind::Pane => {
                let pane_id = config.pane_id.clone().ok_or_else(|| {
                    EngineError::Validation(format!("node {} requires pane_id", id))
                })?;
                let backend = Arc::new(PaneBackend::new(pane_id, config.command.clone()));
                let terminal = TerminalNode::new(
                    id,
                    backend,
                    config.command.join(" "),
                    config.default_parser,
                    writer,
                    config.ready_timeout,
                    config.response_timeout,
                    Arc::clone(&self.clock),
                );
                terminal.start().await?;
                Node::Terminal(Arc::new(terminal))
            }
            BackendKind::Agent => {
                // The wrapped CLI defaults to the claude parser.
                let parser = match config.default_parser {
                    ParserKind::Null => ParserKind::Claude,
                    other => other,
                };
                let agent = AgentNode::spawn(
                    id,
                    config.command.clone(),
                    config.cwd.clone(),
                    config.env.clone(),
                    parser,
                    writer,
                    config.ready_timeout,
                    config.response_timeout,
                    Arc::clone(&self.clock),
                )
                .await?;
                Node::Agent(Arc::new(agent))
            }
        };

        self.nodes.lock().insert(id.to_string(), node.clone());
        Ok(node)
    }

    /// Register a function node. No I/O.
    pub fn create_function<F, Fut>(&self, id: &str, func: F) -> Result<Node, EngineError>
    where
        F: Fn(crate::context::ExecutionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, EngineError>> + Send + 'static,
    {
        validate_name("node id", id)?;
        let mut nodes = self.nodes.lock();
        if nodes.contains_key(id) {
            return Err(EngineError::AlreadyExists(format!("node {}", id)));
        }
        let node = Node::Function(Arc::new(FunctionNode::new(id, func)));
        nodes.insert(id.to_string(), node.clone());
        Ok(node)
    }

    /// Register an empty graph.
    pub fn create_graph(&self, id: &str) -> Result<Arc<Graph>, EngineError> {
        validate_name("graph id", id)?;
        let mut graphs = self.graphs.lock();
        if graphs.contains_key(id) {
            return Err(EngineError::AlreadyExists(format!("graph {}", id)));
        }
        let graph = Arc::new(Graph::new(id));
        graphs.insert(id.to_string(), Arc::clone(&graph));
        Ok(graph)
    }

    /// Register a workflow function.
    pub fn create_workflow<F, Fut>(&self, id: &str, func: F) -> Result<Workflow, EngineError>
    where
        F: Fn(WorkflowContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, EngineError>> + Send + 'static,
    {
        validate_name("workflow id", id)?;
        let mut workflows = self.workflows.lock();
        if workflows.contains_key(id) {
            return Err(EngineError::AlreadyExists(format!("workflow {}", id)));
        }
        let workflow = Workflow::new(id, func);
        workflows.insert(id.to_string(), workflow.clone());
        Ok(workflow)
    }

    /// Start a new run of a registered workflow.
    pub fn execute_workflow(
        self: &Arc<Self>,
        workflow_id: &str,
        input: Option<Value>,
        params: serde_json::Map<String, Value>,
    ) -> Result<WorkflowRun, EngineError> {
        let workflow = self
            .workflows
            .lock()
            .get(workflow_id)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(format!("workflow {}", workflow_id)))?;
        let run = WorkflowRun::new(&workflow, Arc::clone(self), input, params);
        run.start(workflow.func())?;
        self.runs.lock().insert(run.id().to_string(), run.clone());
        Ok(run)
    }

    // -- lookups --

    pub fn get_node(&self, id: &str) -> Option<Node> {
        self.nodes.lock().get(id).cloned()
    }

    pub fn get_graph(&self, id: &str) -> Option<Arc<Graph>> {
        self.graphs.lock().get(id).cloned()
    }

    pub fn get_workflow(&self, id: &str) -> Option<Workflow> {
        self.workflows.lock().get(id).cloned()
    }

    pub fn get_run(&self, run_id: &str) -> Option<WorkflowRun> {
        self.runs.lock().get(run_id).cloned()
    }

    pub fn list_nodes(&self) -> Vec<Node> {
        self.nodes.lock().values().cloned().collect()
    }

    pub fn list_graphs(&self) -> Vec<Arc<Graph>> {
        self.graphs.lock().values().cloned().collect()
    }

    pub fn list_workflows(&self) -> Vec<Workflow> {
        self.workflows.lock().values().cloned().collect()
    }

    pub fn list_runs(&self) -> Vec<WorkflowRun> {
        self.runs.lock().values().cloned().collect()
    }

    // -- removal and shutdown --

    /// Stop and remove a node. Returns whether it existed.
    pub async fn delete_node(&self, id: &str) -> bool {
        let node = self.nodes.lock().shift_remove(id);
        match node {
            Some(node) => {
                if let Err(e) = node.stop().await {
                    tracing::warn!(node_id = %id, error = %e, "node stop failed during delete");
                }
                true
            }
            None => false,
        }
    }

    /// Remove a graph. Returns whether it existed.
    pub fn delete_graph(&self, id: &str) -> bool {
        self.graphs.lock().shift_remove(id).is_some()
    }

    /// Stop every node, cancel every non-terminal run, clear registries.
    pub async fn stop(&self) {
        let nodes: Vec<Node> = {
            let mut map = self.nodes.lock();
            map.drain(..).map(|(_, node)| node).collect()
        };
        for node in nodes {
            if let Err(e) = node.stop().await {
                tracing::warn!(node_id = %node.id(), error = %e, "node stop failed during session stop");
            }
        }
        let runs: Vec<WorkflowRun> = {
            let mut map = self.runs.lock();
            map.drain(..).map(|(_, run)| run).collect()
        };
        for run in runs {
            if !run.is_terminal() {
                run.cancel();
            }
        }
        self.graphs.lock().clear();
        self.workflows.lock().clear();
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
