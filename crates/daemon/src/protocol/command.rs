// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use nerve_core::{Budget, EngineError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;

/// A subprocess command: a single string (split on whitespace) or an argv
/// list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CommandLine {
    Line(String),
    Argv(Vec<String>),
}

impl Default for CommandLine {
    fn default() -> Self {
        CommandLine::Argv(Vec::new())
    }
}

impl CommandLine {
    pub fn to_argv(&self) -> Vec<String> {
        match self {
            CommandLine::Line(line) => line.split_whitespace().map(str::to_string).collect(),
            CommandLine::Argv(argv) => argv.clone(),
        }
    }
}

/// Commands dispatched by the engine.
///
/// Extraction is permissive about missing optional fields; a missing
/// required field fails decoding with a validation error. A `session_id`
/// selects the target session; absent, the default session is used.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    /// Health check.
    Ping,

    /// Orderly stop of all sessions.
    Shutdown,

    // -- sessions --
    CreateSession {
        session_id: String,
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        description: Option<String>,
        #[serde(default)]
        tags: Vec<String>,
    },
    DeleteSession {
        session_id: String,
    },
    ListSessions,
    GetSession {
        #[serde(default)]
        session_id: Option<String>,
    },

    // -- nodes --
    CreateNode {
        #[serde(default)]
        session_id: Option<String>,
        node_id: String,
        #[serde(default)]
        command: CommandLine,
        /// "pty", "pane", or "agent".
        #[serde(default)]
        backend: Option<String>,
        #[serde(default)]
        cwd: Option<PathBuf>,
        #[serde(default)]
        pane_id: Option<String>,
        #[serde(default)]
        history: Option<bool>,
        #[serde(default)]
        ready_timeout_secs: Option<u64>,
        #[serde(default)]
        response_timeout_secs: Option<u64>,
        /// "null", "claude", or "codex".
        #[serde(default)]
        default_parser: Option<String>,
    },
    StopNode {
        #[serde(default)]
        session_id: Option<String>,
        node_id: String,
    },
    ListNodes {
        #[serde(default)]
        session_id: Option<String>,
    },
    GetNode {
        #[serde(default)]
        session_id: Option<String>,
        node_id: String,
    },

    // -- terminal I/O --
    ExecuteInput {
        #[serde(default)]
        session_id: Option<String>,
        node_id: String,
        input: String,
        #[serde(default)]
        parser: Option<String>,
        #[serde(default)]
        timeout_secs: Option<u64>,
        #[serde(default)]
        stream: bool,
    },
    RunCommand {
        #[serde(default)]
        session_id: Option<String>,
        node_id: String,
        command: String,
    },
    WriteData {
        #[serde(default)]
        session_id: Option<String>,
        node_id: String,
        data: String,
    },
    SendInterrupt {
        #[serde(default)]
        session_id: Option<String>,
        node_id: String,
    },
    GetBuffer {
        #[serde(default)]
        session_id: Option<String>,
        node_id: String,
        #[serde(default)]
        lines: Option<usize>,
    },
    GetHistory {
        #[serde(default)]
        session_id: Option<String>,
        node_id: String,
        #[serde(default)]
        last: Option<usize>,
        #[serde(default)]
        op: Option<String>,
    },

    // -- graphs --
    CreateGraph {
        #[serde(default)]
        session_id: Option<String>,
        graph_id: String,
    },
    DeleteGraph {
        #[serde(default)]
        session_id: Option<String>,
        graph_id: String,
    },
    ListGraphs {
        #[serde(default)]
        session_id: Option<String>,
    },
    RunGraph {
        #[serde(default)]
        session_id: Option<String>,
        graph_id: String,
        #[serde(default)]
        budget: Option<Budget>,
        #[serde(default)]
        trace: bool,
    },
    CancelGraph {
        token: String,
    },

    // -- workflows --
    ExecuteWorkflow {
        #[serde(default)]
        session_id: Option<String>,
        workflow_id: String,
        #[serde(default)]
        input: Option<Value>,
        #[serde(default)]
        params: HashMap<String, Value>,
    },
    ListWorkflows {
        #[serde(default)]
        session_id: Option<String>,
    },
    GetWorkflowRun {
        #[serde(default)]
        session_id: Option<String>,
        run_id: String,
    },
    ListWorkflowRuns {
        #[serde(default)]
        session_id: Option<String>,
    },
    AnswerGate {
        #[serde(default)]
        session_id: Option<String>,
        run_id: String,
        answer: Value,
    },
    CancelWorkflow {
        #[serde(default)]
        session_id: Option<String>,
        run_id: String,
    },
}

impl Command {
    /// Decode a command from an untyped envelope. Missing required fields
    /// surface as validation errors.
    pub fn from_value(value: Value) -> Result<Self, EngineError> {
        serde_json::from_value(value).map_err(|e| EngineError::Validation(e.to_string()))
    }

    /// Command name for log spans (the serde tag).
    pub fn name(&self) -> &'static str {
        match self {
            Command::Ping => "ping",
            Command::Shutdown => "shutdown",
            Command::CreateSession { .. } => "create_session",
            Command::DeleteSession { .. } => "delete_session",
            Command::ListSessions => "list_sessions",
            Command::GetSession { .. } => "get_session",
            Command::CreateNode { .. } => "create_node",
            Command::StopNode { .. } => "stop_node",
            Command::ListNodes { .. } => "list_nodes",
            Command::GetNode { .. } => "get_node",
            Command::ExecuteInput { .. } => "execute_input",
            Command::RunCommand { .. } => "run_command",
            Command::WriteData { .. } => "write_data",
            Command::SendInterrupt { .. } => "send_interrupt",
            Command::GetBuffer { .. } => "get_buffer",
            Command::GetHistory { .. } => "get_history",
            Command::CreateGraph { .. } => "create_graph",
            Command::DeleteGraph { .. } => "delete_graph",
            Command::ListGraphs { .. } => "list_graphs",
            Command::RunGraph { .. } => "run_graph",
            Command::CancelGraph { .. } => "cancel_graph",
            Command::ExecuteWorkflow { .. } => "execute_workflow",
            Command::ListWorkflows { .. } => "list_workflows",
            Command::GetWorkflowRun { .. } => "get_workflow_run",
            Command::ListWorkflowRuns { .. } => "list_workflow_runs",
            Command::AnswerGate { .. } => "answer_gate",
            Command::CancelWorkflow { .. } => "cancel_workflow",
        }
    }
}
