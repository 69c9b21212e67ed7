// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lifecycle and output events pushed to transports.

use crate::id::{GraphId, NodeId, RunId, SessionId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Events emitted by the command engine.
///
/// Serializes with `{"type": "node:ready", ...fields}` format. The set is
/// closed; transports adapt these to their wire format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    // -- node lifecycle --
    #[serde(rename = "node:created")]
    NodeCreated { session_id: SessionId, node_id: NodeId },

    #[serde(rename = "node:ready")]
    NodeReady { session_id: SessionId, node_id: NodeId },

    #[serde(rename = "node:busy")]
    NodeBusy { session_id: SessionId, node_id: NodeId },

    #[serde(rename = "node:stopped")]
    NodeStopped { session_id: SessionId, node_id: NodeId },

    // -- graph lifecycle --
    #[serde(rename = "graph:created")]
    GraphCreated { session_id: SessionId, graph_id: GraphId },

    #[serde(rename = "graph:deleted")]
    GraphDeleted { session_id: SessionId, graph_id: GraphId },

    #[serde(rename = "graph:started")]
    GraphStarted {
        session_id: SessionId,
        graph_id: GraphId,
        /// Opaque token for out-of-band cancellation.
        token: String,
    },

    #[serde(rename = "graph:completed")]
    GraphCompleted {
        session_id: SessionId,
        graph_id: GraphId,
        token: String,
        /// "completed" or "failed".
        status: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    // -- step lifecycle --
    #[serde(rename = "step:started")]
    StepStarted { graph_id: GraphId, step_id: String, node_id: NodeId },

    #[serde(rename = "step:completed")]
    StepCompleted { graph_id: GraphId, step_id: String, node_id: NodeId },

    #[serde(rename = "step:failed")]
    StepFailed {
        graph_id: GraphId,
        step_id: String,
        node_id: NodeId,
        error: String,
    },

    // -- session lifecycle --
    #[serde(rename = "session:created")]
    SessionCreated { session_id: SessionId },

    #[serde(rename = "session:deleted")]
    SessionDeleted { session_id: SessionId },

    // -- workflow lifecycle --
    #[serde(rename = "workflow:started")]
    WorkflowStarted { session_id: SessionId, run_id: RunId },

    #[serde(rename = "workflow:finished")]
    WorkflowFinished {
        session_id: SessionId,
        run_id: RunId,
        /// Terminal run state: "completed", "failed", "cancelled".
        status: String,
    },

    // -- output --
    #[serde(rename = "output:chunk")]
    OutputChunk { node_id: NodeId, chunk: String },

    #[serde(rename = "output:parsed")]
    OutputParsed { node_id: NodeId, response: Value },

    // -- errors and shutdown --
    #[serde(rename = "error")]
    Error { message: String },

    #[serde(rename = "server:shutdown")]
    ServerShutdown,
}

impl Event {
    /// Event name for log spans (e.g. "node:ready").
    pub fn name(&self) -> &'static str {
        match self {
            Event::NodeCreated { .. } => "node:created",
            Event::NodeReady { .. } => "node:ready",
            Event::NodeBusy { .. } => "node:busy",
            Event::NodeStopped { .. } => "node:stopped",
            Event::GraphCreated { .. } => "graph:created",
            Event::GraphDeleted { .. } => "graph:deleted",
            Event::GraphStarted { .. } => "graph:started",
            Event::GraphCompleted { .. } => "graph:completed",
            Event::StepStarted { .. } => "step:started",
            Event::StepCompleted { .. } => "step:completed",
            Event::StepFailed { .. } => "step:failed",
            Event::SessionCreated { .. } => "session:created",
            Event::SessionDeleted { .. } => "session:deleted",
            Event::WorkflowStarted { .. } => "workflow:started",
            Event::WorkflowFinished { .. } => "workflow:finished",
            Event::OutputChunk { .. } => "output:chunk",
            Event::OutputParsed { .. } => "output:parsed",
            Event::Error { .. } => "error",
            Event::ServerShutdown => "server:shutdown",
        }
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
