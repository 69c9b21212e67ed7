// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Node and workflow-run state machines.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a node.
///
/// Legal transitions:
///
/// ```text
/// CREATED --start--> STARTING --ready--> READY <=> BUSY --stop--> STOPPING --> STOPPED
///         --start-fail------------------------------------------------------> STOPPED
/// ```
///
/// STOPPED is absorbing; every operation other than close/stop on a stopped
/// node fails with `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
    Created,
    Starting,
    Ready,
    Busy,
    Stopping,
    Stopped,
}

impl NodeState {
    /// Whether `next` is a legal successor of this state.
    pub fn can_transition_to(self, next: NodeState) -> bool {
        use NodeState::*;
        matches!(
            (self, next),
            (Created, Starting)
                | (Starting, Ready)
                | (Starting, Stopped)
                | (Ready, Busy)
                | (Busy, Ready)
                | (Created, Stopping)
                | (Ready, Stopping)
                | (Busy, Stopping)
                | (Stopping, Stopped)
        )
    }

    pub fn is_stopped(self) -> bool {
        self == NodeState::Stopped
    }
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NodeState::Created => "created",
            NodeState::Starting => "starting",
            NodeState::Ready => "ready",
            NodeState::Busy => "busy",
            NodeState::Stopping => "stopping",
            NodeState::Stopped => "stopped",
        };
        write!(f, "{}", s)
    }
}

/// State of a workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Pending,
    Running,
    Waiting,
    Completed,
    Failed,
    Cancelled,
}

impl RunState {
    /// Completed, failed, and cancelled runs never change state again.
    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Completed | RunState::Failed | RunState::Cancelled)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunState::Pending => "pending",
            RunState::Running => "running",
            RunState::Waiting => "waiting",
            RunState::Completed => "completed",
            RunState::Failed => "failed",
            RunState::Cancelled => "cancelled",
        };
        write!(f, "{}", s)
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
