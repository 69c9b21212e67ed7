// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared error taxonomy for the engine.

use crate::budget::{Budget, UsageSnapshot};
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by node, graph, workflow, and session operations.
///
/// History-writer failures are deliberately absent: after creation they are
/// logged and swallowed, never propagated to callers.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    /// Invalid id, bad parameters, or mutually exclusive fields.
    #[error("validation error: {0}")]
    Validation(String),

    /// Unknown session, node, graph, run, or step dependency.
    #[error("not found: {0}")]
    NotFound(String),

    /// Duplicate id on create.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Operation on a stopped node or exited child.
    #[error("closed: {0}")]
    Closed(String),

    /// Parser did not reach ready within the response timeout, or a step
    /// exceeded its per-attempt timeout.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// Cancellation token tripped.
    #[error("cancelled")]
    Cancelled,

    /// Resource usage breached the active budget.
    #[error("budget exceeded: {reason}")]
    BudgetExceeded {
        reason: String,
        usage: UsageSnapshot,
        budget: Budget,
    },

    /// Child process could not be started.
    #[error("spawn failed: {0}")]
    Spawn(String),

    /// Parser failed internally.
    #[error("parser error: {0}")]
    Parser(String),

    /// Invariant violation; the engine continues.
    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Short kind tag for logs and error events.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::Validation(_) => "validation",
            EngineError::NotFound(_) => "not_found",
            EngineError::AlreadyExists(_) => "already_exists",
            EngineError::Closed(_) => "closed",
            EngineError::Timeout(_) => "timeout",
            EngineError::Cancelled => "cancelled",
            EngineError::BudgetExceeded { .. } => "budget_exceeded",
            EngineError::Spawn(_) => "spawn",
            EngineError::Parser(_) => "parser",
            EngineError::Internal(_) => "internal",
        }
    }
}
