// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Opt-in per-step and per-execution observability records.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Record of one executed step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepTrace {
    pub step_id: String,
    pub node_id: String,
    /// Node variant: "terminal", "function", "graph", "agent".
    pub node_kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_ms: u64,
    pub ended_ms: u64,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, Value>,
}

/// Aggregate trace for one graph execution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionTrace {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graph_id: Option<String>,
    /// Overall status: "running", "completed", "failed".
    pub status: String,
    pub steps: Vec<StepTrace>,
    pub total_duration_ms: u64,
    pub total_tokens: u64,
}

impl ExecutionTrace {
    pub fn new(graph_id: impl Into<String>) -> Self {
        Self {
            graph_id: Some(graph_id.into()),
            status: "running".to_string(),
            ..Self::default()
        }
    }

    /// Append a step trace and fold its totals in.
    pub fn record(&mut self, step: StepTrace) {
        self.total_duration_ms += step.duration_ms;
        self.total_tokens += step.tokens.unwrap_or(0);
        self.steps.push(step);
    }
}
