// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Execution budgets and running resource usage.

use crate::error::EngineError;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

/// Limits for one execution tree. `None` disables that dimension.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Budget {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_time_seconds: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_steps: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_api_calls: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_cost_dollars: Option<f64>,
}

impl Budget {
    /// Budget with only a step limit, the most common test shape.
    pub fn max_steps(n: u64) -> Self {
        Self { max_steps: Some(n), ..Self::default() }
    }

    /// Compare `usage` against this budget.
    ///
    /// The step limit uses `>=` so the check placed before the (m+1)-th step
    /// fires once `m` steps have executed; the other dimensions fire once
    /// their running total passes the limit.
    pub fn check(&self, usage: &ResourceUsage) -> Result<(), EngineError> {
        let snap = usage.snapshot();
        let violation = if self.max_steps.is_some_and(|m| snap.steps_executed >= m) {
            Some(format!(
                "steps_executed {} reached max_steps {}",
                snap.steps_executed,
                self.max_steps.unwrap_or_default()
            ))
        } else if self.max_tokens.is_some_and(|m| snap.tokens > m) {
            Some(format!("tokens {} over max_tokens {}", snap.tokens, self.max_tokens.unwrap_or_default()))
        } else if self.max_api_calls.is_some_and(|m| snap.api_calls > m) {
            Some(format!(
                "api_calls {} over max_api_calls {}",
                snap.api_calls,
                self.max_api_calls.unwrap_or_default()
            ))
        } else if self
            .max_time_seconds
            .is_some_and(|m| snap.elapsed_ms as f64 / 1000.0 > m)
        {
            Some(format!(
                "elapsed {:.1}s over max_time_seconds {:.1}",
                snap.elapsed_ms as f64 / 1000.0,
                self.max_time_seconds.unwrap_or_default()
            ))
        } else if self.max_cost_dollars.is_some_and(|m| snap.cost_dollars > m) {
            Some(format!(
                "cost ${:.4} over max_cost_dollars ${:.4}",
                snap.cost_dollars,
                self.max_cost_dollars.unwrap_or_default()
            ))
        } else {
            None
        };

        match violation {
            Some(reason) => Err(EngineError::BudgetExceeded {
                reason,
                usage: snap,
                budget: self.clone(),
            }),
            None => Ok(()),
        }
    }
}

/// Point-in-time copy of the running totals, carried inside budget errors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageSnapshot {
    pub tokens: u64,
    pub steps_executed: u64,
    pub api_calls: u64,
    pub cost_dollars: f64,
    pub elapsed_ms: u64,
}

#[derive(Debug, Default)]
struct Counters {
    tokens: u64,
    steps_executed: u64,
    api_calls: u64,
    cost_dollars: f64,
}

/// Running totals for one execution tree.
///
/// A child usage (installed by a sub-budgeted step) mirrors every increment
/// into its parent, so exceeding either budget raises. Elapsed time is
/// measured from a monotonic start instant, independent of wall-clock
/// changes.
#[derive(Debug)]
pub struct ResourceUsage {
    counters: Mutex<Counters>,
    started: Instant,
    parent: Option<Arc<ResourceUsage>>,
}

impl ResourceUsage {
    pub fn new() -> Self {
        Self {
            counters: Mutex::new(Counters::default()),
            started: Instant::now(),
            parent: None,
        }
    }

    /// Fresh counter constrained by a sub-budget, still feeding the parent.
    pub fn child(parent: &Arc<ResourceUsage>) -> Arc<ResourceUsage> {
        Arc::new(Self {
            counters: Mutex::new(Counters::default()),
            started: Instant::now(),
            parent: Some(Arc::clone(parent)),
        })
    }

    pub fn add_tokens(&self, n: u64) {
        self.counters.lock().tokens += n;
        if let Some(parent) = &self.parent {
            parent.add_tokens(n);
        }
    }

    pub fn add_step(&self) {
        self.counters.lock().steps_executed += 1;
        if let Some(parent) = &self.parent {
            parent.add_step();
        }
    }

    pub fn add_api_call(&self) {
        self.counters.lock().api_calls += 1;
        if let Some(parent) = &self.parent {
            parent.add_api_call();
        }
    }

    pub fn add_cost(&self, dollars: f64) {
        self.counters.lock().cost_dollars += dollars;
        if let Some(parent) = &self.parent {
            parent.add_cost(dollars);
        }
    }

    pub fn snapshot(&self) -> UsageSnapshot {
        let counters = self.counters.lock();
        UsageSnapshot {
            tokens: counters.tokens,
            steps_executed: counters.steps_executed,
            api_calls: counters.api_calls,
            cost_dollars: counters.cost_dollars,
            elapsed_ms: self.started.elapsed().as_millis() as u64,
        }
    }
}

impl Default for ResourceUsage {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "budget_tests.rs"]
mod tests;
