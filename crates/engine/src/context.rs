// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-execution capability bundle.

use crate::session::Session;
use indexmap::IndexMap;
use nerve_adapters::ParserKind;
use nerve_core::{Budget, CancelToken, EngineError, ExecutionTrace, ResourceUsage};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Context passed down the execution call tree.
///
/// `with_*` updates return a new context; budget, usage, cancellation, and
/// trace stay shared by reference, which is how budgets and cancellation
/// apply across nested graphs.
#[derive(Clone)]
pub struct ExecutionContext {
    pub session: Arc<Session>,
    pub input: Option<Value>,
    /// `step_id -> result` for the enclosing graph so far.
    pub upstream: IndexMap<String, Value>,
    /// Per-operation parser override.
    pub parser: Option<ParserKind>,
    /// Per-operation response timeout override.
    pub timeout: Option<Duration>,
    pub usage: Arc<ResourceUsage>,
    pub cancel: CancelToken,
    pub trace: Option<Arc<Mutex<ExecutionTrace>>>,
    /// Active budgets, outermost first, each paired with the usage counter
    /// it constrains.
    budgets: Vec<(Arc<Budget>, Arc<ResourceUsage>)>,
}

impl ExecutionContext {
    pub fn new(session: Arc<Session>) -> Self {
        Self {
            session,
            input: None,
            upstream: IndexMap::new(),
            parser: None,
            timeout: None,
            usage: Arc::new(ResourceUsage::new()),
            cancel: CancelToken::new(),
            trace: None,
            budgets: Vec::new(),
        }
    }

    pub fn with_input(&self, input: Option<Value>) -> Self {
        let mut ctx = self.clone();
        ctx.input = input;
        ctx
    }

    pub fn with_upstream(&self, upstream: IndexMap<String, Value>) -> Self {
        let mut ctx = self.clone();
        ctx.upstream = upstream;
        ctx
    }

    pub fn with_parser(&self, parser: Option<ParserKind>) -> Self {
        let mut ctx = self.clone();
        ctx.parser = parser;
        ctx
    }

    pub fn with_timeout(&self, timeout: Option<Duration>) -> Self {
        let mut ctx = self.clone();
        ctx.timeout = timeout;
        ctx
    }

    pub fn with_cancel(&self, cancel: CancelToken) -> Self {
        let mut ctx = self.clone();
        ctx.cancel = cancel;
        ctx
    }

    pub fn with_trace(&self, trace: Arc<Mutex<ExecutionTrace>>) -> Self {
        let mut ctx = self.clone();
        ctx.trace = Some(trace);
        ctx
    }

    /// Install a budget over the current usage counter.
    pub fn with_budget(&self, budget: Budget) -> Self {
        let mut ctx = self.clone();
        ctx.budgets.push((Arc::new(budget), Arc::clone(&self.usage)));
        ctx
    }

    /// Install a sub-budget: the subtree sees a fresh usage counter
    /// constrained by `budget`, while still incrementing this context's
    /// counter (exceeding either raises).
    pub fn with_sub_budget(&self, budget: Budget) -> Self {
        let child = ResourceUsage::child(&self.usage);
        let mut ctx = self.clone();
        ctx.usage = Arc::clone(&child);
        ctx.budgets.push((Arc::new(budget), child));
        ctx
    }

    pub fn check_cancelled(&self) -> Result<(), EngineError> {
        self.cancel.check()
    }

    /// Check every active budget, innermost included.
    pub fn check_budget(&self) -> Result<(), EngineError> {
        for (budget, usage) in &self.budgets {
            budget.check(usage)?;
        }
        Ok(())
    }

    /// The input as text, for writing into a terminal.
    pub fn input_text(&self) -> String {
        match &self.input {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => String::new(),
        }
    }
}

#[cfg(test)]
#[path = "context_tests.rs"]
mod tests;
