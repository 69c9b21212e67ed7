// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Graph scheduler: an acyclic dependency graph of steps over nodes.

use crate::context::ExecutionContext;
use crate::node::Node;
use crate::policy::{self, ErrorPolicy};
use indexmap::IndexMap;
use nerve_adapters::ParserKind;
use nerve_core::{Budget, EngineError, GraphId, NodeId, StepTrace};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Pure function of upstream results producing a step's input.
pub type InputFn = Arc<dyn Fn(&IndexMap<String, Value>) -> Value + Send + Sync>;

/// One vertex of a graph.
///
/// `input` and `input_fn` are mutually exclusive; `node` and `node_ref` are
/// too (a direct node wins at resolution time, but validation rejects both).
#[derive(Clone)]
pub struct Step {
    pub step_id: String,
    pub node: Option<Node>,
    pub node_ref: Option<NodeId>,
    pub input: Option<Value>,
    pub input_fn: Option<InputFn>,
    pub depends_on: Vec<String>,
    pub error_policy: Option<ErrorPolicy>,
    pub parser: Option<ParserKind>,
    pub budget: Option<Budget>,
}

impl std::fmt::Debug for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Step")
            .field("step_id", &self.step_id)
            .field("node", &self.node)
            .field("node_ref", &self.node_ref)
            .field("depends_on", &self.depends_on)
            .finish_non_exhaustive()
    }
}

impl Step {
    /// Step over a direct node reference.
    pub fn new(step_id: impl Into<String>, node: Node) -> Self {
        Self {
            step_id: step_id.into(),
            node: Some(node),
            node_ref: None,
            input: None,
            input_fn: None,
            depends_on: Vec::new(),
            error_policy: None,
            parser: None,
            budget: None,
        }
    }

    /// Step over a node id resolved through the enclosing session.
    pub fn referencing(step_id: impl Into<String>, node_ref: impl Into<NodeId>) -> Self {
        Self {
            step_id: step_id.into(),
            node: None,
            node_ref: Some(node_ref.into()),
            input: None,
            input_fn: None,
            depends_on: Vec::new(),
            error_policy: None,
            parser: None,
            budget: None,
        }
    }

    pub fn input(mut self, input: Value) -> Self {
        self.input = Some(input);
        self
    }

    pub fn input_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(&IndexMap<String, Value>) -> Value + Send + Sync + 'static,
    {
        self.input_fn = Some(Arc::new(f));
        self
    }

    pub fn depends_on(mut self, deps: &[&str]) -> Self {
        self.depends_on = deps.iter().map(|d| d.to_string()).collect();
        self
    }

    pub fn error_policy(mut self, policy: ErrorPolicy) -> Self {
        self.error_policy = Some(policy);
        self
    }

    pub fn parser(mut self, parser: ParserKind) -> Self {
        self.parser = Some(parser);
        self
    }

    pub fn budget(mut self, budget: Budget) -> Self {
        self.budget = Some(budget);
        self
    }
}

/// Events yielded by [`Graph::execute_stream`].
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepEvent {
    StepStart { step_id: String, node_id: String },
    StepChunk { step_id: String, node_id: String, chunk: String },
    StepComplete { step_id: String, node_id: String, result: Value },
    StepError { step_id: String, node_id: String, error: String },
}

/// Acyclic dependency graph of steps. A graph is itself a node (ephemeral),
/// so graphs nest arbitrarily.
pub struct Graph {
    id: GraphId,
    node_id: NodeId,
    steps: Mutex<Vec<Step>>,
}

impl std::fmt::Debug for Graph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Graph").field("id", &self.id).field("node_id", &self.node_id).finish_non_exhaustive()
    }
}

impl Graph {
    pub fn new(id: impl Into<GraphId>) -> Self {
        let id = id.into();
        let node_id = NodeId::new(id.as_str());
        Self { id, node_id, steps: Mutex::new(Vec::new()) }
    }

    pub fn id(&self) -> &GraphId {
        &self.id
    }

    pub(crate) fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    pub fn add_step(&self, step: Step) {
        self.steps.lock().push(step);
    }

    pub fn len(&self) -> usize {
        self.steps.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.lock().is_empty()
    }

    /// Structural validation. Returns one message per problem; an empty list
    /// means `execute` cannot fail for structural reasons.
    pub fn validate(&self) -> Vec<String> {
        let steps = self.steps.lock();
        let mut errors = Vec::new();
        let mut seen = Vec::new();

        for step in steps.iter() {
            if step.step_id.trim().is_empty() {
                errors.push("step_id must not be empty or whitespace".to_string());
                continue;
            }
            if seen.contains(&step.step_id.as_str()) {
                errors.push(format!("duplicate step_id {:?}", step.step_id));
            }
            seen.push(step.step_id.as_str());

            if step.depends_on.iter().any(|d| d == &step.step_id) {
                errors.push(format!("step {:?} depends on itself", step.step_id));
            }
            if step.input.is_some() && step.input_fn.is_some() {
                errors.push(format!(
                    "step {:?} sets both input and input_fn",
                    step.step_id
                ));
            }
            match (&step.node, &step.node_ref) {
                (Some(_), Some(_)) => errors.push(format!(
                    "step {:?} sets both node and node_ref",
                    step.step_id
                )),
                (None, None) => {
                    errors.push(format!("step {:?} has no node or node_ref", step.step_id))
                }
                _ => {}
            }
        }

        for step in steps.iter() {
            for dep in &step.depends_on {
                if dep != &step.step_id && !seen.contains(&dep.as_str()) {
                    errors.push(format!(
                        "step {:?} depends on unknown step {:?}",
                        step.step_id, dep
                    ));
                }
            }
        }

        if errors.is_empty() {
            if let Err(cycle) = topo_order(&steps) {
                errors.push(cycle);
            }
        }
        errors
    }

    /// Deterministic topological execution order.
    pub fn execution_order(&self) -> Result<Vec<String>, EngineError> {
        let steps = self.steps.lock();
        topo_order(&steps).map_err(EngineError::Validation)
    }

    /// Execute steps sequentially in topological order.
    ///
    /// Dependency results are exposed to each step through
    /// `ctx.upstream`; a nested graph step yields a nested object at that
    /// step's key.
    pub async fn execute(
        &self,
        ctx: &ExecutionContext,
    ) -> Result<IndexMap<String, Value>, EngineError> {
        self.execute_with(ctx, None).await
    }

    /// Execute while yielding [`StepEvent`]s into `events`.
    ///
    /// The per-step sub-sequence is `step_start -> step_chunk* ->
    /// (step_complete | step_error)`. Streaming steps run a single attempt;
    /// error policies apply to the non-streaming path.
    pub async fn execute_stream(
        &self,
        ctx: &ExecutionContext,
        events: mpsc::Sender<StepEvent>,
    ) -> Result<IndexMap<String, Value>, EngineError> {
        self.execute_with(ctx, Some(events)).await
    }

    async fn execute_with(
        &self,
        ctx: &ExecutionContext,
        events: Option<mpsc::Sender<StepEvent>>,
    ) -> Result<IndexMap<String, Value>, EngineError> {
        let errors = self.validate();
        if !errors.is_empty() {
            return Err(EngineError::Validation(format!(
                "graph {} invalid: {}",
                self.id,
                errors.join("; ")
            )));
        }

        let order = self.execution_order()?;
        let steps: Vec<Step> = self.steps.lock().clone();
        let clock = Arc::clone(ctx.session.clock());
        let mut results: IndexMap<String, Value> = IndexMap::new();

        for step_id in order {
            ctx.check_cancelled()?;
            ctx.check_budget()?;

            let Some(step) = steps.iter().find(|s| s.step_id == step_id) else {
                return Err(EngineError::Internal(format!(
                    "step {:?} vanished from graph {}",
                    step_id, self.id
                )));
            };

            let node = self.resolve_node(ctx, step)?;
            let step_input = match &step.input_fn {
                Some(f) => Some(f(&results)),
                None => step.input.clone(),
            };

            let mut step_ctx = ctx
                .with_input(step_input.clone())
                .with_upstream(results.clone());
            // Step override yields to a per-operation override already set.
            if ctx.parser.is_none() && step.parser.is_some() {
                step_ctx = step_ctx.with_parser(step.parser);
            }
            if let Some(budget) = &step.budget {
                step_ctx = step_ctx.with_sub_budget(budget.clone());
            }

            if let Some(events) = &events {
                let _ = events
                    .send(StepEvent::StepStart {
                        step_id: step.step_id.clone(),
                        node_id: node.id().to_string(),
                    })
                    .await;
            }

            let started_ms = clock.epoch_ms();
            let usage_before = step_ctx.usage.snapshot();
            let outcome = match &events {
                Some(events) if node.supports_stream() => {
                    self.run_streaming_step(&node, &step_ctx, step, events).await
                }
                _ => policy::run_with_policy(&node, &step_ctx, step.error_policy.as_ref()).await,
            };
            let ended_ms = clock.epoch_ms();

            match outcome {
                Ok(value) => {
                    if let Some(events) = &events {
                        let _ = events
                            .send(StepEvent::StepComplete {
                                step_id: step.step_id.clone(),
                                node_id: node.id().to_string(),
                                result: value.clone(),
                            })
                            .await;
                    }
                    if let Some(trace) = &ctx.trace {
                        let tokens = step_ctx.usage.snapshot().tokens - usage_before.tokens;
                        trace.lock().record(StepTrace {
                            step_id: step.step_id.clone(),
                            node_id: node.id().to_string(),
                            node_kind: node.kind().to_string(),
                            input: step_input,
                            output: Some(value.clone()),
                            error: None,
                            started_ms,
                            ended_ms,
                            duration_ms: ended_ms.saturating_sub(started_ms),
                            tokens: (tokens > 0).then_some(tokens),
                            metadata: serde_json::Map::new(),
                        });
                    }
                    step_ctx.usage.add_step();
                    results.insert(step.step_id.clone(), value);
                }
                Err(e) => {
                    if let Some(events) = &events {
                        let _ = events
                            .send(StepEvent::StepError {
                                step_id: step.step_id.clone(),
                                node_id: node.id().to_string(),
                                error: e.to_string(),
                            })
                            .await;
                    }
                    if let Some(trace) = &ctx.trace {
                        trace.lock().record(StepTrace {
                            step_id: step.step_id.clone(),
                            node_id: node.id().to_string(),
                            node_kind: node.kind().to_string(),
                            input: step_input,
                            output: None,
                            error: Some(e.to_string()),
                            started_ms,
                            ended_ms,
                            duration_ms: ended_ms.saturating_sub(started_ms),
                            tokens: None,
                            metadata: serde_json::Map::new(),
                        });
                    }
                    return Err(e);
                }
            }
        }

        Ok(results)
    }

    async fn run_streaming_step(
        &self,
        node: &Node,
        step_ctx: &ExecutionContext,
        step: &Step,
        events: &mpsc::Sender<StepEvent>,
    ) -> Result<Value, EngineError> {
        let (chunk_tx, mut chunk_rx) = mpsc::channel::<String>(64);
        let forward_events = events.clone();
        let step_id = step.step_id.clone();
        let node_id = node.id().to_string();
        let forward = async move {
            while let Some(chunk) = chunk_rx.recv().await {
                let _ = forward_events
                    .send(StepEvent::StepChunk {
                        step_id: step_id.clone(),
                        node_id: node_id.clone(),
                        chunk,
                    })
                    .await;
            }
        };
        let (result, ()) = tokio::join!(node.execute_stream(step_ctx, chunk_tx), forward);
        result
    }

    fn resolve_node(&self, ctx: &ExecutionContext, step: &Step) -> Result<Node, EngineError> {
        match (&step.node, &step.node_ref) {
            (Some(node), _) => Ok(node.clone()),
            (None, Some(node_ref)) => {
                ctx.session.get_node(node_ref.as_str()).ok_or_else(|| {
                    EngineError::NotFound(format!(
                        "node {} (step {:?} of graph {})",
                        node_ref, step.step_id, self.id
                    ))
                })
            }
            (None, None) => Err(EngineError::Validation(format!(
                "step {:?} has no node or node_ref",
                step.step_id
            ))),
        }
    }
}

/// Kahn's algorithm, deterministic: among ready steps, declaration order
/// wins. Errors with the cyclic remainder when no progress is possible.
fn topo_order(steps: &[Step]) -> Result<Vec<String>, String> {
    let mut order = Vec::with_capacity(steps.len());
    let mut placed: Vec<&str> = Vec::with_capacity(steps.len());

    while placed.len() < steps.len() {
        let mut progressed = false;
        for step in steps {
            if placed.contains(&step.step_id.as_str()) {
                continue;
            }
            let ready = step
                .depends_on
                .iter()
                .all(|dep| placed.contains(&dep.as_str()));
            if ready {
                placed.push(step.step_id.as_str());
                order.push(step.step_id.clone());
                progressed = true;
            }
        }
        if !progressed {
            let stuck: Vec<&str> = steps
                .iter()
                .map(|s| s.step_id.as_str())
                .filter(|id| !placed.contains(id))
                .collect();
            return Err(format!("dependency cycle involving steps: {}", stuck.join(", ")));
        }
    }
    Ok(order)
}

#[cfg(test)]
#[path = "graph_tests.rs"]
mod tests;
