// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Imperative workflow runtime with suspendable gates.

use crate::context::ExecutionContext;
use crate::session::Session;
use futures_util::future::BoxFuture;
use nerve_core::{CancelToken, Clock, EngineError, RunId, RunState, WorkflowId};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{json, Value};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, watch};

type BoxedWorkflowFn =
    Arc<dyn Fn(WorkflowContext) -> BoxFuture<'static, Result<Value, EngineError>> + Send + Sync>;

/// An orchestration function bound to a session by its runs.
#[derive(Clone)]
pub struct Workflow {
    id: WorkflowId,
    func: BoxedWorkflowFn,
}

impl Workflow {
    pub fn new<F, Fut>(id: impl Into<WorkflowId>, func: F) -> Self
    where
        F: Fn(WorkflowContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, EngineError>> + Send + 'static,
    {
        Self {
            id: id.into(),
            func: Arc::new(move |ctx| Box::pin(func(ctx))),
        }
    }

    pub fn id(&self) -> &WorkflowId {
        &self.id
    }

    pub(crate) fn func(&self) -> BoxedWorkflowFn {
        Arc::clone(&self.func)
    }
}

/// A gate currently waiting for an external answer.
#[derive(Debug, Clone, Serialize)]
pub struct PendingGate {
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub choices: Option<Vec<String>>,
    pub opened_ms: u64,
}

/// One event appended by `emit` or the gate machinery.
#[derive(Debug, Clone, Serialize)]
pub struct RunEvent {
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    pub ts: u64,
}

struct RunShared {
    workflow_id: WorkflowId,
    session: Arc<Session>,
    clock: Arc<dyn Clock>,
    input: Option<Value>,
    params: serde_json::Map<String, Value>,
    state: Mutex<RunState>,
    result: Mutex<Option<Value>>,
    error: Mutex<Option<EngineError>>,
    pending_gate: Mutex<Option<PendingGate>>,
    gate_tx: Mutex<Option<oneshot::Sender<Value>>>,
    scratch: Mutex<serde_json::Map<String, Value>>,
    events: Mutex<Vec<RunEvent>>,
    cancel: CancelToken,
    done_tx: watch::Sender<bool>,
}

impl RunShared {
    fn push_event(&self, kind: &str, data: Option<Value>) {
        self.events.lock().push(RunEvent {
            kind: kind.to_string(),
            data,
            ts: self.clock.epoch_ms(),
        });
    }

    fn finish(&self, result: Result<Value, EngineError>) {
        {
            let mut state = self.state.lock();
            if state.is_terminal() {
                return;
            }
            match result {
                Ok(value) => {
                    *state = RunState::Completed;
                    *self.result.lock() = Some(value);
                }
                Err(EngineError::Cancelled) => {
                    *state = RunState::Cancelled;
                }
                Err(e) => {
                    *state = RunState::Failed;
                    *self.error.lock() = Some(e);
                }
            }
        }
        let _ = self.done_tx.send(true);
    }
}

/// Handle to one invocation of a workflow.
///
/// The run starts PENDING, moves to RUNNING when spawned, WAITING while a
/// gate is open, and ends COMPLETED, FAILED, or CANCELLED.
#[derive(Clone)]
pub struct WorkflowRun {
    id: RunId,
    shared: Arc<RunShared>,
}

impl WorkflowRun {
    pub(crate) fn new(
        workflow: &Workflow,
        session: Arc<Session>,
        input: Option<Value>,
        params: serde_json::Map<String, Value>,
    ) -> Self {
        let clock = Arc::clone(session.clock());
        let (done_tx, _) = watch::channel(false);
        Self {
            id: RunId::generate(),
            shared: Arc::new(RunShared {
                workflow_id: workflow.id().clone(),
                session,
                clock,
                input,
                params,
                state: Mutex::new(RunState::Pending),
                result: Mutex::new(None),
                error: Mutex::new(None),
                pending_gate: Mutex::new(None),
                gate_tx: Mutex::new(None),
                scratch: Mutex::new(serde_json::Map::new()),
                events: Mutex::new(Vec::new()),
                cancel: CancelToken::new(),
                done_tx,
            }),
        }
    }

    pub fn id(&self) -> &RunId {
        &self.id
    }

    pub fn workflow_id(&self) -> &WorkflowId {
        &self.shared.workflow_id
    }

    pub fn state(&self) -> RunState {
        *self.shared.state.lock()
    }

    pub fn result(&self) -> Option<Value> {
        self.shared.result.lock().clone()
    }

    pub fn error(&self) -> Option<String> {
        self.shared.error.lock().as_ref().map(|e| e.to_string())
    }

    pub fn pending_gate(&self) -> Option<PendingGate> {
        self.shared.pending_gate.lock().clone()
    }

    pub fn events(&self) -> Vec<RunEvent> {
        self.shared.events.lock().clone()
    }

    /// Spawn the workflow function. PENDING -> RUNNING.
    pub(crate) fn start(&self, func: BoxedWorkflowFn) -> Result<(), EngineError> {
        {
            let mut state = self.shared.state.lock();
            if *state != RunState::Pending {
                return Err(EngineError::Validation(format!(
                    "run {} already started (state {})",
                    self.id, state
                )));
            }
            *state = RunState::Running;
        }
        let shared = Arc::clone(&self.shared);
        let ctx = WorkflowContext { shared: Arc::clone(&self.shared) };
        tokio::spawn(async move {
            let result = func(ctx).await;
            shared.finish(result);
        });
        Ok(())
    }

    /// Deliver an answer to the pending gate. Rejected unless WAITING.
    pub fn answer_gate(&self, answer: Value) -> Result<(), EngineError> {
        {
            let state = self.shared.state.lock();
            if *state != RunState::Waiting {
                return Err(EngineError::Validation(format!(
                    "run {} is not waiting on a gate (state {})",
                    self.id, state
                )));
            }
        }
        let sender = self.shared.gate_tx.lock().take();
        match sender {
            Some(tx) => tx
                .send(answer)
                .map_err(|_| EngineError::Internal("gate receiver dropped".to_string())),
            None => Err(EngineError::Internal("gate channel missing".to_string())),
        }
    }

    /// Cancel the run; a pending gate resolves as cancelled. Idempotent.
    pub fn cancel(&self) {
        self.shared.cancel.cancel();
        let became_terminal = {
            let mut state = self.shared.state.lock();
            if *state == RunState::Pending {
                *state = RunState::Cancelled;
                true
            } else {
                false
            }
        };
        if became_terminal {
            let _ = self.shared.done_tx.send(true);
        }
    }

    /// Await a terminal state; returns the result or the original error.
    pub async fn wait(&self) -> Result<Value, EngineError> {
        let mut done_rx = self.shared.done_tx.subscribe();
        while !self.state().is_terminal() {
            if done_rx.changed().await.is_err() {
                break;
            }
        }
        match self.state() {
            RunState::Completed => Ok(self.result().unwrap_or(Value::Null)),
            RunState::Cancelled => Err(EngineError::Cancelled),
            RunState::Failed => Err(self
                .shared
                .error
                .lock()
                .clone()
                .unwrap_or_else(|| EngineError::Internal("run failed without error".to_string()))),
            other => Err(EngineError::Internal(format!(
                "run {} left wait() in state {}",
                self.id, other
            ))),
        }
    }

    pub(crate) fn is_terminal(&self) -> bool {
        self.state().is_terminal()
    }
}

/// Capabilities handed to a workflow function.
#[derive(Clone)]
pub struct WorkflowContext {
    shared: Arc<RunShared>,
}

impl WorkflowContext {
    pub fn session(&self) -> Arc<Session> {
        Arc::clone(&self.shared.session)
    }

    pub fn input(&self) -> Option<Value> {
        self.shared.input.clone()
    }

    pub fn params(&self) -> serde_json::Map<String, Value> {
        self.shared.params.clone()
    }

    /// Read one key of the scratch state.
    pub fn get_state(&self, key: &str) -> Option<Value> {
        self.shared.scratch.lock().get(key).cloned()
    }

    /// Write one key of the scratch state.
    pub fn set_state(&self, key: impl Into<String>, value: Value) {
        self.shared.scratch.lock().insert(key.into(), value);
    }

    /// Append `{kind, data, ts}` to the run's event list.
    pub fn emit(&self, kind: &str, data: Option<Value>) {
        self.shared.push_event(kind, data);
    }

    /// Execute a session node with the given input; returns `{"output": ..}`.
    pub async fn run(
        &self,
        node_id: &str,
        input: Value,
        timeout: Option<Duration>,
    ) -> Result<Value, EngineError> {
        let session = self.session();
        let node = session
            .get_node(node_id)
            .ok_or_else(|| EngineError::NotFound(format!("node {}", node_id)))?;
        let ctx = ExecutionContext::new(session)
            .with_input(Some(input))
            .with_timeout(timeout)
            .with_cancel(self.shared.cancel.clone());
        let output = node.execute(&ctx).await?;
        Ok(json!({ "output": output }))
    }

    /// Suspend until an external answer arrives.
    ///
    /// Opens the run's single pending gate, moves the run to WAITING, and
    /// publishes a `gate_opened` event. Resolves with the answer, a timeout,
    /// or cancellation; the run returns to RUNNING afterwards. Gates are
    /// sequential: at most one is pending at a time.
    pub async fn gate(
        &self,
        prompt: &str,
        timeout: Option<Duration>,
        choices: Option<Vec<String>>,
    ) -> Result<Value, EngineError> {
        let (tx, rx) = oneshot::channel();
        {
            let mut state = self.shared.state.lock();
            if *state != RunState::Running {
                return Err(EngineError::Validation(format!(
                    "gate opened while run is {}",
                    state
                )));
            }
            *self.shared.gate_tx.lock() = Some(tx);
            *self.shared.pending_gate.lock() = Some(PendingGate {
                prompt: prompt.to_string(),
                choices: choices.clone(),
                opened_ms: self.shared.clock.epoch_ms(),
            });
            *state = RunState::Waiting;
        }
        self.shared.push_event(
            "gate_opened",
            Some(json!({ "prompt": prompt, "choices": choices })),
        );

        let outcome = self.await_gate(rx, timeout).await;

        *self.shared.pending_gate.lock() = None;
        *self.shared.gate_tx.lock() = None;
        {
            let mut state = self.shared.state.lock();
            if *state == RunState::Waiting {
                *state = RunState::Running;
            }
        }
        match &outcome {
            Ok(answer) => self.shared.push_event("gate_answered", Some(answer.clone())),
            Err(e) => self.shared.push_event("gate_failed", Some(json!(e.to_string()))),
        }
        outcome
    }

    async fn await_gate(
        &self,
        rx: oneshot::Receiver<Value>,
        timeout: Option<Duration>,
    ) -> Result<Value, EngineError> {
        match timeout {
            Some(limit) => tokio::select! {
                answer = rx => answer.map_err(|_| EngineError::Internal("gate sender dropped".to_string())),
                _ = self.shared.cancel.wait() => Err(EngineError::Cancelled),
                _ = tokio::time::sleep(limit) => Err(EngineError::Timeout(limit)),
            },
            None => tokio::select! {
                answer = rx => answer.map_err(|_| EngineError::Internal("gate sender dropped".to_string())),
                _ = self.shared.cancel.wait() => Err(EngineError::Cancelled),
            },
        }
    }
}

#[cfg(test)]
#[path = "workflow_tests.rs"]
mod tests;
