// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Terminal nodes: PTY-backed interactive subprocesses.

use crate::context::ExecutionContext;
use nerve_adapters::backend::{BackendError, TerminalBackend};
use nerve_adapters::parse::{Parser, ParserKind};
use nerve_core::{Clock, EngineError, NodeId, NodeState, ParsedResponse};
use nerve_history::{HistoryRecord, HistoryWriter};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Lines captured in buffer-snapshot (`read`) history entries.
const TAIL_LINES: usize = 50;

/// Settle delay between a raw write and its follow-up buffer snapshot.
const WRITE_SETTLE: Duration = Duration::from_millis(100);

/// Settle delay between a `run` command and its follow-up buffer snapshot.
const RUN_SETTLE: Duration = Duration::from_millis(500);

/// Delay between the input text and the separate Enter key of the Claude
/// CLI's two-key submit sequence.
const SUBMIT_SETTLE: Duration = Duration::from_millis(100);

/// Delay between a submit and the first readiness poll, so the echo and the
/// start of the response reach the buffer before an always-ready parser
/// snapshots it.
const ECHO_SETTLE: Duration = Duration::from_millis(150);

/// Default startup readiness timeout.
pub const DEFAULT_READY_TIMEOUT: Duration = Duration::from_secs(60);

/// Default response timeout for a send.
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(1800);

/// A node owning a terminal backend, a default parser, and a history log.
///
/// Exactly one logical operation (send / stream / write / run) may be in
/// flight at a time; a second caller is refused while the node is BUSY.
/// `interrupt` and `read_tail` stay available while BUSY.
pub struct TerminalNode {
    id: NodeId,
    backend: Arc<dyn TerminalBackend>,
    /// Display form of the subprocess command, logged as the startup `run`.
    command_line: String,
    default_parser: ParserKind,
    state: Mutex<NodeState>,
    history: Mutex<Option<HistoryWriter>>,
    history_path: Option<PathBuf>,
    ready_timeout: Duration,
    response_timeout: Duration,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for TerminalNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TerminalNode").field("id", &self.id).finish_non_exhaustive()
    }
}

impl TerminalNode {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: impl Into<NodeId>,
        backend: Arc<dyn TerminalBackend>,
        command_line: impl Into<String>,
        default_parser: ParserKind,
        history: Option<HistoryWriter>,
        ready_timeout: Duration,
        response_timeout: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let history_path = history.as_ref().map(|w| w.path().to_path_buf());
        Self {
            id: id.into(),
            backend,
            command_line: command_line.into(),
            default_parser,
            state: Mutex::new(NodeState::Created),
            history: Mutex::new(history),
            history_path,
            ready_timeout,
            response_timeout,
            clock,
        }
    }

    pub fn id(&self) -> &NodeId {
        &self.id
    }

    pub fn state(&self) -> NodeState {
        *self.state.lock()
    }

    pub fn default_parser(&self) -> ParserKind {
        self.default_parser
    }

    pub fn response_timeout(&self) -> Duration {
        self.response_timeout
    }

    /// Where this node's history file lives, if history is enabled.
    pub fn history_path(&self) -> Option<&PathBuf> {
        self.history_path.as_ref()
    }

    /// Spawn the backend and wait for the default parser to report ready.
    pub async fn start(&self) -> Result<(), EngineError> {
        self.start_with_ready_wait(true).await
    }

    /// Spawn the backend without waiting for parser readiness. Used by
    /// wrapper nodes that issue the target command themselves.
    pub(crate) async fn start_raw(&self) -> Result<(), EngineError> {
        self.start_with_ready_wait(false).await
    }

    async fn start_with_ready_wait(&self, wait_ready: bool) -> Result<(), EngineError> {
        {
            let mut state = self.state.lock();
            if *state != NodeState::Created {
                return Err(EngineError::Validation(format!(
                    "node {} already started (state {})",
                    self.id, state
                )));
            }
            *state = NodeState::Starting;
        }

        if let Err(e) = self.backend.start().await {
            *self.state.lock() = NodeState::Stopped;
            return Err(self.map_backend(e));
        }

        if wait_ready && self.default_parser != ParserKind::Null {
            let parser = self.default_parser.parser();
            if let Err(e) = self.poll_ready(parser, self.ready_timeout, None, 0).await {
                let _ = self.backend.stop().await;
                *self.state.lock() = NodeState::Stopped;
                return Err(e);
            }
        }

        if !self.command_line.is_empty() {
            self.log(HistoryRecord::Run {
                ts: self.clock.epoch_ms(),
                input: self.command_line.clone(),
            });
            self.log_tail_read().await;
        }

        *self.state.lock() = NodeState::Ready;
        Ok(())
    }

    /// Send input and wait for the parser to declare readiness.
    pub async fn send(&self, ctx: &ExecutionContext) -> Result<ParsedResponse, EngineError> {
        self.ensure_ready()?;
        ctx.check_cancelled()?;

        let parser_kind = ParserKind::resolve(ctx.parser, None, Some(self.default_parser));
        let parser = parser_kind.parser();
        let input = ctx.input_text();
        let ts_start = self.clock.epoch_ms();
        let preceding_buffer_seq = self.log_tail_read().await;

        self.set_state(NodeState::Busy);
        let result = self.send_inner(ctx, parser_kind, parser, &input).await;
        self.settle_after_op();

        match result {
            Ok(response) => {
                ctx.usage.add_api_call();
                if let Some(tokens) = response.tokens {
                    ctx.usage.add_tokens(tokens);
                }
                self.log(HistoryRecord::Send {
                    ts_start,
                    ts_end: self.clock.epoch_ms(),
                    input,
                    preceding_buffer_seq,
                    response: response.clone(),
                });
                Ok(response)
            }
            Err(e) => Err(e),
        }
    }

    async fn send_inner(
        &self,
        ctx: &ExecutionContext,
        parser_kind: ParserKind,
        parser: &dyn Parser,
        input: &str,
    ) -> Result<ParsedResponse, EngineError> {
        // On the accumulating backend only the output after this offset is
        // parsed; the pane backend re-captures the whole screen instead.
        let pre_len = if self.backend.accumulating() {
            self.buffer().await?.len()
        } else {
            0
        };

        self.submit(parser_kind, input).await?;
        tokio::time::sleep(ECHO_SETTLE).await;

        let timeout = ctx.timeout.unwrap_or(self.response_timeout);
        self.poll_ready(parser, timeout, Some(&ctx.cancel), pre_len).await?;

        let buffer = self.buffer().await?;
        let view = &buffer[pre_len.min(buffer.len())..];
        Ok(parser.parse(view))
    }

    /// Send input, forwarding raw chunks into `chunk_tx` until the parser
    /// declares readiness. Individual chunks are never persisted; the
    /// history entry records the final tail and the parser used.
    pub async fn send_stream(
        &self,
        ctx: &ExecutionContext,
        chunk_tx: mpsc::Sender<String>,
    ) -> Result<ParsedResponse, EngineError> {
        self.ensure_ready()?;
        ctx.check_cancelled()?;

        let parser_kind = ParserKind::resolve(ctx.parser, None, Some(self.default_parser));
        let parser = parser_kind.parser();
        let input = ctx.input_text();
        let ts_start = self.clock.epoch_ms();
        let preceding_buffer_seq = self.log_tail_read().await;

        self.set_state(NodeState::Busy);
        let result = self
            .stream_inner(ctx, parser_kind, parser, &input, chunk_tx)
            .await;
        self.settle_after_op();

        match result {
            Ok(response) => {
                ctx.usage.add_api_call();
                if let Some(tokens) = response.tokens {
                    ctx.usage.add_tokens(tokens);
                }
                let final_buffer = self.tail(TAIL_LINES).await.unwrap_or_default();
                self.log(HistoryRecord::SendStream {
                    ts_start,
                    ts_end: self.clock.epoch_ms(),
                    input,
                    preceding_buffer_seq,
                    final_buffer,
                    parser: parser_kind.as_str().to_string(),
                });
                Ok(response)
            }
            Err(e) => Err(e),
        }
    }

    async fn stream_inner(
        &self,
        ctx: &ExecutionContext,
        parser_kind: ParserKind,
        parser: &dyn Parser,
        input: &str,
        chunk_tx: mpsc::Sender<String>,
    ) -> Result<ParsedResponse, EngineError> {
        let pre_len = if self.backend.accumulating() {
            self.buffer().await?.len()
        } else {
            0
        };

        let mut chunks = self.backend.stream().await.map_err(|e| self.map_backend(e))?;
        self.submit(parser_kind, input).await?;
        tokio::time::sleep(ECHO_SETTLE).await;

        let timeout = ctx.timeout.unwrap_or(self.response_timeout);
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            ctx.check_cancelled()?;
            let buffer = self.buffer().await?;
            let view = &buffer[pre_len.min(buffer.len())..];
            if parser.is_ready(view) {
                return Ok(parser.parse(view));
            }
            tokio::select! {
                _ = ctx.cancel.wait() => return Err(EngineError::Cancelled),
                _ = tokio::time::sleep_until(deadline) => return Err(EngineError::Timeout(timeout)),
                chunk = chunks.recv() => match chunk {
                    Some(chunk) => {
                        // A closed receiver just means the consumer stopped
                        // listening; the exchange still completes.
                        let _ = chunk_tx.send(chunk).await;
                    }
                    None => return Err(EngineError::Closed(self.id.to_string())),
                },
            }
        }
    }

    /// Send raw bytes, then snapshot the buffer after a short settle.
    pub async fn write(&self, data: &[u8]) -> Result<(), EngineError> {
        self.ensure_ready()?;
        self.backend.write(data).await.map_err(|e| self.map_backend(e))?;
        self.log(HistoryRecord::Write {
            ts: self.clock.epoch_ms(),
            input: String::from_utf8_lossy(data).to_string(),
        });
        tokio::time::sleep(WRITE_SETTLE).await;
        self.log_tail_read().await;
        Ok(())
    }

    /// Send `command` plus a newline, then snapshot the buffer.
    pub async fn run(&self, command: &str) -> Result<(), EngineError> {
        self.ensure_ready()?;
        let line = format!("{}\n", command.trim_end_matches('\n'));
        self.backend
            .write(line.as_bytes())
            .await
            .map_err(|e| self.map_backend(e))?;
        self.log(HistoryRecord::Run {
            ts: self.clock.epoch_ms(),
            input: command.to_string(),
        });
        tokio::time::sleep(RUN_SETTLE).await;
        self.log_tail_read().await;
        Ok(())
    }

    /// Send a single 0x03. Allowed while BUSY; this is how a hung send is
    /// broken from outside.
    pub async fn interrupt(&self) -> Result<(), EngineError> {
        if self.state().is_stopped() {
            return Err(EngineError::Closed(self.id.to_string()));
        }
        self.backend.write(b"\x03").await.map_err(|e| self.map_backend(e))?;
        self.log(HistoryRecord::Interrupt { ts: self.clock.epoch_ms() });
        tokio::time::sleep(WRITE_SETTLE).await;
        self.log_tail_read().await;
        Ok(())
    }

    /// Non-mutating query of the last `n` buffer lines.
    pub async fn read_tail(&self, lines: usize) -> Result<String, EngineError> {
        if self.state().is_stopped() {
            return Err(EngineError::Closed(self.id.to_string()));
        }
        self.tail(lines).await
    }

    /// Final buffer snapshot, close entry, history close, backend stop.
    /// Idempotent after first completion.
    pub async fn close(&self, reason: &str) -> Result<(), EngineError> {
        {
            let mut state = self.state.lock();
            if matches!(*state, NodeState::Stopped | NodeState::Stopping) {
                return Ok(());
            }
            *state = NodeState::Stopping;
        }
        self.log_tail_read().await;
        self.log(HistoryRecord::Close {
            ts: self.clock.epoch_ms(),
            reason: reason.to_string(),
        });
        // Dropping the writer closes the file.
        *self.history.lock() = None;
        if let Err(e) = self.backend.stop().await {
            tracing::warn!(node_id = %self.id, error = %e, "backend stop failed");
        }
        *self.state.lock() = NodeState::Stopped;
        Ok(())
    }

    // -- internals --

    async fn buffer(&self) -> Result<String, EngineError> {
        self.backend.read_buffer().await.map_err(|e| self.map_backend(e))
    }

    async fn tail(&self, lines: usize) -> Result<String, EngineError> {
        self.backend.read_tail(lines).await.map_err(|e| self.map_backend(e))
    }

    /// Write the input plus the terminator the parser demands.
    async fn submit(&self, parser_kind: ParserKind, input: &str) -> Result<(), EngineError> {
        match parser_kind {
            ParserKind::Claude => {
                // Two-key submit: the text, then a separate Enter after a
                // settle. An empty input collapses to the single Enter so no
                // stray empty submit follows.
                if !input.is_empty() {
                    self.backend
                        .write(input.as_bytes())
                        .await
                        .map_err(|e| self.map_backend(e))?;
                    tokio::time::sleep(SUBMIT_SETTLE).await;
                }
                self.backend.write(b"\r").await.map_err(|e| self.map_backend(e))
            }
            _ => {
                let mut line = input.to_string();
                if !line.ends_with('\n') {
                    line.push('\n');
                }
                self.backend
                    .write(line.as_bytes())
                    .await
                    .map_err(|e| self.map_backend(e))
            }
        }
    }

    /// Poll `parser.is_ready` on the backend's cadence until ready,
    /// cancelled, or timed out. The ready check runs before the deadline
    /// check, so an already-ready buffer needs zero sleeps and a zero
    /// timeout fails only if the first poll is not ready.
    async fn poll_ready(
        &self,
        parser: &dyn Parser,
        timeout: Duration,
        cancel: Option<&nerve_core::CancelToken>,
        from_offset: usize,
    ) -> Result<(), EngineError> {
        let deadline = self.clock.now() + timeout;
        loop {
            if let Some(cancel) = cancel {
                cancel.check()?;
            }
            let buffer = self.buffer().await?;
            let view = &buffer[from_offset.min(buffer.len())..];
            if parser.is_ready(view) {
                return Ok(());
            }
            if self.clock.now() >= deadline {
                return Err(EngineError::Timeout(timeout));
            }
            match cancel {
                Some(cancel) => {
                    tokio::select! {
                        _ = tokio::time::sleep(self.backend.poll_interval()) => {}
                        _ = cancel.wait() => {}
                    }
                }
                None => tokio::time::sleep(self.backend.poll_interval()).await,
            }
        }
    }

    /// Return to READY after an operation unless the node stopped meanwhile.
    fn settle_after_op(&self) {
        let mut state = self.state.lock();
        if *state == NodeState::Busy {
            *state = NodeState::Ready;
        }
    }

    fn ensure_ready(&self) -> Result<(), EngineError> {
        match self.state() {
            NodeState::Ready => Ok(()),
            NodeState::Stopped | NodeState::Stopping => {
                Err(EngineError::Closed(self.id.to_string()))
            }
            NodeState::Busy => Err(EngineError::Validation(format!(
                "node {} has an operation in flight",
                self.id
            ))),
            other => Err(EngineError::Validation(format!(
                "node {} not ready (state {})",
                self.id, other
            ))),
        }
    }

    fn set_state(&self, next: NodeState) {
        *self.state.lock() = next;
    }

    fn map_backend(&self, e: BackendError) -> EngineError {
        match e {
            BackendError::Spawn(msg) => EngineError::Spawn(msg),
            BackendError::Closed => EngineError::Closed(self.id.to_string()),
            BackendError::Io(e) => EngineError::Internal(e.to_string()),
            BackendError::Pane(msg) => EngineError::Internal(msg),
        }
    }

    /// Append a record, or 0 when history is disabled or already closed.
    fn log(&self, record: HistoryRecord) -> u64 {
        self.history
            .lock()
            .as_mut()
            .map(|writer| writer.append(record))
            .unwrap_or(0)
    }

    /// Snapshot the buffer tail as a `read` entry; returns its seq.
    async fn log_tail_read(&self) -> u64 {
        if self.history.lock().is_none() {
            return 0;
        }
        let tail = self.tail(TAIL_LINES).await.unwrap_or_default();
        let lines = tail.lines().count() as u64;
        self.log(HistoryRecord::Read {
            ts: self.clock.epoch_ms(),
            buffer: tail,
            lines,
        })
    }
}

#[cfg(test)]
#[path = "terminal_tests.rs"]
mod tests;
