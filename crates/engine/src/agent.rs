// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wrapped-CLI agent nodes.
//!
//! An agent node spawns an inner terminal node running the user's shell
//! (history disabled), types the target CLI command into it, and waits for
//! the CLI's prompt. All subsequent I/O delegates to the inner node while
//! the wrapper owns the history log, so exactly one history file exists.

use crate::context::ExecutionContext;
use crate::terminal::TerminalNode;
use nerve_adapters::backend::PtyBackend;
use nerve_adapters::parse::ParserKind;
use nerve_core::{Clock, EngineError, NodeId, NodeState, ParsedResponse};
use nerve_history::{HistoryRecord, HistoryWriter};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Lines captured in the wrapper's buffer-snapshot entries.
const TAIL_LINES: usize = 50;

/// Terminal node wrapping a target CLI (claude by default).
pub struct AgentNode {
    id: NodeId,
    inner: TerminalNode,
    history: Mutex<Option<HistoryWriter>>,
    history_path: Option<PathBuf>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for AgentNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentNode").field("id", &self.id).finish_non_exhaustive()
    }
}

impl AgentNode {
    /// Spawn the inner shell, issue the CLI command, and wait for the CLI's
    /// idle prompt (up to `ready_timeout`).
    #[allow(clippy::too_many_arguments)]
    pub async fn spawn(
        id: impl Into<NodeId>,
        command: Vec<String>,
        cwd: Option<PathBuf>,
        env: Vec<(String, String)>,
        default_parser: ParserKind,
        history: Option<HistoryWriter>,
        ready_timeout: Duration,
        response_timeout: Duration,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, EngineError> {
        let id = id.into();
        if command.is_empty() {
            return Err(EngineError::Validation(format!(
                "agent node {} requires a non-empty command",
                id
            )));
        }

        let shell = std::env::var("SHELL").unwrap_or_else(|_| "bash".to_string());
        let backend = Arc::new(PtyBackend::new(vec![shell.clone()], cwd, env));
        // Inner history stays off; the wrapper owns the log.
        let inner = TerminalNode::new(
            NodeId::new(format!("{}-inner", id)),
            backend,
            shell.clone(),
            default_parser,
            None,
            ready_timeout,
            response_timeout,
            Arc::clone(&clock),
        );
        inner.start_raw().await?;

        let node = Self {
            id,
            inner,
            history_path: history.as_ref().map(|w| w.path().to_path_buf()),
            history: Mutex::new(history),
            clock,
        };
        node.log(HistoryRecord::Run {
            ts: node.clock.epoch_ms(),
            input: command.join(" "),
        });
        node.inner.run(&command.join(" ")).await?;

        if let Err(e) = node.startup_wait(ready_timeout).await {
            let _ = node.inner.close("startup failed").await;
            return Err(e);
        }
        Ok(node)
    }

    async fn startup_wait(&self, timeout: Duration) -> Result<(), EngineError> {
        let parser = self.inner.default_parser().parser();
        let deadline = self.clock.now() + timeout;
        loop {
            let buffer = self.inner.read_tail(TAIL_LINES).await?;
            if parser.is_ready(&buffer) {
                return Ok(());
            }
            if self.clock.now() >= deadline {
                return Err(EngineError::Timeout(timeout));
            }
            tokio::time::sleep(Duration::from_millis(300)).await;
        }
    }

    pub fn id(&self) -> &NodeId {
        &self.id
    }

    pub fn state(&self) -> NodeState {
        self.inner.state()
    }

    pub fn default_parser(&self) -> ParserKind {
        self.inner.default_parser()
    }

    pub fn history_path(&self) -> Option<&PathBuf> {
        self.history_path.as_ref()
    }

    /// Send input through the inner terminal; the wrapper logs the exchange.
    pub async fn send(&self, ctx: &ExecutionContext) -> Result<ParsedResponse, EngineError> {
        let ts_start = self.clock.epoch_ms();
        let preceding_buffer_seq = self.log_tail_read().await;
        let input = ctx.input_text();
        let response = self.inner.send(ctx).await?;
        self.log(HistoryRecord::Send {
            ts_start,
            ts_end: self.clock.epoch_ms(),
            input,
            preceding_buffer_seq,
            response: response.clone(),
        });
        Ok(response)
    }

    /// Streaming send through the inner terminal, logged by the wrapper.
    pub async fn send_stream(
        &self,
        ctx: &ExecutionContext,
        chunk_tx: mpsc::Sender<String>,
    ) -> Result<ParsedResponse, EngineError> {
        let parser_kind =
            ParserKind::resolve(ctx.parser, None, Some(self.inner.default_parser()));
        let ts_start = self.clock.epoch_ms();
        let preceding_buffer_seq = self.log_tail_read().await;
        let input = ctx.input_text();
        let response = self.inner.send_stream(ctx, chunk_tx).await?;
        let final_buffer = self.inner.read_tail(TAIL_LINES).await.unwrap_or_default();
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

    pub async fn write(&self, data: &[u8]) -> Result<(), EngineError> {
        self.log(HistoryRecord::Write {
            ts: self.clock.epoch_ms(),
            input: String::from_utf8_lossy(data).to_string(),
        });
        self.inner.write(data).await?;
        self.log_tail_read().await;
        Ok(())
    }

    pub async fn run(&self, command: &str) -> Result<(), EngineError> {
        self.log(HistoryRecord::Run {
            ts: self.clock.epoch_ms(),
            input: command.to_string(),
        });
        self.inner.run(command).await?;
        self.log_tail_read().await;
        Ok(())
    }

    pub async fn interrupt(&self) -> Result<(), EngineError> {
        self.log(HistoryRecord::Interrupt { ts: self.clock.epoch_ms() });
        self.inner.interrupt().await?;
        self.log_tail_read().await;
        Ok(())
    }

    pub async fn read_tail(&self, lines: usize) -> Result<String, EngineError> {
        self.inner.read_tail(lines).await
    }

    /// Close the wrapper's history, then the inner terminal. Idempotent.
    pub async fn close(&self, reason: &str) -> Result<(), EngineError> {
        if self.state().is_stopped() {
            return Ok(());
        }
        self.log_tail_read().await;
        self.log(HistoryRecord::Close {
            ts: self.clock.epoch_ms(),
            reason: reason.to_string(),
        });
        *self.history.lock() = None;
        self.inner.close(reason).await
    }

    fn log(&self, record: HistoryRecord) -> u64 {
        self.history
            .lock()
            .as_mut()
            .map(|writer| writer.append(record))
            .unwrap_or(0)
    }

    async fn log_tail_read(&self) -> u64 {
        if self.history.lock().is_none() {
            return 0;
        }
        let tail = self.inner.read_tail(TAIL_LINES).await.unwrap_or_default();
        let lines = tail.lines().count() as u64;
        self.log(HistoryRecord::Read {
            ts: self.clock.epoch_ms(),
            buffer: tail,
            lines,
        })
    }
}

impl AgentNode {
    /// Path helper for tests and the command engine.
    pub fn history_dir(&self) -> Option<&Path> {
        self.history_path.as_ref().and_then(|p| p.parent())
    }
}

#[cfg(test)]
#[path = "agent_tests.rs"]
mod tests;
