// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Terminal backend abstraction.

mod pane;
mod pty;

pub use pane::PaneBackend;
pub use pty::PtyBackend;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

/// Errors from terminal backend operations.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("spawn failed: {0}")]
    Spawn(String),
    #[error("terminal closed")]
    Closed,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("pane error: {0}")]
    Pane(String),
}

/// Raw byte channel to an interactive subprocess.
///
/// Two implementations: [`PtyBackend`] (direct PTY pair with a background
/// reader accumulating output) and [`PaneBackend`] (queries an external tmux
/// pane on each read). Nodes choose by construction parameter and otherwise
/// treat both identically.
#[async_trait]
pub trait TerminalBackend: Send + Sync {
    /// Spawn the child / verify the attachment.
    async fn start(&self) -> Result<(), BackendError>;

    /// Forward bytes to the terminal's input.
    async fn write(&self, data: &[u8]) -> Result<(), BackendError>;

    /// Full accumulated output as text.
    async fn read_buffer(&self) -> Result<String, BackendError>;

    /// Last `n` logical lines of the buffer.
    async fn read_tail(&self, lines: usize) -> Result<String, BackendError>;

    /// Truncate the buffer. Does not affect the child process.
    async fn clear_buffer(&self) -> Result<(), BackendError>;

    /// Finite stream of newly arrived chunks, starting at the current tail.
    /// Terminates when the child exits or the backend stops.
    async fn stream(&self) -> Result<mpsc::Receiver<String>, BackendError>;

    /// Signal child termination and release resources. Idempotent.
    async fn stop(&self) -> Result<(), BackendError>;

    async fn is_alive(&self) -> bool;

    /// Whether the buffer grows append-only (PTY) or is re-captured (pane).
    /// Append-only backends let callers parse from a pre-send offset.
    fn accumulating(&self) -> bool;

    /// Readiness poll cadence appropriate to this backend.
    fn poll_interval(&self) -> Duration;
}

/// Last `n` lines of `text`, preserving line order.
pub(crate) fn tail_lines(text: &str, n: usize) -> String {
    if n == 0 {
        return String::new();
    }
    let lines: Vec<&str> = text.lines().collect();
    let skip = lines.len().saturating_sub(n);
    lines[skip..].join("\n")
}

#[cfg(test)]
mod mod_tests {
    use super::*;

    #[test]
    fn tail_lines_takes_the_end() {
        assert_eq!(tail_lines("a\nb\nc", 2), "b\nc");
        assert_eq!(tail_lines("a\nb\nc", 10), "a\nb\nc");
        assert_eq!(tail_lines("", 3), "");
        assert_eq!(tail_lines("a\nb", 0), "");
    }
}
