// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tmux pane-attached backend.
//!
//! No background reader: every read shells out to `tmux capture-pane` for
//! the pane's current content, so the "buffer" is a re-captured screen plus
//! scrollback rather than an append-only accumulation. Writes go through
//! `tmux send-keys`.

use super::{tail_lines, BackendError, TerminalBackend};
use async_trait::async_trait;
use std::process::Output;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Readiness poll cadence for pane captures.
const PANE_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// One unit of input for `tmux send-keys`.
#[derive(Debug, PartialEq, Eq)]
enum KeyInput {
    /// Sent with `-l` so tmux does not interpret the text.
    Literal(String),
    /// A named tmux key (Enter, Escape, C-c, Tab).
    Named(&'static str),
}

/// Split raw input into literal runs and named keys.
fn keystrokes(data: &str) -> Vec<KeyInput> {
    let mut out = Vec::new();
    let mut literal = String::new();
    for ch in data.chars() {
        let named = match ch {
            '\n' | '\r' => Some("Enter"),
            '\x03' => Some("C-c"),
            '\x1b' => Some("Escape"),
            '\t' => Some("Tab"),
            _ => None,
        };
        match named {
            Some(key) => {
                if !literal.is_empty() {
                    out.push(KeyInput::Literal(std::mem::take(&mut literal)));
                }
                out.push(KeyInput::Named(key));
            }
            None => literal.push(ch),
        }
    }
    if !literal.is_empty() {
        out.push(KeyInput::Literal(literal));
    }
    out
}

/// Backend attached to an existing tmux pane.
pub struct PaneBackend {
    pane_id: String,
    /// Typed into the pane on start when non-empty.
    command: Vec<String>,
    closed: Arc<AtomicBool>,
}

impl PaneBackend {
    pub fn new(pane_id: impl Into<String>, command: Vec<String>) -> Self {
        Self {
            pane_id: pane_id.into(),
            command,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    async fn tmux(args: &[&str]) -> Result<Output, BackendError> {
        let output = tokio::process::Command::new("tmux")
            .args(args)
            .output()
            .await
            .map_err(|e| BackendError::Pane(format!("failed to run tmux: {}", e)))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(BackendError::Pane(stderr.trim().to_string()));
        }
        Ok(output)
    }

    /// Capture pane content including scrollback.
    async fn capture(pane_id: &str) -> Result<String, BackendError> {
        let output = Self::tmux(&["capture-pane", "-t", pane_id, "-p", "-S", "-"]).await?;
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    async fn probe(&self) -> Result<(), BackendError> {
        Self::tmux(&["display-message", "-p", "-t", &self.pane_id, "#{pane_id}"])
            .await
            .map(|_| ())
    }
}

#[async_trait]
impl TerminalBackend for PaneBackend {
    async fn start(&self) -> Result<(), BackendError> {
        self.probe()
            .await
            .map_err(|e| BackendError::Spawn(format!("pane {}: {}", self.pane_id, e)))?;
        if !self.command.is_empty() {
            let line = format!("{}\n", self.command.join(" "));
            self.write(line.as_bytes()).await?;
        }
        Ok(())
    }

    async fn write(&self, data: &[u8]) -> Result<(), BackendError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BackendError::Closed);
        }
        let text = String::from_utf8_lossy(data);
        for key in keystrokes(&text) {
            match key {
                KeyInput::Literal(chunk) => {
                    Self::tmux(&["send-keys", "-t", &self.pane_id, "-l", &chunk]).await?;
                }
                KeyInput::Named(name) => {
                    Self::tmux(&["send-keys", "-t", &self.pane_id, name]).await?;
                }
            }
        }
        Ok(())
    }

    async fn read_buffer(&self) -> Result<String, BackendError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BackendError::Closed);
        }
        Self::capture(&self.pane_id).await
    }

    async fn read_tail(&self, lines: usize) -> Result<String, BackendError> {
        let buffer = self.read_buffer().await?;
        Ok(tail_lines(&buffer, lines))
    }

    async fn clear_buffer(&self) -> Result<(), BackendError> {
        Self::tmux(&["clear-history", "-t", &self.pane_id]).await?;
        Ok(())
    }

    async fn stream(&self) -> Result<mpsc::Receiver<String>, BackendError> {
        let (tx, rx) = mpsc::channel(64);
        let pane_id = self.pane_id.clone();
        let closed = Arc::clone(&self.closed);
        let mut last = Self::capture(&self.pane_id).await?;
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(PANE_POLL_INTERVAL).await;
                if closed.load(Ordering::SeqCst) {
                    break;
                }
                // Pane gone means the stream is over.
                let Ok(current) = Self::capture(&pane_id).await else {
                    break;
                };
                if current != last {
                    // The screen is not append-only; approximate "new output"
                    // with the suffix when the old capture is a prefix.
                    let delta = match current.strip_prefix(last.as_str()) {
                        Some(suffix) => suffix.to_string(),
                        None => current.clone(),
                    };
                    last = current;
                    if !delta.is_empty() && tx.send(delta).await.is_err() {
                        break;
                    }
                }
            }
        });
        Ok(rx)
    }

    async fn stop(&self) -> Result<(), BackendError> {
        // The pane belongs to the user's terminal emulator; detach without
        // killing it.
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn is_alive(&self) -> bool {
        !self.closed.load(Ordering::SeqCst) && self.probe().await.is_ok()
    }

    fn accumulating(&self) -> bool {
        false
    }

    fn poll_interval(&self) -> Duration {
        PANE_POLL_INTERVAL
    }
}

#[cfg(test)]
#[path = "pane_tests.rs"]
mod tests;
