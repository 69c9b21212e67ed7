// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Direct PTY backend.
//!
//! Allocates a PTY pair, spawns the child on the slave side, and drains the
//! master side from a detached reader thread into an accumulating in-memory
//! buffer. All reads are served from that buffer.

use super::{tail_lines, BackendError, TerminalBackend};
use async_trait::async_trait;
use parking_lot::Mutex;
use portable_pty::{native_pty_system, Child, CommandBuilder, MasterPty, PtySize};
use std::io::{Read, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Readiness poll cadence for the accumulating PTY buffer.
const PTY_POLL_INTERVAL: Duration = Duration::from_millis(300);

/// Reader thread chunk size.
const READ_CHUNK: usize = 4096;

struct PtyHandles {
    writer: Box<dyn Write + Send>,
    child: Box<dyn Child + Send + Sync>,
    // Held so the PTY pair stays open for the child's lifetime.
    _master: Box<dyn MasterPty + Send>,
}

/// PTY-pair backend with a background reader.
pub struct PtyBackend {
    command: Vec<String>,
    cwd: Option<PathBuf>,
    env: Vec<(String, String)>,
    buffer: Arc<Mutex<String>>,
    alive: Arc<AtomicBool>,
    handles: Mutex<Option<PtyHandles>>,
}

impl PtyBackend {
    pub fn new(command: Vec<String>, cwd: Option<PathBuf>, env: Vec<(String, String)>) -> Self {
        Self {
            command,
            cwd,
            env,
            buffer: Arc::new(Mutex::new(String::new())),
            alive: Arc::new(AtomicBool::new(false)),
            handles: Mutex::new(None),
        }
    }
}

#[async_trait]
impl TerminalBackend for PtyBackend {
    async fn start(&self) -> Result<(), BackendError> {
        let Some(program) = self.command.first() else {
            return Err(BackendError::Spawn("empty command".to_string()));
        };

        let pty_system = native_pty_system();
        let pair = pty_system
            .openpty(PtySize { rows: 40, cols: 120, pixel_width: 0, pixel_height: 0 })
            .map_err(|e| BackendError::Spawn(e.to_string()))?;

        let mut cmd = CommandBuilder::new(program);
        cmd.args(&self.command[1..]);
        if let Some(cwd) = &self.cwd {
            cmd.cwd(cwd);
        }
        for (key, val) in &self.env {
            cmd.env(key, val);
        }

        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| BackendError::Spawn(e.to_string()))?;
        drop(pair.slave);

        let mut reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| BackendError::Spawn(e.to_string()))?;
        let writer = pair
            .master
            .take_writer()
            .map_err(|e| BackendError::Spawn(e.to_string()))?;

        self.alive.store(true, Ordering::SeqCst);
        let buffer = Arc::clone(&self.buffer);
        let alive = Arc::clone(&self.alive);
        std::thread::spawn(move || {
            let mut chunk = [0u8; READ_CHUNK];
            loop {
                match reader.read(&mut chunk) {
                    Ok(n) if n > 0 => {
                        let text = String::from_utf8_lossy(&chunk[..n]);
                        buffer.lock().push_str(&text);
                    }
                    _ => break,
                }
            }
            alive.store(false, Ordering::SeqCst);
        });

        *self.handles.lock() = Some(PtyHandles { writer, child, _master: pair.master });
        Ok(())
    }

    async fn write(&self, data: &[u8]) -> Result<(), BackendError> {
        if !self.alive.load(Ordering::SeqCst) {
            return Err(BackendError::Closed);
        }
        let mut handles = self.handles.lock();
        let Some(handles) = handles.as_mut() else {
            return Err(BackendError::Closed);
        };
        handles
            .writer
            .write_all(data)
            .and_then(|_| handles.writer.flush())
            .map_err(|_| BackendError::Closed)
    }

    async fn read_buffer(&self) -> Result<String, BackendError> {
        Ok(self.buffer.lock().clone())
    }

    async fn read_tail(&self, lines: usize) -> Result<String, BackendError> {
        Ok(tail_lines(&self.buffer.lock(), lines))
    }

    async fn clear_buffer(&self) -> Result<(), BackendError> {
        self.buffer.lock().clear();
        Ok(())
    }

    async fn stream(&self) -> Result<mpsc::Receiver<String>, BackendError> {
        let (tx, rx) = mpsc::channel(64);
        let buffer = Arc::clone(&self.buffer);
        let alive = Arc::clone(&self.alive);
        let mut offset = buffer.lock().len();
        tokio::spawn(async move {
            loop {
                let was_alive = alive.load(Ordering::SeqCst);
                let chunk = {
                    let buf = buffer.lock();
                    if buf.len() > offset {
                        let delta = buf[offset..].to_string();
                        offset = buf.len();
                        Some(delta)
                    } else {
                        None
                    }
                };
                if let Some(chunk) = chunk {
                    if tx.send(chunk).await.is_err() {
                        break;
                    }
                }
                // Drain once more after the child exits, then end the stream.
                if !was_alive {
                    break;
                }
                tokio::time::sleep(PTY_POLL_INTERVAL).await;
            }
        });
        Ok(rx)
    }

    async fn stop(&self) -> Result<(), BackendError> {
        let handles = self.handles.lock().take();
        self.alive.store(false, Ordering::SeqCst);
        if let Some(mut handles) = handles {
            let _ = handles.child.kill();
            // Reap off the async runtime; wait() blocks.
            let _ = tokio::task::spawn_blocking(move || {
                let _ = handles.child.wait();
            })
            .await;
        }
        Ok(())
    }

    async fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    fn accumulating(&self) -> bool {
        true
    }

    fn poll_interval(&self) -> Duration {
        PTY_POLL_INTERVAL
    }
}

#[cfg(test)]
#[path = "pty_tests.rs"]
mod tests;
