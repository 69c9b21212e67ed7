// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Append-only history writer with seq recovery.

use crate::entry::{HistoryEntry, HistoryRecord};
use nerve_core::validate_name;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised by history creation. Writes after creation never error.
#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("{0}")]
    InvalidName(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialize error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Resolve the history file path for a node, validating both names first.
pub fn history_path(
    base_dir: &Path,
    server_name: &str,
    node_id: &str,
) -> Result<PathBuf, HistoryError> {
    validate_name("server name", server_name).map_err(|e| HistoryError::InvalidName(e.to_string()))?;
    validate_name("node id", node_id).map_err(|e| HistoryError::InvalidName(e.to_string()))?;
    Ok(base_dir.join(server_name).join(format!("{}.jsonl", node_id)))
}

/// Single-writer append handle for one node's history file.
///
/// Creation fails hard so the caller can decide to proceed without history;
/// every later failure is logged and swallowed (the append returns 0).
/// Writes are synchronous relative to await points, so interleaved task
/// switching cannot corrupt lines; no file locking is needed in one process.
#[derive(Debug)]
pub struct HistoryWriter {
    path: PathBuf,
    file: File,
    seq: u64,
}

impl HistoryWriter {
    /// Open (or create) the history file and recover the seq counter.
    pub fn create(
        base_dir: &Path,
        server_name: &str,
        node_id: &str,
    ) -> Result<Self, HistoryError> {
        let path = history_path(base_dir, server_name, node_id)?;
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let seq = if path.exists() { recover_seq(&path)? } else { 0 };
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self { path, file, seq })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Highest seq assigned so far.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Append one record, assigning the next seq.
    ///
    /// Returns the assigned seq, or 0 if the write failed (fail-soft).
    pub fn append(&mut self, record: HistoryRecord) -> u64 {
        let next = self.seq + 1;
        let entry = HistoryEntry { seq: next, record };
        match self.write_line(&entry) {
            Ok(()) => {
                self.seq = next;
                next
            }
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "history write failed");
                0
            }
        }
    }

    fn write_line(&mut self, entry: &HistoryEntry) -> Result<(), HistoryError> {
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');
        self.file.write_all(line.as_bytes())?;
        self.file.flush()?;
        Ok(())
    }
}

/// Scan an existing file for the highest seq, skipping malformed lines.
fn recover_seq(path: &Path) -> Result<u64, HistoryError> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let mut max_seq = 0u64;
    for (lineno, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<serde_json::Value>(&line) {
            Ok(value) => {
                if let Some(seq) = value.get("seq").and_then(|v| v.as_u64()) {
                    max_seq = max_seq.max(seq);
                }
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    line = lineno + 1,
                    error = %e,
                    "skipping malformed history line during recovery"
                );
            }
        }
    }
    Ok(max_seq)
}

#[cfg(test)]
#[path = "writer_tests.rs"]
mod tests;
