// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Offline history reader.

use crate::entry::HistoryEntry;
use crate::writer::{history_path, HistoryError};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

/// Read-side view of one node's history file.
///
/// Readers load the whole file; malformed lines are skipped with a warning.
/// Unknown fields in well-formed lines are tolerated.
pub struct HistoryReader {
    path: PathBuf,
}

impl HistoryReader {
    /// Reader over an explicit file path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Reader over the standard location for a node.
    pub fn for_node(
        base_dir: &Path,
        server_name: &str,
        node_id: &str,
    ) -> Result<Self, HistoryError> {
        Ok(Self { path: history_path(base_dir, server_name, node_id)? })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All entries, in file order.
    pub fn get_all(&self) -> Result<Vec<HistoryEntry>, HistoryError> {
        let file = File::open(&self.path)?;
        let reader = BufReader::new(file);
        let mut entries = Vec::new();
        for (lineno, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<HistoryEntry>(&line) {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    tracing::warn!(
                        path = %self.path.display(),
                        line = lineno + 1,
                        error = %e,
                        "skipping malformed history line"
                    );
                }
            }
        }
        Ok(entries)
    }

    /// Last `n` entries.
    pub fn get_last(&self, n: usize) -> Result<Vec<HistoryEntry>, HistoryError> {
        let mut entries = self.get_all()?;
        let skip = entries.len().saturating_sub(n);
        Ok(entries.split_off(skip))
    }

    /// Entries whose op tag equals `op`.
    pub fn get_by_op(&self, op: &str) -> Result<Vec<HistoryEntry>, HistoryError> {
        Ok(self
            .get_all()?
            .into_iter()
            .filter(|e| e.record.op() == op)
            .collect())
    }

    /// The entry with the given seq, if present.
    pub fn get_by_seq(&self, seq: u64) -> Result<Option<HistoryEntry>, HistoryError> {
        Ok(self.get_all()?.into_iter().find(|e| e.seq == seq))
    }

    /// Only the entries carrying caller input (send, send_stream, write, run).
    pub fn get_inputs_only(&self) -> Result<Vec<HistoryEntry>, HistoryError> {
        Ok(self
            .get_all()?
            .into_iter()
            .filter(|e| e.record.is_input())
            .collect())
    }
}

#[cfg(test)]
#[path = "reader_tests.rs"]
mod tests;
