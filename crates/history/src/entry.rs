// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! History entry types.

use nerve_core::ParsedResponse;
use serde::{Deserialize, Serialize};

/// One line of a history file: a sequence number plus an op-tagged record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub seq: u64,
    #[serde(flatten)]
    pub record: HistoryRecord,
}

/// Op-specific payloads. Timestamps are epoch milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum HistoryRecord {
    /// A command sent with a trailing newline.
    Run { ts: u64, input: String },

    /// Raw bytes written to the terminal.
    Write { ts: u64, input: String },

    /// Buffer snapshot (tail), logged around mutating operations.
    Read { ts: u64, buffer: String, lines: u64 },

    /// A full send/receive exchange.
    Send {
        ts_start: u64,
        ts_end: u64,
        input: String,
        /// Seq of the `read` entry snapshotting the buffer before the send.
        preceding_buffer_seq: u64,
        response: ParsedResponse,
    },

    /// A streaming send; individual chunks are never persisted.
    SendStream {
        ts_start: u64,
        ts_end: u64,
        input: String,
        preceding_buffer_seq: u64,
        final_buffer: String,
        parser: String,
    },

    /// A 0x03 interrupt.
    Interrupt { ts: u64 },

    /// Node closure; the last entry of a file.
    Close { ts: u64, reason: String },
}

impl HistoryRecord {
    /// The `op` tag value of this record.
    pub fn op(&self) -> &'static str {
        match self {
            HistoryRecord::Run { .. } => "run",
            HistoryRecord::Write { .. } => "write",
            HistoryRecord::Read { .. } => "read",
            HistoryRecord::Send { .. } => "send",
            HistoryRecord::SendStream { .. } => "send_stream",
            HistoryRecord::Interrupt { .. } => "interrupt",
            HistoryRecord::Close { .. } => "close",
        }
    }

    /// Whether this record carries caller input (send, send_stream, write, run).
    pub fn is_input(&self) -> bool {
        matches!(
            self,
            HistoryRecord::Run { .. }
                | HistoryRecord::Write { .. }
                | HistoryRecord::Send { .. }
                | HistoryRecord::SendStream { .. }
        )
    }
}
