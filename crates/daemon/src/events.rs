// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event sinks.
//!
//! The engine pushes every lifecycle and output event into one injected
//! sink; transports adapt it to their wire format.

use nerve_core::Event;
use parking_lot::Mutex;
use tokio::sync::mpsc;

/// Receives engine events. Implementations must not block.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: Event);
}

/// Discards everything.
#[derive(Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: Event) {}
}

/// Forwards events into an unbounded channel.
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<Event>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Event>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: Event) {
        // A dropped receiver just means no transport is listening.
        let _ = self.tx.send(event);
    }
}

/// Accumulates events in memory, for tests and embedding.
#[derive(Default)]
pub struct MemorySink {
    events: Mutex<Vec<Event>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    /// Names of all captured events, in order.
    pub fn names(&self) -> Vec<&'static str> {
        self.events.lock().iter().map(|e| e.name()).collect()
    }
}

impl EventSink for MemorySink {
    fn emit(&self, event: Event) {
        self.events.lock().push(event);
    }
}
