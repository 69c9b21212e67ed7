// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Command/event engine between transports and sessions.
//!
//! Transports decode their wire format into [`protocol::Command`] values,
//! hand them to [`engine::Engine::handle`], and adapt the [`events`]
//! pushed through the injected sink. The engine performs no framing and no
//! networking.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod engine;
pub mod events;
mod monitor;
pub mod protocol;

pub use engine::{Engine, EngineConfig, DEFAULT_SESSION_ID};
pub use events::{ChannelSink, EventSink, MemorySink, NullSink};
pub use protocol::{Command, CommandLine, Response};
