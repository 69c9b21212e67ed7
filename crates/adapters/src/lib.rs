// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Terminal backends and response parsers.
//!
//! A [`backend::TerminalBackend`] owns the raw byte channel to an
//! interactive subprocess: either a direct PTY pair or an attached tmux
//! pane. A [`parse::Parser`] classifies the buffer tail as ready or busy
//! and extracts structured sections.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod backend;
pub mod parse;

pub use backend::{BackendError, PaneBackend, PtyBackend, TerminalBackend};
pub use parse::{Parser, ParserKind};
