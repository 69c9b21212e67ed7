// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Parser for the Claude CLI's interactive prompt.

use super::{clean, scan_token_count, tail, Parser};
use nerve_core::{ParsedResponse, Section};

/// Top border of the box-drawn input prompt.
const INPUT_BOX_TOP: &str = "╭─";
/// The idle input line inside the box.
const PROMPT_MARKER: &str = "│ >";
/// Shortcut hint shown under the idle prompt.
const READY_HINT: &str = "? for shortcuts";
/// Spinner suffix shown while the CLI is working.
const BUSY_MARKER: &str = "esc to interrupt";

/// Lines of tail inspected for readiness anchors.
const TAIL_WINDOW: usize = 40;

/// Claude CLI parser.
///
/// Ready when the box-drawn input prompt is visible at the tail and no
/// working spinner is. Submission is a two-key sequence (the text, then a
/// separate Enter after a settle delay); the node layer owns that detail.
pub struct ClaudeParser;

impl Parser for ClaudeParser {
    fn is_ready(&self, buffer: &str) -> bool {
        let view = tail(&clean(buffer), TAIL_WINDOW);
        if view.contains(BUSY_MARKER) {
            return false;
        }
        view.contains(PROMPT_MARKER) || view.contains(READY_HINT)
    }

    fn parse(&self, buffer: &str) -> ParsedResponse {
        let text = clean(buffer);
        // Everything above the last input box is the response body.
        let body = match text.rfind(INPUT_BOX_TOP) {
            Some(idx) => &text[..idx],
            None => text.as_str(),
        };
        let ready = self.is_ready(buffer);
        ParsedResponse {
            sections: vec![Section::text(body.trim_end())],
            tokens: scan_token_count(&text),
            is_complete: ready,
            is_ready: ready,
        }
    }
}

#[cfg(test)]
#[path = "claude_tests.rs"]
mod tests;
