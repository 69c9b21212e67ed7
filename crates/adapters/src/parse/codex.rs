// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Parser for the Codex CLI's interactive prompt.

use super::{clean, scan_token_count, tail, Parser};
use nerve_core::{ParsedResponse, Section};

/// Idle prompt sigil at the start of the input line.
const PROMPT_SIGIL: char = '›';
/// Indicators shown while the CLI is still working.
const BUSY_MARKERS: &[&str] = &["Thinking", "Working", "esc to interrupt"];

/// Lines of tail inspected for readiness anchors.
const TAIL_WINDOW: usize = 20;

/// Codex CLI parser.
///
/// Unlike the Claude prompt, a visible thinking/working indicator means the
/// response is still streaming even when a prompt sigil is on screen.
pub struct CodexParser;

impl Parser for CodexParser {
    fn is_ready(&self, buffer: &str) -> bool {
        let view = tail(&clean(buffer), TAIL_WINDOW);
        if BUSY_MARKERS.iter().any(|m| view.contains(m)) {
            return false;
        }
        view.lines()
            .rev()
            .find(|l| !l.trim().is_empty())
            .is_some_and(|l| l.trim_start().starts_with(PROMPT_SIGIL))
    }

    fn parse(&self, buffer: &str) -> ParsedResponse {
        let text = clean(buffer);
        // The body ends at the last idle prompt line.
        let body = match text.rfind(PROMPT_SIGIL) {
            Some(idx) => text[..idx].trim_end_matches(|c: char| c != '\n'),
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
#[path = "codex_tests.rs"]
mod tests;
