// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Response parsers.
//!
//! A parser is pure: given the current buffer text it classifies the tail as
//! ready or busy, and extracts structured sections once ready. Parser choice
//! is resolved per operation: operation override > step override > node
//! default > null.

mod claude;
mod codex;
mod null;

pub use claude::ClaudeParser;
pub use codex::CodexParser;
pub use null::NullParser;

use nerve_core::ParsedResponse;
use serde::{Deserialize, Serialize};

/// Classifies buffer readiness and extracts sections.
pub trait Parser: Send + Sync {
    /// Whether the buffer tail shows the target CLI back at an idle prompt.
    fn is_ready(&self, buffer: &str) -> bool;

    /// Extract the response from the buffer. Meaningful once ready, but must
    /// not fail on a busy buffer.
    fn parse(&self, buffer: &str) -> ParsedResponse;
}

/// The closed set of parser variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParserKind {
    /// Always ready; a single raw section.
    #[default]
    Null,
    /// Claude CLI: box-drawn idle input prompt, two-key submit.
    Claude,
    /// Codex CLI: plain prompt line, visible working indicator while busy.
    Codex,
}

impl ParserKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ParserKind::Null => "null",
            ParserKind::Claude => "claude",
            ParserKind::Codex => "codex",
        }
    }

    /// The shared parser instance for this kind.
    pub fn parser(self) -> &'static dyn Parser {
        match self {
            ParserKind::Null => &NullParser,
            ParserKind::Claude => &ClaudeParser,
            ParserKind::Codex => &CodexParser,
        }
    }

    /// Resolve the effective parser: operation override > step override >
    /// node default > null.
    pub fn resolve(
        op_override: Option<ParserKind>,
        step_override: Option<ParserKind>,
        node_default: Option<ParserKind>,
    ) -> ParserKind {
        op_override.or(step_override).or(node_default).unwrap_or_default()
    }
}

impl std::str::FromStr for ParserKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "null" => Ok(ParserKind::Null),
            "claude" => Ok(ParserKind::Claude),
            "codex" => Ok(ParserKind::Codex),
            other => Err(format!("unknown parser: {:?}", other)),
        }
    }
}

impl std::fmt::Display for ParserKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Strip ANSI escapes and decode lossily.
pub(crate) fn clean(buffer: &str) -> String {
    let stripped = strip_ansi_escapes::strip(buffer.as_bytes());
    String::from_utf8_lossy(&stripped).to_string()
}

/// Last `n` lines of `text`.
pub(crate) fn tail(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let skip = lines.len().saturating_sub(n);
    lines[skip..].join("\n")
}

/// Find a token count near the word "tokens" (e.g. "1.2k tokens").
/// Returns the last match in the text.
pub(crate) fn scan_token_count(text: &str) -> Option<u64> {
    let mut found = None;
    let mut prev: Option<&str> = None;
    for word in text.split_whitespace() {
        let bare = word.trim_matches(|c: char| !c.is_ascii_alphanumeric());
        if bare.eq_ignore_ascii_case("tokens") || bare.eq_ignore_ascii_case("token") {
            if let Some(count) = prev.and_then(parse_count) {
                found = Some(count);
            }
        }
        prev = Some(word);
    }
    found
}

fn parse_count(word: &str) -> Option<u64> {
    let w = word.trim_matches(|c: char| !(c.is_ascii_digit() || c == '.' || c.is_ascii_alphabetic()));
    if let Some(rest) = w.strip_suffix(['k', 'K']) {
        rest.parse::<f64>().ok().map(|f| (f * 1_000.0) as u64)
    } else if let Some(rest) = w.strip_suffix(['m', 'M']) {
        rest.parse::<f64>().ok().map(|f| (f * 1_000_000.0) as u64)
    } else {
        w.parse::<u64>().ok()
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
