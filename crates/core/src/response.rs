// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Parsed terminal responses.

use serde::{Deserialize, Serialize};

/// One structured section extracted from a response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    /// Section kind, e.g. "raw", "text", "thinking".
    pub kind: String,
    pub content: String,
}

impl Section {
    pub fn new(kind: impl Into<String>, content: impl Into<String>) -> Self {
        Self { kind: kind.into(), content: content.into() }
    }

    pub fn raw(content: impl Into<String>) -> Self {
        Self::new("raw", content)
    }

    pub fn text(content: impl Into<String>) -> Self {
        Self::new("text", content)
    }
}

/// Result of parsing a terminal buffer once the parser declared readiness.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedResponse {
    pub sections: Vec<Section>,
    /// Token count reported by the target CLI, when the parser can see one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens: Option<u64>,
    pub is_complete: bool,
    pub is_ready: bool,
}

impl ParsedResponse {
    /// Single raw section, complete and ready. The null parser's shape.
    pub fn raw(content: impl Into<String>) -> Self {
        Self {
            sections: vec![Section::raw(content)],
            tokens: None,
            is_complete: true,
            is_ready: true,
        }
    }

    /// Concatenated content of all sections.
    pub fn text(&self) -> String {
        let mut out = String::new();
        for section in &self.sections {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(&section.content);
        }
        out
    }
}
