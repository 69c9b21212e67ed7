// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Null parser: always ready, one raw section.

use super::{clean, Parser};
use nerve_core::ParsedResponse;

/// Pass-through parser for plain shells and anything without a known prompt.
pub struct NullParser;

impl Parser for NullParser {
    fn is_ready(&self, _buffer: &str) -> bool {
        true
    }

    fn parse(&self, buffer: &str) -> ParsedResponse {
        ParsedResponse::raw(clean(buffer))
    }
}
