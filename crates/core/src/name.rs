// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Name validation for identifiers that participate in filesystem paths.

use crate::error::EngineError;

/// Maximum length for a validated name.
pub const NAME_MAX_LEN: usize = 32;

/// Validate a name against `^[a-z0-9]([a-z0-9-]*[a-z0-9])?$` (1-32 chars).
///
/// Node, session, server, and graph ids all pass through here before any
/// filesystem touch. `kind` names the id being validated for error messages.
pub fn validate_name(kind: &str, name: &str) -> Result<(), EngineError> {
    if name.is_empty() {
        return Err(EngineError::Validation(format!("{} must not be empty", kind)));
    }
    if name.len() > NAME_MAX_LEN {
        return Err(EngineError::Validation(format!(
            "{} {:?} exceeds {} characters",
            kind, name, NAME_MAX_LEN
        )));
    }
    let bytes = name.as_bytes();
    let inner_ok = bytes.iter().all(|&b| is_name_byte(b));
    let edges_ok = is_alnum_byte(bytes[0]) && is_alnum_byte(bytes[bytes.len() - 1]);
    if !inner_ok || !edges_ok {
        return Err(EngineError::Validation(format!(
            "{} {:?} must match [a-z0-9]([a-z0-9-]*[a-z0-9])?",
            kind, name
        )));
    }
    Ok(())
}

fn is_alnum_byte(b: u8) -> bool {
    b.is_ascii_lowercase() || b.is_ascii_digit()
}

fn is_name_byte(b: u8) -> bool {
    is_alnum_byte(b) || b == b'-'
}

#[cfg(test)]
#[path = "name_tests.rs"]
mod tests;
