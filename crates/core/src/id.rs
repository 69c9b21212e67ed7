// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Identifier newtypes.
//!
//! Node, session, graph, and workflow ids are caller-chosen names (validated
//! by [`crate::name::validate_name`] where they touch the filesystem).
//! Workflow-run ids are generated with a `run-` prefix.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// Length of the random suffix on generated ids.
const GEN_SUFFIX_LEN: usize = 19;

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            /// Create from any string-like value.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Get the string value of this id.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl PartialEq<str> for $name {
            fn eq(&self, other: &str) -> bool {
                self.0 == other
            }
        }

        impl PartialEq<&str> for $name {
            fn eq(&self, other: &&str) -> bool {
                self.0 == *other
            }
        }

        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }
    };
}

define_id! {
    /// Identifier for a node within a session.
    NodeId
}

define_id! {
    /// Identifier for a session.
    SessionId
}

define_id! {
    /// Identifier for a graph within a session.
    GraphId
}

define_id! {
    /// Identifier for a workflow within a session.
    WorkflowId
}

define_id! {
    /// Identifier for a single workflow run.
    RunId
}

impl RunId {
    /// Generate a fresh run id (`run-` prefix + random suffix).
    pub fn generate() -> Self {
        Self(format!("run-{}", nanoid::nanoid!(GEN_SUFFIX_LEN)))
    }
}

/// Generate an opaque token with the given type prefix (e.g. `grun-`).
pub fn generate_token(prefix: &str) -> String {
    format!("{}{}", prefix, nanoid::nanoid!(GEN_SUFFIX_LEN))
}

#[cfg(test)]
#[path = "id_tests.rs"]
mod tests;
