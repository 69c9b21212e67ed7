// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Single-shot cancellation signal shared across an execution subtree.

use crate::error::EngineError;
use tokio_util::sync::CancellationToken;

/// Cooperative cancellation token.
///
/// Clones share the same underlying signal; once cancelled, every `check()`
/// fails with [`EngineError::Cancelled`] and any pending `wait()` wakes.
/// Cancelling twice is a no-op.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: CancellationToken,
}

impl CancelToken {
    pub fn new() -> Self {
        Self { inner: CancellationToken::new() }
    }

    /// Trip the token. Idempotent.
    pub fn cancel(&self) {
        self.inner.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.is_cancelled()
    }

    /// Fail with `Cancelled` if the token has been tripped.
    pub fn check(&self) -> Result<(), EngineError> {
        if self.inner.is_cancelled() {
            Err(EngineError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Resolve when the token is tripped.
    pub async fn wait(&self) {
        self.inner.cancelled().await;
    }
}

#[cfg(test)]
#[path = "cancel_tests.rs"]
mod tests;
