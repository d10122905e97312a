// Copyright 2025-Present Axiom, Inc. https://axiom.co/
// SPDX-License-Identifier: Apache-2.0

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// One-shot signal raised the first time a `platform.runtimeDone` event is
/// received. Later raises are no-ops.
#[derive(Debug, Default)]
pub struct RuntimeDoneSignal {
    fired: AtomicBool,
    token: CancellationToken,
}

impl RuntimeDoneSignal {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Raises the signal. Returns `true` only for the call that raised it.
    pub fn fire(&self) -> bool {
        if self.fired.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.token.cancel();
        true
    }

    #[must_use]
    pub fn is_fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }

    /// Resolves once the signal has been raised, immediately if it already was.
    pub async fn wait(&self) {
        self.token.cancelled().await;
    }

    /// Like [`Self::wait`], bounded by `timeout`. Returns whether the signal
    /// was raised in time.
    pub async fn wait_timeout(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.wait()).await.is_ok()
    }
}
