// Copyright 2025-Present Axiom, Inc. https://axiom.co/
// SPDX-License-Identifier: Apache-2.0

//! Lifecycle loop driving the extension.
//!
//! ```text
//! Registering ──> Polling ──(SHUTDOWN or cancel)──> ShuttingDown ──> done
//!                  ^    │
//!                  └────┘ INVOKE
//! ```
//!
//! Every lifecycle event is a flush opportunity. The first invocation also
//! waits for its `platform.runtimeDone` so cold-start logs are shipped before
//! the sandbox can be frozen.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::ExtensionError;
use crate::extension::client::{
    ControlPlane, LifecycleEventType, NextEventResponse, SubscribeRequest,
};
use crate::extension::runtime_done::RuntimeDoneSignal;
use crate::logs::flusher::{FlushEngine, RetryOpt};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Registering,
    Polling,
    ShuttingDown,
}

pub struct LifecycleCoordinator {
    control_plane: Arc<dyn ControlPlane>,
    flusher: Arc<FlushEngine>,
    runtime_done: Arc<RuntimeDoneSignal>,
    subscription: SubscribeRequest,
    runtime_done_timeout: Duration,
    cancel: CancellationToken,
    first_invocation: bool,
}

impl LifecycleCoordinator {
    #[must_use]
    pub fn new(
        control_plane: Arc<dyn ControlPlane>,
        flusher: Arc<FlushEngine>,
        runtime_done: Arc<RuntimeDoneSignal>,
        subscription: SubscribeRequest,
        runtime_done_timeout: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            control_plane,
            flusher,
            runtime_done,
            subscription,
            runtime_done_timeout,
            cancel,
            first_invocation: true,
        }
    }

    /// Runs until SHUTDOWN or cancellation, then performs the final flush.
    ///
    /// Registration, subscription and polling errors are returned; flush
    /// errors never are.
    pub async fn run(mut self) -> Result<(), ExtensionError> {
        let mut state = LifecycleState::Registering;
        loop {
            state = match state {
                LifecycleState::Registering => {
                    self.register().await?;
                    LifecycleState::Polling
                }
                LifecycleState::Polling => self.poll_once().await?,
                LifecycleState::ShuttingDown => {
                    self.flusher.flush(RetryOpt::RetryOnFailure).await;
                    info!("LIFECYCLE | Shutdown complete");
                    return Ok(());
                }
            };
        }
    }

    async fn register(&self) -> Result<(), ExtensionError> {
        let registration = self
            .control_plane
            .register()
            .await
            .map_err(ExtensionError::Registration)?;
        info!(
            "LIFECYCLE | Registered for function {} ({})",
            registration.function_name, registration.function_version
        );

        self.control_plane
            .subscribe_logs(&self.subscription)
            .await
            .map_err(ExtensionError::Subscription)?;
        info!(
            "LIFECYCLE | Subscribed to the Logs API at {}",
            self.subscription.destination.uri
        );
        Ok(())
    }

    async fn poll_once(&mut self) -> Result<LifecycleState, ExtensionError> {
        let event = tokio::select! {
            biased;
            () = self.cancel.cancelled() => {
                info!("LIFECYCLE | Shutdown requested");
                return Ok(LifecycleState::ShuttingDown);
            }
            event = self.control_plane.next_event() => event.map_err(ExtensionError::NextEvent)?,
        };
        debug!(
            "LIFECYCLE | Received {:?} event {}",
            event.event_type, event.request_id
        );

        if self.flusher.should_flush() {
            self.flusher.flush(RetryOpt::NoRetry).await;
        }

        if self.first_invocation && event.event_type == LifecycleEventType::Invoke {
            self.first_invocation = false;
            let bound = self.runtime_done_bound(&event);
            if !self.wait_for_runtime_done(bound).await {
                warn!("LIFECYCLE | No platform.runtimeDone within {bound:?}, flushing anyway");
            }
            self.flusher.flush(RetryOpt::NoRetry).await;
        }

        Ok(match event.event_type {
            LifecycleEventType::Shutdown => {
                info!(
                    "LIFECYCLE | SHUTDOWN received ({})",
                    event.shutdown_reason.as_deref().unwrap_or("no reason given")
                );
                LifecycleState::ShuttingDown
            }
            LifecycleEventType::Invoke | LifecycleEventType::Unknown => LifecycleState::Polling,
        })
    }

    /// Time left until the invocation deadline, or the configured timeout
    /// when the deadline is unknown or already past.
    fn runtime_done_bound(&self, event: &NextEventResponse) -> Duration {
        let now_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |now| i64::try_from(now.as_millis()).unwrap_or(i64::MAX));
        match u64::try_from(event.deadline_ms.saturating_sub(now_ms)) {
            Ok(remaining) if remaining > 0 => Duration::from_millis(remaining),
            _ => self.runtime_done_timeout,
        }
    }

    /// Returns whether the signal fired before `bound` elapsed. Cancellation
    /// ends the wait early.
    async fn wait_for_runtime_done(&self, bound: Duration) -> bool {
        tokio::select! {
            fired = self.runtime_done.wait_timeout(bound) => fired,
            () = self.cancel.cancelled() => false,
        }
    }
}

/// Development mode: no Extensions API. Flushes on the configured interval
/// until cancelled, then performs the final flush.
pub async fn run_without_lifecycle(
    flusher: Arc<FlushEngine>,
    interval: Duration,
    cancel: CancellationToken,
) {
    info!("LIFECYCLE | Development mode, skipping registration");
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await;

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {
                if flusher.should_flush() {
                    flusher.flush(RetryOpt::NoRetry).await;
                }
            }
        }
    }

    flusher.flush(RetryOpt::RetryOnFailure).await;
    info!("LIFECYCLE | Shutdown complete");
}
