// Copyright 2025-Present Axiom, Inc. https://axiom.co/
// SPDX-License-Identifier: Apache-2.0

//! In-memory batching of normalized events.
//!
//! Producers (the intake server) append under a short lock. A flush swaps the
//! whole buffer out under the same lock and sends it with the lock released,
//! so producers never wait on the network. Flushes themselves are serialized.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error};

use crate::logs::event::LogEvent;
use crate::logs::sink::IngestionSink;

/// What a flush does with the batch when the send fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryOpt {
    /// One attempt; the batch is dropped on failure.
    NoRetry,
    /// Several attempts; on final failure the batch goes back to the front
    /// of the buffer.
    RetryOnFailure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Nothing was buffered.
    Empty,
    Sent { ingested: u64, failed: u64 },
    /// The send failed and the batch was put back.
    Requeued(usize),
    /// The send failed and the batch was discarded.
    Dropped(usize),
}

#[derive(Default)]
struct FlushState {
    buffer: Vec<LogEvent>,
    last_flush: Option<Instant>,
}

pub struct FlushEngine {
    state: Mutex<FlushState>,
    flush_gate: tokio::sync::Mutex<()>,
    sink: Arc<dyn IngestionSink>,
    max_items: usize,
    interval: Duration,
}

impl FlushEngine {
    #[must_use]
    pub fn new(sink: Arc<dyn IngestionSink>, max_items: usize, interval: Duration) -> Self {
        Self {
            state: Mutex::new(FlushState::default()),
            flush_gate: tokio::sync::Mutex::new(()),
            sink,
            max_items,
            interval,
        }
    }

    fn state(&self) -> MutexGuard<'_, FlushState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn enqueue(&self, event: LogEvent) {
        self.state().buffer.push(event);
    }

    /// Appends a whole batch atomically: no flush can observe part of it.
    pub fn enqueue_batch(&self, events: Vec<LogEvent>) {
        if events.is_empty() {
            return;
        }
        self.state().buffer.extend(events);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.state().buffer.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state().buffer.is_empty()
    }

    /// True when more than `max_items` events are buffered, when no flush
    /// has happened yet, or when the last flush is older than `interval`.
    #[must_use]
    pub fn should_flush(&self) -> bool {
        let state = self.state();
        state.buffer.len() > self.max_items
            || state
                .last_flush
                .map_or(true, |last| last.elapsed() > self.interval)
    }

    pub async fn flush(&self, mode: RetryOpt) -> FlushOutcome {
        let _gate = self.flush_gate.lock().await;

        let batch = {
            let mut state = self.state();
            state.last_flush = Some(Instant::now());
            std::mem::take(&mut state.buffer)
        };

        if batch.is_empty() {
            return FlushOutcome::Empty;
        }

        let batch_len = batch.len();
        debug!("LOGS | Flushing {batch_len} events");

        match self.sink.ingest(&batch, mode).await {
            Ok(status) => {
                if status.failed > 0 {
                    let sample = status
                        .failures
                        .first()
                        .map_or("unknown error", |failure| failure.error.as_str());
                    error!(
                        "LOGS | {} of {batch_len} events were rejected, e.g.: {sample}",
                        status.failed
                    );
                }
                FlushOutcome::Sent {
                    ingested: status.ingested,
                    failed: status.failed,
                }
            }
            Err(e) => match mode {
                RetryOpt::RetryOnFailure => {
                    error!("LOGS | Failed to send {batch_len} events, keeping them for later: {e}");
                    let mut state = self.state();
                    let newer = std::mem::replace(&mut state.buffer, batch);
                    state.buffer.extend(newer);
                    FlushOutcome::Requeued(batch_len)
                }
                RetryOpt::NoRetry => {
                    error!("LOGS | Failed to send {batch_len} events, dropping them: {e}");
                    FlushOutcome::Dropped(batch_len)
                }
            },
        }
    }
}
