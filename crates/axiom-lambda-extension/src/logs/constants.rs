// Copyright 2025-Present Axiom, Inc. https://axiom.co/
// SPDX-License-Identifier: Apache-2.0

//! Constants shared by the intake server and the ingest sink.

use std::time::Duration;

/// Address the intake server binds to. The Logs API reaches it through
/// `sandbox.localdomain`.
pub const INTAKE_BIND_HOST: [u8; 4] = [0, 0, 0, 0];

/// Hostname the Logs API pushes to, used in the subscription destination.
pub const SANDBOX_HOSTNAME: &str = "sandbox.localdomain";

/// Path the intake server accepts batches on.
pub const INTAKE_PATH: &str = "/";

/// How long in-flight intake connections may keep running after shutdown
/// was requested.
pub const INTAKE_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Pushed bodies may be this many times the subscription's `maxBytes`
/// before the intake rejects them. JSON framing inflates the raw log bytes.
pub const INTAKE_BODY_LIMIT_FACTOR: usize = 4;

/// Largest request body the intake reads for a subscription limited to
/// `max_bytes` of log data per push.
#[must_use]
pub fn intake_body_limit(max_bytes: u32) -> usize {
    usize::try_from(max_bytes)
        .unwrap_or(usize::MAX)
        .saturating_mul(INTAKE_BODY_LIMIT_FACTOR)
}

/// Ingest endpoint path, relative to the configured Axiom URL.
pub(crate) fn ingest_path(dataset: &str) -> String {
    format!("/v1/datasets/{dataset}/ingest")
}

/// Base delay between ingest attempts. Attempt `n` waits `n` times this.
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(100);
