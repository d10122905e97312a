// Copyright 2025-Present Axiom, Inc. https://axiom.co/
// SPDX-License-Identifier: Apache-2.0

//! # Axiom Lambda Extension
//!
//! A Lambda extension that receives the function's runtime and platform logs
//! from the Logs API, normalizes them into structured events, batches them in
//! memory and ships them to an Axiom dataset.
//!
//! ## Architecture
//!
//! - [`logs`]: intake server, normalization, buffering and the ingest sink
//! - [`extension`]: Extensions API client and the lifecycle coordinator
//! - [`config`]: environment driven configuration
//! - [`logger`]: formatter for the extension's own log lines
//!
//! ```text
//!   Logs API push ──> intake ──> normalizer ──> FlushEngine ──> IngestionSink
//!                                                   ^
//!   Extensions API <── LifecycleCoordinator ────────┘ (flush triggers)
//! ```

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]
#![deny(unused_extern_crates)]
#![deny(unused_allocation)]

/// Environment variables, defaults and validation
pub mod config;

/// Top-level error type returned by the extension entry points
pub mod error;

/// Extensions API client and the invocation lifecycle loop
pub mod extension;

/// HTTP client construction and response helpers
pub mod http;

/// Formatter for the extension's own log lines
pub mod logger;

/// Log intake, normalization, batching and forwarding
pub mod logs;

/// Version reported in the `axiom` block of every event and in the
/// `User-Agent` of ingest requests.
pub const EXTENSION_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Maximum number of attempts for a single ingest request when the flush asks
/// for retries.
pub(crate) const FLUSH_RETRY_COUNT: usize = 3;

/// Logs the extension version at INFO level.
pub fn log_build_info() {
    tracing::info!("axiom-lambda-extension version: {}", EXTENSION_VERSION);
}
