// Copyright 2025-Present Axiom, Inc. https://axiom.co/
// SPDX-License-Identifier: Apache-2.0

//! Destinations for flushed batches.
//!
//! [`AxiomSink`] posts batches to the Axiom ingest API. When it cannot be
//! built (missing credentials, bad proxy, invalid token characters) the
//! extension runs with a [`NoopSink`] instead, so the host function is never
//! affected by a misconfigured extension.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{
    HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_ENCODING, CONTENT_TYPE, USER_AGENT,
};
use reqwest::StatusCode;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

use crate::config::Config;
use crate::http::{build_client, ProxyMode};
use crate::logs::constants::{ingest_path, DEFAULT_RETRY_BACKOFF};
use crate::logs::event::LogEvent;
use crate::logs::flusher::RetryOpt;
use crate::{EXTENSION_VERSION, FLUSH_RETRY_COUNT};

/// Result of an accepted ingest request. Items listed in `failures` were
/// rejected individually and are not retried.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestStatus {
    #[serde(default)]
    pub ingested: u64,
    #[serde(default)]
    pub failed: u64,
    #[serde(default)]
    pub failures: Vec<IngestFailure>,
    #[serde(default)]
    pub processed_bytes: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct IngestFailure {
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub error: String,
}

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("Missing {0}")]
    MissingCredentials(&'static str),

    #[error("Invalid header value: {0}")]
    InvalidHeader(#[from] reqwest::header::InvalidHeaderValue),

    #[error("Failed to serialize events: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Failed to compress payload: {0}")]
    Compress(#[from] std::io::Error),

    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Ingest rejected with status {status}: {body}")]
    Status { status: u16, body: String },
}

impl SinkError {
    fn is_retryable(&self) -> bool {
        match self {
            SinkError::Request(_) => true,
            SinkError::Status { status, .. } => {
                *status >= 500 || *status == StatusCode::TOO_MANY_REQUESTS.as_u16()
            }
            _ => false,
        }
    }
}

/// Accepts an ordered batch of events for the configured destination.
///
/// `Err` means the call itself failed and nothing was ingested; partial
/// rejection is reported through [`IngestStatus::failed`].
#[async_trait]
pub trait IngestionSink: Send + Sync {
    async fn ingest(&self, events: &[LogEvent], mode: RetryOpt)
        -> Result<IngestStatus, SinkError>;
}

pub struct AxiomSink {
    client: reqwest::Client,
    endpoint: String,
    headers: HeaderMap,
    compression_level: Option<i32>,
    retry_backoff: Duration,
}

impl AxiomSink {
    pub fn new(config: &Config) -> Result<Self, SinkError> {
        let token = config
            .axiom_token
            .as_deref()
            .ok_or(SinkError::MissingCredentials("AXIOM_TOKEN"))?;
        let dataset = config
            .axiom_dataset
            .as_deref()
            .ok_or(SinkError::MissingCredentials("AXIOM_DATASET"))?;

        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {token}"))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("axiom-lambda-extension/{EXTENSION_VERSION}"))?,
        );
        if config.use_compression {
            headers.insert(CONTENT_ENCODING, HeaderValue::from_static("zstd"));
        }

        let client = build_client(
            ProxyMode::from(config.https_proxy.as_deref()),
            Some(config.request_timeout),
        )?;

        Ok(Self {
            client,
            endpoint: format!("{}{}", config.axiom_url, ingest_path(dataset)),
            headers,
            compression_level: config.use_compression.then_some(config.compression_level),
            retry_backoff: DEFAULT_RETRY_BACKOFF,
        })
    }

    #[must_use]
    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn encode(&self, events: &[LogEvent]) -> Result<Bytes, SinkError> {
        let json = serde_json::to_vec(events)?;
        match self.compression_level {
            Some(level) => Ok(Bytes::from(zstd::encode_all(json.as_slice(), level)?)),
            None => Ok(Bytes::from(json)),
        }
    }

    async fn send_once(&self, body: Bytes, batch_len: usize) -> Result<IngestStatus, SinkError> {
        let resp = self
            .client
            .post(&self.endpoint)
            .headers(self.headers.clone())
            .body(body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SinkError::Status {
                status: status.as_u16(),
                body,
            });
        }

        // The batch is accepted at this point; an unreadable status body
        // must not cause it to be sent again.
        match resp.json::<IngestStatus>().await {
            Ok(ingest_status) => Ok(ingest_status),
            Err(e) => {
                warn!("LOGS | Could not decode ingest status: {e}");
                Ok(IngestStatus {
                    ingested: batch_len as u64,
                    ..Default::default()
                })
            }
        }
    }
}

#[async_trait]
impl IngestionSink for AxiomSink {
    async fn ingest(
        &self,
        events: &[LogEvent],
        mode: RetryOpt,
    ) -> Result<IngestStatus, SinkError> {
        let body = self.encode(events)?;
        let max_attempts = match mode {
            RetryOpt::NoRetry => 1,
            RetryOpt::RetryOnFailure => FLUSH_RETRY_COUNT,
        };

        let mut attempts = 0;
        loop {
            attempts += 1;
            let err = match self.send_once(body.clone(), events.len()).await {
                Ok(status) => {
                    debug!(
                        "LOGS | Ingested {} events after {attempts} attempt(s)",
                        status.ingested
                    );
                    return Ok(status);
                }
                Err(e) => e,
            };

            if attempts >= max_attempts || !err.is_retryable() {
                return Err(err);
            }

            debug!("LOGS | Ingest attempt {attempts} failed, retrying: {err}");
            let delay = self.retry_backoff * u32::try_from(attempts).unwrap_or(u32::MAX);
            tokio::time::sleep(delay).await;
        }
    }
}

/// Discards every batch without any network I/O.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

#[async_trait]
impl IngestionSink for NoopSink {
    async fn ingest(
        &self,
        events: &[LogEvent],
        _mode: RetryOpt,
    ) -> Result<IngestStatus, SinkError> {
        debug!(
            "LOGS | No ingest destination configured, discarding {} events",
            events.len()
        );
        Ok(IngestStatus::default())
    }
}

/// Builds the sink for this configuration, degrading to [`NoopSink`] when
/// the Axiom client cannot be created.
pub fn build_sink(config: &Config) -> Arc<dyn IngestionSink> {
    match AxiomSink::new(config) {
        Ok(sink) => {
            debug!("LOGS | Sending events to {}", sink.endpoint());
            Arc::new(sink)
        }
        Err(e) => {
            error!("LOGS | Cannot create Axiom client, logs will not be forwarded: {e}");
            Arc::new(NoopSink)
        }
    }
}
