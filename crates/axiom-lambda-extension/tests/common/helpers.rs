// Copyright 2025-Present Axiom, Inc. https://axiom.co/
// SPDX-License-Identifier: Apache-2.0

//! Helper functions for integration tests

use axiom_lambda_extension::config::{Config, FunctionMetadata};
use axiom_lambda_extension::extension::runtime_done::RuntimeDoneSignal;
use axiom_lambda_extension::logs::flusher::FlushEngine;
use axiom_lambda_extension::logs::intake::IntakeHandler;
use axiom_lambda_extension::logs::normalizer::EventNormalizer;
use axiom_lambda_extension::logs::sink::IngestionSink;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::{Request, StatusCode};
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

pub const TEST_TOKEN: &str = "xaat-test-token";
pub const TEST_DATASET: &str = "lambda-logs";
pub const INGEST_PATH: &str = "/v1/datasets/lambda-logs/ingest";

/// Sink configuration pointing at a mock server, without compression so
/// request bodies can be matched.
pub fn sink_config(url: &str) -> Config {
    Config {
        axiom_url: url.to_string(),
        axiom_token: Some(TEST_TOKEN.to_string()),
        axiom_dataset: Some(TEST_DATASET.to_string()),
        use_compression: false,
        request_timeout: Duration::from_secs(5),
        ..Default::default()
    }
}

pub fn function_metadata() -> FunctionMetadata {
    FunctionMetadata {
        initialization_type: "on-demand".to_string(),
        region: "us-east-1".to_string(),
        name: "orders".to_string(),
        memory_size_mb: 128,
        version: "$LATEST".to_string(),
    }
}

/// Intake handler wired to a fresh flush engine and runtime-done signal.
pub fn pipeline(
    sink: Arc<dyn IngestionSink>,
) -> (IntakeHandler, Arc<FlushEngine>, Arc<RuntimeDoneSignal>) {
    let flusher = Arc::new(FlushEngine::new(sink, 1000, Duration::from_secs(60)));
    let runtime_done = Arc::new(RuntimeDoneSignal::new());
    let handler = IntakeHandler::new(
        Arc::new(EventNormalizer::new(function_metadata())),
        flusher.clone(),
        runtime_done.clone(),
    );
    (handler, flusher, runtime_done)
}

/// Sends an HTTP/1 request over TCP and returns the status and body.
pub async fn send_request(
    addr: SocketAddr,
    method: &str,
    uri: &str,
    body: &str,
) -> Result<(StatusCode, String), Box<dyn std::error::Error>> {
    let stream = timeout(Duration::from_secs(2), tokio::net::TcpStream::connect(addr)).await??;

    let io = TokioIo::new(stream);
    let (mut sender, conn) = hyper::client::conn::http1::handshake(io).await?;

    tokio::spawn(async move {
        let _ = conn.await;
    });

    let request = Request::builder()
        .uri(uri)
        .method(method)
        .header("Host", addr.to_string())
        .header("Content-Type", "application/json")
        .body(Full::new(Bytes::from(body.to_string())))?;

    let response = timeout(Duration::from_secs(2), sender.send_request(request)).await??;
    let status = response.status();
    let bytes = response.into_body().collect().await?.to_bytes();
    Ok((status, String::from_utf8(bytes.to_vec())?))
}
