// Copyright 2025-Present Axiom, Inc. https://axiom.co/
// SPDX-License-Identifier: Apache-2.0

//! HTTP endpoint the Logs API pushes batches to.

use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper::{http, Method, Request, StatusCode};
use hyper_util::rt::TokioIo;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::extension::runtime_done::RuntimeDoneSignal;
use crate::http::{log_and_create_http_response, HttpResponse};
use crate::config::BufferingConfig;
use crate::logs::constants::{intake_body_limit, INTAKE_DRAIN_TIMEOUT, INTAKE_PATH};
use crate::logs::event::RawLogEvent;
use crate::logs::flusher::FlushEngine;
use crate::logs::normalizer::EventNormalizer;

/// Parses, normalizes and buffers pushed batches.
#[derive(Clone)]
pub struct IntakeHandler {
    normalizer: Arc<EventNormalizer>,
    flusher: Arc<FlushEngine>,
    runtime_done: Arc<RuntimeDoneSignal>,
    max_body_bytes: usize,
}

impl IntakeHandler {
    #[must_use]
    pub fn new(
        normalizer: Arc<EventNormalizer>,
        flusher: Arc<FlushEngine>,
        runtime_done: Arc<RuntimeDoneSignal>,
    ) -> Self {
        Self {
            normalizer,
            flusher,
            runtime_done,
            max_body_bytes: intake_body_limit(BufferingConfig::default().max_bytes),
        }
    }

    /// Caps the size of pushed bodies. Larger requests get a 413 and nothing
    /// is buffered.
    #[must_use]
    pub fn with_max_body_bytes(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }

    /// Accepts one pushed batch, returning the number of events buffered.
    ///
    /// The body must be a JSON array of events; on error nothing is buffered.
    /// The runtime-done signal fires only after the batch is in the buffer.
    pub fn accept(&self, body: &[u8]) -> Result<usize, serde_json::Error> {
        let batch: Vec<RawLogEvent> = serde_json::from_slice(body)?;
        let contains_runtime_done = batch.iter().any(|raw| raw.event_type.is_runtime_done());

        let events = self.normalizer.normalize_batch(batch);
        let count = events.len();
        self.flusher.enqueue_batch(events);

        if contains_runtime_done && self.runtime_done.fire() {
            debug!("INTAKE | First platform.runtimeDone received");
        }

        Ok(count)
    }

    async fn handle(&self, req: Request<Incoming>) -> http::Result<HttpResponse> {
        match (req.method(), req.uri().path()) {
            (&Method::POST, INTAKE_PATH) => {
                let body = match Limited::new(req.into_body(), self.max_body_bytes)
                    .collect()
                    .await
                {
                    Ok(collected) => collected.to_bytes(),
                    Err(e) if e.is::<LengthLimitError>() => {
                        return log_and_create_http_response(
                            &format!(
                                "INTAKE | Request body exceeds {} bytes",
                                self.max_body_bytes
                            ),
                            StatusCode::PAYLOAD_TOO_LARGE,
                        );
                    }
                    Err(e) => {
                        return log_and_create_http_response(
                            &format!("INTAKE | Error reading request body: {e}"),
                            StatusCode::BAD_REQUEST,
                        );
                    }
                };

                match self.accept(&body) {
                    Ok(count) => log_and_create_http_response(
                        &format!("INTAKE | Accepted {count} events"),
                        StatusCode::OK,
                    ),
                    Err(e) => log_and_create_http_response(
                        &format!("INTAKE | Error decoding request body: {e}"),
                        StatusCode::BAD_REQUEST,
                    ),
                }
            }
            (method, path) => log_and_create_http_response(
                &format!("INTAKE | No route for {method} {path}"),
                StatusCode::NOT_FOUND,
            ),
        }
    }
}

pub struct LogIntakeServer {
    listener: TcpListener,
    handler: IntakeHandler,
}

impl LogIntakeServer {
    /// Binds the listener. Port 0 picks a free port, see [`Self::local_addr`].
    pub async fn bind(addr: SocketAddr, handler: IntakeHandler) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener, handler })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serves until `cancel` fires. Connections still open at that point get
    /// a short grace period before they are dropped.
    pub async fn serve(self, cancel: CancellationToken) -> io::Result<()> {
        let server = hyper::server::conn::http1::Builder::new();
        let mut joinset = JoinSet::new();

        loop {
            let conn = tokio::select! {
                () = cancel.cancelled() => {
                    debug!("INTAKE | Shutdown requested, no longer accepting connections");
                    break;
                }
                con_res = self.listener.accept() => match con_res {
                    Err(e)
                        if matches!(
                            e.kind(),
                            io::ErrorKind::ConnectionAborted
                                | io::ErrorKind::ConnectionReset
                                | io::ErrorKind::ConnectionRefused
                        ) =>
                    {
                        continue;
                    }
                    Err(e) => {
                        error!("INTAKE | Server error: {e}");
                        return Err(e);
                    }
                    Ok((conn, _)) => conn,
                },
                finished = async {
                    match joinset.join_next().await {
                        Some(finished) => finished,
                        None => std::future::pending().await,
                    }
                } => match finished {
                    Err(e) if e.is_panic() => {
                        error!("INTAKE | Connection task panicked: {e}");
                        continue;
                    }
                    Ok(()) | Err(_) => continue,
                },
            };

            let io = TokioIo::new(conn);
            let server = server.clone();
            let handler = self.handler.clone();
            joinset.spawn(async move {
                let service = service_fn(move |req| {
                    let handler = handler.clone();
                    async move { handler.handle(req).await }
                });
                if let Err(e) = server.serve_connection(io, service).await {
                    debug!("INTAKE | Connection error: {e}");
                }
            });
        }

        let drained = tokio::time::timeout(INTAKE_DRAIN_TIMEOUT, async {
            while joinset.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            debug!("INTAKE | Dropping {} open connections", joinset.len());
        }

        Ok(())
    }
}
