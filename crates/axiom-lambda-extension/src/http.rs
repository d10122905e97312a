// Copyright 2025-Present Axiom, Inc. https://axiom.co/
// SPDX-License-Identifier: Apache-2.0

use bytes::Bytes;
use core::time::Duration;
use http_body_util::Full;
use hyper::{http, Response, StatusCode};
use serde_json::json;
use tracing::{debug, error};

pub type HttpResponse = Response<Full<Bytes>>;

/// Does two things:
/// 1. Logs the given message. A success status code (within 200-299) will cause a debug log to be
///    written, otherwise error will be written.
/// 2. Returns the given message in the body of JSON response with the given status code.
///
/// Response body format:
/// {
///     "message": message
/// }
pub fn log_and_create_http_response(message: &str, status: StatusCode) -> http::Result<HttpResponse> {
    if status.is_success() {
        debug!("{message}");
    } else {
        error!("{message}");
    }
    let body = json!({ "message": message }).to_string();
    Response::builder()
        .status(status)
        .body(Full::new(Bytes::from(body)))
}

/// Proxy selection for [`build_client`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyMode<'a> {
    /// reqwest's default: proxies from the environment.
    System,
    /// All HTTPS traffic goes through this proxy.
    Https(&'a str),
    /// Direct connections only. Used for the sandbox-local Runtime API.
    Disabled,
}

impl<'a> From<Option<&'a str>> for ProxyMode<'a> {
    fn from(proxy_url: Option<&'a str>) -> Self {
        proxy_url.map_or(ProxyMode::System, ProxyMode::Https)
    }
}

/// Builds a reqwest client with rustls, the given proxy mode and optional timeout.
///
/// Clients talking to the Extensions API must not set a timeout: `event/next`
/// blocks until the next invocation.
pub fn build_client(
    proxy: ProxyMode<'_>,
    timeout: Option<Duration>,
) -> Result<reqwest::Client, reqwest::Error> {
    let mut builder = reqwest::Client::builder().use_rustls_tls();
    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }
    builder = match proxy {
        ProxyMode::System => builder,
        ProxyMode::Https(proxy_url) => builder.proxy(reqwest::Proxy::https(proxy_url)?),
        ProxyMode::Disabled => builder.no_proxy(),
    };
    builder.build()
}
