// Copyright 2025-Present Axiom, Inc. https://axiom.co/
// SPDX-License-Identifier: Apache-2.0

//! Client for the Lambda Extensions API and the Logs API subscription.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use tracing::debug;

use crate::config::BufferingConfig;
use crate::http::{build_client, ProxyMode};
use crate::logs::constants::SANDBOX_HOSTNAME;

pub const EXTENSION_NAME_HEADER: &str = "Lambda-Extension-Name";
pub const EXTENSION_ID_HEADER: &str = "Lambda-Extension-Identifier";

const EXTENSIONS_API_VERSION: &str = "2020-01-01";
const LOGS_API_VERSION: &str = "2020-08-15";
pub const LOGS_SCHEMA_VERSION: &str = "2021-03-18";

#[derive(Debug, thiserror::Error)]
pub enum ControlPlaneError {
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Register response has no Lambda-Extension-Identifier header")]
    MissingExtensionId,

    #[error("Extension is not registered")]
    NotRegistered,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    #[serde(default)]
    pub function_name: String,
    #[serde(default)]
    pub function_version: String,
    #[serde(default)]
    pub handler: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecycleEventType {
    Invoke,
    Shutdown,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Tracing {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NextEventResponse {
    pub event_type: LifecycleEventType,
    /// Invocation deadline in milliseconds since the Unix epoch.
    #[serde(default)]
    pub deadline_ms: i64,
    #[serde(default)]
    pub request_id: String,
    #[serde(default)]
    pub invoked_function_arn: String,
    #[serde(default)]
    pub tracing: Option<Tracing>,
    #[serde(default)]
    pub shutdown_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Destination {
    pub protocol: &'static str,
    #[serde(rename = "URI")]
    pub uri: String,
    pub method: &'static str,
    pub encoding: &'static str,
}

/// Body of the Logs API subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeRequest {
    pub schema_version: &'static str,
    pub types: Vec<&'static str>,
    pub buffering: BufferingConfig,
    pub destination: Destination,
}

impl SubscribeRequest {
    /// Subscribes to function and platform logs, pushed as JSON to the
    /// intake server on `port`.
    #[must_use]
    pub fn new(buffering: BufferingConfig, port: u16) -> Self {
        Self {
            schema_version: LOGS_SCHEMA_VERSION,
            types: vec!["function", "platform"],
            buffering,
            destination: Destination {
                protocol: "HTTP",
                uri: format!("http://{SANDBOX_HOSTNAME}:{port}/"),
                method: "POST",
                encoding: "JSON",
            },
        }
    }
}

/// The control-plane operations the lifecycle loop depends on.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    async fn register(&self) -> Result<RegisterResponse, ControlPlaneError>;

    async fn subscribe_logs(&self, request: &SubscribeRequest) -> Result<(), ControlPlaneError>;

    /// Blocks until the next lifecycle event.
    async fn next_event(&self) -> Result<NextEventResponse, ControlPlaneError>;
}

pub struct RuntimeApiClient {
    client: reqwest::Client,
    extensions_url: String,
    logs_url: String,
    extension_name: String,
    extension_id: OnceLock<String>,
}

impl RuntimeApiClient {
    /// `runtime_api` is the `host:port` from `AWS_LAMBDA_RUNTIME_API`.
    pub fn new(runtime_api: &str, extension_name: &str) -> Result<Self, ControlPlaneError> {
        // No timeout: event/next blocks until the next invocation.
        let client = build_client(ProxyMode::Disabled, None)?;

        Ok(Self {
            client,
            extensions_url: format!("http://{runtime_api}/{EXTENSIONS_API_VERSION}/extension"),
            logs_url: format!("http://{runtime_api}/{LOGS_API_VERSION}/logs"),
            extension_name: extension_name.to_string(),
            extension_id: OnceLock::new(),
        })
    }

    #[must_use]
    pub fn extension_id(&self) -> Option<&str> {
        self.extension_id.get().map(String::as_str)
    }

    fn require_extension_id(&self) -> Result<&str, ControlPlaneError> {
        self.extension_id().ok_or(ControlPlaneError::NotRegistered)
    }
}

async fn ensure_ok(resp: reqwest::Response) -> Result<reqwest::Response, ControlPlaneError> {
    let status = resp.status();
    if status != reqwest::StatusCode::OK {
        let body = resp.text().await.unwrap_or_default();
        return Err(ControlPlaneError::Status {
            status: status.as_u16(),
            body,
        });
    }
    Ok(resp)
}

#[async_trait]
impl ControlPlane for RuntimeApiClient {
    async fn register(&self) -> Result<RegisterResponse, ControlPlaneError> {
        let resp = self
            .client
            .post(format!("{}/register", self.extensions_url))
            .header(EXTENSION_NAME_HEADER, &self.extension_name)
            .json(&serde_json::json!({ "events": ["INVOKE", "SHUTDOWN"] }))
            .send()
            .await?;
        let resp = ensure_ok(resp).await?;

        let extension_id = resp
            .headers()
            .get(EXTENSION_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .filter(|value| !value.is_empty())
            .ok_or(ControlPlaneError::MissingExtensionId)?
            .to_string();

        let register_response = resp.json::<RegisterResponse>().await?;
        debug!("EXTENSION | Registered with id {extension_id}");
        // A second registration keeps the first id.
        let _ = self.extension_id.set(extension_id);

        Ok(register_response)
    }

    async fn subscribe_logs(&self, request: &SubscribeRequest) -> Result<(), ControlPlaneError> {
        let extension_id = self.require_extension_id()?;
        let resp = self
            .client
            .put(&self.logs_url)
            .header(EXTENSION_ID_HEADER, extension_id)
            .json(request)
            .send()
            .await?;
        ensure_ok(resp).await?;
        Ok(())
    }

    async fn next_event(&self) -> Result<NextEventResponse, ControlPlaneError> {
        let extension_id = self.require_extension_id()?;
        let resp = self
            .client
            .get(format!("{}/event/next", self.extensions_url))
            .header(EXTENSION_NAME_HEADER, &self.extension_name)
            .header(EXTENSION_ID_HEADER, extension_id)
            .send()
            .await?;
        let resp = ensure_ok(resp).await?;
        Ok(resp.json::<NextEventResponse>().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_subscribe_request_body() {
        let request = SubscribeRequest::new(BufferingConfig::default(), 8080);
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "schemaVersion": "2021-03-18",
                "types": ["function", "platform"],
                "buffering": {"maxItems": 1000, "maxBytes": 262144, "timeoutMs": 1000},
                "destination": {
                    "protocol": "HTTP",
                    "URI": "http://sandbox.localdomain:8080/",
                    "method": "POST",
                    "encoding": "JSON",
                },
            })
        );
    }

    #[test]
    fn test_next_event_decoding() {
        let event: NextEventResponse = serde_json::from_value(json!({
            "eventType": "INVOKE",
            "deadlineMs": 1_705_395_231_919_i64,
            "requestId": "3da1f2dc-3222-475e-9205-e2e6c6318895",
            "invokedFunctionArn": "arn:aws:lambda:us-east-1:123456789012:function:orders",
            "tracing": {"type": "X-Amzn-Trace-Id", "value": "Root=1-5f35ae12"}
        }))
        .unwrap();

        assert_eq!(event.event_type, LifecycleEventType::Invoke);
        assert_eq!(event.deadline_ms, 1_705_395_231_919);
        assert_eq!(event.tracing.unwrap().kind, "X-Amzn-Trace-Id");

        let event: NextEventResponse = serde_json::from_value(json!({
            "eventType": "SHUTDOWN",
            "shutdownReason": "spindown",
            "deadlineMs": 0
        }))
        .unwrap();
        assert_eq!(event.event_type, LifecycleEventType::Shutdown);
        assert_eq!(event.shutdown_reason.as_deref(), Some("spindown"));
    }

    #[test]
    fn test_unknown_event_type() {
        let event: NextEventResponse =
            serde_json::from_value(json!({"eventType": "RESTORE"})).unwrap();
        assert_eq!(event.event_type, LifecycleEventType::Unknown);
    }

    #[test]
    fn test_urls() {
        let client = RuntimeApiClient::new("127.0.0.1:9001", "axiom").unwrap();
        assert_eq!(client.extensions_url, "http://127.0.0.1:9001/2020-01-01/extension");
        assert_eq!(client.logs_url, "http://127.0.0.1:9001/2020-08-15/logs");
        assert_eq!(client.extension_id(), None);
    }

    #[tokio::test]
    async fn test_calls_before_registration_fail() {
        let client = RuntimeApiClient::new("127.0.0.1:9001", "axiom").unwrap();
        assert!(matches!(
            client.next_event().await,
            Err(ControlPlaneError::NotRegistered)
        ));
        assert!(matches!(
            client
                .subscribe_logs(&SubscribeRequest::new(BufferingConfig::default(), 8080))
                .await,
            Err(ControlPlaneError::NotRegistered)
        ));
    }
}
