// Copyright 2025-Present Axiom, Inc. https://axiom.co/
// SPDX-License-Identifier: Apache-2.0

//! Log event types received from the Logs API and sent to the ingest sink.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

use crate::config::FunctionMetadata;
use crate::EXTENSION_VERSION;

const FUNCTION_TYPE: &str = "function";
const PLATFORM_PREFIX: &str = "platform.";
const EXTENSION_PREFIX: &str = "extension.";
const RUNTIME_DONE: &str = "runtimeDone";

/// The `type` of a Logs API event.
///
/// Always serialized back to the exact string it was parsed from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventType {
    /// Output of the function code (`function`).
    Function,
    /// Platform events such as `platform.start` or `platform.runtimeDone`,
    /// holding the part after `platform.`.
    Platform(String),
    /// Extension output (`extension`, `extension.*`), holding the part after
    /// `extension.` if any.
    Extension(String),
    Other(String),
}

impl EventType {
    #[must_use]
    pub fn is_function(&self) -> bool {
        matches!(self, EventType::Function)
    }

    /// True for `platform.runtimeDone`, which marks the end of an invocation.
    #[must_use]
    pub fn is_runtime_done(&self) -> bool {
        matches!(self, EventType::Platform(name) if name == RUNTIME_DONE)
    }
}

impl From<String> for EventType {
    fn from(value: String) -> Self {
        if value == FUNCTION_TYPE {
            EventType::Function
        } else if let Some(name) = value.strip_prefix(PLATFORM_PREFIX) {
            EventType::Platform(name.to_string())
        } else if value == "extension" {
            EventType::Extension(String::new())
        } else if let Some(name) = value.strip_prefix(EXTENSION_PREFIX) {
            EventType::Extension(name.to_string())
        } else {
            EventType::Other(value)
        }
    }
}

impl From<&str> for EventType {
    fn from(value: &str) -> Self {
        EventType::from(value.to_string())
    }
}

impl From<EventType> for String {
    fn from(value: EventType) -> Self {
        value.to_string()
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventType::Function => f.write_str(FUNCTION_TYPE),
            EventType::Platform(name) => write!(f, "{PLATFORM_PREFIX}{name}"),
            EventType::Extension(name) if name.is_empty() => f.write_str("extension"),
            EventType::Extension(name) => write!(f, "{EXTENSION_PREFIX}{name}"),
            EventType::Other(raw) => f.write_str(raw),
        }
    }
}

/// One event as pushed by the Logs API.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RawLogEvent {
    #[serde(rename = "type")]
    pub event_type: EventType,
    #[serde(default)]
    pub time: Option<Value>,
    #[serde(default)]
    pub record: Value,
    /// Any other top-level field, kept verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Version of the extension, attached to every event as the `axiom` block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgentMetadata {
    #[serde(rename = "awsLambdaExtensionVersion")]
    pub extension_version: String,
}

impl AgentMetadata {
    #[must_use]
    pub fn current() -> Self {
        Self {
            extension_version: EXTENSION_VERSION.to_string(),
        }
    }
}

/// A normalized event, ready to be sent to the sink.
///
/// `time` is emitted under the sink's reserved `_time` field; the original
/// `time` key does not appear in the serialized form.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEvent {
    #[serde(rename = "type")]
    pub event_type: EventType,
    #[serde(rename = "_time", skip_serializing_if = "Option::is_none")]
    pub time: Option<Value>,
    pub record: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
    #[serde(rename = "requestId", skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub lambda: Arc<FunctionMetadata>,
    pub axiom: Arc<AgentMetadata>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
