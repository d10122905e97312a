// Copyright 2025-Present Axiom, Inc. https://axiom.co/
// SPDX-License-Identifier: Apache-2.0

//! Extension configuration.
//!
//! Everything is read once at startup from the process environment. Values
//! that fail to parse fall back to their defaults with a warning; only
//! structural problems (see [`Config::validate`]) stop the extension.

use serde::Serialize;
use std::env;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

pub const DEFAULT_LOGS_PORT: u16 = 8080;
pub const DEFAULT_AXIOM_URL: &str = "https://api.axiom.co";
pub const DEFAULT_EXTENSION_NAME: &str = "axiom-lambda-extension";

// Logs API buffering limits requested at subscription time.
pub const DEFAULT_BUFFERING_MAX_ITEMS: u32 = 1000;
pub const DEFAULT_BUFFERING_MAX_BYTES: u32 = 262_144;
pub const DEFAULT_BUFFERING_TIMEOUT_MS: u32 = 1000;

pub const DEFAULT_FLUSH_MAX_ITEMS: usize = 1000;
pub const DEFAULT_FLUSH_INTERVAL_MS: u64 = 1000;
pub const DEFAULT_RUNTIME_DONE_TIMEOUT_MS: u64 = 2000;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_COMPRESSION_LEVEL: i32 = 3;

const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("AWS_LAMBDA_RUNTIME_API is not set and development mode is disabled")]
    MissingRuntimeApi,
}

/// Buffering limits the Logs API applies before pushing a batch to the intake
/// endpoint. Serialized as-is into the subscription request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BufferingConfig {
    pub max_items: u32,
    pub max_bytes: u32,
    pub timeout_ms: u32,
}

impl Default for BufferingConfig {
    fn default() -> Self {
        Self {
            max_items: DEFAULT_BUFFERING_MAX_ITEMS,
            max_bytes: DEFAULT_BUFFERING_MAX_BYTES,
            timeout_ms: DEFAULT_BUFFERING_TIMEOUT_MS,
        }
    }
}

/// Identity of the function this extension runs next to. Attached to every
/// event as the `lambda` block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionMetadata {
    pub initialization_type: String,
    pub region: String,
    pub name: String,
    #[serde(rename = "memorySizeMB")]
    pub memory_size_mb: i64,
    pub version: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    /// `host:port` of the Lambda runtime API.
    pub runtime_api: Option<String>,
    /// Name sent in the `Lambda-Extension-Name` header.
    pub extension_name: String,
    /// Skips registration, subscription and polling; only the intake server runs.
    pub development_mode: bool,
    /// Port the intake server listens on.
    pub logs_port: u16,
    pub buffering: BufferingConfig,
    pub axiom_url: String,
    pub axiom_token: Option<String>,
    pub axiom_dataset: Option<String>,
    /// Buffered item count above which a flush is due.
    pub flush_max_items: usize,
    /// Time since the last flush after which a flush is due.
    pub flush_interval: Duration,
    /// Upper bound of the wait for the first `platform.runtimeDone` when the
    /// invocation deadline is unknown.
    pub runtime_done_timeout: Duration,
    /// Timeout of a single ingest request.
    pub request_timeout: Duration,
    pub use_compression: bool,
    pub compression_level: i32,
    pub https_proxy: Option<String>,
    pub log_level: String,
    pub function: FunctionMetadata,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            runtime_api: None,
            extension_name: DEFAULT_EXTENSION_NAME.to_string(),
            development_mode: false,
            logs_port: DEFAULT_LOGS_PORT,
            buffering: BufferingConfig::default(),
            axiom_url: DEFAULT_AXIOM_URL.to_string(),
            axiom_token: None,
            axiom_dataset: None,
            flush_max_items: DEFAULT_FLUSH_MAX_ITEMS,
            flush_interval: Duration::from_millis(DEFAULT_FLUSH_INTERVAL_MS),
            runtime_done_timeout: Duration::from_millis(DEFAULT_RUNTIME_DONE_TIMEOUT_MS),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            use_compression: true,
            compression_level: DEFAULT_COMPRESSION_LEVEL,
            https_proxy: None,
            log_level: "info".to_string(),
            function: FunctionMetadata::default(),
        }
    }
}

impl Config {
    /// Reads the configuration from the process environment. The extension
    /// name is the file name of the running executable.
    pub fn from_env() -> Self {
        let mut config = Self::from_lookup(|key| env::var(key).ok());
        if let Some(name) = env::args()
            .next()
            .as_deref()
            .and_then(|arg0| Path::new(arg0).file_name())
            .and_then(|name| name.to_str())
        {
            config.extension_name = name.to_string();
        }
        config
    }

    /// Builds a configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|val| !val.trim().is_empty());
        let defaults = Self::default();

        Self {
            runtime_api: non_empty("AWS_LAMBDA_RUNTIME_API"),
            extension_name: defaults.extension_name,
            development_mode: false,
            logs_port: parse_or(&lookup, "AXIOM_LOGS_PORT", DEFAULT_LOGS_PORT),
            buffering: BufferingConfig {
                max_items: parse_or(
                    &lookup,
                    "AXIOM_BUFFERING_MAX_ITEMS",
                    DEFAULT_BUFFERING_MAX_ITEMS,
                ),
                max_bytes: parse_or(
                    &lookup,
                    "AXIOM_BUFFERING_MAX_BYTES",
                    DEFAULT_BUFFERING_MAX_BYTES,
                ),
                timeout_ms: parse_or(
                    &lookup,
                    "AXIOM_BUFFERING_TIMEOUT_MS",
                    DEFAULT_BUFFERING_TIMEOUT_MS,
                ),
            },
            axiom_url: non_empty("AXIOM_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.axiom_url),
            axiom_token: non_empty("AXIOM_TOKEN"),
            axiom_dataset: non_empty("AXIOM_DATASET"),
            flush_max_items: parse_or(&lookup, "AXIOM_FLUSH_MAX_ITEMS", DEFAULT_FLUSH_MAX_ITEMS),
            flush_interval: Duration::from_millis(parse_or(
                &lookup,
                "AXIOM_FLUSH_INTERVAL_MS",
                DEFAULT_FLUSH_INTERVAL_MS,
            )),
            runtime_done_timeout: Duration::from_millis(parse_or(
                &lookup,
                "AXIOM_RUNTIME_DONE_TIMEOUT_MS",
                DEFAULT_RUNTIME_DONE_TIMEOUT_MS,
            )),
            request_timeout: Duration::from_secs(parse_or(
                &lookup,
                "AXIOM_REQUEST_TIMEOUT_SECS",
                DEFAULT_REQUEST_TIMEOUT_SECS,
            )),
            use_compression: lookup("AXIOM_USE_COMPRESSION")
                .map(|val| val.to_lowercase() != "false")
                .unwrap_or(true),
            compression_level: parse_or(
                &lookup,
                "AXIOM_COMPRESSION_LEVEL",
                DEFAULT_COMPRESSION_LEVEL,
            ),
            https_proxy: non_empty("HTTPS_PROXY"),
            log_level: lookup("AXIOM_LOG_LEVEL")
                .map(|val| val.to_lowercase())
                .unwrap_or(defaults.log_level),
            function: FunctionMetadata {
                initialization_type: lookup("AWS_LAMBDA_INITIALIZATION_TYPE").unwrap_or_default(),
                region: lookup("AWS_REGION").unwrap_or_default(),
                name: lookup("AWS_LAMBDA_FUNCTION_NAME").unwrap_or_default(),
                memory_size_mb: lookup("AWS_LAMBDA_FUNCTION_MEMORY_SIZE")
                    .and_then(|val| val.parse::<i64>().ok())
                    .unwrap_or(0),
                version: lookup("AWS_LAMBDA_FUNCTION_VERSION").unwrap_or_default(),
            },
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.development_mode && self.runtime_api.is_none() {
            return Err(ConfigError::MissingRuntimeApi);
        }

        if self.logs_port == 0 {
            return Err(ConfigError::InvalidConfig(
                "AXIOM_LOGS_PORT must be greater than 0".to_string(),
            ));
        }

        if self.flush_max_items == 0 {
            return Err(ConfigError::InvalidConfig(
                "AXIOM_FLUSH_MAX_ITEMS must be greater than 0".to_string(),
            ));
        }

        if self.flush_interval.is_zero() {
            return Err(ConfigError::InvalidConfig(
                "AXIOM_FLUSH_INTERVAL_MS must be greater than 0".to_string(),
            ));
        }

        if !VALID_LOG_LEVELS.contains(&self.log_level.as_str()) {
            return Err(ConfigError::InvalidConfig(format!(
                "Invalid log level '{}'. Must be one of: trace, debug, info, warn, error",
                self.log_level
            )));
        }

        Ok(())
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        None => default,
        Some(raw) => raw.trim().parse::<T>().unwrap_or_else(|_| {
            warn!("CONFIG | Invalid value {raw:?} for {key}, using default");
            default
        }),
    }
}
