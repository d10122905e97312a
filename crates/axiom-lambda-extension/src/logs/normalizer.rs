// Copyright 2025-Present Axiom, Inc. https://axiom.co/
// SPDX-License-Identifier: Apache-2.0

//! Turns raw Logs API events into the structured events sent to the sink.
//!
//! Function output arrives as plain text. Two shapes are recognized:
//!
//! - a JSON object, which becomes the `record` as-is;
//! - the default runtime format `<timestamp>\t<request id>\t<LEVEL>\t<body>`,
//!   which is split into `{timestamp, requestId, level, message}`.
//!
//! In both cases the original text is kept, untouched, under `message`.

use regex::Regex;
use serde_json::{Map, Value};
use std::sync::{Arc, OnceLock};
use tracing::debug;

use crate::config::FunctionMetadata;
use crate::logs::event::{AgentMetadata, LogEvent, RawLogEvent};

const LEVEL_FIELD: &str = "level";
const REQUEST_ID_FIELD: &str = "requestId";

#[allow(clippy::expect_used)]
fn runtime_line_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"(?s)^([0-9]{4}-[0-9]{2}-[0-9]{2}T[0-9]{2}:[0-9]{2}:[0-9]{2}(?:\.[0-9]+)?(?:Z|[+-][0-9]{2}:?[0-9]{2}))\s+([0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12})\s+(ERROR|INFO|WARN|DEBUG|TRACE)\s+(.*)$",
        )
        .expect("runtime line pattern is valid")
    })
}

/// Structured view of a function output line.
#[derive(Debug, PartialEq)]
struct ParsedRecord {
    record: Value,
    level: Option<String>,
    request_id: Option<String>,
}

pub struct EventNormalizer {
    function: Arc<FunctionMetadata>,
    agent: Arc<AgentMetadata>,
}

impl EventNormalizer {
    #[must_use]
    pub fn new(function: FunctionMetadata) -> Self {
        Self {
            function: Arc::new(function),
            agent: Arc::new(AgentMetadata::current()),
        }
    }

    /// Normalizes a single event. Never fails: anything that cannot be
    /// structured is passed through as text.
    #[must_use]
    pub fn normalize(&self, raw: RawLogEvent) -> LogEvent {
        let RawLogEvent {
            event_type,
            time,
            record,
            extra,
        } = raw;

        let mut event = LogEvent {
            event_type,
            time,
            record: Value::Null,
            message: None,
            level: None,
            request_id: None,
            lambda: Arc::clone(&self.function),
            axiom: Arc::clone(&self.agent),
            extra,
        };

        match record {
            Value::String(text) if event.event_type.is_function() => {
                match parse_function_output(&text) {
                    Some(parsed) => {
                        event.record = parsed.record;
                        event.level = parsed.level;
                        event.request_id = parsed.request_id;
                    }
                    None => event.record = Value::String(text.clone()),
                }
                event.message = Some(text);
            }
            Value::String(text) => {
                event.message = Some(text.clone());
                event.record = Value::String(text);
            }
            Value::Object(fields) => {
                event.level = string_field(&fields, LEVEL_FIELD).map(|level| level.to_lowercase());
                event.request_id = string_field(&fields, REQUEST_ID_FIELD).map(str::to_string);
                event.record = Value::Object(fields);
            }
            other => event.record = other,
        }

        drop_shadowed_fields(&mut event);
        event
    }

    #[must_use]
    pub fn normalize_batch(&self, batch: Vec<RawLogEvent>) -> Vec<LogEvent> {
        batch.into_iter().map(|raw| self.normalize(raw)).collect()
    }
}

/// Removes raw top-level fields that would be serialized a second time next
/// to a field the event already emits. Enrichment and derived fields win.
fn drop_shadowed_fields(event: &mut LogEvent) {
    if event.extra.is_empty() {
        return;
    }
    let emitted = [
        ("_time", event.time.is_some()),
        ("message", event.message.is_some()),
        (LEVEL_FIELD, event.level.is_some()),
        (REQUEST_ID_FIELD, event.request_id.is_some()),
        ("lambda", true),
        ("axiom", true),
    ];
    for (key, is_emitted) in emitted {
        if is_emitted && event.extra.remove(key).is_some() {
            debug!("NORMALIZER | Dropping raw `{key}` field of a {} event", event.event_type);
        }
    }
}

fn string_field<'a>(fields: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    fields.get(key).and_then(Value::as_str)
}

/// Structures a function output line, or returns `None` if it has no
/// recognizable shape.
fn parse_function_output(text: &str) -> Option<ParsedRecord> {
    let trimmed = text.trim();

    if trimmed.starts_with('{') && trimmed.ends_with('}') {
        match serde_json::from_str::<Map<String, Value>>(trimmed) {
            Ok(fields) => {
                return Some(ParsedRecord {
                    level: string_field(&fields, LEVEL_FIELD).map(|level| level.to_lowercase()),
                    request_id: string_field(&fields, REQUEST_ID_FIELD).map(str::to_string),
                    record: Value::Object(fields),
                })
            }
            Err(e) => debug!("NORMALIZER | Function output looks like JSON but is not: {e}"),
        }
    }

    let captures = runtime_line_pattern().captures(text)?;
    let timestamp = captures.get(1)?.as_str();
    let request_id = captures.get(2)?.as_str();
    let level = captures.get(3)?.as_str().to_lowercase();
    let body = captures.get(4)?.as_str();

    let mut record = Map::new();
    record.insert(REQUEST_ID_FIELD.to_string(), Value::from(request_id));
    record.insert("message".to_string(), Value::from(body));
    record.insert("timestamp".to_string(), Value::from(timestamp));
    record.insert(LEVEL_FIELD.to_string(), Value::from(level.as_str()));

    Some(ParsedRecord {
        record: Value::Object(record),
        level: Some(level),
        request_id: Some(request_id.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logs::event::EventType;
    use serde_json::json;

    fn normalizer() -> EventNormalizer {
        EventNormalizer::new(FunctionMetadata {
            initialization_type: "on-demand".to_string(),
            region: "eu-central-1".to_string(),
            name: "orders".to_string(),
            memory_size_mb: 256,
            version: "$LATEST".to_string(),
        })
    }

    fn function_event(record: &str) -> RawLogEvent {
        RawLogEvent {
            event_type: EventType::Function,
            time: Some(json!("2024-01-16T08:53:51.920Z")),
            record: Value::from(record),
            extra: Map::new(),
        }
    }

    fn assert_runtime_line(input: &str, level: &str, request_id: &str, body: &str) {
        let event = normalizer().normalize(function_event(input));

        assert_eq!(event.level.as_deref(), Some(level));
        assert_eq!(event.message.as_deref(), Some(input));
        assert_eq!(event.request_id.as_deref(), Some(request_id));
        assert_eq!(
            event.record,
            json!({
                "requestId": request_id,
                "message": body,
                "timestamp": "2024-01-16T08:53:51.919Z",
                "level": level,
            })
        );
    }

    #[test]
    fn test_multiline_error() {
        assert_runtime_line(
            "2024-01-16T08:53:51.919Z\t4b995efa-75f8-4fdc-92af-0882c79f47a1\tERROR\ttesting sending an error\nand this is a new line inside the error \n and a new line \n bye",
            "error",
            "4b995efa-75f8-4fdc-92af-0882c79f47a1",
            "testing sending an error\nand this is a new line inside the error \n and a new line \n bye",
        );
    }

    #[test]
    fn test_info() {
        assert_runtime_line(
            "2024-01-16T08:53:51.919Z\t4b995efa-75f8-4fdc-92af-0882c79f47a2\tINFO\tHello, world!",
            "info",
            "4b995efa-75f8-4fdc-92af-0882c79f47a2",
            "Hello, world!",
        );
    }

    #[test]
    fn test_warn() {
        assert_runtime_line(
            "2024-01-16T08:53:51.919Z\t4b995efa-75f8-4fdc-92af-0882c79f47a3\tWARN\thead my warning",
            "warn",
            "4b995efa-75f8-4fdc-92af-0882c79f47a3",
            "head my warning",
        );
    }

    #[test]
    fn test_trace_with_newline() {
        assert_runtime_line(
            "2024-01-16T08:53:51.919Z\t4b995efa-75f8-4fdc-92af-0882c79f47a4\tTRACE\tthis is a trace \n with information on a new line.",
            "trace",
            "4b995efa-75f8-4fdc-92af-0882c79f47a4",
            "this is a trace \n with information on a new line.",
        );
    }

    #[test]
    fn test_debug() {
        assert_runtime_line(
            "2024-01-16T08:53:51.919Z\t4b995efa-75f8-4fdc-92af-0882c79f47a5\tDEBUG\tDebugging is fun!",
            "debug",
            "4b995efa-75f8-4fdc-92af-0882c79f47a5",
            "Debugging is fun!",
        );
    }

    #[test]
    fn test_trailing_newline_is_kept_in_record_body() {
        let input = "2024-01-16T08:53:51.919Z\t4b995efa-75f8-4fdc-92af-0882c79f47a6\tINFO\tdone\n";
        let event = normalizer().normalize(function_event(input));

        assert_eq!(event.message.as_deref(), Some(input));
        assert_eq!(event.record["message"], json!("done\n"));
    }

    #[test]
    fn test_multiline_body_with_trailing_newline() {
        assert_runtime_line(
            "2024-01-16T08:53:51.919Z\t4b995efa-75f8-4fdc-92af-0882c79f47a7\tINFO\tline one\nline two\n",
            "info",
            "4b995efa-75f8-4fdc-92af-0882c79f47a7",
            "line one\nline two\n",
        );
    }

    #[test]
    fn test_leading_whitespace_is_not_stripped_before_matching() {
        let input = "\n2024-01-16T08:53:51.919Z\t4b995efa-75f8-4fdc-92af-0882c79f47a8\tINFO\tindented";
        let event = normalizer().normalize(function_event(input));

        assert_eq!(event.record, json!(input));
        assert_eq!(event.message.as_deref(), Some(input));
        assert_eq!(event.level, None);
    }

    #[test]
    fn test_json_output() {
        let input = r#"{"timestamp":"2024-01-08T16:48:45.316Z","level":"INFO","requestId":"de126cf0-6124-426c-818a-174983fbfc4b","message":"foo != bar"}"#;
        let event = normalizer().normalize(function_event(input));

        assert_eq!(event.level.as_deref(), Some("info"));
        assert_eq!(event.message.as_deref(), Some(input));
        assert_eq!(
            event.request_id.as_deref(),
            Some("de126cf0-6124-426c-818a-174983fbfc4b")
        );
        assert_eq!(
            event.record,
            json!({
                "timestamp": "2024-01-08T16:48:45.316Z",
                "level": "INFO",
                "requestId": "de126cf0-6124-426c-818a-174983fbfc4b",
                "message": "foo != bar",
            })
        );
    }

    #[test]
    fn test_json_output_with_surrounding_whitespace() {
        let input = "  {\"msg\":\"hi\",\"nested\":{\"a\":1}}\n";
        let event = normalizer().normalize(function_event(input));

        assert_eq!(event.record, json!({"msg": "hi", "nested": {"a": 1}}));
        assert_eq!(event.level, None);
        assert_eq!(event.message.as_deref(), Some(input));
    }

    #[test]
    fn test_malformed_json_is_kept_as_text() {
        let input = "{\"unterminated\": }";
        let event = normalizer().normalize(function_event(input));

        assert_eq!(event.record, json!(input));
        assert_eq!(event.message.as_deref(), Some(input));
        assert_eq!(event.level, None);
    }

    #[test]
    fn test_unrecognized_text_passes_through() {
        let input = "START RequestId: 6d3d1d3b Version: $LATEST\n";
        let event = normalizer().normalize(function_event(input));

        assert_eq!(event.record, json!(input));
        assert_eq!(event.message.as_deref(), Some(input));
        assert_eq!(event.level, None);
        assert_eq!(event.request_id, None);
    }

    #[test]
    fn test_unknown_level_does_not_match() {
        let input = "2024-01-16T08:53:51.919Z\t4b995efa-75f8-4fdc-92af-0882c79f47a1\tFATAL\tboom";
        let event = normalizer().normalize(function_event(input));

        assert_eq!(event.record, json!(input));
        assert_eq!(event.level, None);
    }

    #[test]
    fn test_platform_record_is_kept_and_request_id_lifted() {
        let raw = RawLogEvent {
            event_type: EventType::from("platform.runtimeDone"),
            time: Some(json!("2024-01-16T08:53:52.000Z")),
            record: json!({"requestId": "abc", "status": "success"}),
            extra: Map::new(),
        };
        let event = normalizer().normalize(raw);

        assert_eq!(event.record, json!({"requestId": "abc", "status": "success"}));
        assert_eq!(event.request_id.as_deref(), Some("abc"));
        assert_eq!(event.message, None);
        assert_eq!(event.level, None);
    }

    #[test]
    fn test_extension_text_is_not_parsed() {
        let input = "2024-01-16T08:53:51.919Z\t4b995efa-75f8-4fdc-92af-0882c79f47a1\tINFO\tfrom an extension";
        let raw = RawLogEvent {
            event_type: EventType::from("extension"),
            time: None,
            record: Value::from(input),
            extra: Map::new(),
        };
        let event = normalizer().normalize(raw);

        assert_eq!(event.record, json!(input));
        assert_eq!(event.message.as_deref(), Some(input));
        assert_eq!(event.level, None);
    }

    #[test]
    fn test_serialized_shape() {
        let mut extra = Map::new();
        extra.insert("tenant".to_string(), json!("blue"));
        let raw = RawLogEvent {
            event_type: EventType::Function,
            time: Some(json!("2024-01-16T08:53:51.920Z")),
            record: json!("plain"),
            extra,
        };

        let json = serde_json::to_value(normalizer().normalize(raw)).unwrap();

        assert_eq!(
            json,
            json!({
                "type": "function",
                "_time": "2024-01-16T08:53:51.920Z",
                "record": "plain",
                "message": "plain",
                "tenant": "blue",
                "lambda": {
                    "initializationType": "on-demand",
                    "region": "eu-central-1",
                    "name": "orders",
                    "memorySizeMB": 256,
                    "version": "$LATEST",
                },
                "axiom": {"awsLambdaExtensionVersion": crate::EXTENSION_VERSION},
            })
        );
        assert!(json.get("time").is_none());
    }

    #[test]
    fn test_raw_fields_never_shadow_enrichment() {
        let raw: RawLogEvent = serde_json::from_str(
            r#"{"type":"platform.report","time":"t","record":{"requestId":"abc"},"lambda":"x","axiom":1,"_time":"y","requestId":"other","tenant":"blue"}"#,
        )
        .unwrap();
        let event = normalizer().normalize(raw);
        let serialized = serde_json::to_string(&event).unwrap();

        for key in ["\"lambda\":", "\"axiom\":", "\"_time\":"] {
            assert_eq!(serialized.matches(key).count(), 1, "{key} in {serialized}");
        }
        let json: Value = serde_json::from_str(&serialized).unwrap();
        assert_eq!(json["_time"], json!("t"));
        assert_eq!(json["requestId"], json!("abc"));
        assert_eq!(json["lambda"]["name"], json!("orders"));
        assert_eq!(
            json["axiom"],
            json!({"awsLambdaExtensionVersion": crate::EXTENSION_VERSION})
        );
        assert_eq!(json["tenant"], json!("blue"));
    }

    #[test]
    fn test_raw_fields_without_a_derived_counterpart_are_kept() {
        let raw: RawLogEvent =
            serde_json::from_str(r#"{"type":"platform.report","record":{},"message":"raw","_time":"y"}"#)
                .unwrap();
        let json = serde_json::to_value(normalizer().normalize(raw)).unwrap();

        assert_eq!(json["message"], json!("raw"));
        assert_eq!(json["_time"], json!("y"));
    }

    #[test]
    fn test_batch_preserves_order() {
        let batch = vec![function_event("one"), function_event("two"), function_event("three")];
        let events = normalizer().normalize_batch(batch);
        let messages: Vec<_> = events.iter().filter_map(|e| e.message.as_deref()).collect();
        assert_eq!(messages, vec!["one", "two", "three"]);
    }
}
