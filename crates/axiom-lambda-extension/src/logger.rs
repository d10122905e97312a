// Copyright 2025-Present Axiom, Inc. https://axiom.co/
// SPDX-License-Identifier: Apache-2.0

//! Formatter for the extension's own log lines.
//!
//! The extension writes to the same stdout stream the function's logs end up
//! in, so every line is prefixed to make it easy to filter:
//!
//! ```text
//! AXIOM_EXTENSION | LEVEL | [span_name{span_fields}:] message {event_fields}
//! ```

use std::fmt;
use tracing_core::{Event, Subscriber};
use tracing_subscriber::fmt::{
    format::{self, FormatEvent, FormatFields},
    FmtContext, FormattedFields,
};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::EnvFilter;

const LOG_PREFIX: &str = "AXIOM_EXTENSION";

#[derive(Debug, Clone, Copy)]
pub struct Formatter;

impl<S, N> FormatEvent<S, N> for Formatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: format::Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let metadata = event.metadata();
        write!(&mut writer, "{LOG_PREFIX} | {} | ", metadata.level())?;

        if let Some(scope) = ctx.event_scope() {
            for span in scope.from_root() {
                write!(writer, "{}", span.name())?;

                let ext = span.extensions();
                if let Some(fields) = ext.get::<FormattedFields<N>>() {
                    if !fields.is_empty() {
                        write!(writer, "{{{fields}}}")?;
                    }
                }
                write!(writer, ": ")?;
            }
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;

        writeln!(writer)
    }
}

/// Filter directive for the given level. HTTP stack internals are silenced.
#[must_use]
pub fn env_filter_directive(log_level: &str) -> String {
    format!("h2=off,hyper=off,hyper_util=off,reqwest=off,rustls=off,{log_level}")
}

/// Installs the global subscriber. Returns an error message if the level
/// cannot be parsed or a subscriber is already installed.
pub fn init(log_level: &str) -> Result<(), String> {
    let filter = EnvFilter::try_new(env_filter_directive(log_level))
        .map_err(|e| format!("could not parse log level in configuration: {e}"))?;

    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(filter)
        .event_format(Formatter)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| format!("setting default subscriber failed: {e}"))
}
