//! `DateTime` and `Duration` helper namespaces.
//!
//! Values cross the runtime boundary as RFC 3339 strings in UTC, so both
//! runtimes get the same representation without sharing a date type.

use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use indexmap::IndexMap;
use serde_json::{Value, json};

use super::{ContextValue, HostFunction, arg_i64, arg_str};
use crate::host::WorkflowHost;

pub(crate) fn iso(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_iso(text: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(text)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|error| format!("invalid ISO date `{text}`: {error}"))
}

fn from_millis(millis: i64) -> Result<DateTime<Utc>, String> {
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| format!("timestamp {millis} is out of range"))
}

fn duration_value(millis: i64) -> Value {
    json!({
        "milliseconds": millis,
        "seconds": millis as f64 / 1_000.0,
        "minutes": millis as f64 / 60_000.0,
        "hours": millis as f64 / 3_600_000.0,
        "days": millis as f64 / 86_400_000.0,
    })
}

/// The `DateTime` namespace.
pub(crate) fn date_time_namespace(host: &Arc<dyn WorkflowHost>) -> ContextValue {
    let clock = Arc::clone(host);
    let mut members = IndexMap::new();
    members.insert(
        "now".to_owned(),
        ContextValue::Function(HostFunction::new("DateTime.now", move |_| {
            Ok(Value::String(iso(clock.now())))
        })),
    );
    members.insert(
        "fromISO".to_owned(),
        ContextValue::Function(HostFunction::new("DateTime.fromISO", |args| {
            let text = arg_str(args, 0, "DateTime.fromISO")?;
            Ok(Value::String(iso(parse_iso(text)?)))
        })),
    );
    members.insert(
        "fromMillis".to_owned(),
        ContextValue::Function(HostFunction::new("DateTime.fromMillis", |args| {
            let millis = arg_i64(args, 0, "DateTime.fromMillis")?;
            Ok(Value::String(iso(from_millis(millis)?)))
        })),
    );
    members.insert(
        "toMillis".to_owned(),
        ContextValue::Function(HostFunction::new("DateTime.toMillis", |args| {
            let text = arg_str(args, 0, "DateTime.toMillis")?;
            Ok(Value::from(parse_iso(text)?.timestamp_millis()))
        })),
    );
    members.insert(
        "format".to_owned(),
        ContextValue::Function(HostFunction::new("DateTime.format", |args| {
            let text = arg_str(args, 0, "DateTime.format")?;
            let pattern = arg_str(args, 1, "DateTime.format")?;
            let instant = parse_iso(text)?;
            let items: Vec<_> = chrono::format::StrftimeItems::new(pattern).collect();
            if items.contains(&chrono::format::Item::Error) {
                return Err(format!("invalid format pattern `{pattern}`"));
            }
            Ok(Value::String(
                instant.format_with_items(items.into_iter()).to_string(),
            ))
        })),
    );
    ContextValue::Namespace(members)
}

/// The `Duration` namespace.
pub(crate) fn duration_namespace() -> ContextValue {
    let mut members = IndexMap::new();
    members.insert(
        "between".to_owned(),
        ContextValue::Function(HostFunction::new("Duration.between", |args| {
            let start = parse_iso(arg_str(args, 0, "Duration.between")?)?;
            let end = parse_iso(arg_str(args, 1, "Duration.between")?)?;
            Ok(duration_value((end - start).num_milliseconds()))
        })),
    );
    members.insert(
        "fromMillis".to_owned(),
        ContextValue::Function(HostFunction::new("Duration.fromMillis", |args| {
            Ok(duration_value(arg_i64(args, 0, "Duration.fromMillis")?))
        })),
    );
    ContextValue::Namespace(members)
}
