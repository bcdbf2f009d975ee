//! Audit Log Entry
//!
//! Defines the immutable, hash-chained record stored in the audit log.

use chrono::{DateTime, SecondsFormat, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::AuditError;

/// Free-form context attached to an entry.
///
/// A `BTreeMap` keeps key order canonical, so two logically identical
/// detail sets always serialize (and hash) the same way.
pub type Details = BTreeMap<String, String>;

/// Audit log entry bound to its predecessor by `prev_hash`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: u64,
    #[serde(rename = "ts")]
    pub timestamp: DateTime<Utc>,
    pub actor: String,
    pub action: String,
    pub case_id: String,
    #[serde(default)]
    pub details: Details,
    pub hash: String,
    pub prev_hash: String,
}

impl LogEntry {
    /// Timestamp in the exact textual form covered by the hash
    pub fn ts_string(&self) -> String {
        format_timestamp(&self.timestamp)
    }

    /// Get a human-readable summary
    pub fn summary(&self) -> String {
        format!(
            "#{} {} on {} by {}",
            self.id, self.action, self.case_id, self.actor
        )
    }
}

/// RFC 3339, UTC, microsecond precision.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Current time truncated to the precision entries are stored with.
///
/// Anything finer would be lost on a text round trip and break the hash.
pub fn now_micros() -> DateTime<Utc> {
    let now = Utc::now();
    let micros = now.nanosecond() / 1_000 * 1_000;
    now.with_nanosecond(micros).unwrap_or(now)
}

/// Convert an open JSON object into typed details.
///
/// Only string values are accepted; anything else is a validation error
/// raised before the log is touched.
pub fn details_from_json(
    map: serde_json::Map<String, serde_json::Value>,
) -> Result<Details, AuditError> {
    map.into_iter()
        .map(|(key, value)| match value {
            serde_json::Value::String(s) => Ok((key, s)),
            other => Err(AuditError::validation(format!(
                "detail '{}' must be a string, got {}",
                key,
                json_kind(&other)
            ))),
        })
        .collect()
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
