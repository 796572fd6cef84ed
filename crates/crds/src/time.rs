//! Timestamp helpers
//!
//! Bridges Kubernetes metadata timestamps to `chrono` and defines the
//! whole-second RFC3339 form the controller persists in status fields.

use chrono::{DateTime, SecondsFormat, Timelike, Utc};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;

/// Convert a metadata timestamp to `chrono`.
///
/// Goes through the RFC3339 wire form so it does not depend on which date
/// library `k8s-openapi` wraps.
pub fn to_chrono(time: &Time) -> Option<DateTime<Utc>> {
    let value = serde_json::to_value(time).ok()?;
    value.as_str().and_then(parse_rfc3339)
}

/// Convert a `chrono` timestamp to a metadata timestamp
pub fn from_chrono(time: DateTime<Utc>) -> Option<Time> {
    serde_json::from_value(serde_json::Value::String(format_rfc3339(time))).ok()
}

/// Drop sub-second precision
pub fn truncate_to_seconds(time: DateTime<Utc>) -> DateTime<Utc> {
    time.with_nanosecond(0).unwrap_or(time)
}

/// Format as RFC3339 UTC with whole seconds (`2024-06-01T12:00:00Z`)
pub fn format_rfc3339(time: DateTime<Utc>) -> String {
    truncate_to_seconds(time).to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Parse an RFC3339 timestamp into UTC
pub fn parse_rfc3339(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}
