//! UTC timestamp parsing and formatting.
//!
//! Request parameters and user-facing messages use minute precision
//! (`2024-01-20T00:00Z`). Full RFC 3339 values are accepted on input as well.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};

use crate::error::RegistryError;

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%MZ";

pub fn parse_utc(value: &str) -> Result<DateTime<Utc>, RegistryError> {
    let trimmed = value.trim();
    if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, TIMESTAMP_FORMAT) {
        return Ok(Utc.from_utc_datetime(&naive));
    }
    DateTime::parse_from_rfc3339(trimmed)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|_| RegistryError::BadTimestamp(value.to_string()))
}

pub fn format_utc(instant: &DateTime<Utc>) -> String {
    instant.format(TIMESTAMP_FORMAT).to_string()
}
