//! Shared utility functions used across multiple modules.

use chrono::{DateTime, NaiveDate, Utc};

/// Prefix marking client-generated temporary identifiers.
pub const TEMP_ID_PREFIX: &str = "tmp_";

/// Normalize optional text by trimming whitespace and removing empties.
///
/// Returns `None` when the input is `None` or the trimmed value is empty.
pub fn normalize_text_option(value: Option<String>) -> Option<String> {
    let value = value?;
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Truncate text to at most 500 characters for persisted error messages.
pub fn compact_text(value: &str) -> String {
    value.trim().chars().take(500).collect()
}

/// Whether an identifier was generated on a device before the server saw it.
pub fn is_temp_id(value: &str) -> bool {
    value.len() > TEMP_ID_PREFIX.len() && value.starts_with(TEMP_ID_PREFIX)
}

/// Convert a stored Unix-millisecond column back into a UTC timestamp.
pub fn millis_to_datetime(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or_default()
}

/// Format a date the way it is stored.
pub fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}
