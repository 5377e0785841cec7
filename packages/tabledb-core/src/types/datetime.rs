use chrono::{DateTime, NaiveDate, NaiveDateTime};

use super::value::unquote;

const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Parses `'YYYY-MM-DD HH:MM:SS'` (quotes optional, date-only accepted) into
/// seconds since the Unix epoch. Times are taken as UTC.
pub fn parse_datetime(value: &str) -> Option<i64> {
    let text = unquote(value.trim());
    if let Ok(parsed) = NaiveDateTime::parse_from_str(text, DATETIME_FORMAT) {
        return Some(parsed.and_utc().timestamp());
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc().timestamp())
}

/// Renders a timestamp as a quoted `'YYYY-MM-DD HH:MM:SS'` string.
pub fn format_datetime(timestamp: i64) -> Option<String> {
    DateTime::from_timestamp(timestamp, 0)
        .map(|dt| format!("'{}'", dt.naive_utc().format(DATETIME_FORMAT)))
}
