//! Timestamp localization.
//!
//! Comment timestamps are rendered with a machine-readable UTC `datetime`
//! attribute. Localization reads only that attribute and rewrites the
//! visible text, so running it any number of times gives the same result.

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeZone, Utc};
use std::fmt::Display;

/// Text shown when the source attribute cannot be parsed.
pub const INVALID_DATE: &str = "Invalid Date";

/// Numeric month/day/year, two-digit 12-hour clock.
pub const DISPLAY_FORMAT: &str = "%-m/%-d/%Y, %I:%M %p";

/// Parse a `datetime` attribute value.
///
/// Accepts RFC 3339, a naive `YYYY-MM-DDTHH:MM:SS` (read as UTC) and a bare
/// date (midnight UTC).
pub fn parse_source(source: &str) -> Option<DateTime<Utc>> {
    let source = source.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(source) {
        return Some(parsed.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(source, "%Y-%m-%dT%H:%M:%S") {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(source, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Render `source` in the given time zone.
///
/// # Example
///
/// ```
/// use chrono::FixedOffset;
/// use formgate::client::timestamp::{localize_in, INVALID_DATE};
///
/// let tz = FixedOffset::east_opt(0).unwrap();
/// assert_eq!(localize_in("2024-01-01T00:00:00Z", &tz), "1/1/2024, 12:00 AM");
/// assert_eq!(localize_in("not-a-date", &tz), INVALID_DATE);
/// ```
pub fn localize_in<Tz>(source: &str, tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    match parse_source(source) {
        Some(instant) => instant.with_timezone(tz).format(DISPLAY_FORMAT).to_string(),
        None => INVALID_DATE.to_string(),
    }
}

/// Render `source` in the machine's local time zone.
pub fn localize(source: &str) -> String {
    localize_in(source, &Local)
}
