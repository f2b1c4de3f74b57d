//! Timestamp helpers. Both tables keep timestamps as text, so every reader goes through
//! `parse_timestamp`.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};

const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

const OFFSET_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f%:z", "%Y-%m-%d %H:%M:%S%.f%#z"];

/// Canonical text form written by this crate: RFC 3339 with a `Z` suffix.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Parses the timestamp shapes found in the tables. Values without an offset are UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }

    for format in OFFSET_FORMATS {
        if let Ok(ts) = DateTime::parse_from_str(raw, format) {
            return Some(ts.with_timezone(&Utc));
        }
    }

    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[test]
    fn parses_rfc3339_with_offset() {
        assert_eq!(
            parse_timestamp("2024-03-01T10:00:00+07:00"),
            Some(utc(2024, 3, 1, 3, 0, 0))
        );
    }

    #[test]
    fn parses_database_style_timestamps() {
        assert_eq!(parse_timestamp("2024-03-01 10:00:00"), Some(utc(2024, 3, 1, 10, 0, 0)));
        assert_eq!(
            parse_timestamp("2024-03-01 10:00:00.250"),
            Some(utc(2024, 3, 1, 10, 0, 0) + chrono::Duration::milliseconds(250))
        );
        assert_eq!(
            parse_timestamp("2024-03-01 10:00:00+00:00"),
            Some(utc(2024, 3, 1, 10, 0, 0))
        );
        assert_eq!(parse_timestamp("2024-03-01"), Some(utc(2024, 3, 1, 0, 0, 0)));
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(parse_timestamp(""), None);
        assert_eq!(parse_timestamp("yesterday"), None);
    }

    #[test]
    fn format_round_trips() {
        let ts = utc(2025, 1, 2, 3, 4, 5);
        assert_eq!(format_timestamp(ts), "2025-01-02T03:04:05Z");
        assert_eq!(parse_timestamp(&format_timestamp(ts)), Some(ts));
    }
}
