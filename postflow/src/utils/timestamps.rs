//! Timestamp helpers.

use chrono::{DateTime, Utc};

/// Timestamp type used across the crate.
pub type Timestamp = DateTime<Utc>;

/// Returns the current UTC time as an ISO 8601 string with microseconds,
/// e.g. `2026-10-19T08:30:00.123456+00:00`.
#[must_use]
pub fn iso_timestamp() -> String {
    format_iso8601(&Utc::now())
}

/// Formats a timestamp the same way [`iso_timestamp`] does.
#[must_use]
pub fn format_iso8601(dt: &Timestamp) -> String {
    dt.format("%Y-%m-%dT%H:%M:%S%.6f+00:00").to_string()
}

/// Seconds elapsed between two timestamps (negative if `end` precedes `start`).
#[must_use]
pub fn seconds_between(start: &Timestamp, end: &Timestamp) -> f64 {
    (*end - *start).num_milliseconds() as f64 / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_format_iso8601() {
        let dt = Utc.with_ymd_and_hms(2026, 10, 19, 8, 30, 0).unwrap();
        assert_eq!(format_iso8601(&dt), "2026-10-19T08:30:00.000000+00:00");
    }

    #[test]
    fn test_seconds_between() {
        let start = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2026, 1, 1, 0, 1, 30).unwrap();
        assert!((seconds_between(&start, &end) - 90.0).abs() < f64::EPSILON);
    }
}
