//! Time and timestamp utilities
//!
//! Event timestamps travel as integer microseconds since the Unix epoch and
//! are rendered as RFC 3339 strings with microsecond precision.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};

/// Naive layouts accepted when a caller omits the UTC offset
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
];

/// Current time in microseconds since the Unix epoch
pub fn now_micros() -> i64 {
    Utc::now().timestamp_micros()
}

/// Convert epoch microseconds to a UTC datetime
pub fn micros_to_datetime(micros: i64) -> Option<DateTime<Utc>> {
    let secs = micros.div_euclid(1_000_000);
    let nanos = (micros.rem_euclid(1_000_000) * 1_000) as u32;
    DateTime::from_timestamp(secs, nanos)
}

/// Render epoch microseconds as RFC 3339 (`2024-03-01T09:30:00.000125Z`)
pub fn format_micros(micros: i64) -> String {
    match micros_to_datetime(micros) {
        Some(dt) => dt.to_rfc3339_opts(SecondsFormat::Micros, true),
        None => micros.to_string(),
    }
}

/// Parse an RFC 3339 string, or a naive datetime interpreted as UTC
pub fn parse_datetime_micros(text: &str) -> Option<i64> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc).timestamp_micros());
    }
    NAIVE_FORMATS.iter().find_map(|fmt| {
        NaiveDateTime::parse_from_str(text, fmt)
            .ok()
            .map(|naive| naive.and_utc().timestamp_micros())
    })
}

/// Milliseconds elapsed since `started`, with sub-millisecond precision
pub fn elapsed_ms(started: std::time::Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_and_parse_roundtrip_keeps_micros() {
        let micros = 1_709_285_400_000_125;
        let text = format_micros(micros);
        assert_eq!(text, "2024-03-01T09:30:00.000125Z");
        assert_eq!(parse_datetime_micros(&text), Some(micros));
    }

    #[test]
    fn test_parse_naive_as_utc() {
        let with_zone = parse_datetime_micros("2024-03-01T09:30:00Z").unwrap();
        assert_eq!(parse_datetime_micros("2024-03-01 09:30:00"), Some(with_zone));
        assert_eq!(parse_datetime_micros("2024-03-01T09:30:00.0"), Some(with_zone));
    }

    #[test]
    fn test_parse_offset_is_normalized() {
        let utc = parse_datetime_micros("2024-03-01T09:30:00Z").unwrap();
        let offset = parse_datetime_micros("2024-03-01T11:30:00+02:00").unwrap();
        assert_eq!(utc, offset);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_eq!(parse_datetime_micros("yesterday"), None);
        assert_eq!(parse_datetime_micros(""), None);
    }

    #[test]
    fn test_negative_micros_format() {
        assert_eq!(format_micros(-1), "1969-12-31T23:59:59.999999Z");
    }
}
