use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;

/// Epoch values at or above this magnitude are milliseconds. As seconds it
/// would land past the year 5000.
const MILLIS_THRESHOLD: i64 = 100_000_000_000;

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Normalize any supported timestamp encoding to UTC.
///
/// Accepts RFC 3339 / ISO-8601 strings (naive ones are taken as UTC), epoch
/// seconds and epoch milliseconds, as JSON numbers or numeric strings.
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => match n.as_i64() {
            Some(i) => from_epoch(i),
            None => n.as_f64().and_then(from_epoch_f64),
        },
        Value::String(s) => parse_timestamp_str(s),
        _ => None,
    }
}

pub fn parse_timestamp_str(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(i) = s.parse::<i64>() {
        return from_epoch(i);
    }
    if let Ok(f) = s.parse::<f64>() {
        return from_epoch_f64(f);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    // Offsets without a colon, e.g. 2019-01-05T10:00:00+0000
    if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f%z") {
        return Some(dt.with_timezone(&Utc));
    }
    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn from_epoch(n: i64) -> Option<DateTime<Utc>> {
    if n.checked_abs().map_or(true, |abs| abs >= MILLIS_THRESHOLD) {
        DateTime::from_timestamp_millis(n)
    } else {
        DateTime::from_timestamp(n, 0)
    }
}

fn from_epoch_f64(f: f64) -> Option<DateTime<Utc>> {
    if !f.is_finite() {
        return None;
    }
    if f.abs() >= MILLIS_THRESHOLD as f64 {
        DateTime::from_timestamp_millis(f.round() as i64)
    } else {
        let mut secs = f.floor() as i64;
        let mut nanos = ((f - f.floor()) * 1e9).round() as u32;
        if nanos >= 1_000_000_000 {
            secs += 1;
            nanos = 0;
        }
        DateTime::from_timestamp(secs, nanos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_three_encodings_of_one_instant() {
        let expected = Utc.with_ymd_and_hms(2024, 1, 5, 10, 0, 0).unwrap();
        assert_eq!(parse_timestamp(&json!("2024-01-05T10:00:00Z")), Some(expected));
        assert_eq!(parse_timestamp(&json!(1704448800)), Some(expected));
        assert_eq!(parse_timestamp(&json!(1704448800000i64)), Some(expected));
    }

    #[test]
    fn test_offsets_and_naive_strings() {
        let expected = Utc.with_ymd_and_hms(2024, 1, 5, 10, 0, 0).unwrap();
        assert_eq!(parse_timestamp(&json!("2024-01-05T12:00:00+02:00")), Some(expected));
        assert_eq!(parse_timestamp(&json!("2024-01-05T10:00:00+0000")), Some(expected));
        assert_eq!(parse_timestamp(&json!("2024-01-05T10:00:00")), Some(expected));
        assert_eq!(parse_timestamp(&json!("2024-01-05 10:00:00")), Some(expected));
        assert_eq!(parse_timestamp(&json!("1704448800")), Some(expected));
    }

    #[test]
    fn test_fractional_seconds() {
        let ts = parse_timestamp(&json!(1704448800.5)).unwrap();
        assert_eq!(ts.timestamp_millis(), 1_704_448_800_500);
    }

    #[test]
    fn test_negative_fractional_seconds() {
        let ts = parse_timestamp(&json!(-1.5)).unwrap();
        assert_eq!(ts.timestamp_millis(), -1_500);
        let ts = parse_timestamp(&json!(-0.25)).unwrap();
        assert_eq!(ts.timestamp_millis(), -250);
    }

    #[test]
    fn test_unparseable() {
        assert_eq!(parse_timestamp(&json!("last tuesday")), None);
        assert_eq!(parse_timestamp(&json!(true)), None);
        assert_eq!(parse_timestamp(&json!("")), None);
    }
}
