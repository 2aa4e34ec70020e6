//! Directory timestamp parsing.
//!
//! Active Directory stores logon and password times as Windows FILETIME
//! integers (100-nanosecond intervals since 1601-01-01) and creation times as
//! LDAP generalized time (`20240101120000.0Z`).

use chrono::{DateTime, NaiveDateTime, Utc};

use crate::operation::AttributeValue;

/// Seconds between 1601-01-01 and 1970-01-01.
const FILETIME_UNIX_OFFSET_SECS: i64 = 11_644_473_600;
const FILETIME_TICKS_PER_SEC: i64 = 10_000_000;

/// Convert a FILETIME value. Zero and `i64::MAX` mean "never" and yield `None`.
pub fn from_filetime(ticks: i64) -> Option<DateTime<Utc>> {
    if ticks <= 0 || ticks == i64::MAX {
        return None;
    }
    let secs = ticks / FILETIME_TICKS_PER_SEC - FILETIME_UNIX_OFFSET_SECS;
    let nanos = (ticks % FILETIME_TICKS_PER_SEC) * 100;
    DateTime::from_timestamp(secs, nanos as u32)
}

/// Convert a timestamp to FILETIME ticks.
pub fn to_filetime(time: DateTime<Utc>) -> i64 {
    (time.timestamp() + FILETIME_UNIX_OFFSET_SECS) * FILETIME_TICKS_PER_SEC
        + i64::from(time.timestamp_subsec_nanos() / 100)
}

/// Parse LDAP generalized time, with or without fractional seconds.
pub fn from_generalized_time(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    ["%Y%m%d%H%M%S%.fZ", "%Y%m%d%H%M%SZ"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// Interpret an attribute value as a point in time.
///
/// Accepts FILETIME integers (native or string-encoded), generalized time,
/// and RFC 3339 strings. Returns `None` for "never" values and anything
/// unparseable.
pub fn parse_directory_time(value: &AttributeValue) -> Option<DateTime<Utc>> {
    match value {
        AttributeValue::Integer(ticks) => from_filetime(*ticks),
        AttributeValue::String(s) => {
            let s = s.trim();
            if !s.is_empty() && s.chars().all(|c| c.is_ascii_digit()) {
                return s.parse().ok().and_then(from_filetime);
            }
            from_generalized_time(s).or_else(|| {
                DateTime::parse_from_rfc3339(s)
                    .ok()
                    .map(|t| t.with_timezone(&Utc))
            })
        }
        AttributeValue::Array(values) => values.iter().find_map(parse_directory_time),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_filetime_conversion() {
        // 2024-01-01T00:00:00Z
        let expected = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(from_filetime(133_485_408_000_000_000), Some(expected));
        assert_eq!(to_filetime(expected), 133_485_408_000_000_000);
    }

    #[test]
    fn test_filetime_never() {
        assert_eq!(from_filetime(0), None);
        assert_eq!(from_filetime(i64::MAX), None);
    }

    #[test]
    fn test_generalized_time() {
        let expected = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        assert_eq!(from_generalized_time("20240101120000.0Z"), Some(expected));
        assert_eq!(from_generalized_time("20240101120000Z"), Some(expected));
        assert_eq!(from_generalized_time("yesterday"), None);
    }

    #[test]
    fn test_parse_directory_time_variants() {
        let expected = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(
            parse_directory_time(&AttributeValue::from("133485408000000000")),
            Some(expected)
        );
        assert_eq!(
            parse_directory_time(&AttributeValue::Integer(133_485_408_000_000_000)),
            Some(expected)
        );
        assert_eq!(
            parse_directory_time(&AttributeValue::from("2024-01-01T00:00:00Z")),
            Some(expected)
        );
        assert_eq!(parse_directory_time(&AttributeValue::from("0")), None);
        assert_eq!(parse_directory_time(&AttributeValue::Null), None);
    }
}
