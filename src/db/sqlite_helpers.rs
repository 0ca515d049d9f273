//! SQLite type-conversion helpers
//!
//! SQLite has no native booleans, datetimes or string lists. Booleans are
//! stored as 0/1 integers, timestamps as ISO-8601 text and keyword/id lists
//! as JSON text.

use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};

/// Convert bool to SQLite integer (0 or 1)
#[inline]
pub fn bool_to_int(b: bool) -> i32 {
    if b { 1 } else { 0 }
}

/// Convert SQLite integer to bool
#[inline]
pub fn int_to_bool(i: i32) -> bool {
    i != 0
}

/// Current UTC timestamp as ISO-8601 text
#[inline]
pub fn now_iso8601() -> String {
    Utc::now().to_rfc3339()
}

/// Parse an ISO-8601 string to DateTime, accepting SQLite's own
/// `datetime()` output as a fallback.
pub fn str_to_datetime(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
                .map(|ndt| ndt.and_utc())
                .map_err(|e| anyhow!("Invalid datetime '{}': {}", s, e))
        })
}

/// Parse an optional datetime string
pub fn str_to_datetime_opt(s: Option<&str>) -> Result<Option<DateTime<Utc>>> {
    match s {
        Some(s) if !s.is_empty() => Ok(Some(str_to_datetime(s)?)),
        _ => Ok(None),
    }
}

/// Serialize a string list to JSON text for storage
#[inline]
pub fn list_to_json(v: &[String]) -> String {
    serde_json::to_string(v).unwrap_or_else(|_| "[]".to_string())
}

/// Deserialize JSON text back into a string list (invalid or absent ⇒ empty)
#[inline]
pub fn json_to_list(s: Option<&str>) -> Vec<String> {
    match s {
        Some(s) => serde_json::from_str(s).unwrap_or_default(),
        None => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;

    #[test]
    fn datetime_roundtrip() {
        let dt = Utc::now();
        let parsed = str_to_datetime(&dt.to_rfc3339()).unwrap();
        assert_eq!(dt.timestamp(), parsed.timestamp());
    }

    #[test]
    fn sqlite_datetime_format() {
        let parsed = str_to_datetime("2025-11-03 08:30:00").unwrap();
        assert_eq!(parsed.year(), 2025);
        assert_eq!(parsed.month(), 11);
    }

    #[test]
    fn list_roundtrip() {
        let v = vec!["a1b2".to_string(), "c3d4".to_string()];
        assert_eq!(json_to_list(Some(&list_to_json(&v))), v);
        assert!(json_to_list(None).is_empty());
        assert!(json_to_list(Some("not json")).is_empty());
    }

    #[test]
    fn bool_conversion() {
        assert_eq!(bool_to_int(true), 1);
        assert!(int_to_bool(1));
        assert!(!int_to_bool(0));
    }
}
