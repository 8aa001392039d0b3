use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer};

/// Convert a millisecond epoch value to UTC, rejecting out-of-range input.
pub fn from_millis(ms: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms).single()
}

/// Parse a timestamp that is either an ISO-8601 string or a
/// milliseconds-since-epoch number. Both appear in the wild.
pub fn parse_flexible(value: &serde_json::Value) -> Option<DateTime<Utc>> {
    match value {
        serde_json::Value::String(s) => parse_iso(s),
        serde_json::Value::Number(n) => {
            if let Some(ms) = n.as_i64() {
                from_millis(ms)
            } else {
                n.as_f64().and_then(|f| from_millis(f as i64))
            }
        }
        _ => None,
    }
}

/// Parse an ISO-8601 / RFC 3339 timestamp string.
pub fn parse_iso(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            // Space-separated variant without timezone, treated as UTC
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
                .ok()
                .map(|naive| Utc.from_utc_datetime(&naive))
        })
}

/// Serde helper: deserialise `Option<DateTime<Utc>>` from either an
/// ISO-8601 string or an epoch-milliseconds number.
pub fn deserialize_flexible_opt<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(parse_flexible))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_iso_string() {
        let ts = parse_flexible(&serde_json::json!("2025-03-01T12:30:00Z")).unwrap();
        assert_eq!(ts.timestamp(), 1740832200);
    }

    #[test]
    fn parses_epoch_millis() {
        let ts = parse_flexible(&serde_json::json!(1740832200000i64)).unwrap();
        assert_eq!(ts.timestamp(), 1740832200);
    }

    #[test]
    fn parses_iso_with_offset() {
        let ts = parse_flexible(&serde_json::json!("2025-03-01T13:30:00+01:00")).unwrap();
        assert_eq!(ts.timestamp(), 1740832200);
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_flexible(&serde_json::json!("not a date")).is_none());
        assert!(parse_flexible(&serde_json::json!(true)).is_none());
    }
}
