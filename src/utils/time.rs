//! UTC clock helpers. All persisted timestamps are RFC3339, truncated to
//! whole seconds.

use chrono::{DateTime, Duration, SecondsFormat, Utc};

pub fn utc_now() -> DateTime<Utc> {
    Utc::now()
}

/// Format as RFC3339 UTC with second precision (`2026-01-02T03:04:05Z`).
pub fn to_iso(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub fn utc_now_iso() -> String {
    to_iso(utc_now())
}

/// ISO timestamp `seconds` from now.
pub fn future_iso(seconds: i64) -> String {
    to_iso(utc_now() + Duration::seconds(seconds))
}

/// Parse an RFC3339 timestamp; empty or malformed input yields `None`.
pub fn parse_iso(value: &str) -> Option<DateTime<Utc>> {
    let text = value.trim();
    if text.is_empty() {
        return None;
    }
    DateTime::parse_from_rfc3339(text)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iso_round_trip() {
        let now = utc_now();
        let iso = to_iso(now);
        let parsed = parse_iso(&iso).unwrap();
        assert_eq!(to_iso(parsed), iso);
        assert!(iso.ends_with('Z'));
    }

    #[test]
    fn test_parse_iso_rejects_garbage() {
        assert!(parse_iso("").is_none());
        assert!(parse_iso("not-a-time").is_none());
    }

    #[test]
    fn test_future_iso_is_later() {
        let ahead = parse_iso(&future_iso(60)).unwrap();
        assert!(ahead > utc_now());
    }
}
