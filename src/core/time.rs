//! Shared timestamp/day helpers and the command response envelope.
//!
//! Completion bookkeeping reduces timestamps to the *server-local* calendar
//! day. Per-user timezones are a known limitation, kept as-is.

use chrono::{DateTime, Local, NaiveDate};
use serde_json::Value as JsonValue;
use ulid::Ulid;

/// RFC3339 timestamp in the server's local offset.
pub fn now_rfc3339() -> String {
    Local::now().to_rfc3339()
}

pub fn to_rfc3339(ts: DateTime<Local>) -> String {
    ts.to_rfc3339()
}

/// Calendar day of a timestamp, formatted `YYYY-MM-DD`.
pub fn day_of(ts: DateTime<Local>) -> String {
    ts.date_naive().format("%Y-%m-%d").to_string()
}

pub fn parse_day(day: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
}

pub fn new_event_id() -> String {
    Ulid::new().to_string()
}

/// Standard command response envelope shape used across CLI surfaces.
pub fn command_envelope(cmd: &str, status: &str, extra: JsonValue) -> JsonValue {
    let mut base = serde_json::json!({
        "envelope_version": "1.0.0",
        "ts": now_rfc3339(),
        "event_id": new_event_id(),
        "cmd": cmd,
        "status": status
    });
    if let (Some(base_obj), Some(extra_obj)) = (base.as_object_mut(), extra.as_object()) {
        for (k, v) in extra_obj {
            base_obj.insert(k.clone(), v.clone());
        }
    }
    base
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_day_of_formats_calendar_day() {
        let ts = Local.with_ymd_and_hms(2026, 3, 9, 23, 59, 59).unwrap();
        assert_eq!(day_of(ts), "2026-03-09");
    }

    #[test]
    fn test_parse_day_round_trips() {
        let day = parse_day("2026-03-09").unwrap();
        assert_eq!(day.format("%Y-%m-%d").to_string(), "2026-03-09");
        assert!(parse_day("not-a-day").is_none());
    }

    #[test]
    fn test_new_event_id_is_unique() {
        assert_ne!(new_event_id(), new_event_id());
    }

    #[test]
    fn test_command_envelope_basic() {
        let envelope = command_envelope("test", "ok", serde_json::json!({"count": 2}));
        assert_eq!(envelope["cmd"], "test");
        assert_eq!(envelope["status"], "ok");
        assert_eq!(envelope["count"], 2);
        assert!(envelope["ts"].is_string());
        assert_eq!(envelope["envelope_version"], "1.0.0");
    }
}
