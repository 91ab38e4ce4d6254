//! JSON transport encoding for events.
//!
//! Timestamps are written as ISO-8601 strings normalized to UTC with an
//! explicit `+00:00` offset. When reading, offset-less timestamps are taken
//! to already be in UTC.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};

use crate::foundation::event::Event;

const NAIVE_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Formats a timestamp as a UTC ISO-8601 string.
pub fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, false)
}

/// Parses an ISO-8601 timestamp, converting it to UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(raw) {
        return Some(timestamp.with_timezone(&Utc));
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .map(|naive| naive.and_utc())
}

/// Encodes an event to its JSON transport form.
pub fn encode_event(event: &Event) -> Result<String, serde_json::Error> {
    serde_json::to_string(event)
}

/// Decodes an event from its JSON transport form.
pub fn decode_event(payload: &str) -> Result<Event, serde_json::Error> {
    serde_json::from_str(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, TimeZone};
    use serde_json::json;

    #[test]
    fn test_offset_timestamps_are_normalized_to_utc() {
        let parsed = parse_timestamp("2020-01-01T14:12:12+02:00").unwrap();
        assert_eq!(format_timestamp(&parsed), "2020-01-01T12:12:12+00:00");
    }

    #[test]
    fn test_naive_timestamps_are_taken_as_utc() {
        let parsed = parse_timestamp("2020-01-01T12:12:12.000000").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2020, 1, 1, 12, 12, 12).unwrap());
    }

    #[test]
    fn test_subsecond_precision_is_kept() {
        let offset = FixedOffset::east_opt(0).unwrap();
        let timestamp = offset
            .with_ymd_and_hms(2020, 1, 1, 12, 12, 12)
            .unwrap()
            .with_timezone(&Utc)
            + chrono::Duration::microseconds(1500);
        assert_eq!(format_timestamp(&timestamp), "2020-01-01T12:12:12.001500+00:00");
    }

    #[test]
    fn test_decode_restores_typed_timestamp() {
        let payload = json!({
            "name": "video.stop",
            "timestamp": "2020-01-01T12:12:12+00:00",
            "data": {"position": 42},
        })
        .to_string();

        let event = decode_event(&payload).unwrap();
        assert_eq!(event.name(), "video.stop");
        assert!(event.timestamp().is_some());
        assert_eq!(encode_event(&event).unwrap().len(), payload.len());
    }

    #[test]
    fn test_decode_rejects_non_objects() {
        assert!(decode_event("[1, 2]").is_err());
    }
}
