//! Event types and their text-stream wire encoding.
//!
//! An [`Event`] is a typed notification with a JSON payload and an optional
//! client-facing id. [`Event::to_frame`] produces the exact bytes written to
//! every subscriber; it is pure so the encoding can be tested without a live
//! connection.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EventError {
    #[error("event payload is not JSON-serializable: {0}")]
    Payload(#[from] serde_json::Error),
}

/// The fixed set of notification types producers may emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    #[serde(rename = "ping")]
    Ping,
    #[serde(rename = "listing.found")]
    ListingFound,
    #[serde(rename = "job.complete")]
    JobComplete,
    #[serde(rename = "job.failed")]
    JobFailed,
    #[serde(rename = "opportunity.created")]
    OpportunityCreated,
    #[serde(rename = "opportunity.updated")]
    OpportunityUpdated,
    #[serde(rename = "alert.high-value")]
    AlertHighValue,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Ping => "ping",
            EventKind::ListingFound => "listing.found",
            EventKind::JobComplete => "job.complete",
            EventKind::JobFailed => "job.failed",
            EventKind::OpportunityCreated => "opportunity.created",
            EventKind::OpportunityUpdated => "opportunity.updated",
            EventKind::AlertHighValue => "alert.high-value",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One notification, existing only between `emit` and delivery.
#[derive(Debug, Clone)]
pub struct Event {
    pub kind: EventKind,
    pub data: serde_json::Value,
    /// Optional id clients may use for de-duplication. Best-effort only,
    /// never persisted.
    pub id: Option<String>,
}

impl Event {
    /// Build an event from any serializable payload.
    ///
    /// Fails if the payload cannot be represented as JSON, which is a
    /// producer bug surfaced at the call site rather than swallowed.
    pub fn new<T: Serialize>(kind: EventKind, data: &T) -> Result<Self, EventError> {
        Ok(Self {
            kind,
            data: serde_json::to_value(data)?,
            id: None,
        })
    }

    /// Build an event from an already-constructed JSON value.
    pub fn from_value(kind: EventKind, data: serde_json::Value) -> Self {
        Self {
            kind,
            data,
            id: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Keepalive event carrying the current unix timestamp in milliseconds.
    pub fn ping() -> Self {
        Self::from_value(EventKind::Ping, serde_json::json!({ "ts": unix_millis() }))
    }

    /// Encode this event as one wire message:
    ///
    /// ```text
    /// event: <type>
    /// id: <id>            (only if an id was set)
    /// data: <single-line JSON>
    ///
    /// ```
    ///
    /// The JSON encoding escapes any embedded newlines, so the payload can
    /// never break the line-oriented framing.
    pub fn to_frame(&self) -> Bytes {
        let data = self.data.to_string();
        let mut out = String::with_capacity(data.len() + 32);
        out.push_str("event: ");
        out.push_str(self.kind.as_str());
        out.push('\n');
        if let Some(id) = &self.id {
            out.push_str("id: ");
            out.push_str(id);
            out.push('\n');
        }
        out.push_str("data: ");
        out.push_str(&data);
        out.push_str("\n\n");
        Bytes::from(out)
    }
}

pub(crate) fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// Minimal SSE-grammar parser used to verify the encoding round-trips.
    fn parse_frame(frame: &str) -> (String, Option<String>, serde_json::Value) {
        assert!(frame.ends_with("\n\n"), "frame must be blank-line terminated");
        let mut kind = String::new();
        let mut id = None;
        let mut data = serde_json::Value::Null;
        for line in frame.trim_end().lines() {
            if let Some(rest) = line.strip_prefix("event: ") {
                kind = rest.to_string();
            } else if let Some(rest) = line.strip_prefix("id: ") {
                id = Some(rest.to_string());
            } else if let Some(rest) = line.strip_prefix("data: ") {
                data = serde_json::from_str(rest).unwrap();
            } else {
                panic!("unexpected line: {line:?}");
            }
        }
        (kind, id, data)
    }

    #[test]
    fn ping_frame_is_byte_exact() {
        let event = Event::from_value(EventKind::Ping, json!({ "ts": 1 }));
        assert_eq!(
            &event.to_frame()[..],
            &b"event: ping\ndata: {\"ts\":1}\n\n"[..],
        );
    }

    #[test]
    fn id_line_appears_between_event_and_data() {
        let event = Event::from_value(EventKind::ListingFound, json!({ "id": "x" })).with_id("42");
        assert_eq!(
            &event.to_frame()[..],
            &b"event: listing.found\nid: 42\ndata: {\"id\":\"x\"}\n\n"[..],
        );
    }

    #[test]
    fn payload_newlines_are_escaped_not_raw() {
        let event = Event::from_value(EventKind::JobFailed, json!({ "error": "line one\nline two" }));
        let frame = event.to_frame();
        let text = std::str::from_utf8(&frame).unwrap();
        // Exactly the framing newlines: one per header line plus the terminator.
        assert_eq!(text.matches('\n').count(), 3);
        assert!(text.contains(r"line one\nline two"));
    }

    #[test]
    fn frame_round_trips_through_sse_grammar() {
        let event = Event::from_value(EventKind::Ping, json!({ "ts": 1 }));
        let frame = event.to_frame();
        let (kind, id, data) = parse_frame(std::str::from_utf8(&frame).unwrap());
        assert_eq!(kind, "ping");
        assert_eq!(id, None);
        assert_eq!(data, json!({ "ts": 1 }));

        let event = Event::from_value(EventKind::AlertHighValue, json!({ "score": 0.5 })).with_id("abc");
        let (kind, id, data) = parse_frame(std::str::from_utf8(&event.to_frame()).unwrap());
        assert_eq!(kind, "alert.high-value");
        assert_eq!(id.as_deref(), Some("abc"));
        assert_eq!(data, json!({ "score": 0.5 }));
    }

    #[test]
    fn kind_names_match_serde_encoding() {
        for kind in [
            EventKind::Ping,
            EventKind::ListingFound,
            EventKind::JobComplete,
            EventKind::JobFailed,
            EventKind::OpportunityCreated,
            EventKind::OpportunityUpdated,
            EventKind::AlertHighValue,
        ] {
            let encoded = serde_json::to_string(&kind).unwrap();
            assert_eq!(encoded, format!("\"{}\"", kind.as_str()));
        }
    }

    #[test]
    fn ping_constructor_carries_timestamp() {
        let event = Event::ping();
        assert_eq!(event.kind, EventKind::Ping);
        assert!(event.data["ts"].as_u64().unwrap() > 0);
    }

    #[test]
    fn unserializable_payload_is_rejected() {
        use std::collections::HashMap;
        // Non-string map keys cannot be represented in JSON.
        let bad: HashMap<(u32, u32), u32> = HashMap::from([((1, 2), 3)]);
        let result = Event::new(EventKind::JobComplete, &bad);
        assert!(matches!(result, Err(EventError::Payload(_))));
    }
}
