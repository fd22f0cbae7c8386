//! The event envelope, one per transport message.
//!
//! An envelope carries a deterministic identity, a declared event type, the
//! semantic observation time, the wall-clock processing time, and the raw
//! type-specific payload. Typed access to the payload happens in
//! [`crate::payload`] once the router has picked a normaliser.

use std::fmt;

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
  Error, Result,
  identity::{self, Origin},
};

/// Payload fields consulted, in order, for the observation time.
pub const EVENT_TIME_FIELDS: [&str; 3] = ["measurement_time", "event_time", "dt"];

// ─── Event type ──────────────────────────────────────────────────────────────

/// The event kinds this consumer understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
  Weather,
  Iot,
}

impl EventType {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Weather => "weather",
      Self::Iot => "iot",
    }
  }

  /// Parse a declared type. Unknown names yield `None`, not an error.
  pub fn parse(s: &str) -> Option<Self> {
    match s {
      "weather" => Some(Self::Weather),
      "iot" => Some(Self::Iot),
      _ => None,
    }
  }
}

impl fmt::Display for EventType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

// ─── Envelope ────────────────────────────────────────────────────────────────

/// The canonical event record exchanged over the transport.
///
/// `event_type` is kept as the raw declared string so that envelopes from
/// newer producers still deserialise; see [`Envelope::kind`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
  pub event_id:    String,
  #[serde(default)]
  pub event_type:  Option<String>,
  pub event_time:  DateTime<Utc>,
  pub ingested_at: DateTime<Utc>,
  pub payload:     Value,
}

impl Envelope {
  /// Build an envelope for a raw payload observed at `origin`.
  ///
  /// The event time comes from the payload when it carries one; the current
  /// time is used only for payloads with no observation timestamp at all.
  pub fn build(origin: &Origin, event_type: EventType, payload: Value) -> Result<Self> {
    let event_id = identity::event_id(origin, &payload)?;
    let now = Utc::now();
    let event_time = match extract_event_time(&payload)? {
      Some(t) => t,
      None => {
        tracing::debug!(%event_id, %event_type, "payload has no observation time, using now");
        now
      }
    };

    Ok(Self {
      event_id,
      event_type: Some(event_type.as_str().to_owned()),
      event_time,
      ingested_at: now,
      payload,
    })
  }

  /// The declared type, if it is one this consumer understands.
  pub fn kind(&self) -> Option<EventType> {
    self.event_type.as_deref().and_then(EventType::parse)
  }

  /// Display label for logs; `"<missing>"` when no type was declared.
  pub fn type_label(&self) -> &str { self.event_type.as_deref().unwrap_or("<missing>") }

  /// Boundary checks for envelopes received from the transport.
  pub fn validate(&self) -> Result<()> {
    if !identity::is_event_id(&self.event_id) {
      return Err(Error::validation(format!(
        "event_id must be {} lowercase hex characters",
        identity::EVENT_ID_LEN
      )));
    }
    if !self.payload.is_object() {
      return Err(Error::validation("payload must be a JSON object"));
    }
    Ok(())
  }
}

// ─── Event time ──────────────────────────────────────────────────────────────

/// Find the observation time inside a payload.
///
/// Returns `Ok(None)` only when none of [`EVENT_TIME_FIELDS`] is present (or
/// all are null). A present but unparseable value is an error.
pub fn extract_event_time(payload: &Value) -> Result<Option<DateTime<Utc>>> {
  for field in EVENT_TIME_FIELDS {
    match payload.get(field) {
      None | Some(Value::Null) => continue,
      Some(value) => return parse_timestamp(field, value).map(Some),
    }
  }
  Ok(None)
}

fn parse_timestamp(field: &'static str, value: &Value) -> Result<DateTime<Utc>> {
  let bad = || Error::Timestamp { field, value: value.to_string() };

  match value {
    Value::Number(n) => {
      let secs = n
        .as_i64()
        .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
        .ok_or_else(bad)?;
      Utc.timestamp_opt(secs, 0).single().ok_or_else(bad)
    }
    Value::String(s) => {
      let s = s.trim();
      if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
      }
      if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Ok(naive.and_utc());
      }
      if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
        return Ok(naive.and_utc());
      }
      if let Ok(secs) = s.parse::<i64>() {
        return Utc.timestamp_opt(secs, 0).single().ok_or_else(bad);
      }
      Err(bad())
    }
    _ => Err(bad()),
  }
}
