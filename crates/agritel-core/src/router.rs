//! Event routing: pick the normaliser for an envelope's declared type.
//!
//! Unknown or missing types are not errors. Newer producers may emit kinds
//! this consumer does not understand yet; those envelopes are logged and
//! dropped.

use crate::{
  Result,
  envelope::{Envelope, EventType},
  normalize::{normalize_iot, normalize_weather},
  write::WriteSet,
};

/// What to do with an envelope.
#[derive(Debug, Clone, PartialEq)]
pub enum Route {
  /// Apply these writes.
  Write(WriteSet),
  /// Nothing to persist.
  Dropped { event_type: Option<String> },
}

/// Dispatch `envelope` to the matching normaliser.
pub fn route(envelope: &Envelope) -> Result<Route> {
  let Some(kind) = envelope.kind() else {
    tracing::info!(
      event_id = %envelope.event_id,
      event_type = envelope.type_label(),
      "unrecognised event type, dropping envelope"
    );
    return Ok(Route::Dropped { event_type: envelope.event_type.clone() });
  };

  let writes = match kind {
    EventType::Weather => normalize_weather(envelope)?,
    EventType::Iot => normalize_iot(envelope)?,
  };
  tracing::debug!(
    event_id = %envelope.event_id,
    event_type = %kind,
    intents = writes.len(),
    "envelope normalised"
  );
  Ok(Route::Write(writes))
}
