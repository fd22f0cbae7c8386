//! IoT normaliser: one `iot_reading` plus per-actuator state events.
//!
//! Actuator state comes from an on/off flag pair:
//!
//! | on | off | result |
//! |----|-----|--------|
//! | 1  | any | on     |
//! | ≠1 | 1   | off    |
//! | ≠1 | ≠1  | skip   |
//!
//! Flags are never coerced by truthiness: `on = 0, off = 0` means "no
//! information this cycle", not "off".

use crate::{
  Result,
  envelope::{Envelope, EventType},
  payload::{ActuatorFlags, IotPayload},
  write::{ActuatorEventRow, ActuatorRow, Dimension, FactRow, IotReadingRow, WriteSet},
};

/// Value of the `source` column on actuator events produced here.
pub const ACTUATOR_EVENT_SOURCE: &str = "iot";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActuatorState {
  On,
  Off,
  /// Both flags absent or neither equal to 1; no event is emitted.
  Unknown,
}

impl ActuatorState {
  pub fn as_bool(self) -> Option<bool> {
    match self {
      Self::On => Some(true),
      Self::Off => Some(false),
      Self::Unknown => None,
    }
  }
}

fn is_set(flag: Option<f64>) -> bool { flag == Some(1.0) }

/// Derive an actuator's state from its flag pair. `on` wins when both are set.
pub fn derive_actuator_state(on: Option<f64>, off: Option<f64>) -> ActuatorState {
  if is_set(on) {
    ActuatorState::On
  } else if is_set(off) {
    ActuatorState::Off
  } else {
    ActuatorState::Unknown
  }
}

/// Build the write set for an IoT envelope.
pub fn normalize_iot(envelope: &Envelope) -> Result<WriteSet> {
  let payload = IotPayload::from_value(&envelope.payload)?;
  let mut writes = WriteSet::new(&envelope.event_id, EventType::Iot);

  writes.insert(FactRow::IotReading(IotReadingRow {
    event_time:  envelope.event_time,
    location:    None,
    temperature: payload.temperature,
    humidity:    payload.humidity,
    water_level: payload.water_level,
    nitrogen:    payload.nitrogen,
    phosphorus:  payload.phosphorus,
    potassium:   payload.potassium,
  }));

  for flags in payload.actuators() {
    push_actuator(&mut writes, envelope, flags);
  }

  Ok(writes)
}

fn push_actuator(writes: &mut WriteSet, envelope: &Envelope, flags: ActuatorFlags) {
  if flags.on.is_none() && flags.off.is_none() {
    return;
  }
  let Some(state) = derive_actuator_state(flags.on, flags.off).as_bool() else {
    tracing::debug!(
      event_id = %envelope.event_id,
      actuator = flags.name,
      on = ?flags.on,
      off = ?flags.off,
      "ambiguous actuator flags, no state recorded"
    );
    return;
  };

  let actuator = writes.upsert(Dimension::Actuator(ActuatorRow {
    actuator_name: flags.name.to_owned(),
    actuator_type: flags.kind.to_owned(),
  }));
  writes.insert(FactRow::ActuatorEvent(ActuatorEventRow {
    event_time: envelope.event_time,
    actuator,
    state,
    source: ACTUATOR_EVENT_SOURCE.to_owned(),
  }));
}
