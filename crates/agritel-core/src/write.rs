//! Row-level write intents produced by the normalisers.
//!
//! A [`WriteSet`] is everything one envelope wants to persist, in dependency
//! order. Dimension upserts hand back a [`DimensionRef`], a placeholder for
//! the surrogate id the executor resolves at apply time, and fact intents
//! reference dimensions only through those handles. The executor applies a
//! whole set inside one transaction.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::envelope::EventType;

// ─── Dimensions ──────────────────────────────────────────────────────────────

/// Natural key `(city_name, country_code)`; the rest is refreshed on every
/// occurrence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationRow {
  pub city_name:       String,
  pub country_code:    String,
  pub latitude:        f64,
  pub longitude:       f64,
  /// Shift from UTC in seconds.
  pub timezone_offset: Option<i64>,
}

/// Natural key `(external_condition_id, icon)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherConditionRow {
  pub external_condition_id: i64,
  pub icon:                  String,
  pub main:                  String,
  pub description:           String,
}

/// Natural key `actuator_name`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActuatorRow {
  pub actuator_name: String,
  pub actuator_type: String,
}

/// A mutable reference entity, upserted by natural key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "table", rename_all = "snake_case")]
pub enum Dimension {
  Location(LocationRow),
  WeatherCondition(WeatherConditionRow),
  Actuator(ActuatorRow),
}

impl Dimension {
  pub fn table(&self) -> &'static str {
    match self {
      Self::Location(_) => "location",
      Self::WeatherCondition(_) => "weather_condition",
      Self::Actuator(_) => "actuator",
    }
  }
}

/// Handle to a dimension upserted earlier in the same [`WriteSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DimensionRef(usize);

impl DimensionRef {
  pub fn slot(self) -> usize { self.0 }
}

// ─── Facts ───────────────────────────────────────────────────────────────────

/// Natural key `(event_time, location, condition)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherReadingRow {
  pub event_time:  DateTime<Utc>,
  pub location:    DimensionRef,
  pub condition:   DimensionRef,
  pub temperature: f64,
  pub feels_like:  Option<f64>,
  pub temp_min:    Option<f64>,
  pub temp_max:    Option<f64>,
  pub pressure:    Option<f64>,
  pub humidity:    Option<f64>,
  pub sea_level:   Option<f64>,
  pub grnd_level:  Option<f64>,
  pub visibility:  Option<i64>,
  pub wind_speed:  Option<f64>,
  pub wind_deg:    Option<f64>,
  pub wind_gust:   Option<f64>,
  pub cloudiness:  Option<f64>,
  pub sunrise:     Option<i64>,
  pub sunset:      Option<i64>,
}

/// Natural key `(event_time, location)`; `location` stays `None` until the
/// sensor is geo-resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IotReadingRow {
  pub event_time:  DateTime<Utc>,
  pub location:    Option<DimensionRef>,
  pub temperature: Option<f64>,
  pub humidity:    Option<f64>,
  pub water_level: Option<f64>,
  pub nitrogen:    Option<f64>,
  pub phosphorus:  Option<f64>,
  pub potassium:   Option<f64>,
}

/// Natural key `(event_time, actuator, state)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActuatorEventRow {
  pub event_time: DateTime<Utc>,
  pub actuator:   DimensionRef,
  pub state:      bool,
  pub source:     String,
}

/// An immutable observation, inserted only if its natural key is absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "table", rename_all = "snake_case")]
pub enum FactRow {
  WeatherReading(WeatherReadingRow),
  IotReading(IotReadingRow),
  ActuatorEvent(ActuatorEventRow),
}

impl FactRow {
  pub fn table(&self) -> &'static str {
    match self {
      Self::WeatherReading(_) => "weather_reading",
      Self::IotReading(_) => "iot_reading",
      Self::ActuatorEvent(_) => "actuator_event",
    }
  }

  /// Every dimension handle this fact depends on.
  pub fn references(&self) -> Vec<DimensionRef> {
    match self {
      Self::WeatherReading(r) => vec![r.location, r.condition],
      Self::IotReading(r) => r.location.into_iter().collect(),
      Self::ActuatorEvent(r) => vec![r.actuator],
    }
  }
}

// ─── Write set ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum WriteIntent {
  Upsert { slot: DimensionRef, dimension: Dimension },
  Insert { fact: FactRow },
}

/// All writes for one envelope, in the order they must be applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteSet {
  pub event_id:   String,
  pub event_type: EventType,
  intents:        Vec<WriteIntent>,
  slots:          usize,
}

impl WriteSet {
  pub fn new(event_id: impl Into<String>, event_type: EventType) -> Self {
    Self { event_id: event_id.into(), event_type, intents: Vec::new(), slots: 0 }
  }

  /// Queue a dimension upsert and return a handle to its surrogate id.
  pub fn upsert(&mut self, dimension: Dimension) -> DimensionRef {
    let slot = DimensionRef(self.slots);
    self.slots += 1;
    self.intents.push(WriteIntent::Upsert { slot, dimension });
    slot
  }

  /// Queue a fact insert-if-absent.
  pub fn insert(&mut self, fact: FactRow) {
    self.intents.push(WriteIntent::Insert { fact });
  }

  pub fn intents(&self) -> &[WriteIntent] { &self.intents }

  /// Number of dimension handles issued; the executor sizes its id table
  /// from this.
  pub fn slot_count(&self) -> usize { self.slots }

  pub fn is_empty(&self) -> bool { self.intents.is_empty() }

  pub fn len(&self) -> usize { self.intents.len() }

  pub fn facts(&self) -> impl Iterator<Item = &FactRow> {
    self.intents.iter().filter_map(|i| match i {
      WriteIntent::Insert { fact } => Some(fact),
      WriteIntent::Upsert { .. } => None,
    })
  }

  pub fn dimensions(&self) -> impl Iterator<Item = &Dimension> {
    self.intents.iter().filter_map(|i| match i {
      WriteIntent::Upsert { dimension, .. } => Some(dimension),
      WriteIntent::Insert { .. } => None,
    })
  }
}

// ─── Apply outcome ───────────────────────────────────────────────────────────

/// What the executor did with a write set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyReport {
  pub dimensions_upserted: usize,
  pub facts_inserted:      usize,
  /// Facts whose natural key was already present (redelivery).
  pub facts_skipped:       usize,
}

impl ApplyReport {
  pub fn merge(&mut self, other: ApplyReport) {
    self.dimensions_upserted += other.dimensions_upserted;
    self.facts_inserted += other.facts_inserted;
    self.facts_skipped += other.facts_skipped;
  }
}
