//! Encoding and decoding helpers between domain types and SQLite columns.
//!
//! Timestamps are stored as fixed-width RFC 3339 UTC strings with
//! microsecond precision, so lexical order in SQL matches time order and the
//! same instant always encodes to the same natural-key text.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use agritel_core::reading::{IotSnapshot, WeatherSnapshot};

use crate::{Error, Result};

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339_opts(SecondsFormat::Micros, true) }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(format!("{s:?}: {e}")))
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw columns of the latest weather reading joined with its dimensions.
pub struct RawWeatherSnapshot {
  pub event_time:   String,
  pub city_name:    String,
  pub country_code: String,
  pub condition:    String,
  pub temperature:  f64,
  pub humidity:     Option<f64>,
}

impl RawWeatherSnapshot {
  pub fn into_snapshot(self) -> Result<WeatherSnapshot> {
    Ok(WeatherSnapshot {
      event_time:   decode_dt(&self.event_time)?,
      city_name:    self.city_name,
      country_code: self.country_code,
      condition:    self.condition,
      temperature:  self.temperature,
      humidity:     self.humidity,
    })
  }
}

/// Raw columns of the latest `iot_reading` row.
pub struct RawIotSnapshot {
  pub event_time:  String,
  pub temperature: Option<f64>,
  pub humidity:    Option<f64>,
  pub water_level: Option<f64>,
  pub nitrogen:    Option<f64>,
  pub phosphorus:  Option<f64>,
  pub potassium:   Option<f64>,
}

impl RawIotSnapshot {
  pub fn into_snapshot(self) -> Result<IotSnapshot> {
    Ok(IotSnapshot {
      event_time:  decode_dt(&self.event_time)?,
      temperature: self.temperature,
      humidity:    self.humidity,
      water_level: self.water_level,
      nitrogen:    self.nitrogen,
      phosphorus:  self.phosphorus,
      potassium:   self.potassium,
    })
  }
}

/// A `location` row as stored, surrogate id included.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocationRecord {
  pub location_id:     i64,
  pub city_name:       String,
  pub country_code:    String,
  pub latitude:        f64,
  pub longitude:       f64,
  pub timezone_offset: Option<i64>,
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;

  #[test]
  fn encoding_is_fixed_width_and_round_trips() {
    let a = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
    let b = Utc.timestamp_opt(1_700_000_000, 123_456_000).unwrap();
    assert_eq!(encode_dt(a), "2023-11-14T22:13:20.000000Z");
    assert_eq!(encode_dt(a).len(), encode_dt(b).len());
    assert!(encode_dt(a) < encode_dt(b));
    assert_eq!(decode_dt(&encode_dt(b)).unwrap(), b);
  }

  #[test]
  fn garbage_timestamp_is_an_error() {
    assert!(matches!(decode_dt("yesterday"), Err(Error::DateParse(_))));
  }
}
