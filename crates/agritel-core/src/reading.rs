//! Read models for the most recently persisted readings.
//!
//! These are what the alert evaluator sees; they are never written back.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The latest `weather_reading` joined with its location and condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherSnapshot {
  pub event_time:   DateTime<Utc>,
  pub city_name:    String,
  pub country_code: String,
  pub condition:    String,
  /// Air temperature in upstream units.
  pub temperature:  f64,
  pub humidity:     Option<f64>,
}

/// The latest `iot_reading`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IotSnapshot {
  pub event_time:  DateTime<Utc>,
  /// Soil temperature.
  pub temperature: Option<f64>,
  /// Soil humidity, percent.
  pub humidity:    Option<f64>,
  /// Tank water level, percent.
  pub water_level: Option<f64>,
  pub nitrogen:    Option<f64>,
  pub phosphorus:  Option<f64>,
  pub potassium:   Option<f64>,
}

/// Both latest readings, either of which may be absent on a fresh store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LatestReadings {
  pub weather: Option<WeatherSnapshot>,
  pub iot:     Option<IotSnapshot>,
}
