//! Threshold alerting over the most recently persisted readings.
//!
//! Evaluation runs after a successful commit and never feeds back into
//! ingestion: an evaluator or notifier failure is logged by the caller and
//! the committed envelope stays committed.
//!
//! Rules (all bounds exclusive, all configurable through [`Thresholds`]):
//!
//! | Reading               | High               | Low             |
//! |-----------------------|--------------------|-----------------|
//! | air temperature (°C)  | heat               | frost           |
//! | water level (%)       | n/a                | low water       |
//! | soil humidity (%)     | over-watering      | dry soil        |
//! | soil temperature (°C) | soil heat          | soil cold       |

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
  notify::Notifier,
  reading::{IotSnapshot, LatestReadings, WeatherSnapshot},
  store::TelemetryStore,
};

// ─── Configuration ───────────────────────────────────────────────────────────

/// Unit of the air temperature stored in `weather_reading`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemperatureUnit {
  /// The upstream default when no `units` parameter is requested.
  #[default]
  Kelvin,
  Celsius,
  Fahrenheit,
}

impl TemperatureUnit {
  pub fn to_celsius(self, value: f64) -> f64 {
    match self {
      Self::Kelvin => value - 273.15,
      Self::Celsius => value,
      Self::Fahrenheit => (value - 32.0) * 5.0 / 9.0,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
  pub air_temperature_unit: TemperatureUnit,
  pub air_temp_high:        f64,
  pub air_temp_low:         f64,
  pub water_level_low:      f64,
  pub soil_humidity_high:   f64,
  pub soil_humidity_low:    f64,
  pub soil_temp_high:       f64,
  pub soil_temp_low:        f64,
}

impl Default for Thresholds {
  fn default() -> Self {
    Self {
      air_temperature_unit: TemperatureUnit::Kelvin,
      air_temp_high:        40.0,
      air_temp_low:         5.0,
      water_level_low:      20.0,
      soil_humidity_high:   80.0,
      soil_humidity_low:    30.0,
      soil_temp_high:       35.0,
      soil_temp_low:        10.0,
    }
  }
}

// ─── Alerts ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
  Heat,
  Frost,
  LowWater,
  OverWatering,
  DrySoil,
  SoilHeat,
  SoilCold,
}

impl AlertKind {
  pub fn title(self) -> &'static str {
    match self {
      Self::Heat => "Heat alert",
      Self::Frost => "Frost alert",
      Self::LowWater => "Low water alert",
      Self::OverWatering => "Over-watering alert",
      Self::DrySoil => "Dry soil alert",
      Self::SoilHeat => "Soil heat alert",
      Self::SoilCold => "Soil cold alert",
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
  pub kind:      AlertKind,
  pub value:     f64,
  pub threshold: f64,
  pub message:   String,
}

impl Alert {
  fn new(kind: AlertKind, value: f64, threshold: f64, detail: String) -> Self {
    Self { kind, value, threshold, message: format!("{}: {detail}", kind.title()) }
  }
}

impl fmt::Display for Alert {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.message) }
}

#[derive(Debug, Error)]
pub enum AlertingError {
  #[error("could not read latest readings: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error("notification failed: {0}")]
  Notify(#[source] Box<dyn std::error::Error + Send + Sync>),
}

// ─── Evaluation ──────────────────────────────────────────────────────────────

/// Apply every rule to `latest`. Missing readings or fields fire nothing.
pub fn evaluate_readings(latest: &LatestReadings, thresholds: &Thresholds) -> Vec<Alert> {
  let mut alerts = Vec::new();
  if let Some(weather) = &latest.weather {
    weather_rules(weather, thresholds, &mut alerts);
  }
  if let Some(iot) = &latest.iot {
    iot_rules(iot, thresholds, &mut alerts);
  }
  alerts
}

fn weather_rules(w: &WeatherSnapshot, t: &Thresholds, out: &mut Vec<Alert>) {
  let air = t.air_temperature_unit.to_celsius(w.temperature);
  if air > t.air_temp_high {
    out.push(Alert::new(
      AlertKind::Heat,
      air,
      t.air_temp_high,
      format!("air temperature in {} is {air:.1}°C (above {:.1}°C)", w.city_name, t.air_temp_high),
    ));
  } else if air < t.air_temp_low {
    out.push(Alert::new(
      AlertKind::Frost,
      air,
      t.air_temp_low,
      format!("air temperature in {} is {air:.1}°C (below {:.1}°C)", w.city_name, t.air_temp_low),
    ));
  }
}

fn iot_rules(r: &IotSnapshot, t: &Thresholds, out: &mut Vec<Alert>) {
  if let Some(level) = r.water_level
    && level < t.water_level_low
  {
    out.push(Alert::new(
      AlertKind::LowWater,
      level,
      t.water_level_low,
      format!("water level is {level:.1}% (below {:.1}%)", t.water_level_low),
    ));
  }

  if let Some(h) = r.humidity {
    if h > t.soil_humidity_high {
      out.push(Alert::new(
        AlertKind::OverWatering,
        h,
        t.soil_humidity_high,
        format!("soil humidity is {h:.1}% (above {:.1}%)", t.soil_humidity_high),
      ));
    } else if h < t.soil_humidity_low {
      out.push(Alert::new(
        AlertKind::DrySoil,
        h,
        t.soil_humidity_low,
        format!("soil humidity is {h:.1}% (below {:.1}%)", t.soil_humidity_low),
      ));
    }
  }

  if let Some(temp) = r.temperature {
    if temp > t.soil_temp_high {
      out.push(Alert::new(
        AlertKind::SoilHeat,
        temp,
        t.soil_temp_high,
        format!("soil temperature is {temp:.1}°C (above {:.1}°C)", t.soil_temp_high),
      ));
    } else if temp < t.soil_temp_low {
      out.push(Alert::new(
        AlertKind::SoilCold,
        temp,
        t.soil_temp_low,
        format!("soil temperature is {temp:.1}°C (below {:.1}°C)", t.soil_temp_low),
      ));
    }
  }
}

/// Read the latest readings from `store` and evaluate them.
pub async fn evaluate<S: TelemetryStore>(
  store: &S,
  thresholds: &Thresholds,
) -> Result<Vec<Alert>, AlertingError> {
  let weather = store
    .latest_weather()
    .await
    .map_err(|e| AlertingError::Store(Box::new(e)))?;
  let iot = store
    .latest_iot()
    .await
    .map_err(|e| AlertingError::Store(Box::new(e)))?;

  if weather.is_none() && iot.is_none() {
    tracing::debug!("no readings persisted yet, nothing to evaluate");
  }
  Ok(evaluate_readings(&LatestReadings { weather, iot }, thresholds))
}

// ─── Dispatch ────────────────────────────────────────────────────────────────

/// Render one aggregated notification for a non-empty alert list.
pub fn render(subject_prefix: &str, alerts: &[Alert]) -> (String, String) {
  let subject = format!("{subject_prefix}: {} alert(s)", alerts.len());
  let body = alerts
    .iter()
    .map(|a| format!("- {a}"))
    .collect::<Vec<_>>()
    .join("\n");
  (subject, body)
}

/// Send a single aggregated notification. An empty list sends nothing and
/// returns `Ok(false)`.
pub async fn dispatch<N: Notifier>(
  notifier: &N,
  subject_prefix: &str,
  alerts: &[Alert],
) -> Result<bool, AlertingError> {
  if alerts.is_empty() {
    return Ok(false);
  }
  let (subject, body) = render(subject_prefix, alerts);
  notifier
    .notify(&subject, &body)
    .await
    .map_err(|e| AlertingError::Notify(Box::new(e)))?;
  Ok(true)
}

#[cfg(test)]
mod tests {
  use std::sync::Mutex;

  use chrono::Utc;

  use super::*;

  fn iot(water_level: f64) -> IotSnapshot {
    IotSnapshot {
      event_time: Utc::now(),
      temperature: Some(22.0),
      humidity: Some(55.0),
      water_level: Some(water_level),
      ..IotSnapshot::default()
    }
  }

  fn weather(kelvin: f64) -> WeatherSnapshot {
    WeatherSnapshot {
      event_time:   Utc::now(),
      city_name:    "windhoek".into(),
      country_code: "NA".into(),
      condition:    "Clear".into(),
      temperature:  kelvin,
      humidity:     Some(12.0),
    }
  }

  #[test]
  fn low_water_fires_exactly_one_alert() {
    let latest = LatestReadings { weather: None, iot: Some(iot(15.0)) };
    let alerts = evaluate_readings(&latest, &Thresholds::default());
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].kind, AlertKind::LowWater);
    assert!(alerts[0].message.contains("Low water alert"));
  }

  #[test]
  fn nominal_water_fires_nothing() {
    let latest = LatestReadings { weather: None, iot: Some(iot(50.0)) };
    assert!(evaluate_readings(&latest, &Thresholds::default()).is_empty());
  }

  #[test]
  fn air_temperature_is_converted_before_comparison() {
    // 315.15 K = 42 °C; a raw comparison would fire at any Kelvin value.
    let hot = LatestReadings { weather: Some(weather(315.15)), iot: None };
    let alerts = evaluate_readings(&hot, &Thresholds::default());
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].kind, AlertKind::Heat);

    let mild = LatestReadings { weather: Some(weather(295.15)), iot: None };
    assert!(evaluate_readings(&mild, &Thresholds::default()).is_empty());

    let frost = LatestReadings { weather: Some(weather(270.0)), iot: None };
    assert_eq!(evaluate_readings(&frost, &Thresholds::default())[0].kind, AlertKind::Frost);
  }

  #[test]
  fn soil_rules() {
    let mut r = iot(50.0);
    r.humidity = Some(85.0);
    r.temperature = Some(8.0);
    let kinds: Vec<AlertKind> =
      evaluate_readings(&LatestReadings { weather: None, iot: Some(r) }, &Thresholds::default())
        .into_iter()
        .map(|a| a.kind)
        .collect();
    assert_eq!(kinds, [AlertKind::OverWatering, AlertKind::SoilCold]);
  }

  #[test]
  fn bounds_are_exclusive() {
    let latest = LatestReadings { weather: None, iot: Some(iot(20.0)) };
    assert!(evaluate_readings(&latest, &Thresholds::default()).is_empty());
  }

  #[test]
  fn thresholds_deserialise_with_partial_overrides() {
    let t: Thresholds =
      serde_json::from_str(r#"{ "water_level_low": 35, "air_temperature_unit": "celsius" }"#)
        .unwrap();
    assert_eq!(t.water_level_low, 35.0);
    assert_eq!(t.air_temperature_unit, TemperatureUnit::Celsius);
    assert_eq!(t.soil_temp_high, 35.0);
  }

  #[derive(Default)]
  struct Recording {
    sent: Mutex<Vec<(String, String)>>,
  }

  impl Notifier for Recording {
    type Error = std::convert::Infallible;

    async fn notify(&self, subject: &str, body: &str) -> Result<(), Self::Error> {
      self.sent.lock().unwrap().push((subject.to_owned(), body.to_owned()));
      Ok(())
    }
  }

  #[tokio::test]
  async fn dispatch_aggregates_into_one_notification() {
    let notifier = Recording::default();
    let mut r = iot(10.0);
    r.humidity = Some(20.0);
    let alerts =
      evaluate_readings(&LatestReadings { weather: None, iot: Some(r) }, &Thresholds::default());
    assert_eq!(alerts.len(), 2);

    assert!(dispatch(&notifier, "Agritel", &alerts).await.unwrap());
    let sent = notifier.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, "Agritel: 2 alert(s)");
    assert!(sent[0].1.contains("Low water alert"));
    assert!(sent[0].1.contains("Dry soil alert"));
  }

  #[tokio::test]
  async fn dispatch_is_silent_without_alerts() {
    let notifier = Recording::default();
    assert!(!dispatch(&notifier, "Agritel", &[]).await.unwrap());
    assert!(notifier.sent.lock().unwrap().is_empty());
  }
}
