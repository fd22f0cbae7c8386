//! Typed payload shapes, one per event kind.
//!
//! Normalisers never touch the open JSON mapping directly: the router parses
//! the payload into one of these closed shapes and runs [`validate`] on it
//! first, so anything past that point operates on checked data.
//!
//! [`validate`]: WeatherPayload::validate

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Error, Result};

fn parse<T: for<'de> Deserialize<'de>>(kind: &'static str, payload: &Value) -> Result<T> {
  T::deserialize(payload).map_err(|source| Error::PayloadShape { kind, source })
}

fn require_finite(field: &str, value: Option<f64>) -> Result<()> {
  match value {
    Some(v) if !v.is_finite() => Err(Error::validation(format!("{field} is not finite"))),
    _ => Ok(()),
  }
}

// ─── Weather ─────────────────────────────────────────────────────────────────

/// A current-weather snapshot in the OpenWeatherMap response shape.
/// Numeric fields are in whatever units the upstream API returned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherPayload {
  pub coord:      Coord,
  pub weather:    Vec<ConditionPayload>,
  pub main:       MainPayload,
  #[serde(default)]
  pub visibility: Option<i64>,
  #[serde(default)]
  pub wind:       Option<WindPayload>,
  #[serde(default)]
  pub clouds:     Option<CloudsPayload>,
  /// Observation time, unix seconds.
  pub dt:         i64,
  pub sys:        SysPayload,
  /// Shift from UTC in seconds.
  #[serde(default)]
  pub timezone:   Option<i64>,
  /// City name.
  pub name:       String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coord {
  pub lon: f64,
  pub lat: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionPayload {
  /// Upstream condition id (e.g. 800 for "clear sky").
  pub id:          i64,
  pub main:        String,
  pub description: String,
  pub icon:        String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MainPayload {
  pub temp:       f64,
  #[serde(default)]
  pub feels_like: Option<f64>,
  #[serde(default)]
  pub temp_min:   Option<f64>,
  #[serde(default)]
  pub temp_max:   Option<f64>,
  #[serde(default)]
  pub pressure:   Option<f64>,
  #[serde(default)]
  pub humidity:   Option<f64>,
  #[serde(default)]
  pub sea_level:  Option<f64>,
  #[serde(default)]
  pub grnd_level: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindPayload {
  #[serde(default)]
  pub speed: Option<f64>,
  #[serde(default)]
  pub deg:   Option<f64>,
  #[serde(default)]
  pub gust:  Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloudsPayload {
  #[serde(default)]
  pub all: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SysPayload {
  pub country: String,
  #[serde(default)]
  pub sunrise: Option<i64>,
  #[serde(default)]
  pub sunset:  Option<i64>,
}

impl WeatherPayload {
  pub fn from_value(payload: &Value) -> Result<Self> {
    let parsed: Self = parse("weather", payload)?;
    parsed.validate()?;
    Ok(parsed)
  }

  pub fn validate(&self) -> Result<()> {
    if self.name.trim().is_empty() {
      return Err(Error::validation("weather payload has an empty city name"));
    }
    if self.sys.country.trim().is_empty() {
      return Err(Error::validation("weather payload has an empty country code"));
    }
    if self.weather.is_empty() {
      return Err(Error::validation("weather payload has no condition entry"));
    }
    if !(-90.0..=90.0).contains(&self.coord.lat) || !(-180.0..=180.0).contains(&self.coord.lon) {
      return Err(Error::validation("weather payload coordinates are out of range"));
    }
    require_finite("main.temp", Some(self.main.temp))
  }

  /// The primary condition (`weather[0]`); present once validated.
  pub fn condition(&self) -> Option<&ConditionPayload> { self.weather.first() }
}

// ─── IoT ─────────────────────────────────────────────────────────────────────

/// One row from a field sensor: soil measurements plus actuator on/off flags.
///
/// The flag pairs mirror the sensor export format, where each actuator is
/// reported as two 0/1 columns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IotPayload {
  #[serde(default)]
  pub temperature: Option<f64>,
  #[serde(default)]
  pub humidity:    Option<f64>,
  #[serde(default)]
  pub water_level: Option<f64>,
  #[serde(default, alias = "N")]
  pub nitrogen:    Option<f64>,
  #[serde(default, alias = "P")]
  pub phosphorus:  Option<f64>,
  #[serde(default, alias = "K")]
  pub potassium:   Option<f64>,

  #[serde(default, alias = "Fan_actuator_ON")]
  pub fan_actuator_on:          Option<f64>,
  #[serde(default, alias = "Fan_actuator_OFF")]
  pub fan_actuator_off:         Option<f64>,
  #[serde(default, alias = "Watering_plant_pump_ON")]
  pub watering_plant_pump_on:   Option<f64>,
  #[serde(default, alias = "Watering_plant_pump_OFF")]
  pub watering_plant_pump_off:  Option<f64>,
  #[serde(default, alias = "Water_pump_actuator_ON")]
  pub water_pump_actuator_on:   Option<f64>,
  #[serde(default, alias = "Water_pump_actuator_OFF")]
  pub water_pump_actuator_off:  Option<f64>,
}

/// An actuator's raw flag pair as reported by the sensor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActuatorFlags {
  pub name: &'static str,
  pub kind: &'static str,
  pub on:   Option<f64>,
  pub off:  Option<f64>,
}

impl IotPayload {
  pub fn from_value(payload: &Value) -> Result<Self> {
    let parsed: Self = parse("iot", payload)?;
    parsed.validate()?;
    Ok(parsed)
  }

  pub fn validate(&self) -> Result<()> {
    require_finite("temperature", self.temperature)?;
    require_finite("humidity", self.humidity)?;
    require_finite("water_level", self.water_level)?;
    require_finite("nitrogen", self.nitrogen)?;
    require_finite("phosphorus", self.phosphorus)?;
    require_finite("potassium", self.potassium)?;
    if let Some(level) = self.water_level
      && level < 0.0
    {
      return Err(Error::validation("water_level is negative"));
    }
    Ok(())
  }

  /// The three known actuators with their flag pairs.
  pub fn actuators(&self) -> [ActuatorFlags; 3] {
    [
      ActuatorFlags {
        name: "fan",
        kind: "fan",
        on:   self.fan_actuator_on,
        off:  self.fan_actuator_off,
      },
      ActuatorFlags {
        name: "watering_pump",
        kind: "pump",
        on:   self.watering_plant_pump_on,
        off:  self.watering_plant_pump_off,
      },
      ActuatorFlags {
        name: "water_pump",
        kind: "pump",
        on:   self.water_pump_actuator_on,
        off:  self.water_pump_actuator_off,
      },
    ]
  }
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  fn windhoek() -> Value {
    json!({
      "coord": { "lon": 17.0832, "lat": -22.5594 },
      "weather": [{ "id": 800, "main": "Clear", "description": "clear sky", "icon": "01d" }],
      "main": { "temp": 301.2, "feels_like": 299.9, "temp_min": 301.2, "temp_max": 301.2,
                "pressure": 1016, "humidity": 12 },
      "visibility": 10000,
      "wind": { "speed": 4.1, "deg": 90 },
      "clouds": { "all": 0 },
      "dt": 1_700_000_000,
      "sys": { "country": "NA", "sunrise": 1_699_962_000, "sunset": 1_700_009_000 },
      "timezone": 7200,
      "name": "windhoek",
    })
  }

  #[test]
  fn parses_weather_shape() {
    let w = WeatherPayload::from_value(&windhoek()).unwrap();
    assert_eq!(w.name, "windhoek");
    assert_eq!(w.sys.country, "NA");
    assert_eq!(w.condition().unwrap().icon, "01d");
    assert_eq!(w.main.pressure, Some(1016.0));
  }

  #[test]
  fn weather_without_condition_is_invalid() {
    let mut raw = windhoek();
    raw["weather"] = json!([]);
    assert!(matches!(WeatherPayload::from_value(&raw), Err(Error::Validation(_))));
  }

  #[test]
  fn weather_missing_dt_is_a_shape_error() {
    let mut raw = windhoek();
    raw.as_object_mut().unwrap().remove("dt");
    assert!(matches!(
      WeatherPayload::from_value(&raw),
      Err(Error::PayloadShape { kind: "weather", .. })
    ));
  }

  #[test]
  fn iot_accepts_export_column_names() {
    let p = IotPayload::from_value(&json!({
      "temperature": 22.0, "humidity": 55.0, "water_level": 80,
      "N": 10, "P": 20, "K": 30,
      "Fan_actuator_ON": 1, "Fan_actuator_OFF": 0,
    }))
    .unwrap();
    assert_eq!(p.nitrogen, Some(10.0));
    assert_eq!(p.potassium, Some(30.0));
    assert_eq!(p.actuators()[0].on, Some(1.0));
    assert_eq!(p.actuators()[1].on, None);
  }

  #[test]
  fn iot_rejects_non_numeric_reading() {
    let err = IotPayload::from_value(&json!({ "temperature": "warm" })).unwrap_err();
    assert!(matches!(err, Error::PayloadShape { kind: "iot", .. }));
  }
}
