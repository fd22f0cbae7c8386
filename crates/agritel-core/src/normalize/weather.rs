//! Weather normaliser: `location` + `weather_condition` + `weather_reading`.

use crate::{
  Error, Result,
  envelope::{Envelope, EventType},
  payload::WeatherPayload,
  write::{
    Dimension, FactRow, LocationRow, WeatherConditionRow, WeatherReadingRow, WriteSet,
  },
};

/// Build the write set for a weather envelope.
///
/// Emits, in order: the location upsert, the condition upsert, and the
/// reading insert that references both. Units pass through untouched.
pub fn normalize_weather(envelope: &Envelope) -> Result<WriteSet> {
  let payload = WeatherPayload::from_value(&envelope.payload)?;
  let condition = payload
    .condition()
    .ok_or_else(|| Error::validation("weather payload has no condition entry"))?;

  let mut writes = WriteSet::new(&envelope.event_id, EventType::Weather);

  let location = writes.upsert(Dimension::Location(LocationRow {
    city_name:       payload.name.trim().to_owned(),
    country_code:    payload.sys.country.trim().to_owned(),
    latitude:        payload.coord.lat,
    longitude:       payload.coord.lon,
    timezone_offset: payload.timezone,
  }));

  let condition = writes.upsert(Dimension::WeatherCondition(WeatherConditionRow {
    external_condition_id: condition.id,
    icon:                  condition.icon.clone(),
    main:                  condition.main.clone(),
    description:           condition.description.clone(),
  }));

  let wind = payload.wind.as_ref();
  writes.insert(FactRow::WeatherReading(WeatherReadingRow {
    event_time: envelope.event_time,
    location,
    condition,
    temperature: payload.main.temp,
    feels_like: payload.main.feels_like,
    temp_min: payload.main.temp_min,
    temp_max: payload.main.temp_max,
    pressure: payload.main.pressure,
    humidity: payload.main.humidity,
    sea_level: payload.main.sea_level,
    grnd_level: payload.main.grnd_level,
    visibility: payload.visibility,
    wind_speed: wind.and_then(|w| w.speed),
    wind_deg: wind.and_then(|w| w.deg),
    wind_gust: wind.and_then(|w| w.gust),
    cloudiness: payload.clouds.as_ref().and_then(|c| c.all),
    sunrise: payload.sys.sunrise,
    sunset: payload.sys.sunset,
  }));

  Ok(writes)
}
