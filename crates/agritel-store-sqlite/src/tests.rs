//! Integration tests for `SqliteStore` against in-memory and on-disk
//! databases.

use std::path::PathBuf;

use agritel_core::{
  envelope::{Envelope, EventType},
  identity::Origin,
  router::{Route, route},
  store::TelemetryStore,
  write::{Dimension, FactRow, LocationRow, WeatherConditionRow, WeatherReadingRow, WriteSet},
};
use chrono::{TimeZone, Utc};
use serde_json::{Value, json};

use crate::{Error, SqliteStore, StoreStats};

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn weather_payload(dt: i64, lat: f64) -> Value {
  json!({
    "coord": { "lon": 17.0832, "lat": lat },
    "weather": [{ "id": 800, "main": "Clear", "description": "clear sky", "icon": "01d" }],
    "main": { "temp": 300.15, "feels_like": 299.0, "pressure": 1015, "humidity": 14 },
    "visibility": 10000,
    "wind": { "speed": 4.6, "deg": 110 },
    "clouds": { "all": 0 },
    "dt": dt,
    "sys": { "country": "NA", "sunrise": 1_699_962_000, "sunset": 1_700_009_000 },
    "timezone": 7200,
    "name": "windhoek",
  })
}

fn iot_payload(time: &str, water_level: f64) -> Value {
  json!({
    "measurement_time": time,
    "temperature": 23.0, "humidity": 55.0, "water_level": water_level,
    "N": 40, "P": 25, "K": 30,
    "fan_actuator_on": 1, "fan_actuator_off": 0,
    "watering_plant_pump_on": 0, "watering_plant_pump_off": 1,
    "water_pump_actuator_on": 0, "water_pump_actuator_off": 0,
  })
}

fn writes_for(event_type: EventType, payload: Value) -> WriteSet {
  let env = Envelope::build(&Origin::new("tests", 1), event_type, payload).unwrap();
  match route(&env).unwrap() {
    Route::Write(writes) => writes,
    Route::Dropped { .. } => panic!("known event type was dropped"),
  }
}

// ─── Weather path ────────────────────────────────────────────────────────────

#[tokio::test]
async fn weather_envelope_creates_one_row_per_table() {
  let s = store().await;
  let report = s
    .apply(writes_for(EventType::Weather, weather_payload(1_700_000_000, -22.5594)))
    .await
    .unwrap();

  assert_eq!(report.dimensions_upserted, 2);
  assert_eq!(report.facts_inserted, 1);
  assert_eq!(report.facts_skipped, 0);

  let stats = s.stats().await.unwrap();
  assert_eq!(stats.locations, 1);
  assert_eq!(stats.weather_conditions, 1);
  assert_eq!(stats.weather_readings, 1);
}

#[tokio::test]
async fn weather_redelivery_is_idempotent() {
  let s = store().await;
  let writes = writes_for(EventType::Weather, weather_payload(1_700_000_000, -22.5594));

  s.apply(writes.clone()).await.unwrap();
  let first = s.stats().await.unwrap();

  let report = s.apply(writes).await.unwrap();
  assert_eq!(report.facts_inserted, 0);
  assert_eq!(report.facts_skipped, 1);
  assert_eq!(s.stats().await.unwrap(), first);
}

#[tokio::test]
async fn location_is_refreshed_in_place() {
  let s = store().await;
  s.apply(writes_for(EventType::Weather, weather_payload(1_700_000_000, -22.5594)))
    .await
    .unwrap();
  let before = s.find_location("windhoek", "NA").await.unwrap().unwrap();

  // Same instant, place and condition; corrected coordinates.
  let report = s
    .apply(writes_for(EventType::Weather, weather_payload(1_700_000_000, -22.57)))
    .await
    .unwrap();
  assert_eq!(report.facts_skipped, 1);

  let after = s.find_location("windhoek", "NA").await.unwrap().unwrap();
  assert_eq!(after.location_id, before.location_id);
  assert_eq!(after.latitude, -22.57);

  let stats = s.stats().await.unwrap();
  assert_eq!(stats.locations, 1);
  assert_eq!(stats.weather_readings, 1);
}

#[tokio::test]
async fn new_observation_reuses_dimensions() {
  let s = store().await;
  s.apply(writes_for(EventType::Weather, weather_payload(1_700_000_000, -22.5594)))
    .await
    .unwrap();
  s.apply(writes_for(EventType::Weather, weather_payload(1_700_003_600, -22.5594)))
    .await
    .unwrap();

  let stats = s.stats().await.unwrap();
  assert_eq!(stats.locations, 1);
  assert_eq!(stats.weather_conditions, 1);
  assert_eq!(stats.weather_readings, 2);
}

#[tokio::test]
async fn latest_weather_is_by_event_time_not_arrival() {
  let s = store().await;
  s.apply(writes_for(EventType::Weather, weather_payload(1_700_003_600, -22.5594)))
    .await
    .unwrap();
  s.apply(writes_for(EventType::Weather, weather_payload(1_700_000_000, -22.5594)))
    .await
    .unwrap();

  let latest = s.latest_weather().await.unwrap().unwrap();
  assert_eq!(latest.event_time.timestamp(), 1_700_003_600);
  assert_eq!(latest.city_name, "windhoek");
  assert_eq!(latest.condition, "Clear");
  assert_eq!(latest.temperature, 300.15);
}

// ─── IoT path ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn iot_envelope_records_reading_and_decided_actuators() {
  let s = store().await;
  let report = s
    .apply(writes_for(EventType::Iot, iot_payload("2024-03-01T10:00:00Z", 60.0)))
    .await
    .unwrap();

  // fan on, watering pump off, water pump undecided.
  assert_eq!(report.dimensions_upserted, 2);
  assert_eq!(report.facts_inserted, 3);

  let stats = s.stats().await.unwrap();
  assert_eq!(stats.iot_readings, 1);
  assert_eq!(stats.actuators, 2);
  assert_eq!(stats.actuator_events, 2);
}

#[tokio::test]
async fn iot_redelivery_is_idempotent_with_null_location() {
  let s = store().await;
  let writes = writes_for(EventType::Iot, iot_payload("2024-03-01T10:00:00Z", 60.0));

  s.apply(writes.clone()).await.unwrap();
  let first = s.stats().await.unwrap();
  let report = s.apply(writes).await.unwrap();

  assert_eq!(report.facts_inserted, 0);
  assert_eq!(report.facts_skipped, 3);
  assert_eq!(s.stats().await.unwrap(), first);
}

#[tokio::test]
async fn untimed_reading_rebuilt_later_dedupes_on_event_id() {
  let s = store().await;
  let payload = json!({ "temperature": 22.0, "water_level": 60.0, "fan_actuator_on": 1 });

  let first = writes_for(EventType::Iot, payload.clone());

  // Same line, stamped at a different ingestion time.
  let mut env = Envelope::build(&Origin::new("tests", 1), EventType::Iot, payload).unwrap();
  env.event_time = Utc.timestamp_opt(1_900_000_000, 0).unwrap();
  let Route::Write(second) = route(&env).unwrap() else {
    panic!("known event type was dropped");
  };
  assert_eq!(first.event_id, second.event_id);

  s.apply(first).await.unwrap();
  let report = s.apply(second).await.unwrap();
  assert_eq!(report.facts_inserted, 0);
  assert_eq!(report.facts_skipped, 2);

  let stats = s.stats().await.unwrap();
  assert_eq!(stats.iot_readings, 1);
  assert_eq!(stats.actuator_events, 1);
}

#[tokio::test]
async fn actuator_events_accumulate_across_time() {
  let s = store().await;
  s.apply(writes_for(EventType::Iot, iot_payload("2024-03-01T10:00:00Z", 60.0)))
    .await
    .unwrap();
  s.apply(writes_for(EventType::Iot, iot_payload("2024-03-01T10:05:00Z", 58.0)))
    .await
    .unwrap();

  let stats = s.stats().await.unwrap();
  assert_eq!(stats.actuators, 2);
  assert_eq!(stats.actuator_events, 4);
  assert_eq!(stats.iot_readings, 2);

  let latest = s.latest_iot().await.unwrap().unwrap();
  assert_eq!(latest.water_level, Some(58.0));
  assert_eq!(latest.nitrogen, Some(40.0));
}

#[tokio::test]
async fn empty_store_has_no_latest_readings() {
  let s = store().await;
  assert!(s.latest_weather().await.unwrap().is_none());
  assert!(s.latest_iot().await.unwrap().is_none());
}

// ─── Atomicity and ordering ──────────────────────────────────────────────────

fn reading(set: &mut WriteSet) -> WeatherReadingRow {
  let location = set.upsert(Dimension::Location(location_row()));
  let condition = set.upsert(Dimension::WeatherCondition(WeatherConditionRow {
    external_condition_id: 800,
    icon:                  "01d".into(),
    main:                  "Clear".into(),
    description:           "clear sky".into(),
  }));
  WeatherReadingRow {
    event_time: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
    location,
    condition,
    temperature: 300.0,
    feels_like: None,
    temp_min: None,
    temp_max: None,
    pressure: None,
    humidity: None,
    sea_level: None,
    grnd_level: None,
    visibility: None,
    wind_speed: None,
    wind_deg: None,
    wind_gust: None,
    cloudiness: None,
    sunrise: None,
    sunset: None,
  }
}

fn location_row() -> LocationRow {
  LocationRow {
    city_name:       "windhoek".into(),
    country_code:    "NA".into(),
    latitude:        -22.5594,
    longitude:       17.0832,
    timezone_offset: Some(7200),
  }
}

#[tokio::test]
async fn fact_before_its_dimension_rolls_back_the_envelope() {
  let s = store().await;

  // A handle issued by another set is not resolved in this one until the
  // upsert that follows the fact.
  let mut other = WriteSet::new("a".repeat(64), EventType::Weather);
  let row = reading(&mut other);

  let mut writes = WriteSet::new("b".repeat(64), EventType::Weather);
  writes.insert(FactRow::WeatherReading(row));
  writes.upsert(Dimension::Location(location_row()));

  let err = s.apply(writes).await.unwrap_err();
  assert!(matches!(err, Error::UnresolvedDimension { slot: 0, .. }));
  assert!(!err.is_transient());
  assert_eq!(s.stats().await.unwrap(), StoreStats::default());
}

#[tokio::test]
async fn failed_fact_rolls_back_earlier_dimension_writes() {
  let s = store().await;

  let mut writes = WriteSet::new("c".repeat(64), EventType::Weather);
  let mut row = reading(&mut writes);
  // SQLite stores NaN as NULL, which violates the NOT NULL constraint.
  row.temperature = f64::NAN;
  writes.insert(FactRow::WeatherReading(row));

  let err = s.apply(writes).await.unwrap_err();
  assert!(matches!(err, Error::Database(_)));
  assert!(!err.is_transient());
  assert!(s.find_location("windhoek", "NA").await.unwrap().is_none());
}

// ─── Concurrency ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn concurrent_upserts_on_shared_handle_converge() {
  let s = store().await;
  let a = s.clone();
  let b = s.clone();

  let (ra, rb) = tokio::join!(
    a.apply(writes_for(EventType::Weather, weather_payload(1_700_000_000, -22.5594))),
    b.apply(writes_for(EventType::Weather, weather_payload(1_700_003_600, -22.5594))),
  );
  ra.unwrap();
  rb.unwrap();

  let stats = s.stats().await.unwrap();
  assert_eq!(stats.locations, 1);
  assert_eq!(stats.weather_conditions, 1);
  assert_eq!(stats.weather_readings, 2);
}

struct TempDb(PathBuf);

impl TempDb {
  fn new(tag: &str) -> Self {
    let nanos = std::time::SystemTime::now()
      .duration_since(std::time::UNIX_EPOCH)
      .unwrap()
      .as_nanos();
    Self(std::env::temp_dir().join(format!(
      "agritel-{tag}-{}-{nanos}.db",
      std::process::id()
    )))
  }
}

impl Drop for TempDb {
  fn drop(&mut self) {
    for suffix in ["", "-wal", "-shm"] {
      let mut path = self.0.clone().into_os_string();
      path.push(suffix);
      let _ = std::fs::remove_file(path);
    }
  }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_connections_converge_on_one_surrogate_id() {
  let db = TempDb::new("concurrent");
  let first = SqliteStore::open(&db.0).await.unwrap();
  let second = SqliteStore::open(&db.0).await.unwrap();

  let mut tasks = Vec::new();
  for (i, s) in [first.clone(), second.clone()].into_iter().cycle().take(8).enumerate() {
    let writes =
      writes_for(EventType::Weather, weather_payload(1_700_000_000 + i as i64 * 60, -22.5594));
    tasks.push(tokio::spawn(async move { s.apply(writes).await }));
  }
  for task in tasks {
    task.await.unwrap().unwrap();
  }

  let stats = first.stats().await.unwrap();
  assert_eq!(stats.locations, 1);
  assert_eq!(stats.weather_conditions, 1);
  assert_eq!(stats.weather_readings, 8);
  assert_eq!(second.stats().await.unwrap(), stats);
}
