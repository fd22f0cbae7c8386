//! [`SqliteStore`]: the SQLite implementation of [`TelemetryStore`].

use std::{path::Path, time::Duration};

use rusqlite::{Connection, OptionalExtension as _, Transaction, TransactionBehavior};
use serde::Serialize;

use agritel_core::{
  reading::{IotSnapshot, WeatherSnapshot},
  store::TelemetryStore,
  write::{
    ActuatorEventRow, ActuatorRow, ApplyReport, Dimension, DimensionRef, FactRow, IotReadingRow,
    LocationRow, WeatherConditionRow, WeatherReadingRow, WriteIntent, WriteSet,
  },
};

use crate::{
  Error, Result,
  encode::{LocationRecord, RawIotSnapshot, RawWeatherSnapshot, encode_dt},
  schema::SCHEMA,
};

/// How long a writer waits on a locked database before giving up.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

// ─── Store ───────────────────────────────────────────────────────────────────

/// A telemetry store backed by a single SQLite file.
///
/// Construct once per process and share; cloning is cheap because the inner
/// connection handle is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

/// Row counts for every table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
  pub locations:          i64,
  pub weather_conditions: i64,
  pub weather_readings:   i64,
  pub iot_readings:       i64,
  pub actuators:          i64,
  pub actuator_events:    i64,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init(DEFAULT_BUSY_TIMEOUT).await?;
    Ok(store)
  }

  /// Open an in-memory store. Useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init(DEFAULT_BUSY_TIMEOUT).await?;
    Ok(store)
  }

  async fn init(&self, busy_timeout: Duration) -> Result<()> {
    self
      .conn
      .call(move |conn| {
        conn.busy_timeout(busy_timeout)?;
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Override how long writers wait on a locked database.
  pub async fn set_busy_timeout(&self, timeout: Duration) -> Result<()> {
    self
      .conn
      .call(move |conn| {
        conn.busy_timeout(timeout)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Row counts for all six tables.
  pub async fn stats(&self) -> Result<StoreStats> {
    let stats = self
      .conn
      .call(|conn| {
        let count = |table: &str| -> rusqlite::Result<i64> {
          conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |r| r.get(0))
        };
        Ok(StoreStats {
          locations:          count("location")?,
          weather_conditions: count("weather_condition")?,
          weather_readings:   count("weather_reading")?,
          iot_readings:       count("iot_reading")?,
          actuators:          count("actuator")?,
          actuator_events:    count("actuator_event")?,
        })
      })
      .await?;
    Ok(stats)
  }

  /// Look a location up by its natural key.
  pub async fn find_location(
    &self,
    city_name: &str,
    country_code: &str,
  ) -> Result<Option<LocationRecord>> {
    let city = city_name.to_owned();
    let country = country_code.to_owned();

    let record = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT location_id, city_name, country_code, latitude, longitude, timezone_offset
               FROM location WHERE city_name = ?1 AND country_code = ?2",
              rusqlite::params![city, country],
              |row| {
                Ok(LocationRecord {
                  location_id:     row.get(0)?,
                  city_name:       row.get(1)?,
                  country_code:    row.get(2)?,
                  latitude:        row.get(3)?,
                  longitude:       row.get(4)?,
                  timezone_offset: row.get(5)?,
                })
              },
            )
            .optional()?,
        )
      })
      .await?;
    Ok(record)
  }
}

// ─── Executor ────────────────────────────────────────────────────────────────

/// Why a write set could not be applied inside the transaction.
enum ApplyFault {
  Sql(rusqlite::Error),
  Unresolved(usize),
}

impl From<rusqlite::Error> for ApplyFault {
  fn from(e: rusqlite::Error) -> Self { Self::Sql(e) }
}

/// Apply every intent against an open transaction. The caller commits.
fn apply_intents(
  tx: &Transaction<'_>,
  writes: &WriteSet,
) -> std::result::Result<ApplyReport, ApplyFault> {
  let mut ids: Vec<Option<i64>> = vec![None; writes.slot_count()];
  let mut report = ApplyReport::default();

  for intent in writes.intents() {
    match intent {
      WriteIntent::Upsert { slot, dimension } => {
        let id = upsert_dimension(tx, dimension)?;
        if let Some(entry) = ids.get_mut(slot.slot()) {
          *entry = Some(id);
        }
        report.dimensions_upserted += 1;
      }
      WriteIntent::Insert { fact } => {
        let resolve = |r: DimensionRef| {
          ids.get(r.slot()).copied().flatten().ok_or(ApplyFault::Unresolved(r.slot()))
        };
        let inserted = match fact {
          FactRow::WeatherReading(row) => insert_weather_reading(
            tx,
            row,
            resolve(row.location)?,
            resolve(row.condition)?,
            &writes.event_id,
          )?,
          FactRow::IotReading(row) => {
            let location = row.location.map(resolve).transpose()?;
            insert_iot_reading(tx, row, location, &writes.event_id)?
          }
          FactRow::ActuatorEvent(row) => {
            insert_actuator_event(tx, row, resolve(row.actuator)?, &writes.event_id)?
          }
        };
        if inserted {
          report.facts_inserted += 1;
        } else {
          report.facts_skipped += 1;
        }
      }
    }
  }

  Ok(report)
}

// ── Dimension upserts ────────────────────────────────────────────────────────
//
// Each upsert targets the natural-key uniqueness constraint and asks for the
// surrogate id back. If the backend hands back no row, the id is read by
// natural key inside the same transaction.

fn upsert_dimension(tx: &Transaction<'_>, dimension: &Dimension) -> rusqlite::Result<i64> {
  match dimension {
    Dimension::Location(row) => upsert_location(tx, row),
    Dimension::WeatherCondition(row) => upsert_condition(tx, row),
    Dimension::Actuator(row) => upsert_actuator(tx, row),
  }
}

fn upsert_location(tx: &Transaction<'_>, row: &LocationRow) -> rusqlite::Result<i64> {
  let returned: Option<i64> = tx
    .query_row(
      "INSERT INTO location (city_name, country_code, latitude, longitude, timezone_offset)
       VALUES (?1, ?2, ?3, ?4, ?5)
       ON CONFLICT (city_name, country_code) DO UPDATE SET
         latitude        = excluded.latitude,
         longitude       = excluded.longitude,
         timezone_offset = excluded.timezone_offset
       RETURNING location_id",
      rusqlite::params![
        row.city_name,
        row.country_code,
        row.latitude,
        row.longitude,
        row.timezone_offset,
      ],
      |r| r.get(0),
    )
    .optional()?;

  match returned {
    Some(id) => Ok(id),
    None => lookup_location(tx, &row.city_name, &row.country_code),
  }
}

fn upsert_condition(tx: &Transaction<'_>, row: &WeatherConditionRow) -> rusqlite::Result<i64> {
  let returned: Option<i64> = tx
    .query_row(
      "INSERT INTO weather_condition (external_condition_id, icon, main, description)
       VALUES (?1, ?2, ?3, ?4)
       ON CONFLICT (external_condition_id, icon) DO UPDATE SET
         main        = excluded.main,
         description = excluded.description
       RETURNING weather_condition_id",
      rusqlite::params![row.external_condition_id, row.icon, row.main, row.description],
      |r| r.get(0),
    )
    .optional()?;

  match returned {
    Some(id) => Ok(id),
    None => lookup_condition(tx, row.external_condition_id, &row.icon),
  }
}

fn upsert_actuator(tx: &Transaction<'_>, row: &ActuatorRow) -> rusqlite::Result<i64> {
  let returned: Option<i64> = tx
    .query_row(
      "INSERT INTO actuator (actuator_name, actuator_type)
       VALUES (?1, ?2)
       ON CONFLICT (actuator_name) DO UPDATE SET
         actuator_type = excluded.actuator_type
       RETURNING actuator_id",
      rusqlite::params![row.actuator_name, row.actuator_type],
      |r| r.get(0),
    )
    .optional()?;

  match returned {
    Some(id) => Ok(id),
    None => lookup_actuator(tx, &row.actuator_name),
  }
}

// Natural-key reads. SQLite's `DO UPDATE … RETURNING` always yields a row,
// so these only run on backends whose upsert can come back empty.

fn lookup_location(
  conn: &Connection,
  city_name: &str,
  country_code: &str,
) -> rusqlite::Result<i64> {
  conn.query_row(
    "SELECT location_id FROM location WHERE city_name = ?1 AND country_code = ?2",
    rusqlite::params![city_name, country_code],
    |r| r.get(0),
  )
}

fn lookup_condition(conn: &Connection, external_id: i64, icon: &str) -> rusqlite::Result<i64> {
  conn.query_row(
    "SELECT weather_condition_id FROM weather_condition
     WHERE external_condition_id = ?1 AND icon = ?2",
    rusqlite::params![external_id, icon],
    |r| r.get(0),
  )
}

fn lookup_actuator(conn: &Connection, actuator_name: &str) -> rusqlite::Result<i64> {
  conn.query_row(
    "SELECT actuator_id FROM actuator WHERE actuator_name = ?1",
    rusqlite::params![actuator_name],
    |r| r.get(0),
  )
}

// ── Fact inserts ─────────────────────────────────────────────────────────────
//
// `ON CONFLICT DO NOTHING` against the natural key: a redelivered fact
// changes zero rows and is reported as skipped, never as an error.

fn insert_weather_reading(
  tx: &Transaction<'_>,
  row: &WeatherReadingRow,
  location_id: i64,
  condition_id: i64,
  event_id: &str,
) -> rusqlite::Result<bool> {
  let changed = tx.execute(
    "INSERT INTO weather_reading (
       event_time, location_id, weather_condition_id,
       temperature, feels_like, temp_min, temp_max, pressure, humidity,
       sea_level, grnd_level, visibility, wind_speed, wind_deg, wind_gust,
       cloudiness, sunrise, sunset, event_id
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)
     ON CONFLICT DO NOTHING",
    rusqlite::params![
      encode_dt(row.event_time),
      location_id,
      condition_id,
      row.temperature,
      row.feels_like,
      row.temp_min,
      row.temp_max,
      row.pressure,
      row.humidity,
      row.sea_level,
      row.grnd_level,
      row.visibility,
      row.wind_speed,
      row.wind_deg,
      row.wind_gust,
      row.cloudiness,
      row.sunrise,
      row.sunset,
      event_id,
    ],
  )?;
  Ok(changed == 1)
}

fn insert_iot_reading(
  tx: &Transaction<'_>,
  row: &IotReadingRow,
  location_id: Option<i64>,
  event_id: &str,
) -> rusqlite::Result<bool> {
  let changed = tx.execute(
    "INSERT INTO iot_reading (
       event_time, location_id, temperature, humidity, water_level,
       nitrogen, phosphorus, potassium, event_id
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
     ON CONFLICT DO NOTHING",
    rusqlite::params![
      encode_dt(row.event_time),
      location_id,
      row.temperature,
      row.humidity,
      row.water_level,
      row.nitrogen,
      row.phosphorus,
      row.potassium,
      event_id,
    ],
  )?;
  Ok(changed == 1)
}

fn insert_actuator_event(
  tx: &Transaction<'_>,
  row: &ActuatorEventRow,
  actuator_id: i64,
  event_id: &str,
) -> rusqlite::Result<bool> {
  let changed = tx.execute(
    "INSERT INTO actuator_event (actuator_id, event_time, state, source, event_id)
     VALUES (?1, ?2, ?3, ?4, ?5)
     ON CONFLICT DO NOTHING",
    rusqlite::params![actuator_id, encode_dt(row.event_time), row.state, row.source, event_id],
  )?;
  Ok(changed == 1)
}

// ─── TelemetryStore impl ─────────────────────────────────────────────────────

impl TelemetryStore for SqliteStore {
  type Error = Error;

  fn is_transient(error: &Error) -> bool { error.is_transient() }

  async fn apply(&self, writes: WriteSet) -> Result<ApplyReport> {
    let event_id = writes.event_id.clone();
    let event_type = writes.event_type;

    let outcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        match apply_intents(&tx, &writes) {
          Ok(report) => {
            tx.commit()?;
            Ok(Ok(report))
          }
          // Dropping `tx` rolls back everything written so far.
          Err(ApplyFault::Unresolved(slot)) => Ok(Err(slot)),
          Err(ApplyFault::Sql(e)) => Err(e.into()),
        }
      })
      .await?;

    match outcome {
      Ok(report) => {
        tracing::debug!(
          event_id = %event_id,
          event_type = %event_type,
          dimensions = report.dimensions_upserted,
          inserted = report.facts_inserted,
          skipped = report.facts_skipped,
          "write set committed"
        );
        Ok(report)
      }
      Err(slot) => Err(Error::UnresolvedDimension { event_id, slot }),
    }
  }

  async fn latest_weather(&self) -> Result<Option<WeatherSnapshot>> {
    let raw: Option<RawWeatherSnapshot> = self
      .conn
      .call(|conn| {
        Ok(
          conn
            .query_row(
              "SELECT r.event_time, l.city_name, l.country_code, c.main,
                      r.temperature, r.humidity
               FROM weather_reading r
               JOIN location          l ON l.location_id          = r.location_id
               JOIN weather_condition c ON c.weather_condition_id = r.weather_condition_id
               ORDER BY r.event_time DESC, r.weather_reading_id DESC
               LIMIT 1",
              [],
              |row| {
                Ok(RawWeatherSnapshot {
                  event_time:   row.get(0)?,
                  city_name:    row.get(1)?,
                  country_code: row.get(2)?,
                  condition:    row.get(3)?,
                  temperature:  row.get(4)?,
                  humidity:     row.get(5)?,
                })
              },
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawWeatherSnapshot::into_snapshot).transpose()
  }

  async fn latest_iot(&self) -> Result<Option<IotSnapshot>> {
    let raw: Option<RawIotSnapshot> = self
      .conn
      .call(|conn| {
        Ok(
          conn
            .query_row(
              "SELECT event_time, temperature, humidity, water_level,
                      nitrogen, phosphorus, potassium
               FROM iot_reading
               ORDER BY event_time DESC, iot_reading_id DESC
               LIMIT 1",
              [],
              |row| {
                Ok(RawIotSnapshot {
                  event_time:  row.get(0)?,
                  temperature: row.get(1)?,
                  humidity:    row.get(2)?,
                  water_level: row.get(3)?,
                  nitrogen:    row.get(4)?,
                  phosphorus:  row.get(5)?,
                  potassium:   row.get(6)?,
                })
              },
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawIotSnapshot::into_snapshot).transpose()
  }
}
