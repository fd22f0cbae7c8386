//! SQL schema for the Agritel SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`. The natural-key uniqueness constraints below are
//! the dedup surface: changing them changes what counts as a redelivery.

/// Full schema DDL; idempotent thanks to `IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- Dimensions: created on first sight, attributes refreshed on every
-- occurrence, surrogate id stable.
CREATE TABLE IF NOT EXISTS location (
    location_id      INTEGER PRIMARY KEY AUTOINCREMENT,
    city_name        TEXT    NOT NULL,
    country_code     TEXT    NOT NULL,
    latitude         REAL    NOT NULL,
    longitude        REAL    NOT NULL,
    timezone_offset  INTEGER,           -- seconds from UTC
    UNIQUE (city_name, country_code)
);

CREATE TABLE IF NOT EXISTS weather_condition (
    weather_condition_id  INTEGER PRIMARY KEY AUTOINCREMENT,
    external_condition_id INTEGER NOT NULL,
    icon                  TEXT    NOT NULL,
    main                  TEXT    NOT NULL,
    description           TEXT    NOT NULL,
    UNIQUE (external_condition_id, icon)
);

CREATE TABLE IF NOT EXISTS actuator (
    actuator_id    INTEGER PRIMARY KEY AUTOINCREMENT,
    actuator_name  TEXT NOT NULL UNIQUE,
    actuator_type  TEXT NOT NULL
);

-- Facts: inserted once, never updated or deleted by the pipeline.
CREATE TABLE IF NOT EXISTS weather_reading (
    weather_reading_id   INTEGER PRIMARY KEY AUTOINCREMENT,
    event_time           TEXT    NOT NULL,  -- RFC 3339 UTC, fixed width
    location_id          INTEGER NOT NULL REFERENCES location(location_id),
    weather_condition_id INTEGER NOT NULL REFERENCES weather_condition(weather_condition_id),
    temperature          REAL    NOT NULL,  -- upstream units
    feels_like           REAL,
    temp_min             REAL,
    temp_max             REAL,
    pressure             REAL,
    humidity             REAL,
    sea_level            REAL,
    grnd_level           REAL,
    visibility           INTEGER,
    wind_speed           REAL,
    wind_deg             REAL,
    wind_gust            REAL,
    cloudiness           REAL,
    sunrise              INTEGER,
    sunset               INTEGER,
    event_id             TEXT    NOT NULL,  -- first envelope to record it
    UNIQUE (event_time, location_id, weather_condition_id)
);

CREATE TABLE IF NOT EXISTS iot_reading (
    iot_reading_id  INTEGER PRIMARY KEY AUTOINCREMENT,
    event_time      TEXT    NOT NULL,
    location_id     INTEGER REFERENCES location(location_id),  -- NULL until geo-resolved
    temperature     REAL,
    humidity        REAL,
    water_level     REAL,
    nitrogen        REAL,
    phosphorus      REAL,
    potassium       REAL,
    event_id        TEXT    NOT NULL
);

-- NULLs are distinct in a plain UNIQUE constraint; fold them so readings
-- without a location still deduplicate on event_time.
CREATE UNIQUE INDEX IF NOT EXISTS iot_reading_natural_key
    ON iot_reading (event_time, IFNULL(location_id, -1));

-- Sensor rows without an observation time are stamped at ingestion, so the
-- natural key alone does not catch a re-ingested line. The envelope id does.
CREATE UNIQUE INDEX IF NOT EXISTS iot_reading_event_id
    ON iot_reading (event_id);

CREATE TABLE IF NOT EXISTS actuator_event (
    actuator_event_id  INTEGER PRIMARY KEY AUTOINCREMENT,
    actuator_id        INTEGER NOT NULL REFERENCES actuator(actuator_id),
    event_time         TEXT    NOT NULL,
    state              INTEGER NOT NULL CHECK (state IN (0, 1)),
    source             TEXT    NOT NULL,
    event_id           TEXT    NOT NULL,
    UNIQUE (event_time, actuator_id, state)
);

CREATE UNIQUE INDEX IF NOT EXISTS actuator_event_event_id
    ON actuator_event (event_id, actuator_id);

CREATE INDEX IF NOT EXISTS weather_reading_time_idx ON weather_reading(event_time);
CREATE INDEX IF NOT EXISTS iot_reading_time_idx     ON iot_reading(event_time);

PRAGMA user_version = 2;
";
