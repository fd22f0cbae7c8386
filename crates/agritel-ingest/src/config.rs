//! Worker configuration.
//!
//! Layered with the `config` crate: an optional TOML file first, then
//! environment variables prefixed `AGRITEL_`, with `__` separating nested
//! keys (`AGRITEL_HTTP__PORT=9000`, `AGRITEL_THRESHOLDS__WATER_LEVEL_LOW=25`).

use std::{collections::HashMap, path::Path, time::Duration};

use agritel_core::alert::Thresholds;
use serde::Deserialize;

pub const ENV_PREFIX: &str = "AGRITEL";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
  pub store_path:      String,
  /// Upper bound on one store transaction, in milliseconds.
  pub db_timeout_ms:   u64,
  /// How long SQLite waits on a locked database before failing.
  pub busy_timeout_ms: u64,
  pub http:            HttpConfig,
  pub notify:          NotifyConfig,
  pub thresholds:      Thresholds,
  /// Inline secrets, consulted before `AGRITEL_SECRET_*` variables.
  pub secrets:         HashMap<String, String>,
}

impl Default for IngestConfig {
  fn default() -> Self {
    Self {
      store_path:      "agritel.db".to_string(),
      db_timeout_ms:   10_000,
      busy_timeout_ms: 5_000,
      http:            HttpConfig::default(),
      notify:          NotifyConfig::default(),
      thresholds:      Thresholds::default(),
      secrets:         HashMap::new(),
    }
  }
}

impl IngestConfig {
  pub fn db_timeout(&self) -> Duration { Duration::from_millis(self.db_timeout_ms) }

  pub fn busy_timeout(&self) -> Duration { Duration::from_millis(self.busy_timeout_ms) }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
  pub host: String,
  pub port: u16,
}

impl Default for HttpConfig {
  fn default() -> Self { Self { host: "127.0.0.1".to_string(), port: 8080 } }
}

impl HttpConfig {
  pub fn address(&self) -> String { format!("{}:{}", self.host, self.port) }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
  /// When unset, alerts are written to the log instead.
  pub webhook_url:    Option<String>,
  /// Prefix of every notification subject.
  pub subject:        String,
  pub timeout_ms:     u64,
  /// Name of the secret holding the webhook bearer token.
  pub api_key_secret: Option<String>,
}

impl Default for NotifyConfig {
  fn default() -> Self {
    Self {
      webhook_url:    None,
      subject:        "Agritel".to_string(),
      timeout_ms:     5_000,
      api_key_secret: None,
    }
  }
}

impl NotifyConfig {
  pub fn timeout(&self) -> Duration { Duration::from_millis(self.timeout_ms) }
}

/// Read `path` (if it exists) and the environment into an [`IngestConfig`].
pub fn load(path: &Path) -> Result<IngestConfig, config::ConfigError> {
  config::Config::builder()
    .add_source(config::File::from(path).required(false))
    .add_source(
      config::Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true),
    )
    .build()?
    .try_deserialize()
}
