//! Error types for `agritel-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// Malformed or unparseable envelope or payload. The caller drops the
  /// record and moves on.
  #[error("validation error: {0}")]
  Validation(String),

  #[error("payload does not match the {kind} shape: {source}")]
  PayloadShape {
    kind:   &'static str,
    #[source]
    source: serde_json::Error,
  },

  #[error("unparseable timestamp in field {field:?}: {value}")]
  Timestamp { field: &'static str, value: String },

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

impl Error {
  pub fn validation(msg: impl Into<String>) -> Self { Self::Validation(msg.into()) }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
