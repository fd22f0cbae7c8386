//! Error type for one envelope's trip through the pipeline.
//!
//! A failure here is isolated to its envelope. Alerting failures never show
//! up as an `IngestError`; they are logged and swallowed after commit.

use std::time::Duration;

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
  /// Malformed envelope or payload. Drop it; redelivery will not help.
  #[error("invalid envelope: {0}")]
  Validation(#[from] agritel_core::Error),

  /// The store rejected or failed the unit of work. Nothing was committed.
  /// `retryable` is the backend's verdict on whether redelivery can succeed.
  #[error("store error: {source}")]
  Store {
    #[source]
    source:    Box<dyn std::error::Error + Send + Sync>,
    retryable: bool,
  },

  /// A bounded outbound call ran out of time.
  #[error("{operation} timed out after {after:?}")]
  Timeout { operation: &'static str, after: Duration },
}

impl IngestError {
  /// Whether the transport should redeliver this envelope.
  pub fn is_retryable(&self) -> bool {
    match self {
      Self::Validation(_) => false,
      Self::Store { retryable, .. } => *retryable,
      Self::Timeout { .. } => true,
    }
  }

  /// Short label for structured logs.
  pub fn kind(&self) -> &'static str {
    match self {
      Self::Validation(_) => "validation",
      Self::Store { retryable: true, .. } => "store",
      Self::Store { retryable: false, .. } => "store_rejected",
      Self::Timeout { .. } => "timeout",
    }
  }

  fn status(&self) -> StatusCode {
    match self {
      Self::Validation(_) => StatusCode::BAD_REQUEST,
      Self::Store { retryable: false, .. } => StatusCode::UNPROCESSABLE_ENTITY,
      Self::Store { retryable: true, .. } | Self::Timeout { .. } => {
        StatusCode::SERVICE_UNAVAILABLE
      }
    }
  }
}

impl IntoResponse for IngestError {
  fn into_response(self) -> Response {
    let status = self.status();
    let body = json!({ "error": self.to_string(), "kind": self.kind() });
    (status, Json(body)).into_response()
  }
}
