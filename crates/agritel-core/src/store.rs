//! The `TelemetryStore` trait.
//!
//! Implemented by storage backends (e.g. `agritel-store-sqlite`). The backend
//! is the only component with write access to the six telemetry tables.

use std::future::Future;

use crate::{
  reading::{IotSnapshot, WeatherSnapshot},
  write::{ApplyReport, WriteSet},
};

/// Abstraction over the relational telemetry store.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes.
pub trait TelemetryStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Apply every intent in `writes` inside one atomic transaction.
  ///
  /// Dimension upserts update mutable attributes on natural-key conflict and
  /// resolve to the existing surrogate id. Fact inserts that hit an existing
  /// natural key are silent no-ops. Either every intent commits or none does.
  fn apply(
    &self,
    writes: WriteSet,
  ) -> impl Future<Output = Result<ApplyReport, Self::Error>> + Send + '_;

  /// The most recent weather reading by event time, if any.
  fn latest_weather(
    &self,
  ) -> impl Future<Output = Result<Option<WeatherSnapshot>, Self::Error>> + Send + '_;

  /// The most recent IoT reading by event time, if any.
  fn latest_iot(
    &self,
  ) -> impl Future<Output = Result<Option<IotSnapshot>, Self::Error>> + Send + '_;

  /// Whether `error` may clear up if the same envelope is redelivered.
  ///
  /// Backends that cannot tell answer `true` and let the transport retry.
  fn is_transient(error: &Self::Error) -> bool {
    let _ = error;
    true
  }
}
