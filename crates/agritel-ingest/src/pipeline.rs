//! The per-envelope worker: validate, route, apply, then alert.
//!
//! One envelope is one unit of work. Its writes commit or roll back
//! together; alert evaluation and delivery happen afterwards and cannot undo
//! or fail the commit.

use std::{sync::Arc, time::Duration};

use agritel_core::{
  alert::{self, Alert, Thresholds},
  envelope::{Envelope, EventType},
  identity::Origin,
  notify::Notifier,
  router::{self, Route},
  store::TelemetryStore,
  write::ApplyReport,
};
use serde_json::Value;

use crate::IngestError;

pub const DEFAULT_DB_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_NOTIFY_TIMEOUT: Duration = Duration::from_secs(5);

/// Result of processing one envelope.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
  Applied {
    event_id:   String,
    event_type: EventType,
    report:     ApplyReport,
    /// Alerts raised by the post-commit evaluation; empty if it failed.
    alerts:     Vec<Alert>,
  },
  /// Unknown or missing event type; nothing was written.
  Dropped {
    event_id:   String,
    event_type: Option<String>,
  },
}

pub struct Pipeline<S, N> {
  store:          Arc<S>,
  notifier:       Arc<N>,
  thresholds:     Thresholds,
  db_timeout:     Duration,
  notify_timeout: Duration,
  subject_prefix: String,
}

impl<S, N> Pipeline<S, N>
where
  S: TelemetryStore,
  N: Notifier,
{
  pub fn new(store: Arc<S>, notifier: Arc<N>) -> Self {
    Self {
      store,
      notifier,
      thresholds: Thresholds::default(),
      db_timeout: DEFAULT_DB_TIMEOUT,
      notify_timeout: DEFAULT_NOTIFY_TIMEOUT,
      subject_prefix: "Agritel".to_string(),
    }
  }

  pub fn with_thresholds(mut self, thresholds: Thresholds) -> Self {
    self.thresholds = thresholds;
    self
  }

  pub fn with_timeouts(mut self, db: Duration, notify: Duration) -> Self {
    self.db_timeout = db;
    self.notify_timeout = notify;
    self
  }

  pub fn with_subject_prefix(mut self, prefix: impl Into<String>) -> Self {
    self.subject_prefix = prefix.into();
    self
  }

  pub fn store(&self) -> &S { &self.store }

  /// Build an envelope for a raw payload and process it.
  pub async fn process_raw(
    &self,
    origin: &Origin,
    event_type: EventType,
    payload: Value,
  ) -> Result<Outcome, IngestError> {
    let envelope = Envelope::build(origin, event_type, payload)?;
    self.process(envelope).await
  }

  /// Process one envelope end to end.
  ///
  /// Safe to call any number of times with the same envelope: redelivery
  /// adds no rows and leaves dimension ids unchanged.
  pub async fn process(&self, envelope: Envelope) -> Result<Outcome, IngestError> {
    if let Err(e) = envelope.validate() {
      tracing::warn!(
        event_id = %envelope.event_id,
        event_type = envelope.type_label(),
        error = %e,
        "rejecting invalid envelope"
      );
      return Err(e.into());
    }

    let writes = match router::route(&envelope) {
      Ok(Route::Write(writes)) => writes,
      Ok(Route::Dropped { event_type }) => {
        return Ok(Outcome::Dropped { event_id: envelope.event_id, event_type });
      }
      Err(e) => {
        tracing::warn!(
          event_id = %envelope.event_id,
          event_type = envelope.type_label(),
          error = %e,
          "rejecting malformed payload"
        );
        return Err(e.into());
      }
    };

    let event_type = writes.event_type;
    let event_id = envelope.event_id;

    let report = match tokio::time::timeout(self.db_timeout, self.store.apply(writes)).await {
      Ok(Ok(report)) => report,
      Ok(Err(e)) => {
        let retryable = S::is_transient(&e);
        tracing::warn!(
          %event_id,
          %event_type,
          retryable,
          error = %e,
          "store rejected envelope, rolled back"
        );
        return Err(IngestError::Store { source: Box::new(e), retryable });
      }
      Err(_) => {
        tracing::warn!(%event_id, %event_type, after = ?self.db_timeout, "store apply timed out");
        return Err(IngestError::Timeout { operation: "store apply", after: self.db_timeout });
      }
    };

    tracing::info!(
      %event_id,
      %event_type,
      dimensions = report.dimensions_upserted,
      inserted = report.facts_inserted,
      skipped = report.facts_skipped,
      "envelope applied"
    );

    let alerts = self.alert(&event_id, event_type).await;
    Ok(Outcome::Applied { event_id, event_type, report, alerts })
  }

  /// Evaluate thresholds and send at most one notification. Failures are
  /// logged and swallowed.
  async fn alert(&self, event_id: &str, event_type: EventType) -> Vec<Alert> {
    let evaluated =
      tokio::time::timeout(self.db_timeout, alert::evaluate(&*self.store, &self.thresholds)).await;
    let alerts = match evaluated {
      Ok(Ok(alerts)) => alerts,
      Ok(Err(e)) => {
        tracing::error!(event_id, %event_type, error = %e, "alert evaluation failed");
        return Vec::new();
      }
      Err(_) => {
        tracing::error!(event_id, %event_type, "alert evaluation timed out");
        return Vec::new();
      }
    };
    if alerts.is_empty() {
      return alerts;
    }

    for a in &alerts {
      tracing::info!(event_id, %event_type, alert = ?a.kind, value = a.value, "threshold crossed");
    }

    let sent = tokio::time::timeout(
      self.notify_timeout,
      alert::dispatch(&*self.notifier, &self.subject_prefix, &alerts),
    )
    .await;
    match sent {
      Ok(Ok(_)) => {}
      Ok(Err(e)) => {
        tracing::error!(event_id, %event_type, error = %e, "alert notification failed");
      }
      Err(_) => {
        tracing::error!(
          event_id,
          %event_type,
          after = ?self.notify_timeout,
          "alert notification timed out"
        );
      }
    }
    alerts
  }
}
