//! HTTP ingest endpoint.
//!
//! `POST /ingest` takes one envelope as JSON. Applied and dropped envelopes
//! both answer `202 Accepted`; validation failures answer `400` and
//! retryable failures `503`, which tells the transport to redeliver.

use std::sync::Arc;

use agritel_core::{envelope::Envelope, notify::Notifier, store::TelemetryStore};
use axum::{
  Json, Router,
  extract::State,
  http::StatusCode,
  routing::{get, post},
};
use serde_json::{Value, json};
use tower_http::trace::TraceLayer;

use crate::{IngestError, Outcome, Pipeline};

pub fn router<S, N>(pipeline: Arc<Pipeline<S, N>>) -> Router
where
  S: TelemetryStore + 'static,
  N: Notifier + 'static,
{
  Router::new()
    .route("/ingest", post(ingest::<S, N>))
    .route("/health", get(health))
    .layer(TraceLayer::new_for_http())
    .with_state(pipeline)
}

async fn health() -> Json<Value> { Json(json!({ "status": "ok" })) }

async fn ingest<S, N>(
  State(pipeline): State<Arc<Pipeline<S, N>>>,
  Json(body): Json<Value>,
) -> Result<(StatusCode, Json<Value>), IngestError>
where
  S: TelemetryStore + 'static,
  N: Notifier + 'static,
{
  let envelope: Envelope = serde_json::from_value(body).map_err(|e| {
    IngestError::Validation(agritel_core::Error::validation(format!("malformed envelope: {e}")))
  })?;

  let body = match pipeline.process(envelope).await? {
    Outcome::Applied { event_id, event_type, report, alerts } => json!({
      "status":         "applied",
      "event_id":       event_id,
      "event_type":     event_type,
      "facts_inserted": report.facts_inserted,
      "facts_skipped":  report.facts_skipped,
      "alerts":         alerts.len(),
    }),
    Outcome::Dropped { event_id, event_type } => json!({
      "status":     "dropped",
      "event_id":   event_id,
      "event_type": event_type,
    }),
  };
  Ok((StatusCode::ACCEPTED, Json(body)))
}

#[cfg(test)]
mod tests {
  use agritel_core::{envelope::EventType, identity::Origin};
  use agritel_store_sqlite::SqliteStore;
  use axum::{
    body::Body,
    http::{Request, header},
  };
  use tower::ServiceExt as _;

  use super::*;
  use crate::notify::LogNotifier;

  async fn app() -> Router {
    let store = SqliteStore::open_in_memory().await.unwrap();
    router(Arc::new(Pipeline::new(Arc::new(store), Arc::new(LogNotifier))))
  }

  fn envelope() -> Envelope {
    Envelope::build(
      &Origin::new("gateway-3", 41),
      EventType::Iot,
      json!({ "measurement_time": "2024-03-01T10:00:00Z", "temperature": 21.5, "water_level": 48.0 }),
    )
    .unwrap()
  }

  async fn post_json(app: Router, body: String) -> (StatusCode, Value) {
    let req = Request::builder()
      .method("POST")
      .uri("/ingest")
      .header(header::CONTENT_TYPE, "application/json")
      .body(Body::from(body))
      .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
  }

  #[tokio::test]
  async fn health_is_ok() {
    let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let resp = app().await.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
  }

  #[tokio::test]
  async fn envelope_is_accepted_once_and_redelivery_is_harmless() {
    let app = app().await;
    let body = serde_json::to_string(&envelope()).unwrap();

    let (status, first) = post_json(app.clone(), body.clone()).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(first["status"], "applied");
    assert_eq!(first["facts_inserted"], 1);

    let (status, second) = post_json(app, body).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(second["event_id"], first["event_id"]);
    assert_eq!(second["facts_inserted"], 0);
    assert_eq!(second["facts_skipped"], 1);
  }

  #[tokio::test]
  async fn unknown_type_is_accepted_and_dropped() {
    let mut envelope = envelope();
    envelope.event_type = Some("firmware".into());
    let (status, body) = post_json(app().await, serde_json::to_string(&envelope).unwrap()).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["status"], "dropped");
    assert_eq!(body["event_type"], "firmware");
  }

  #[tokio::test]
  async fn invalid_event_id_is_a_bad_request() {
    let mut envelope = envelope();
    envelope.event_id = "ABC".into();
    let (status, body) = post_json(app().await, serde_json::to_string(&envelope).unwrap()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "validation");
  }

  #[tokio::test]
  async fn envelope_missing_fields_is_a_bad_request() {
    let (status, _) = post_json(app().await, json!({ "payload": {} }).to_string()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
  }
}
