//! Ingestion worker for Agritel.
//!
//! Wires the pure core (routing, normalisation, alerting) to a concrete
//! store and notifier: one envelope in, one transaction out, then a
//! best-effort alert pass. Also hosts the entry points that feed envelopes
//! in: JSONL batch files and an HTTP endpoint.

pub mod batch;
pub mod config;
pub mod error;
pub mod http;
pub mod notify;
pub mod pipeline;
pub mod secrets;

pub use error::IngestError;
pub use pipeline::{Outcome, Pipeline};
