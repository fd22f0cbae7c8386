//! Core types and trait definitions for the Agritel telemetry pipeline.
//!
//! This crate is deliberately free of HTTP and database dependencies. It owns
//! event identity, the typed payload shapes, routing, normalisation into
//! write sets, and threshold alerting. Storage backends implement
//! [`store::TelemetryStore`]; notification and secret backends implement the
//! traits in [`notify`] and [`secrets`].

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
#![allow(async_fn_in_trait)]

pub mod alert;
pub mod envelope;
pub mod error;
pub mod identity;
pub mod normalize;
pub mod notify;
pub mod payload;
pub mod reading;
pub mod router;
pub mod secrets;
pub mod store;
pub mod write;

pub use error::{Error, Result};
