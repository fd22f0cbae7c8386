//! SQLite backend for the Agritel telemetry store.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. This crate is the idempotent upsert
//! executor: every write set is applied in one `BEGIN IMMEDIATE` transaction
//! whose conflict handling is backed by natural-key uniqueness constraints.

mod encode;
mod schema;
mod store;

pub mod error;

pub use encode::LocationRecord;
pub use error::{Error, Result};
pub use store::{SqliteStore, StoreStats};

#[cfg(test)]
mod tests;
