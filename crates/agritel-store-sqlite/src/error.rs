//! Error type for `agritel-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  /// A fact referenced a dimension that was not upserted earlier in the same
  /// write set. The whole envelope was rolled back.
  #[error("write set for event {event_id} references unresolved dimension slot {slot}")]
  UnresolvedDimension { event_id: String, slot: usize },
}

impl Error {
  /// Whether retrying the same envelope later may succeed.
  ///
  /// Lock contention, I/O trouble and a closed connection are transient.
  /// Constraint violations, type mismatches and unresolved slots fail the
  /// same way on every redelivery.
  pub fn is_transient(&self) -> bool {
    match self {
      Self::Database(tokio_rusqlite::Error::Rusqlite(e)) => sqlite_transient(e),
      Self::Database(tokio_rusqlite::Error::Close((_, e))) => sqlite_transient(e),
      Self::Database(_) => true,
      Self::DateParse(_) | Self::UnresolvedDimension { .. } => false,
    }
  }
}

fn sqlite_transient(e: &rusqlite::Error) -> bool {
  use rusqlite::ErrorCode::*;

  match e.sqlite_error_code() {
    Some(
      DatabaseBusy | DatabaseLocked | SystemIoFailure | DiskFull | OutOfMemory | CannotOpen
      | OperationInterrupted | SchemaChanged,
    ) => true,
    Some(_) => false,
    // Binding and conversion errors raised before SQLite saw the statement.
    None => false,
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
