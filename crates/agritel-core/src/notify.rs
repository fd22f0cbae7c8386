//! Outbound notification sink.
//!
//! Delivery is best-effort: callers log failures and carry on. Nothing in the
//! ingestion path waits on or retries a notification.

use std::future::Future;

/// Accepts a subject and body and makes one delivery attempt.
pub trait Notifier: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  fn notify<'a>(
    &'a self,
    subject: &'a str,
    body: &'a str,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;
}
