//! JSONL batch ingestion.
//!
//! Each non-empty line is one raw payload of a single declared type. The
//! origin of a line is (file name, 1-based line number), so re-running the
//! same file reproduces the same event ids and adds nothing. Lines without an
//! observation time are stamped at ingestion; the store dedupes those on
//! their event id.

use std::path::Path;

use agritel_core::{
  envelope::EventType,
  identity::Origin,
  notify::Notifier,
  store::TelemetryStore,
  write::ApplyReport,
};
use serde::Serialize;
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};

use crate::{Outcome, Pipeline};

/// Per-batch tallies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
  pub lines:         usize,
  pub applied:       usize,
  pub dropped:       usize,
  pub skipped_empty: usize,
  /// Lines that are not JSON, or that can never be stored as written.
  pub rejected:      usize,
  /// Transient store failures and timeouts; worth re-running.
  pub failed:        usize,
  pub alerts_fired:  usize,
  pub writes:        ApplyReport,
}

/// Feed every line of `reader` through `pipeline`.
///
/// Per-line failures are counted and logged; only an I/O error on the reader
/// itself stops the batch.
pub async fn ingest_lines<S, N, R>(
  pipeline: &Pipeline<S, N>,
  source: &str,
  event_type: EventType,
  reader: R,
) -> std::io::Result<BatchReport>
where
  S: TelemetryStore,
  N: Notifier,
  R: AsyncBufRead + Unpin,
{
  let mut report = BatchReport::default();
  let mut lines = reader.lines();
  let mut line_no = 0u64;

  while let Some(line) = lines.next_line().await? {
    line_no += 1;
    report.lines += 1;

    let line = line.trim();
    if line.is_empty() {
      report.skipped_empty += 1;
      continue;
    }

    let payload: Value = match serde_json::from_str(line) {
      Ok(v) => v,
      Err(e) => {
        tracing::warn!(source, line = line_no, error = %e, "skipping line that is not JSON");
        report.rejected += 1;
        continue;
      }
    };

    match pipeline.process_raw(&Origin::new(source, line_no), event_type, payload).await {
      Ok(Outcome::Applied { report: writes, alerts, .. }) => {
        report.applied += 1;
        report.alerts_fired += alerts.len();
        report.writes.merge(writes);
      }
      Ok(Outcome::Dropped { .. }) => report.dropped += 1,
      Err(e) if !e.is_retryable() => {
        tracing::warn!(source, line = line_no, kind = e.kind(), error = %e, "rejected line");
        report.rejected += 1;
      }
      Err(e) => {
        tracing::error!(source, line = line_no, error = %e, "line failed");
        report.failed += 1;
      }
    }
  }

  tracing::info!(
    source,
    lines = report.lines,
    applied = report.applied,
    rejected = report.rejected,
    failed = report.failed,
    "batch finished"
  );
  Ok(report)
}

/// Open `path` and ingest it; the file name is the origin source.
pub async fn ingest_file<S, N>(
  pipeline: &Pipeline<S, N>,
  path: &Path,
  event_type: EventType,
) -> std::io::Result<BatchReport>
where
  S: TelemetryStore,
  N: Notifier,
{
  let file = tokio::fs::File::open(path).await?;
  let source = path
    .file_name()
    .map(|n| n.to_string_lossy().into_owned())
    .unwrap_or_else(|| path.display().to_string());
  ingest_lines(pipeline, &source, event_type, BufReader::new(file)).await
}
