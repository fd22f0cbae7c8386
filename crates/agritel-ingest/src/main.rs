//! `agritel` worker binary.
//!
//! Reads `agritel.toml` (or the path given with `--config`) plus `AGRITEL_*`
//! environment overrides, opens the SQLite store, and then either serves the
//! HTTP ingest endpoint, ingests one JSONL file, or prints table counts.

use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use agritel_core::{envelope::EventType, secrets::CachedSecrets};
use agritel_ingest::{
  Pipeline,
  batch,
  config::{self, IngestConfig},
  http,
  notify::ConfiguredNotifier,
  secrets::ConfigSecrets,
};
use agritel_store_sqlite::SqliteStore;
use anyhow::Context as _;
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Agritel telemetry ingestion worker")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "agritel.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Serve `POST /ingest` and `GET /health`.
  Serve,
  /// Ingest a file of newline-delimited JSON payloads.
  IngestFile {
    path:       PathBuf,
    /// Declared type of every line: `weather` or `iot`.
    #[arg(long, value_parser = parse_event_type)]
    event_type: EventType,
  },
  /// Print row counts for every table as JSON.
  Stats,
}

fn parse_event_type(s: &str) -> Result<EventType, String> {
  EventType::parse(s).ok_or_else(|| format!("unknown event type {s:?} (expected weather or iot)"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  // Initialise tracing.
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  let cfg = config::load(&cli.config)
    .with_context(|| format!("failed to load configuration from {:?}", cli.config))?;

  let store_path = expand_tilde(Path::new(&cfg.store_path));
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;
  store
    .set_busy_timeout(cfg.busy_timeout())
    .await
    .context("failed to set busy timeout")?;

  match cli.command {
    Command::Stats => {
      let stats = store.stats().await.context("failed to count rows")?;
      println!("{}", serde_json::to_string_pretty(&stats)?);
    }
    Command::IngestFile { path, event_type } => {
      let pipeline = build_pipeline(&cfg, store)?;
      let report = batch::ingest_file(&pipeline, &path, event_type)
        .await
        .with_context(|| format!("failed to read {path:?}"))?;
      println!("{}", serde_json::to_string_pretty(&report)?);
    }
    Command::Serve => {
      let pipeline = Arc::new(build_pipeline(&cfg, store)?);
      let app = http::router(pipeline);
      let address = cfg.http.address();

      tracing::info!("Listening on http://{address}");
      let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind {address}"))?;
      axum::serve(listener, app).await.context("server error")?;
    }
  }

  Ok(())
}

fn build_pipeline(
  cfg: &IngestConfig,
  store: SqliteStore,
) -> anyhow::Result<Pipeline<SqliteStore, ConfiguredNotifier>> {
  let secrets = CachedSecrets::new(ConfigSecrets::new(cfg.secrets.clone()));
  let notifier = ConfiguredNotifier::from_config(&cfg.notify, &secrets)
    .context("failed to configure notifier")?;
  if matches!(notifier, ConfiguredNotifier::Log(_)) {
    tracing::info!("no webhook configured, alerts will be logged");
  }

  Ok(
    Pipeline::new(Arc::new(store), Arc::new(notifier))
      .with_thresholds(cfg.thresholds.clone())
      .with_timeouts(cfg.db_timeout(), cfg.notify.timeout())
      .with_subject_prefix(cfg.notify.subject.clone()),
  )
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
