//! Notifier implementations: the log sink and an HTTP webhook.

use std::{convert::Infallible, time::Duration};

use agritel_core::{notify::Notifier, secrets::SecretProvider};
use reqwest::Client;
use serde_json::json;
use thiserror::Error;

use crate::config::NotifyConfig;

#[derive(Debug, Error)]
pub enum NotifyError {
  #[error("webhook request failed: {0}")]
  Http(#[from] reqwest::Error),

  #[error("secret {0:?} is not configured")]
  MissingSecret(String),
}

// ─── Log ─────────────────────────────────────────────────────────────────────

/// Writes each notification to the log at `WARN`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
  type Error = Infallible;

  async fn notify(&self, subject: &str, body: &str) -> Result<(), Self::Error> {
    tracing::warn!(subject, body, "alert notification");
    Ok(())
  }
}

// ─── Webhook ─────────────────────────────────────────────────────────────────

/// POSTs `{"subject": .., "body": ..}` to a fixed URL.
///
/// Cheap to clone; the inner [`reqwest::Client`] is `Arc`-based.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
  client:  Client,
  url:     String,
  api_key: Option<String>,
}

impl WebhookNotifier {
  pub fn new(
    url: impl Into<String>,
    timeout: Duration,
    api_key: Option<String>,
  ) -> Result<Self, NotifyError> {
    let client = Client::builder().timeout(timeout).build()?;
    Ok(Self { client, url: url.into(), api_key })
  }
}

impl Notifier for WebhookNotifier {
  type Error = NotifyError;

  async fn notify(&self, subject: &str, body: &str) -> Result<(), Self::Error> {
    let mut req = self
      .client
      .post(&self.url)
      .json(&json!({ "subject": subject, "body": body }));
    if let Some(key) = &self.api_key {
      req = req.bearer_auth(key);
    }
    req.send().await?.error_for_status()?;
    tracing::debug!(url = %self.url, subject, "webhook delivered");
    Ok(())
  }
}

// ─── Selection ───────────────────────────────────────────────────────────────

/// The notifier chosen by configuration.
#[derive(Debug, Clone)]
pub enum ConfiguredNotifier {
  Log(LogNotifier),
  Webhook(WebhookNotifier),
}

impl ConfiguredNotifier {
  /// A webhook when `webhook_url` is set, otherwise the log sink.
  ///
  /// A named but missing API key secret is a configuration error.
  pub fn from_config(
    config: &NotifyConfig,
    secrets: &impl SecretProvider,
  ) -> Result<Self, NotifyError> {
    let Some(url) = &config.webhook_url else {
      return Ok(Self::Log(LogNotifier));
    };
    let api_key = match &config.api_key_secret {
      Some(name) => {
        Some(secrets.secret(name).ok_or_else(|| NotifyError::MissingSecret(name.clone()))?)
      }
      None => None,
    };
    Ok(Self::Webhook(WebhookNotifier::new(url.clone(), config.timeout(), api_key)?))
  }
}

impl Notifier for ConfiguredNotifier {
  type Error = NotifyError;

  async fn notify(&self, subject: &str, body: &str) -> Result<(), Self::Error> {
    match self {
      Self::Log(log) => match log.notify(subject, body).await {
        Ok(()) => Ok(()),
        Err(never) => match never {},
      },
      Self::Webhook(hook) => hook.notify(subject, body).await,
    }
  }
}
