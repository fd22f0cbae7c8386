//! Config-backed [`SecretProvider`].

use std::collections::HashMap;

use agritel_core::secrets::SecretProvider;

use crate::config::ENV_PREFIX;

/// Looks a secret up in the `[secrets]` table, then in
/// `AGRITEL_SECRET_<NAME>` with the name upper-cased and `-`/`.` mapped to
/// `_`.
#[derive(Debug, Clone, Default)]
pub struct ConfigSecrets {
  table: HashMap<String, String>,
}

impl ConfigSecrets {
  pub fn new(table: HashMap<String, String>) -> Self { Self { table } }
}

pub fn env_key(name: &str) -> String {
  let name: String = name
    .chars()
    .map(|c| match c {
      '-' | '.' => '_',
      c => c.to_ascii_uppercase(),
    })
    .collect();
  format!("{ENV_PREFIX}_SECRET_{name}")
}

impl SecretProvider for ConfigSecrets {
  fn secret(&self, name: &str) -> Option<String> {
    if let Some(value) = self.table.get(name) {
      return Some(value.clone());
    }
    let value = std::env::var(env_key(name)).ok().filter(|v| !v.is_empty());
    if value.is_none() {
      tracing::debug!(secret = name, "secret not configured");
    }
    value
  }
}
