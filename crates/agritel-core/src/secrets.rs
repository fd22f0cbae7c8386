//! Secret / configuration lookup.
//!
//! The core asks for secrets by name and never talks to a vault SDK itself.
//! [`CachedSecrets`] memoises any provider for the life of the process.

use std::{collections::HashMap, sync::RwLock};

/// Synchronous lookup of a named secret. `None` means "not configured".
pub trait SecretProvider: Send + Sync {
  fn secret(&self, name: &str) -> Option<String>;
}

/// Wraps a provider and remembers every answer, including misses.
pub struct CachedSecrets<P> {
  inner: P,
  cache: RwLock<HashMap<String, Option<String>>>,
}

impl<P: SecretProvider> CachedSecrets<P> {
  pub fn new(inner: P) -> Self { Self { inner, cache: RwLock::new(HashMap::new()) } }
}

impl<P: SecretProvider> SecretProvider for CachedSecrets<P> {
  fn secret(&self, name: &str) -> Option<String> {
    if let Ok(cache) = self.cache.read()
      && let Some(hit) = cache.get(name)
    {
      return hit.clone();
    }
    let value = self.inner.secret(name);
    if let Ok(mut cache) = self.cache.write() {
      cache.entry(name.to_owned()).or_insert_with(|| value.clone());
    }
    value
  }
}

impl SecretProvider for HashMap<String, String> {
  fn secret(&self, name: &str) -> Option<String> { self.get(name).cloned() }
}

#[cfg(test)]
mod tests {
  use std::sync::atomic::{AtomicUsize, Ordering};

  use super::*;

  struct Counting {
    calls: AtomicUsize,
  }

  impl SecretProvider for Counting {
    fn secret(&self, name: &str) -> Option<String> {
      self.calls.fetch_add(1, Ordering::SeqCst);
      (name == "weather-api-key").then(|| "k3y".to_owned())
    }
  }

  #[test]
  fn lookups_hit_the_provider_once() {
    let cached = CachedSecrets::new(Counting { calls: AtomicUsize::new(0) });
    assert_eq!(cached.secret("weather-api-key").as_deref(), Some("k3y"));
    assert_eq!(cached.secret("weather-api-key").as_deref(), Some("k3y"));
    assert_eq!(cached.secret("missing"), None);
    assert_eq!(cached.secret("missing"), None);
    assert_eq!(cached.inner.calls.load(Ordering::SeqCst), 2);
  }
}
