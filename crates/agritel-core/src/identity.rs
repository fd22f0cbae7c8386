//! Deterministic, content-addressed event identity.
//!
//! An event id is the SHA-256 digest of the canonical form of
//! `[source, sequence, payload]`. The canonical form is compact JSON with
//! object keys sorted at every depth, so two serialisations of the same
//! payload that differ only in key order or whitespace collapse to the same
//! id. Integral floats are written as integers, so `15.0` and `15` agree.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::{Error, Result};

/// Length of a hex-encoded event id.
pub const EVENT_ID_LEN: usize = 64;

// ─── Origin markers ──────────────────────────────────────────────────────────

/// Where a raw record came from: a source label plus a position within it
/// (file name + line number, stream partition + offset, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Origin {
  pub source:   String,
  pub sequence: String,
}

impl Origin {
  pub fn new(source: impl Into<String>, sequence: impl ToString) -> Self {
    Self { source: source.into(), sequence: sequence.to_string() }
  }
}

// ─── Canonical form ──────────────────────────────────────────────────────────

/// Serialise `value` as compact JSON with recursively sorted object keys.
pub fn canonical_json(value: &Value) -> Result<String> {
  let mut out = String::new();
  write_canonical(value, &mut out)?;
  Ok(out)
}

fn write_canonical(value: &Value, out: &mut String) -> Result<()> {
  match value {
    Value::Object(map) => {
      let mut keys: Vec<&String> = map.keys().collect();
      keys.sort();
      out.push('{');
      for (i, key) in keys.into_iter().enumerate() {
        if i > 0 {
          out.push(',');
        }
        out.push_str(&serde_json::to_string(key)?);
        out.push(':');
        write_canonical(&map[key], out)?;
      }
      out.push('}');
    }
    Value::Array(items) => {
      out.push('[');
      for (i, item) in items.iter().enumerate() {
        if i > 0 {
          out.push(',');
        }
        write_canonical(item, out)?;
      }
      out.push(']');
    }
    Value::Number(n) => match integral(n) {
      Some(i) => out.push_str(&i.to_string()),
      None => out.push_str(&n.to_string()),
    },
    scalar => out.push_str(&serde_json::to_string(scalar)?),
  }
  Ok(())
}

/// Largest magnitude at which every integer is exactly representable in f64.
const MAX_EXACT_F64: f64 = 9_007_199_254_740_992.0;

fn integral(n: &serde_json::Number) -> Option<i64> {
  if let Some(i) = n.as_i64() {
    return Some(i);
  }
  if n.is_u64() {
    return None;
  }
  n.as_f64()
    .filter(|f| f.fract() == 0.0 && f.abs() <= MAX_EXACT_F64)
    .map(|f| f as i64)
}

// ─── Digest ──────────────────────────────────────────────────────────────────

/// Compute the event id for a payload observed at `origin`.
///
/// The payload must be a JSON object; anything else is rejected with
/// [`Error::Validation`].
pub fn event_id(origin: &Origin, payload: &Value) -> Result<String> {
  if !payload.is_object() {
    return Err(Error::validation(format!(
      "payload must be a JSON object, got {}",
      json_kind(payload)
    )));
  }

  let framed = Value::Array(vec![
    Value::String(origin.source.clone()),
    Value::String(origin.sequence.clone()),
    payload.clone(),
  ]);
  let canonical = canonical_json(&framed)?;

  let mut hasher = Sha256::new();
  hasher.update(canonical.as_bytes());
  Ok(hex::encode(hasher.finalize()))
}

/// Whether `id` has the shape of an event id (64 lowercase hex characters).
pub fn is_event_id(id: &str) -> bool {
  id.len() == EVENT_ID_LEN
    && id.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

fn json_kind(value: &Value) -> &'static str {
  match value {
    Value::Null => "null",
    Value::Bool(_) => "a boolean",
    Value::Number(_) => "a number",
    Value::String(_) => "a string",
    Value::Array(_) => "an array",
    Value::Object(_) => "an object",
  }
}
