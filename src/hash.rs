//! Integrity hashing for audit events
//!
//! Produces a deterministic SHA-256 digest over a canonical rendering of
//! a JSON payload. Object keys are serialized in sorted order at every
//! nesting level, so equal payloads always hash equal regardless of how
//! the caller assembled them.

use crate::error::{HealthError, Result};
use sha2::{Digest, Sha256};

/// Compute the integrity digest for an audit payload
///
/// Returns a lowercase 64-character hex string. Mappings are hashed over
/// their canonical (key-sorted) serialization; any other value hashes its
/// canonical string representation. Pure and side-effect free.
pub fn integrity_hash(payload: &serde_json::Value) -> Result<String> {
    let canonical = canonical_string(payload)?;
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

/// Render a JSON value to its canonical string form
///
/// Matches serde_json compact output except that object keys appear in
/// sorted order. Non-finite numbers cannot be represented in JSON and
/// surface as `IntegrityComputation`.
fn canonical_string(value: &serde_json::Value) -> Result<String> {
    let mut out = String::new();
    write_canonical(value, &mut out)?;
    Ok(out)
}

fn write_canonical(value: &serde_json::Value, out: &mut String) -> Result<()> {
    match value {
        serde_json::Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();

            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&encode_atom(&serde_json::Value::String((*key).clone()))?);
                out.push(':');
                write_canonical(&map[*key], out)?;
            }
            out.push('}');
            Ok(())
        }
        serde_json::Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out)?;
            }
            out.push(']');
            Ok(())
        }
        other => {
            out.push_str(&encode_atom(other)?);
            Ok(())
        }
    }
}

fn encode_atom(value: &serde_json::Value) -> Result<String> {
    serde_json::to_string(value)
        .map_err(|e| HealthError::IntegrityComputation(format!("unserializable value: {}", e)))
}
