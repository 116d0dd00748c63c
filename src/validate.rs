//! Input validation and sanitization
//!
//! Applied at the boundary before any domain effect. Sanitization strips
//! characters commonly used in injection payloads; field validation
//! reports every missing field at once rather than the first.

use crate::error::{HealthError, Result};
use regex::Regex;
use std::sync::OnceLock;

const DANGEROUS_CHARS: [char; 6] = ['<', '>', '"', '\'', '&', '\0'];

/// Strip dangerous characters and surrounding whitespace from one string
pub fn sanitize_text(s: &str) -> String {
    let cleaned: String = s.chars().filter(|c| !DANGEROUS_CHARS.contains(c)).collect();
    cleaned.trim().to_string()
}

/// Recursively sanitize a JSON value
///
/// Strings lose dangerous characters and surrounding whitespace; objects
/// and arrays are sanitized element-wise; other values pass through.
pub fn sanitize(value: &serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::String(s) => serde_json::Value::String(sanitize_text(s)),
        serde_json::Value::Object(map) => serde_json::Value::Object(
            map.iter().map(|(k, v)| (k.clone(), sanitize(v))).collect(),
        ),
        serde_json::Value::Array(items) => {
            serde_json::Value::Array(items.iter().map(sanitize).collect())
        }
        other => other.clone(),
    }
}

/// Require `value` to be an object containing every named field
pub fn require_fields(value: &serde_json::Value, required: &[&str]) -> Result<()> {
    let map = value
        .as_object()
        .ok_or_else(|| HealthError::Validation("payload must be a JSON object".to_string()))?;

    let missing: Vec<&str> = required
        .iter()
        .filter(|f| !map.contains_key(**f))
        .copied()
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(HealthError::Validation(format!(
            "missing required fields: {}",
            missing.join(", ")
        )))
    }
}

fn email_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$")
            .expect("email regex is valid")
    })
}

/// Basic email format check
pub fn is_valid_email(email: &str) -> bool {
    email_regex().is_match(email)
}

/// Whether `s` parses as a UUID
pub fn is_valid_uuid(s: &str) -> bool {
    uuid::Uuid::parse_str(s).is_ok()
}
