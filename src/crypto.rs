//! Protected-payload sealing
//!
//! Health measurements and chat content are personally identifiable, so
//! the core offers application-level envelope encryption for them at
//! rest, independent of transport encryption. Key rotation is supported
//! via key IDs: new payloads seal under the active key while old keys
//! stay registered for unsealing existing rows.

use crate::error::{HealthError, Result};
use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{AeadCore, Aes256Gcm, Key, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;

/// Sealed envelope stored in place of a plaintext payload
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SealedPayload {
    /// Which registered key sealed this payload
    pub key_id: String,

    /// Base64-encoded 96-bit nonce
    pub nonce: String,

    /// Base64-encoded ciphertext
    pub ciphertext: String,

    /// Marker distinguishing sealed envelopes from plaintext payloads
    #[serde(default = "default_sealed")]
    pub sealed: bool,
}

fn default_sealed() -> bool {
    true
}

impl SealedPayload {
    /// Check if a stored JSON value is a sealed envelope
    pub fn is_sealed(value: &serde_json::Value) -> bool {
        value.get("sealed").and_then(|v| v.as_bool()).unwrap_or(false)
    }
}

/// Seam for sealing and unsealing protected health payloads
pub trait PayloadSealer: Send + Sync {
    /// Seal a plaintext JSON payload into an envelope
    fn seal(&self, payload: &serde_json::Value) -> Result<serde_json::Value>;

    /// Unseal an envelope back to the original payload
    fn unseal(&self, sealed: &serde_json::Value) -> Result<serde_json::Value>;

    /// Key ID currently used for sealing
    fn active_key_id(&self) -> &str;
}

/// AES-256-GCM sealer with a rotating key registry
pub struct Aes256GcmSealer {
    active_key_id: String,

    /// Registered keys (key_id to cipher); old keys unseal only
    keys: RwLock<HashMap<String, Aes256Gcm>>,
}

impl Aes256GcmSealer {
    /// Create a sealer with a single 256-bit key
    pub fn new(key_id: impl Into<String>, key: &[u8; 32]) -> Self {
        let key_id = key_id.into();
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
        let mut keys = HashMap::new();
        keys.insert(key_id.clone(), cipher);

        Self {
            active_key_id: key_id,
            keys: RwLock::new(keys),
        }
    }

    /// Register a key for unsealing rows written before a rotation
    pub fn register_key(&self, key_id: impl Into<String>, key: &[u8; 32]) -> Result<()> {
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
        let mut keys = self
            .keys
            .write()
            .map_err(|e| HealthError::Crypto(format!("key lock poisoned: {}", e)))?;
        keys.insert(key_id.into(), cipher);
        Ok(())
    }

    /// Rotate sealing to an already-registered key
    pub fn rotate_to(&mut self, key_id: &str) -> Result<()> {
        let keys = self
            .keys
            .read()
            .map_err(|e| HealthError::Crypto(format!("key lock poisoned: {}", e)))?;
        if !keys.contains_key(key_id) {
            return Err(HealthError::Crypto(format!(
                "key '{}' not registered, register it first",
                key_id
            )));
        }
        self.active_key_id = key_id.to_string();
        Ok(())
    }

    fn with_cipher<T>(
        &self,
        key_id: &str,
        f: impl FnOnce(&Aes256Gcm) -> Result<T>,
    ) -> Result<T> {
        let keys = self
            .keys
            .read()
            .map_err(|e| HealthError::Crypto(format!("key lock poisoned: {}", e)))?;
        let cipher = keys
            .get(key_id)
            .ok_or_else(|| HealthError::Crypto(format!("key '{}' not registered", key_id)))?;
        f(cipher)
    }
}

impl PayloadSealer for Aes256GcmSealer {
    fn seal(&self, payload: &serde_json::Value) -> Result<serde_json::Value> {
        let plaintext = serde_json::to_vec(payload)?;
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

        let ciphertext = self.with_cipher(&self.active_key_id, |cipher| {
            cipher
                .encrypt(&nonce, plaintext.as_ref())
                .map_err(|e| HealthError::Crypto(format!("sealing failed: {}", e)))
        })?;

        let envelope = SealedPayload {
            key_id: self.active_key_id.clone(),
            nonce: BASE64.encode(nonce),
            ciphertext: BASE64.encode(ciphertext),
            sealed: true,
        };
        serde_json::to_value(envelope).map_err(Into::into)
    }

    fn unseal(&self, sealed: &serde_json::Value) -> Result<serde_json::Value> {
        let envelope: SealedPayload = serde_json::from_value(sealed.clone())?;

        let nonce_bytes = BASE64
            .decode(&envelope.nonce)
            .map_err(|e| HealthError::Crypto(format!("invalid nonce encoding: {}", e)))?;
        let ciphertext = BASE64
            .decode(&envelope.ciphertext)
            .map_err(|e| HealthError::Crypto(format!("invalid ciphertext encoding: {}", e)))?;
        if nonce_bytes.len() != 12 {
            return Err(HealthError::Crypto(format!(
                "invalid nonce length {}",
                nonce_bytes.len()
            )));
        }

        let plaintext = self.with_cipher(&envelope.key_id, |cipher| {
            cipher
                .decrypt(Nonce::from_slice(&nonce_bytes), ciphertext.as_ref())
                .map_err(|e| HealthError::Crypto(format!("unsealing failed: {}", e)))
        })?;

        serde_json::from_slice(&plaintext).map_err(Into::into)
    }

    fn active_key_id(&self) -> &str {
        &self.active_key_id
    }
}
