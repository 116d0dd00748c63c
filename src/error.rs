//! Error types for maxi-health

use thiserror::Error;

/// Errors that can occur in the health-tracking core
#[derive(Debug, Error)]
pub enum HealthError {
    /// Malformed or missing required input fields
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The audit-record write itself failed
    ///
    /// Callers may suppress this on non-critical log paths, but it must
    /// never change the success/failure status of the triggering action.
    #[error("Audit persistence failed: {0}")]
    AuditPersistence(String),

    /// The rate limiter rejected the call (retryable later, not a fault)
    #[error("Rate limit exceeded for '{key}', retry in {retry_after_secs}s")]
    RateLimitExceeded {
        key: String,
        retry_after_secs: u64,
    },

    /// The hasher input could not be canonicalized or serialized
    #[error("Integrity computation failed: {0}")]
    IntegrityComputation(String),

    /// Referenced entity does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Persistence collaborator failure
    #[error("Store error: {0}")]
    Store(String),

    /// Outbound LLM provider failure
    #[error("Upstream error from '{provider}': {reason}")]
    Upstream {
        provider: String,
        reason: String,
    },

    /// Payload sealing/unsealing failure
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// Serialization/deserialization failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for health-core operations
pub type Result<T> = std::result::Result<T, HealthError>;
