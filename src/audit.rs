//! Tamper-evident audit trail
//!
//! Every auditable action produces one immutable [`AuditRecord`], on both
//! success and failure paths. Each record carries a SHA-256 integrity
//! digest computed at write time over the canonical hashed subset of the
//! event. Persistence is behind the [`AuditStore`] trait so backends can
//! be swapped without touching the recording logic.

use crate::error::{HealthError, Result};
use crate::hash::integrity_hash;
use crate::types::{prefixed_id, AuditRecord, AuditSeverity};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::RwLock;

/// A not-yet-persisted audit event assembled by a business action
#[derive(Debug, Clone)]
pub struct AuditEvent {
    pub event_type: String,
    pub severity: AuditSeverity,
    pub user_id: Option<String>,
    pub details: serde_json::Value,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub session_id: Option<String>,
}

impl AuditEvent {
    /// Start building an event of the given type and severity
    pub fn new(event_type: impl Into<String>, severity: AuditSeverity) -> Self {
        Self {
            event_type: event_type.into(),
            severity,
            user_id: None,
            details: serde_json::json!({}),
            ip_address: None,
            user_agent: None,
            session_id: None,
        }
    }

    pub fn user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }

    pub fn ip_address(mut self, ip: impl Into<String>) -> Self {
        self.ip_address = Some(ip.into());
        self
    }

    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    pub fn session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }
}

/// Persistence seam for audit records
///
/// Implementations own the storage schema. Records are insert-only; the
/// core never updates or deletes them after creation.
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Persist one audit record
    async fn insert(&self, record: &AuditRecord) -> Result<()>;

    /// Number of records held
    async fn count(&self) -> Result<usize>;

    /// Most recent records, newest first
    async fn recent(&self, limit: usize) -> Result<Vec<AuditRecord>>;
}

/// In-memory audit store for development and testing
///
/// Keeps records in a `Vec` with a configurable capacity cap; when the
/// cap is exceeded the oldest records are dropped.
pub struct MemoryAuditStore {
    records: Arc<RwLock<Vec<AuditRecord>>>,
    max_records: usize,
}

impl MemoryAuditStore {
    pub fn new(max_records: usize) -> Self {
        Self {
            records: Arc::new(RwLock::new(Vec::new())),
            max_records,
        }
    }
}

impl Default for MemoryAuditStore {
    fn default() -> Self {
        Self::new(10_000)
    }
}

#[async_trait]
impl AuditStore for MemoryAuditStore {
    async fn insert(&self, record: &AuditRecord) -> Result<()> {
        let mut records = self.records.write().await;
        records.push(record.clone());

        if self.max_records > 0 && records.len() > self.max_records {
            let drain_count = records.len() - self.max_records;
            records.drain(..drain_count);
        }

        Ok(())
    }

    async fn count(&self) -> Result<usize> {
        let records = self.records.read().await;
        Ok(records.len())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<AuditRecord>> {
        let records = self.records.read().await;
        Ok(records.iter().rev().take(limit).cloned().collect())
    }
}

/// Records audit events against a pluggable store
///
/// Cheap to clone; clones share the underlying store.
#[derive(Clone)]
pub struct AuditTrail {
    store: Arc<dyn AuditStore>,
}

impl AuditTrail {
    pub fn new(store: impl AuditStore + 'static) -> Self {
        Self {
            store: Arc::new(store),
        }
    }

    pub fn with_store(store: Arc<dyn AuditStore>) -> Self {
        Self { store }
    }

    /// Record an auditable event, returning the persisted record
    ///
    /// Generates a fresh id, computes the integrity hash over the narrow
    /// payload `{event, user_id, timestamp}` at call time, assembles the
    /// full record, and persists it. A store failure surfaces as
    /// [`HealthError::AuditPersistence`].
    ///
    /// The digest intentionally covers only the narrow payload; `details`
    /// and provenance fields sit outside it and are not tamper-evident.
    /// This scope is preserved as recorded behavior rather than silently
    /// widened; [`AuditTrail::expected_hash`] recomputes the same payload
    /// for offline verification.
    pub async fn record(&self, event: AuditEvent) -> Result<AuditRecord> {
        let timestamp = Utc::now();

        let hashed_payload = serde_json::json!({
            "event": event.event_type,
            "user_id": event.user_id,
            "timestamp": timestamp.to_rfc3339(),
        });
        let hash = integrity_hash(&hashed_payload)?;

        let record = AuditRecord {
            id: prefixed_id("aud"),
            user_id: event.user_id,
            event_type: event.event_type,
            severity: event.severity,
            details: event.details,
            ip_address: event.ip_address,
            user_agent: event.user_agent,
            session_id: event.session_id,
            timestamp,
            hash,
        };

        self.store
            .insert(&record)
            .await
            .map_err(|e| HealthError::AuditPersistence(e.to_string()))?;

        tracing::debug!(
            record_id = %record.id,
            event_type = %record.event_type,
            "Audit record written"
        );
        Ok(record)
    }

    /// Record an event, reporting (not propagating) a persistence failure
    ///
    /// Business actions call this after their domain effect so an audit
    /// write failure can never mask or downgrade the action's own
    /// outcome. The failure is reported through the process log.
    pub async fn record_best_effort(&self, event: AuditEvent) {
        let event_type = event.event_type.clone();
        if let Err(e) = self.record(event).await {
            tracing::error!(
                event_type = %event_type,
                error = %e,
                "Audit write failed; business outcome unaffected"
            );
        }
    }

    /// Recompute the digest a record should carry
    ///
    /// Useful for offline verification sweeps. Detection is per-record:
    /// the hash covers only that record's narrow payload, not its
    /// neighbors, so a deleted record cannot be detected this way.
    pub fn expected_hash(record: &AuditRecord) -> Result<String> {
        integrity_hash(&serde_json::json!({
            "event": record.event_type,
            "user_id": record.user_id,
            "timestamp": record.timestamp.to_rfc3339(),
        }))
    }
}
