//! Core domain types for the maxi-health system
//!
//! All types use camelCase JSON serialization for wire compatibility.
//! Severity vocabularies are part of the boundary contract: audit records
//! and insights carry two distinct enumerations that are never unified.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Severity of an audit event
///
/// Classifies how serious a recorded action was. Distinct from
/// [`InsightSeverity`]; note the vocabularies differ (`error` vs `alert`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

/// An immutable audit record describing one auditable action
///
/// Created exactly once, at the moment the action completes (success or
/// failure path), and never updated or deleted by the application.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    /// Unique record identifier (aud-<uuid>)
    pub id: String,

    /// Acting principal; `None` for unauthenticated or system events
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    /// Short tag classifying the action (e.g. "child_created")
    pub event_type: String,

    /// How serious the recorded action was
    pub severity: AuditSeverity,

    /// Free-form structured payload describing the event
    pub details: serde_json::Value,

    /// Client IP, if known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,

    /// Client user agent, if known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,

    /// Session the action belonged to, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    /// Creation time, set at write time
    pub timestamp: DateTime<Utc>,

    /// Integrity digest over the canonical hashed subset of the event
    pub hash: String,
}

/// Severity of an insight, ordered by urgency
///
/// The declaration order defines the ranking used for listings:
/// `Critical` sorts first, `Info` last. Modeled as an explicit ordered
/// enumeration so a new severity cannot silently misrank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightSeverity {
    Critical,
    Alert,
    Warning,
    Info,
}

impl InsightSeverity {
    /// Numeric rank: critical=1, alert=2, warning=3, info=4
    pub fn rank(self) -> u8 {
        match self {
            InsightSeverity::Critical => 1,
            InsightSeverity::Alert => 2,
            InsightSeverity::Warning => 3,
            InsightSeverity::Info => 4,
        }
    }
}

/// A system-generated notice derived from a child's health data
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsightRecord {
    /// Unique insight identifier (ins-<uuid>)
    pub id: String,

    /// Owning child
    pub child_id: String,

    /// Insight kind (e.g. "growth_percentile", "milestone")
    pub insight_type: String,

    pub title: String,
    pub description: String,

    /// Supporting data for the insight
    #[serde(default)]
    pub data: serde_json::Value,

    pub severity: InsightSeverity,

    /// User-interaction flags, mutable post-creation
    #[serde(default)]
    pub is_read: bool,
    #[serde(default)]
    pub is_dismissed: bool,
    #[serde(default)]
    pub action_required: bool,

    pub generated_at: DateTime<Utc>,

    /// Once past, the insight is excluded from active listings but kept
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl InsightRecord {
    /// Whether this insight belongs in active listings at `now`
    ///
    /// Active iff not dismissed and not expired; a missing `expires_at`
    /// never expires.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        !self.is_dismissed && self.expires_at.map_or(true, |exp| exp > now)
    }
}

/// A child profile owned by a user account
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChildProfile {
    /// Unique profile identifier (chd-<uuid>)
    pub id: String,

    /// Owning user account
    pub user_id: String,

    pub name: String,
    pub birth_date: NaiveDate,

    /// "male", "female", or "other"
    pub gender: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blood_type: Option<String>,

    #[serde(default)]
    pub allergies: Vec<String>,

    #[serde(default)]
    pub medical_conditions: Vec<String>,

    #[serde(default)]
    pub pediatrician_info: serde_json::Value,

    #[serde(default)]
    pub emergency_contact: serde_json::Value,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    /// Soft-delete flag; inactive profiles are hidden from listings
    pub is_active: bool,
}

/// Outbound sync state of a health record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    #[default]
    Pending,
    Synced,
    Error,
}

/// A single health measurement or observation for a child
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthRecord {
    /// Unique record identifier (rec-<uuid>)
    pub id: String,

    pub child_id: String,

    /// Measurement kind (e.g. "weight", "height", "temperature")
    pub record_type: String,

    /// When the measurement was taken (not when it was stored)
    pub timestamp: DateTime<Utc>,

    /// Type-specific measurement payload
    pub data: serde_json::Value,

    /// True when the payload was extracted from free-form input by the
    /// LLM boundary rather than entered directly
    #[serde(default)]
    pub ai_extracted: bool,

    /// Original free-form input the payload was extracted from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_input: Option<serde_json::Value>,

    /// Extraction provenance (model, usage, confidence)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_processing: Option<serde_json::Value>,

    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default)]
    pub sync_status: SyncStatus,

    pub created_at: DateTime<Utc>,
}

/// Role of a chat transcript entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    User,
    Assistant,
    System,
}

/// One message in an AI-assisted chat transcript
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    /// Unique message identifier (msg-<uuid>)
    pub id: String,

    pub child_id: String,

    /// Conversation the message belongs to
    pub session_id: String,

    pub role: ChatRole,
    pub content: String,

    /// Context snapshot the assistant answered against
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_model: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens: Option<u32>,

    pub timestamp: DateTime<Utc>,
}

/// Pagination window requested by a caller
#[derive(Debug, Clone, Copy)]
pub struct PageRequest {
    pub limit: usize,
    pub offset: usize,
}

impl PageRequest {
    pub fn new(limit: usize, offset: usize) -> Self {
        Self { limit, offset }
    }
}

/// Pagination metadata returned alongside a listing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    /// Count of all matching rows before the window was applied
    pub total: usize,
    pub limit: usize,
    pub offset: usize,

    /// True when rows exist past this window: (offset + limit) < total
    pub has_more: bool,
}

impl Pagination {
    /// Build pagination metadata for a window over `total` matching rows
    pub fn for_window(total: usize, page: PageRequest) -> Self {
        Self {
            total,
            limit: page.limit,
            offset: page.offset,
            has_more: page.offset + page.limit < total,
        }
    }
}

/// Request provenance passed in from the HTTP boundary
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub session_id: Option<String>,
}

impl RequestContext {
    pub fn new(ip_address: impl Into<String>, user_agent: impl Into<String>) -> Self {
        Self {
            ip_address: Some(ip_address.into()),
            user_agent: Some(user_agent.into()),
            session_id: None,
        }
    }
}

/// Generate a prefixed unique identifier (e.g. `aud-<uuid>`)
pub(crate) fn prefixed_id(prefix: &str) -> String {
    format!("{}-{}", prefix, uuid::Uuid::new_v4())
}
