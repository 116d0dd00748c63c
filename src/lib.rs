//! # maxi-health
//!
//! Core library for the Maxi family health-tracking backend: child
//! profiles, health records, AI-assisted chat transcripts, rule-derived
//! insights, and a tamper-evident audit trail over all of it.
//!
//! ## Overview
//!
//! The crate is the layer between an HTTP framework and a database.
//! Persistence sits behind async store traits so backends can be swapped
//! without changing application code; in-memory implementations ship for
//! development and tests.
//!
//! ## Quick Start
//!
//! ```rust
//! use maxi_health::{AuditEvent, AuditSeverity, AuditTrail, MemoryAuditStore};
//!
//! # async fn example() -> maxi_health::Result<()> {
//! let trail = AuditTrail::new(MemoryAuditStore::default());
//!
//! let record = trail
//!     .record(
//!         AuditEvent::new("child_created", AuditSeverity::Info)
//!             .user("usr-1")
//!             .details(serde_json::json!({"child_id": "chd-9"})),
//!     )
//!     .await?;
//!
//! println!("audited: {} ({})", record.id, record.hash);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - **AuditTrail**: integrity-hashed, insert-only audit records
//! - **RateLimiter**: sliding-window throttle with an injectable clock
//! - **InsightRanker**: severity-ranked, paginated insight listings
//! - **HealthService**: composition root wiring stores, audit, and
//!   throttling into the business operations the HTTP layer calls

pub mod ai;
pub mod audit;
pub mod crypto;
pub mod error;
pub mod hash;
pub mod insight;
pub mod limiter;
pub mod records;
pub mod search;
pub mod service;
pub mod types;
pub mod validate;

// Re-export core types
pub use audit::{AuditEvent, AuditStore, AuditTrail, MemoryAuditStore};
pub use error::{HealthError, Result};
pub use hash::integrity_hash;
pub use insight::{
    InsightFilter, InsightPage, InsightRanker, InsightStore, MemoryInsightStore,
};
pub use limiter::{Clock, ManualClock, RateLimiter, SystemClock};
pub use records::{
    ChatPage, ChatQuery, ChatStore, ChildStore, MemoryChatStore, MemoryChildStore,
    MemoryRecordStore, RecordPage, RecordQuery, RecordStore,
};
pub use service::{
    ExtractionRequest, ExtractionResult, HealthService, NewChatMessage, NewChild,
    NewHealthRecord,
};
pub use types::{
    AuditRecord, AuditSeverity, ChatMessage, ChatRole, ChildProfile, HealthRecord,
    InsightRecord, InsightSeverity, PageRequest, Pagination, RequestContext, SyncStatus,
};

// Re-export boundary seams for convenience
pub use ai::{Completion, CompletionClient, CompletionOptions, PromptMessage, TokenUsage};
pub use crypto::{Aes256GcmSealer, PayloadSealer, SealedPayload};
pub use search::{medical_search, SearchResult};
