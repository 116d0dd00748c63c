//! High-level health service composed from the core components
//!
//! `HealthService` is the composition root the HTTP layer talks to: each
//! operation validates its input, optionally consults the rate limiter,
//! performs its domain effect through the persistence seams, and then
//! writes an audit record. Audit writes after a successful domain effect
//! are best-effort so they can never mask the action's outcome.

use crate::ai::{
    build_chat_system_prompt, build_extraction_prompt, extraction_system_prompt, Completion,
    CompletionClient, CompletionOptions, PromptMessage,
};
use crate::audit::{AuditEvent, AuditTrail};
use crate::crypto::{PayloadSealer, SealedPayload};
use crate::error::{HealthError, Result};
use crate::insight::{InsightFilter, InsightPage, InsightRanker};
use crate::limiter::RateLimiter;
use crate::records::{
    ChatPage, ChatQuery, ChatStore, ChildStore, RecordPage, RecordQuery, RecordStore,
};
use crate::search::{medical_search, SearchResult};
use crate::types::{
    prefixed_id, AuditSeverity, ChatMessage, ChatRole, ChildProfile, HealthRecord,
    RequestContext, SyncStatus,
};
use crate::validate::{require_fields, sanitize, sanitize_text};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Search throttle: 20 queries per user per hour
const SEARCH_LIMIT: usize = 20;
const SEARCH_WINDOW_SECS: u64 = 3600;

/// Input for registering a child profile
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewChild {
    pub name: String,
    pub birth_date: NaiveDate,
    pub gender: String,

    #[serde(default)]
    pub blood_type: Option<String>,
    #[serde(default)]
    pub allergies: Vec<String>,
    #[serde(default)]
    pub medical_conditions: Vec<String>,
    #[serde(default)]
    pub pediatrician_info: serde_json::Value,
    #[serde(default)]
    pub emergency_contact: serde_json::Value,
}

/// Input for recording a health measurement
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewHealthRecord {
    pub child_id: String,
    #[serde(rename = "type")]
    pub record_type: String,
    pub timestamp: chrono::DateTime<Utc>,
    pub data: serde_json::Value,

    #[serde(default)]
    pub ai_extracted: bool,
    #[serde(default)]
    pub original_input: Option<serde_json::Value>,
    #[serde(default)]
    pub ai_processing: Option<serde_json::Value>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl NewHealthRecord {
    /// Parse a raw boundary payload, sanitizing it first and reporting
    /// every missing required field at once
    pub fn from_json(child_id: &str, payload: &serde_json::Value) -> Result<Self> {
        require_fields(payload, &["type", "timestamp", "data"])?;
        let mut cleaned = sanitize(payload);
        if let Some(map) = cleaned.as_object_mut() {
            map.insert("childId".to_string(), serde_json::json!(child_id));
        }
        serde_json::from_value(cleaned)
            .map_err(|e| HealthError::Validation(format!("malformed record payload: {}", e)))
    }
}

/// Input for persisting one chat transcript entry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewChatMessage {
    pub child_id: String,
    pub session_id: String,
    pub role: ChatRole,
    pub content: String,

    #[serde(default)]
    pub context: Option<serde_json::Value>,
    #[serde(default)]
    pub ai_model: Option<String>,
    #[serde(default)]
    pub tokens: Option<u32>,
}

/// Input for an AI extraction call
#[derive(Debug, Clone)]
pub struct ExtractionRequest {
    /// Free-form input (text, or an image URL for vision models)
    pub input: String,
    /// "text", "voice_transcript", "image", ...
    pub input_type: String,
    /// JSON schema the extracted data must conform to
    pub schema: serde_json::Value,
    pub options: CompletionOptions,
}

/// Structured data extracted by the model
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionResult {
    pub data: serde_json::Value,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<crate::ai::TokenUsage>,
}

/// The composed backend core
pub struct HealthService {
    children: Arc<dyn ChildStore>,
    records: Arc<dyn RecordStore>,
    chat: Arc<dyn ChatStore>,
    insights: InsightRanker,
    audit: AuditTrail,
    limiter: Arc<RateLimiter>,
    completions: Option<Arc<dyn CompletionClient>>,
    sealer: Option<Arc<dyn PayloadSealer>>,
}

impl HealthService {
    pub fn new(
        children: Arc<dyn ChildStore>,
        records: Arc<dyn RecordStore>,
        chat: Arc<dyn ChatStore>,
        insights: InsightRanker,
        audit: AuditTrail,
        limiter: Arc<RateLimiter>,
    ) -> Self {
        Self {
            children,
            records,
            chat,
            insights,
            audit,
            limiter,
            completions: None,
            sealer: None,
        }
    }

    /// Attach an LLM provider for extraction and chat operations
    pub fn with_completions(mut self, client: Arc<dyn CompletionClient>) -> Self {
        self.completions = Some(client);
        self
    }

    /// Seal record data and chat content at rest with the given sealer
    ///
    /// Rows written before the sealer was attached stay readable: reads
    /// unseal only values that are sealed envelopes.
    pub fn with_sealer(mut self, sealer: Arc<dyn PayloadSealer>) -> Self {
        self.sealer = Some(sealer);
        self
    }

    pub fn audit(&self) -> &AuditTrail {
        &self.audit
    }

    pub fn insights(&self) -> &InsightRanker {
        &self.insights
    }

    // ─── Children ────────────────────────────────────────────────

    /// Register a child profile and audit the creation
    pub async fn register_child(
        &self,
        user_id: &str,
        input: NewChild,
        ctx: &RequestContext,
    ) -> Result<ChildProfile> {
        let name = sanitize_text(&input.name);
        if name.is_empty() {
            return Err(HealthError::Validation("name must not be empty".to_string()));
        }
        if !matches!(input.gender.as_str(), "male" | "female" | "other") {
            return Err(HealthError::Validation(format!(
                "unknown gender '{}'",
                input.gender
            )));
        }

        let now = Utc::now();
        let child = ChildProfile {
            id: prefixed_id("chd"),
            user_id: user_id.to_string(),
            name,
            birth_date: input.birth_date,
            gender: input.gender,
            blood_type: input.blood_type,
            allergies: input.allergies,
            medical_conditions: input.medical_conditions,
            pediatrician_info: sanitize(&input.pediatrician_info),
            emergency_contact: sanitize(&input.emergency_contact),
            created_at: now,
            updated_at: now,
            is_active: true,
        };

        self.children.insert(&child).await?;

        self.audit
            .record_best_effort(
                self.event("child_created", AuditSeverity::Info, user_id, ctx)
                    .details(serde_json::json!({
                        "child_id": child.id,
                        "child_name": child.name,
                    })),
            )
            .await;

        Ok(child)
    }

    /// Active children owned by the user
    pub async fn list_children(&self, user_id: &str) -> Result<Vec<ChildProfile>> {
        self.children.list_for_user(user_id).await
    }

    // ─── Health records ──────────────────────────────────────────

    /// Store a health measurement for one of the user's children
    pub async fn add_health_record(
        &self,
        user_id: &str,
        input: NewHealthRecord,
        ctx: &RequestContext,
    ) -> Result<HealthRecord> {
        if input.record_type.trim().is_empty() {
            return Err(HealthError::Validation("record type required".to_string()));
        }
        if !input.data.is_object() {
            return Err(HealthError::Validation("data must be a JSON object".to_string()));
        }
        self.owned_child(user_id, &input.child_id).await?;

        let data = sanitize(&input.data);
        let data = match &self.sealer {
            Some(sealer) => sealer.seal(&data)?,
            None => data,
        };

        let record = HealthRecord {
            id: prefixed_id("rec"),
            child_id: input.child_id,
            record_type: input.record_type,
            timestamp: input.timestamp,
            data,
            ai_extracted: input.ai_extracted,
            original_input: input.original_input,
            ai_processing: input.ai_processing,
            tags: input.tags,
            sync_status: SyncStatus::Pending,
            created_at: Utc::now(),
        };

        self.records.insert(&record).await?;

        self.audit
            .record_best_effort(
                self.event("health_record_created", AuditSeverity::Info, user_id, ctx)
                    .details(serde_json::json!({
                        "child_id": record.child_id,
                        "record_id": record.id,
                        "record_type": record.record_type,
                        "ai_extracted": record.ai_extracted,
                    })),
            )
            .await;

        Ok(record)
    }

    /// Paginated record history for one of the user's children
    pub async fn list_records(&self, user_id: &str, query: RecordQuery) -> Result<RecordPage> {
        self.owned_child(user_id, &query.child_id).await?;
        let mut page = self.records.query(&query).await?;

        if let Some(sealer) = &self.sealer {
            for record in &mut page.records {
                if SealedPayload::is_sealed(&record.data) {
                    record.data = sealer.unseal(&record.data)?;
                }
            }
        }
        Ok(page)
    }

    // ─── Chat transcripts ────────────────────────────────────────

    /// Persist one chat message (not audited, matching record retention
    /// policy for conversational data)
    pub async fn log_chat_message(
        &self,
        user_id: &str,
        input: NewChatMessage,
    ) -> Result<ChatMessage> {
        if input.content.trim().is_empty() {
            return Err(HealthError::Validation("content must not be empty".to_string()));
        }
        self.owned_child(user_id, &input.child_id).await?;

        let plaintext = input.content;
        let stored_content = match &self.sealer {
            Some(sealer) => {
                let envelope =
                    sealer.seal(&serde_json::Value::String(plaintext.clone()))?;
                serde_json::to_string(&envelope)?
            }
            None => plaintext.clone(),
        };

        let mut message = ChatMessage {
            id: prefixed_id("msg"),
            child_id: input.child_id,
            session_id: input.session_id,
            role: input.role,
            content: stored_content,
            context: input.context,
            ai_model: input.ai_model,
            tokens: input.tokens,
            timestamp: Utc::now(),
        };

        self.chat.insert(&message).await?;
        message.content = plaintext;
        Ok(message)
    }

    /// Conversation-ordered transcript page
    pub async fn list_chat(&self, user_id: &str, query: ChatQuery) -> Result<ChatPage> {
        self.owned_child(user_id, &query.child_id).await?;
        let mut page = self.chat.query(&query).await?;

        if let Some(sealer) = &self.sealer {
            for message in &mut page.messages {
                message.content = open_content(sealer.as_ref(), &message.content)?;
            }
        }
        Ok(page)
    }

    // ─── Insights ────────────────────────────────────────────────

    /// Ranked, paginated active insights for one of the user's children
    pub async fn list_insights(
        &self,
        user_id: &str,
        filter: InsightFilter,
    ) -> Result<InsightPage> {
        self.owned_child(user_id, &filter.child_id).await?;
        self.insights.list(&filter).await
    }

    // ─── Medical search ──────────────────────────────────────────

    /// Rate-limited supplementary medical search
    ///
    /// Rejection happens before any side effect: no search, no audit
    /// record, no limiter slot consumed.
    pub async fn search_medical(
        &self,
        user_id: &str,
        query: &str,
        ctx: &RequestContext,
    ) -> Result<Vec<SearchResult>> {
        let key = format!("search_{}", user_id);
        if !self.limiter.is_allowed(&key, SEARCH_LIMIT, SEARCH_WINDOW_SECS) {
            return Err(HealthError::RateLimitExceeded {
                key,
                retry_after_secs: SEARCH_WINDOW_SECS,
            });
        }

        if query.trim().is_empty() {
            return Err(HealthError::Validation("search query required".to_string()));
        }
        let cleaned = sanitize_text(query);

        let results = medical_search(&cleaned);

        self.audit
            .record_best_effort(
                self.event("web_search", AuditSeverity::Info, user_id, ctx)
                    .details(serde_json::json!({
                        "query": cleaned,
                        "results_count": results.len(),
                    })),
            )
            .await;

        Ok(results)
    }

    // ─── LLM operations ──────────────────────────────────────────

    /// Extract structured health data from free-form input
    ///
    /// Success and every failure mode write an audit record; the audit
    /// write itself never alters the returned outcome.
    pub async fn extract_health_data(
        &self,
        user_id: &str,
        request: ExtractionRequest,
        ctx: &RequestContext,
    ) -> Result<ExtractionResult> {
        let client = self.completions_client()?;

        let messages = [
            PromptMessage::system(extraction_system_prompt()),
            PromptMessage::user(build_extraction_prompt(
                &request.input,
                &request.input_type,
                &request.schema,
            )),
        ];

        let completion = match client.complete(&messages, &request.options).await {
            Ok(completion) => completion,
            Err(e) => {
                self.audit
                    .record_best_effort(
                        self.event("ai_extraction_failed", AuditSeverity::Error, user_id, ctx)
                            .details(serde_json::json!({
                                "input_type": request.input_type,
                                "error_message": e.to_string(),
                            })),
                    )
                    .await;
                return Err(e);
            }
        };

        let data: serde_json::Value = match serde_json::from_str(&completion.content) {
            Ok(data) => data,
            Err(_) => {
                self.audit
                    .record_best_effort(
                        self.event("ai_extraction_json_error", AuditSeverity::Error, user_id, ctx)
                            .details(serde_json::json!({
                                "input_type": request.input_type,
                                "error_message": "model response is not valid JSON",
                                "raw_response": completion.content,
                            })),
                    )
                    .await;
                return Err(HealthError::Upstream {
                    provider: client.provider().to_string(),
                    reason: "model response is not valid JSON".to_string(),
                });
            }
        };

        self.audit
            .record_best_effort(
                self.event("ai_data_extraction", AuditSeverity::Info, user_id, ctx)
                    .details(serde_json::json!({
                        "input_type": request.input_type,
                        "model": completion.model,
                        "usage": completion.usage,
                    })),
            )
            .await;

        Ok(ExtractionResult {
            data,
            model: completion.model,
            usage: completion.usage,
        })
    }

    /// Contextual chat completion, optionally grounded in search results
    pub async fn chat_completion(
        &self,
        user_id: &str,
        messages: Vec<PromptMessage>,
        context: &serde_json::Value,
        search_results: &[SearchResult],
        ctx: &RequestContext,
    ) -> Result<Completion> {
        let client = self.completions_client()?;
        if messages.is_empty() {
            return Err(HealthError::Validation("messages must not be empty".to_string()));
        }

        let mut prompt = vec![PromptMessage::system(build_chat_system_prompt(
            context,
            search_results,
        ))];
        prompt.extend(messages);

        let options = CompletionOptions::chat();
        match client.complete(&prompt, &options).await {
            Ok(completion) => {
                self.audit
                    .record_best_effort(
                        self.event("ai_chat_completion", AuditSeverity::Info, user_id, ctx)
                            .details(serde_json::json!({
                                "model": completion.model,
                                "usage": completion.usage,
                            })),
                    )
                    .await;
                Ok(completion)
            }
            Err(e) => {
                self.audit
                    .record_best_effort(
                        self.event("ai_chat_failed", AuditSeverity::Error, user_id, ctx)
                            .details(serde_json::json!({
                                "error_message": e.to_string(),
                            })),
                    )
                    .await;
                Err(e)
            }
        }
    }

    // ─── Internals ───────────────────────────────────────────────

    fn completions_client(&self) -> Result<&Arc<dyn CompletionClient>> {
        self.completions.as_ref().ok_or_else(|| HealthError::Upstream {
            provider: "none".to_string(),
            reason: "no completion client configured".to_string(),
        })
    }

    /// Verify the child exists and belongs to the acting user
    async fn owned_child(&self, user_id: &str, child_id: &str) -> Result<ChildProfile> {
        match self.children.get(child_id).await? {
            Some(child) if child.user_id == user_id => Ok(child),
            _ => Err(HealthError::NotFound(format!("child {}", child_id))),
        }
    }

    fn event(
        &self,
        event_type: &str,
        severity: AuditSeverity,
        user_id: &str,
        ctx: &RequestContext,
    ) -> AuditEvent {
        let mut event = AuditEvent::new(event_type, severity).user(user_id);
        if let Some(ip) = &ctx.ip_address {
            event = event.ip_address(ip.clone());
        }
        if let Some(agent) = &ctx.user_agent {
            event = event.user_agent(agent.clone());
        }
        if let Some(session) = &ctx.session_id {
            event = event.session(session.clone());
        }
        event
    }
}

/// Restore a chat message's plaintext content
///
/// Content written before a sealer was configured is stored as-is and
/// passes through unchanged; only sealed envelopes are opened.
fn open_content(sealer: &dyn PayloadSealer, content: &str) -> Result<String> {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(content) else {
        return Ok(content.to_string());
    };
    if !SealedPayload::is_sealed(&value) {
        return Ok(content.to_string());
    }
    match sealer.unseal(&value)? {
        serde_json::Value::String(s) => Ok(s),
        other => Ok(other.to_string()),
    }
}
