//! Service integration tests
//!
//! End-to-end tests exercising the composed HealthService over the
//! in-memory stores. Covers the audited child/record flows, rate-limited
//! search, insight ranking and pagination, payload sealing, and the
//! decoupling of audit failures from business outcomes.

use chrono::{Duration, NaiveDate, Utc};
use maxi_health::{
    Aes256GcmSealer, AuditEvent, AuditSeverity, AuditStore, AuditTrail, ChatQuery, ChatRole,
    ChatStore, HealthError, HealthService, InsightFilter, InsightRanker, InsightRecord,
    InsightSeverity, ManualClock, MemoryAuditStore, MemoryChatStore, MemoryChildStore,
    MemoryInsightStore, MemoryRecordStore, NewChatMessage, NewChild, NewHealthRecord,
    PayloadSealer, RateLimiter, RecordQuery, RecordStore, RequestContext, SealedPayload,
};
use std::sync::Arc;

struct Harness {
    service: HealthService,
    audit_store: Arc<dyn AuditStore>,
    insights: InsightRanker,
    clock: Arc<ManualClock>,
}

fn harness() -> Harness {
    let audit_store: Arc<dyn AuditStore> = Arc::new(MemoryAuditStore::default());
    let clock = Arc::new(ManualClock::new(1_700_000_000_000));
    let insights = InsightRanker::new(MemoryInsightStore::default());

    let service = HealthService::new(
        Arc::new(MemoryChildStore::default()),
        Arc::new(MemoryRecordStore::default()),
        Arc::new(MemoryChatStore::default()),
        insights.clone(),
        AuditTrail::with_store(audit_store.clone()),
        Arc::new(RateLimiter::new(clock.clone())),
    );

    Harness {
        service,
        audit_store,
        insights,
        clock,
    }
}

fn ctx() -> RequestContext {
    RequestContext::new("203.0.113.7", "maxi-app/2.1")
}

fn child_input(name: &str) -> NewChild {
    NewChild {
        name: name.to_string(),
        birth_date: NaiveDate::from_ymd_opt(2024, 3, 15).unwrap(),
        gender: "female".to_string(),
        blood_type: Some("O+".to_string()),
        allergies: vec!["penicillin".to_string()],
        medical_conditions: Vec::new(),
        pediatrician_info: serde_json::json!({"name": "Dr. Ruiz"}),
        emergency_contact: serde_json::json!({"phone": "555-0101"}),
    }
}

fn insight(child_id: &str, severity: InsightSeverity, minutes: i64) -> InsightRecord {
    InsightRecord {
        id: format!("ins-{}", uuid_like(severity, minutes)),
        child_id: child_id.to_string(),
        insight_type: "growth_percentile".to_string(),
        title: "Growth check".to_string(),
        description: "Weight percentile shifted since last measurement".to_string(),
        data: serde_json::json!({}),
        severity,
        is_read: false,
        is_dismissed: false,
        action_required: false,
        generated_at: Utc::now() + Duration::minutes(minutes),
        expires_at: None,
    }
}

fn uuid_like(severity: InsightSeverity, minutes: i64) -> String {
    format!("{:?}-{}", severity, minutes).to_lowercase()
}

// ─── Audited flows ───────────────────────────────────────────────

#[tokio::test]
async fn test_child_and_record_flow_writes_audit_trail() {
    let h = harness();

    let child = h
        .service
        .register_child("usr-1", child_input("Maxi"), &ctx())
        .await
        .unwrap();

    h.service
        .add_health_record(
            "usr-1",
            NewHealthRecord {
                child_id: child.id.clone(),
                record_type: "weight".to_string(),
                timestamp: Utc::now(),
                data: serde_json::json!({"value": 9.2, "unit": "kg"}),
                ai_extracted: false,
                original_input: None,
                ai_processing: None,
                tags: vec!["checkup".to_string()],
            },
            &ctx(),
        )
        .await
        .unwrap();

    let audits = h.audit_store.recent(10).await.unwrap();
    assert_eq!(audits.len(), 2);
    // Newest first
    assert_eq!(audits[0].event_type, "health_record_created");
    assert_eq!(audits[1].event_type, "child_created");

    for record in &audits {
        assert_eq!(record.severity, AuditSeverity::Info);
        assert_eq!(record.hash.len(), 64);
        assert_eq!(AuditTrail::expected_hash(record).unwrap(), record.hash);
        assert_eq!(record.ip_address.as_deref(), Some("203.0.113.7"));
    }
}

#[tokio::test]
async fn test_chat_transcript_conversation_order() {
    let h = harness();
    let child = h
        .service
        .register_child("usr-1", child_input("Maxi"), &ctx())
        .await
        .unwrap();

    for (role, content) in [
        (ChatRole::User, "she felt warm tonight"),
        (ChatRole::Assistant, "what temperature did you measure?"),
        (ChatRole::User, "38.7 under the arm"),
    ] {
        h.service
            .log_chat_message(
                "usr-1",
                NewChatMessage {
                    child_id: child.id.clone(),
                    session_id: "sess-1".to_string(),
                    role,
                    content: content.to_string(),
                    context: None,
                    ai_model: None,
                    tokens: None,
                },
            )
            .await
            .unwrap();
    }

    let page = h
        .service
        .list_chat("usr-1", ChatQuery::for_child(&child.id).session("sess-1"))
        .await
        .unwrap();
    assert_eq!(page.messages.len(), 3);
    assert_eq!(page.messages[0].content, "she felt warm tonight");
    assert_eq!(page.messages[2].content, "38.7 under the arm");
    assert_eq!(page.pagination.total, 3);
}

// ─── Insight ranking through the service ─────────────────────────

#[tokio::test]
async fn test_insight_listing_ranked_and_paginated() {
    let h = harness();
    let child = h
        .service
        .register_child("usr-1", child_input("Maxi"), &ctx())
        .await
        .unwrap();

    // Generated in increasing-timestamp order: warning, critical, info, alert
    for (severity, minutes) in [
        (InsightSeverity::Warning, 0),
        (InsightSeverity::Critical, 1),
        (InsightSeverity::Info, 2),
        (InsightSeverity::Alert, 3),
    ] {
        h.insights
            .add(&insight(&child.id, severity, minutes))
            .await
            .unwrap();
    }

    let page = h
        .service
        .list_insights("usr-1", InsightFilter::for_child(&child.id))
        .await
        .unwrap();

    let order: Vec<InsightSeverity> = page.insights.iter().map(|i| i.severity).collect();
    assert_eq!(
        order,
        vec![
            InsightSeverity::Critical,
            InsightSeverity::Alert,
            InsightSeverity::Warning,
            InsightSeverity::Info,
        ]
    );

    let windowed = h
        .service
        .list_insights("usr-1", InsightFilter::for_child(&child.id).page(2, 2))
        .await
        .unwrap();
    assert_eq!(windowed.insights.len(), 2);
    assert_eq!(windowed.pagination.total, 4);
    assert!(!windowed.pagination.has_more);
}

#[tokio::test]
async fn test_expired_insights_hidden_from_service_listing() {
    let h = harness();
    let child = h
        .service
        .register_child("usr-1", child_input("Maxi"), &ctx())
        .await
        .unwrap();

    let mut expired = insight(&child.id, InsightSeverity::Alert, -120);
    expired.expires_at = Some(Utc::now() - Duration::hours(1));
    h.insights.add(&expired).await.unwrap();
    h.insights
        .add(&insight(&child.id, InsightSeverity::Info, 0))
        .await
        .unwrap();

    let page = h
        .service
        .list_insights("usr-1", InsightFilter::for_child(&child.id))
        .await
        .unwrap();
    assert_eq!(page.pagination.total, 1);
    assert_eq!(page.insights[0].severity, InsightSeverity::Info);
}

// ─── Rate-limited search ─────────────────────────────────────────

#[tokio::test]
async fn test_search_throttle_lifecycle() {
    let h = harness();

    for _ in 0..20 {
        h.service.search_medical("usr-1", "fever", &ctx()).await.unwrap();
    }

    let err = h
        .service
        .search_medical("usr-1", "fever", &ctx())
        .await
        .unwrap_err();
    match err {
        HealthError::RateLimitExceeded { key, .. } => assert_eq!(key, "search_usr-1"),
        other => panic!("expected RateLimitExceeded, got {other}"),
    }

    // Rejection left no audit trace
    assert_eq!(h.audit_store.count().await.unwrap(), 20);

    h.clock.advance_secs(3601);
    let results = h.service.search_medical("usr-1", "fever", &ctx()).await.unwrap();
    assert!(!results.is_empty());
    assert_eq!(h.audit_store.count().await.unwrap(), 21);
}

// ─── Record history pagination ───────────────────────────────────

#[tokio::test]
async fn test_record_history_window() {
    let h = harness();
    let child = h
        .service
        .register_child("usr-1", child_input("Maxi"), &ctx())
        .await
        .unwrap();

    let t0 = Utc::now() - Duration::days(30);
    for i in 0..25 {
        h.service
            .add_health_record(
                "usr-1",
                NewHealthRecord {
                    child_id: child.id.clone(),
                    record_type: "weight".to_string(),
                    timestamp: t0 + Duration::days(i),
                    data: serde_json::json!({"value": 8.0 + i as f64 * 0.05, "unit": "kg"}),
                    ai_extracted: false,
                    original_input: None,
                    ai_processing: None,
                    tags: Vec::new(),
                },
                &ctx(),
            )
            .await
            .unwrap();
    }

    let tail = h
        .service
        .list_records("usr-1", RecordQuery::for_child(&child.id).page(10, 20))
        .await
        .unwrap();
    assert_eq!(tail.records.len(), 5);
    assert_eq!(tail.pagination.total, 25);
    assert!(!tail.pagination.has_more);

    // Newest first
    let head = h
        .service
        .list_records("usr-1", RecordQuery::for_child(&child.id).page(10, 0))
        .await
        .unwrap();
    assert!(head.pagination.has_more);
    assert!(head.records[0].timestamp > head.records[9].timestamp);
}

// ─── Audit decoupling ────────────────────────────────────────────

struct FailingAuditStore;

#[async_trait::async_trait]
impl AuditStore for FailingAuditStore {
    async fn insert(&self, _record: &maxi_health::AuditRecord) -> maxi_health::Result<()> {
        Err(HealthError::Store("audit table unavailable".to_string()))
    }
    async fn count(&self) -> maxi_health::Result<usize> {
        Ok(0)
    }
    async fn recent(&self, _limit: usize) -> maxi_health::Result<Vec<maxi_health::AuditRecord>> {
        Ok(Vec::new())
    }
}

#[tokio::test]
async fn test_audit_failure_never_masks_business_success() {
    let clock = Arc::new(ManualClock::new(1_700_000_000_000));
    let service = HealthService::new(
        Arc::new(MemoryChildStore::default()),
        Arc::new(MemoryRecordStore::default()),
        Arc::new(MemoryChatStore::default()),
        InsightRanker::new(MemoryInsightStore::default()),
        AuditTrail::new(FailingAuditStore),
        Arc::new(RateLimiter::new(clock)),
    );

    // The domain effect succeeds even though every audit write fails
    let child = service
        .register_child("usr-1", child_input("Maxi"), &ctx())
        .await
        .unwrap();
    assert_eq!(service.list_children("usr-1").await.unwrap().len(), 1);
    assert!(child.id.starts_with("chd-"));

    // Direct audit writes still surface the failure to callers who ask
    let err = service
        .audit()
        .record(AuditEvent::new("manual_check", AuditSeverity::Info))
        .await
        .unwrap_err();
    assert!(matches!(err, HealthError::AuditPersistence(_)));
}

// ─── Payload sealing ─────────────────────────────────────────────

#[tokio::test]
async fn test_sealed_payloads_end_to_end() {
    let record_store: Arc<MemoryRecordStore> = Arc::new(MemoryRecordStore::default());
    let chat_store: Arc<MemoryChatStore> = Arc::new(MemoryChatStore::default());
    let sealer = Arc::new(Aes256GcmSealer::new("phi-2025a", &[0x42; 32]));
    let clock = Arc::new(ManualClock::new(1_700_000_000_000));

    let service = HealthService::new(
        Arc::new(MemoryChildStore::default()),
        record_store.clone(),
        chat_store.clone(),
        InsightRanker::new(MemoryInsightStore::default()),
        AuditTrail::new(MemoryAuditStore::default()),
        Arc::new(RateLimiter::new(clock)),
    )
    .with_sealer(sealer.clone());

    let child = service
        .register_child("usr-1", child_input("Maxi"), &ctx())
        .await
        .unwrap();

    service
        .add_health_record(
            "usr-1",
            NewHealthRecord {
                child_id: child.id.clone(),
                record_type: "temperature".to_string(),
                timestamp: Utc::now(),
                data: serde_json::json!({"value": 38.7, "unit": "celsius"}),
                ai_extracted: false,
                original_input: None,
                ai_processing: None,
                tags: Vec::new(),
            },
            &ctx(),
        )
        .await
        .unwrap();
    service
        .log_chat_message(
            "usr-1",
            NewChatMessage {
                child_id: child.id.clone(),
                session_id: "sess-1".to_string(),
                role: ChatRole::User,
                content: "her temperature was 38.7 tonight".to_string(),
                context: None,
                ai_model: None,
                tokens: None,
            },
        )
        .await
        .unwrap();

    // At rest both rows are opaque envelopes
    let raw_records = record_store
        .query(&RecordQuery::for_child(&child.id))
        .await
        .unwrap();
    assert!(SealedPayload::is_sealed(&raw_records.records[0].data));
    assert!(!raw_records.records[0].data.to_string().contains("celsius"));

    let raw_chat = chat_store
        .query(&ChatQuery::for_child(&child.id))
        .await
        .unwrap();
    assert!(!raw_chat.messages[0].content.contains("38.7"));

    // The service surface returns plaintext
    let page = service
        .list_records("usr-1", RecordQuery::for_child(&child.id))
        .await
        .unwrap();
    assert_eq!(page.records[0].data, serde_json::json!({"value": 38.7, "unit": "celsius"}));

    let transcript = service
        .list_chat("usr-1", ChatQuery::for_child(&child.id))
        .await
        .unwrap();
    assert_eq!(transcript.messages[0].content, "her temperature was 38.7 tonight");

    // Key rotation keeps the existing rows readable
    let mut rotated = Aes256GcmSealer::new("phi-2025a", &[0x42; 32]);
    rotated.register_key("phi-2026a", &[0x43; 32]).unwrap();
    rotated.rotate_to("phi-2026a").unwrap();
    assert_eq!(
        rotated.unseal(&raw_records.records[0].data).unwrap(),
        serde_json::json!({"value": 38.7, "unit": "celsius"})
    );
}
