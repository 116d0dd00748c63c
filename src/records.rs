//! Health record and chat transcript persistence seams
//!
//! Listings follow the same pagination contract as insights but with
//! fixed orderings: health records newest first, chat messages oldest
//! first (conversation order).

use crate::error::Result;
use crate::types::{ChatMessage, ChildProfile, HealthRecord, PageRequest, Pagination};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Filter for a health-record listing
#[derive(Debug, Clone)]
pub struct RecordQuery {
    pub child_id: String,
    pub record_type: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub page: PageRequest,
}

impl RecordQuery {
    pub fn for_child(child_id: impl Into<String>) -> Self {
        Self {
            child_id: child_id.into(),
            record_type: None,
            start: None,
            end: None,
            page: PageRequest::new(100, 0),
        }
    }

    pub fn record_type(mut self, t: impl Into<String>) -> Self {
        self.record_type = Some(t.into());
        self
    }

    pub fn between(mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.start = Some(start);
        self.end = Some(end);
        self
    }

    pub fn page(mut self, limit: usize, offset: usize) -> Self {
        self.page = PageRequest::new(limit, offset);
        self
    }

    fn matches(&self, record: &HealthRecord) -> bool {
        record.child_id == self.child_id
            && self
                .record_type
                .as_ref()
                .map_or(true, |t| &record.record_type == t)
            && self.start.map_or(true, |s| record.timestamp >= s)
            && self.end.map_or(true, |e| record.timestamp <= e)
    }
}

/// One page of health records, newest first
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordPage {
    pub records: Vec<HealthRecord>,
    pub pagination: Pagination,
}

/// Persistence seam for health records
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn insert(&self, record: &HealthRecord) -> Result<()>;

    /// Matching records ordered by measurement timestamp descending,
    /// with the query's pagination window applied
    async fn query(&self, query: &RecordQuery) -> Result<RecordPage>;
}

/// Filter for a chat transcript listing
#[derive(Debug, Clone)]
pub struct ChatQuery {
    pub child_id: String,
    pub session_id: Option<String>,
    pub page: PageRequest,
}

impl ChatQuery {
    pub fn for_child(child_id: impl Into<String>) -> Self {
        Self {
            child_id: child_id.into(),
            session_id: None,
            page: PageRequest::new(50, 0),
        }
    }

    pub fn session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn page(mut self, limit: usize, offset: usize) -> Self {
        self.page = PageRequest::new(limit, offset);
        self
    }

    fn matches(&self, message: &ChatMessage) -> bool {
        message.child_id == self.child_id
            && self
                .session_id
                .as_ref()
                .map_or(true, |s| &message.session_id == s)
    }
}

/// One page of chat messages in conversation order
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatPage {
    pub messages: Vec<ChatMessage>,
    pub pagination: Pagination,
}

/// Persistence seam for chat transcripts
#[async_trait]
pub trait ChatStore: Send + Sync {
    async fn insert(&self, message: &ChatMessage) -> Result<()>;

    /// Matching messages ordered by timestamp ascending, paginated
    async fn query(&self, query: &ChatQuery) -> Result<ChatPage>;
}

/// Persistence seam for child profiles
#[async_trait]
pub trait ChildStore: Send + Sync {
    async fn insert(&self, child: &ChildProfile) -> Result<()>;

    /// Look up an active profile by id
    async fn get(&self, child_id: &str) -> Result<Option<ChildProfile>>;

    /// All active profiles owned by a user
    async fn list_for_user(&self, user_id: &str) -> Result<Vec<ChildProfile>>;
}

/// In-memory child-profile store for development and testing
#[derive(Default)]
pub struct MemoryChildStore {
    children: Arc<RwLock<Vec<ChildProfile>>>,
}

#[async_trait]
impl ChildStore for MemoryChildStore {
    async fn insert(&self, child: &ChildProfile) -> Result<()> {
        let mut children = self.children.write().await;
        children.push(child.clone());
        Ok(())
    }

    async fn get(&self, child_id: &str) -> Result<Option<ChildProfile>> {
        let children = self.children.read().await;
        Ok(children
            .iter()
            .find(|c| c.id == child_id && c.is_active)
            .cloned())
    }

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<ChildProfile>> {
        let children = self.children.read().await;
        Ok(children
            .iter()
            .filter(|c| c.user_id == user_id && c.is_active)
            .cloned()
            .collect())
    }
}

/// In-memory record store for development and testing
#[derive(Default)]
pub struct MemoryRecordStore {
    records: Arc<RwLock<Vec<HealthRecord>>>,
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn insert(&self, record: &HealthRecord) -> Result<()> {
        let mut records = self.records.write().await;
        records.push(record.clone());
        Ok(())
    }

    async fn query(&self, query: &RecordQuery) -> Result<RecordPage> {
        let records = self.records.read().await;
        let mut matching: Vec<HealthRecord> =
            records.iter().filter(|r| query.matches(r)).cloned().collect();
        matching.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

        let total = matching.len();
        let windowed = matching
            .into_iter()
            .skip(query.page.offset)
            .take(query.page.limit)
            .collect();

        Ok(RecordPage {
            records: windowed,
            pagination: Pagination::for_window(total, query.page),
        })
    }
}

/// In-memory chat store for development and testing
#[derive(Default)]
pub struct MemoryChatStore {
    messages: Arc<RwLock<Vec<ChatMessage>>>,
}

#[async_trait]
impl ChatStore for MemoryChatStore {
    async fn insert(&self, message: &ChatMessage) -> Result<()> {
        let mut messages = self.messages.write().await;
        messages.push(message.clone());
        Ok(())
    }

    async fn query(&self, query: &ChatQuery) -> Result<ChatPage> {
        let messages = self.messages.read().await;
        let mut matching: Vec<ChatMessage> =
            messages.iter().filter(|m| query.matches(m)).cloned().collect();
        matching.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));

        let total = matching.len();
        let windowed = matching
            .into_iter()
            .skip(query.page.offset)
            .take(query.page.limit)
            .collect();

        Ok(ChatPage {
            messages: windowed,
            pagination: Pagination::for_window(total, query.page),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{prefixed_id, ChatRole, SyncStatus};
    use chrono::Duration;

    fn record(record_type: &str, timestamp: DateTime<Utc>) -> HealthRecord {
        HealthRecord {
            id: prefixed_id("rec"),
            child_id: "chd-1".to_string(),
            record_type: record_type.to_string(),
            timestamp,
            data: serde_json::json!({"value": 9.2, "unit": "kg"}),
            ai_extracted: false,
            original_input: None,
            ai_processing: None,
            tags: Vec::new(),
            sync_status: SyncStatus::Pending,
            created_at: Utc::now(),
        }
    }

    fn message(session: &str, content: &str, timestamp: DateTime<Utc>) -> ChatMessage {
        ChatMessage {
            id: prefixed_id("msg"),
            child_id: "chd-1".to_string(),
            session_id: session.to_string(),
            role: ChatRole::User,
            content: content.to_string(),
            context: None,
            ai_model: None,
            tokens: None,
            timestamp,
        }
    }

    #[tokio::test]
    async fn test_records_newest_first() {
        let store = MemoryRecordStore::default();
        let t0 = Utc::now();

        for i in 0..3 {
            store.insert(&record("weight", t0 + Duration::days(i))).await.unwrap();
        }

        let page = store.query(&RecordQuery::for_child("chd-1")).await.unwrap();
        assert_eq!(page.records.len(), 3);
        assert!(page.records[0].timestamp > page.records[1].timestamp);
        assert!(page.records[1].timestamp > page.records[2].timestamp);
    }

    #[tokio::test]
    async fn test_record_type_and_range_filters() {
        let store = MemoryRecordStore::default();
        let t0 = Utc::now();

        store.insert(&record("weight", t0)).await.unwrap();
        store.insert(&record("height", t0 + Duration::days(1))).await.unwrap();
        store.insert(&record("weight", t0 + Duration::days(10))).await.unwrap();

        let by_type = RecordQuery::for_child("chd-1").record_type("weight");
        assert_eq!(store.query(&by_type).await.unwrap().records.len(), 2);

        let ranged = RecordQuery::for_child("chd-1")
            .between(t0 - Duration::hours(1), t0 + Duration::days(2));
        assert_eq!(store.query(&ranged).await.unwrap().records.len(), 2);
    }

    #[tokio::test]
    async fn test_record_pagination() {
        let store = MemoryRecordStore::default();
        let t0 = Utc::now();

        for i in 0..25 {
            store.insert(&record("weight", t0 + Duration::minutes(i))).await.unwrap();
        }

        let tail = store
            .query(&RecordQuery::for_child("chd-1").page(10, 20))
            .await
            .unwrap();
        assert_eq!(tail.records.len(), 5);
        assert_eq!(tail.pagination.total, 25);
        assert!(!tail.pagination.has_more);
    }

    #[tokio::test]
    async fn test_chat_conversation_order() {
        let store = MemoryChatStore::default();
        let t0 = Utc::now();

        // Inserted out of order; listing must restore conversation order
        store.insert(&message("s1", "second", t0 + Duration::seconds(10))).await.unwrap();
        store.insert(&message("s1", "first", t0)).await.unwrap();
        store.insert(&message("s1", "third", t0 + Duration::seconds(20))).await.unwrap();

        let page = store.query(&ChatQuery::for_child("chd-1")).await.unwrap();
        let contents: Vec<&str> = page.messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn test_chat_session_filter() {
        let store = MemoryChatStore::default();
        let t0 = Utc::now();

        store.insert(&message("s1", "a", t0)).await.unwrap();
        store.insert(&message("s2", "b", t0)).await.unwrap();

        let page = store
            .query(&ChatQuery::for_child("chd-1").session("s2"))
            .await
            .unwrap();
        assert_eq!(page.messages.len(), 1);
        assert_eq!(page.messages[0].content, "b");
    }
}
