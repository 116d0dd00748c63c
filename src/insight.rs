//! Insight retrieval, ranking, and pagination
//!
//! Insights are rule-derived notices over a child's health data. Listing
//! them is a two-step flow: the persistence seam returns the filtered
//! active set, then a pure ranking policy orders it (severity rank
//! ascending, newest first within a rank) and applies the caller's
//! pagination window.

use crate::error::Result;
use crate::types::{InsightRecord, InsightSeverity, PageRequest, Pagination};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Filter clauses for an insight listing
///
/// All clauses must hold for a row to be included. Dismissed and expired
/// insights are always excluded; the caller layer, not this filter, is
/// responsible for capping `page.limit` to a sane maximum.
#[derive(Debug, Clone)]
pub struct InsightFilter {
    pub child_id: String,
    pub insight_type: Option<String>,
    pub severity: Option<InsightSeverity>,
    pub unread_only: bool,
    pub page: PageRequest,
}

impl InsightFilter {
    /// Filter for all active insights of a child, first 20
    pub fn for_child(child_id: impl Into<String>) -> Self {
        Self {
            child_id: child_id.into(),
            insight_type: None,
            severity: None,
            unread_only: false,
            page: PageRequest::new(20, 0),
        }
    }

    pub fn insight_type(mut self, t: impl Into<String>) -> Self {
        self.insight_type = Some(t.into());
        self
    }

    pub fn severity(mut self, severity: InsightSeverity) -> Self {
        self.severity = Some(severity);
        self
    }

    pub fn unread_only(mut self) -> Self {
        self.unread_only = true;
        self
    }

    pub fn page(mut self, limit: usize, offset: usize) -> Self {
        self.page = PageRequest::new(limit, offset);
        self
    }

    /// Whether `insight` matches every clause at `now`
    pub fn matches(&self, insight: &InsightRecord, now: DateTime<Utc>) -> bool {
        insight.child_id == self.child_id
            && insight.is_active(now)
            && self
                .insight_type
                .as_ref()
                .map_or(true, |t| &insight.insight_type == t)
            && self.severity.map_or(true, |s| insight.severity == s)
            && (!self.unread_only || !insight.is_read)
    }
}

/// One page of ranked insights plus pagination metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsightPage {
    pub insights: Vec<InsightRecord>,
    pub pagination: Pagination,
}

/// Persistence seam for insight records
///
/// `fetch_active` returns the rows matching the filter's equality clauses
/// and the expiry invariant, in no particular order; ordering and
/// windowing are the ranker's job.
#[async_trait]
pub trait InsightStore: Send + Sync {
    async fn insert(&self, insight: &InsightRecord) -> Result<()>;

    /// All active rows matching `filter`, unordered and unpaginated
    async fn fetch_active(&self, filter: &InsightFilter, now: DateTime<Utc>)
        -> Result<Vec<InsightRecord>>;
}

/// In-memory insight store for development and testing
#[derive(Default)]
pub struct MemoryInsightStore {
    insights: Arc<RwLock<Vec<InsightRecord>>>,
}

#[async_trait]
impl InsightStore for MemoryInsightStore {
    async fn insert(&self, insight: &InsightRecord) -> Result<()> {
        let mut insights = self.insights.write().await;
        insights.push(insight.clone());
        Ok(())
    }

    async fn fetch_active(
        &self,
        filter: &InsightFilter,
        now: DateTime<Utc>,
    ) -> Result<Vec<InsightRecord>> {
        let insights = self.insights.read().await;
        Ok(insights
            .iter()
            .filter(|i| filter.matches(i, now))
            .cloned()
            .collect())
    }
}

/// Order insights in place: severity rank ascending, then newest first
///
/// Pure policy; `InsightSeverity`'s declaration order supplies the rank,
/// so a new severity variant cannot be forgotten by a lookup table.
pub fn rank_insights(insights: &mut [InsightRecord]) {
    insights.sort_by(|a, b| {
        a.severity
            .cmp(&b.severity)
            .then(b.generated_at.cmp(&a.generated_at))
    });
}

/// Rank a filtered set and cut the requested window out of it
///
/// `total` counts the whole matching set before the window; `has_more`
/// is `(offset + limit) < total`.
pub fn rank_and_page(mut insights: Vec<InsightRecord>, page: PageRequest) -> InsightPage {
    rank_insights(&mut insights);

    let total = insights.len();
    let windowed: Vec<InsightRecord> = insights
        .into_iter()
        .skip(page.offset)
        .take(page.limit)
        .collect();

    InsightPage {
        insights: windowed,
        pagination: Pagination::for_window(total, page),
    }
}

/// Insight listing service over a pluggable store
#[derive(Clone)]
pub struct InsightRanker {
    store: Arc<dyn InsightStore>,
}

impl InsightRanker {
    pub fn new(store: impl InsightStore + 'static) -> Self {
        Self {
            store: Arc::new(store),
        }
    }

    pub fn with_store(store: Arc<dyn InsightStore>) -> Self {
        Self { store }
    }

    /// Store a newly generated insight
    pub async fn add(&self, insight: &InsightRecord) -> Result<()> {
        self.store.insert(insight).await
    }

    /// Produce a ranked page of active insights for the filter
    pub async fn list(&self, filter: &InsightFilter) -> Result<InsightPage> {
        let matching = self.store.fetch_active(filter, Utc::now()).await?;
        Ok(rank_and_page(matching, filter.page))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::prefixed_id;
    use chrono::Duration;

    fn insight(severity: InsightSeverity, generated_at: DateTime<Utc>) -> InsightRecord {
        InsightRecord {
            id: prefixed_id("ins"),
            child_id: "chd-1".to_string(),
            insight_type: "growth_percentile".to_string(),
            title: "Growth check".to_string(),
            description: "Weight percentile shifted".to_string(),
            data: serde_json::json!({}),
            severity,
            is_read: false,
            is_dismissed: false,
            action_required: false,
            generated_at,
            expires_at: None,
        }
    }

    #[test]
    fn test_severity_ordering() {
        let t0 = Utc::now();
        // Generated in this order: warning, critical, info, alert
        let mut set = vec![
            insight(InsightSeverity::Warning, t0),
            insight(InsightSeverity::Critical, t0 + Duration::minutes(1)),
            insight(InsightSeverity::Info, t0 + Duration::minutes(2)),
            insight(InsightSeverity::Alert, t0 + Duration::minutes(3)),
        ];

        rank_insights(&mut set);

        let order: Vec<InsightSeverity> = set.iter().map(|i| i.severity).collect();
        assert_eq!(
            order,
            vec![
                InsightSeverity::Critical,
                InsightSeverity::Alert,
                InsightSeverity::Warning,
                InsightSeverity::Info,
            ]
        );
    }

    #[test]
    fn test_tie_break_newest_first() {
        let t1 = Utc::now();
        let t2 = t1 + Duration::hours(1);

        let older = insight(InsightSeverity::Critical, t1);
        let newer = insight(InsightSeverity::Critical, t2);
        let mut set = vec![older.clone(), newer.clone()];

        rank_insights(&mut set);
        assert_eq!(set[0].id, newer.id);
        assert_eq!(set[1].id, older.id);
    }

    #[test]
    fn test_pagination_contract() {
        let t0 = Utc::now();
        let set: Vec<InsightRecord> = (0..25)
            .map(|i| insight(InsightSeverity::Info, t0 + Duration::minutes(i)))
            .collect();

        let tail = rank_and_page(set.clone(), PageRequest::new(10, 20));
        assert_eq!(tail.insights.len(), 5);
        assert_eq!(tail.pagination.total, 25);
        assert!(!tail.pagination.has_more);

        let head = rank_and_page(set, PageRequest::new(10, 0));
        assert_eq!(head.insights.len(), 10);
        assert!(head.pagination.has_more);
    }

    #[test]
    fn test_pagination_offset_past_end() {
        let set = vec![insight(InsightSeverity::Info, Utc::now())];
        let page = rank_and_page(set, PageRequest::new(10, 50));
        assert!(page.insights.is_empty());
        assert_eq!(page.pagination.total, 1);
        assert!(!page.pagination.has_more);
    }

    #[tokio::test]
    async fn test_expiry_filtering() {
        let store = MemoryInsightStore::default();
        let now = Utc::now();

        let mut expired = insight(InsightSeverity::Alert, now - Duration::days(2));
        expired.expires_at = Some(now - Duration::days(1));
        let mut live = insight(InsightSeverity::Alert, now - Duration::days(2));
        live.expires_at = Some(now + Duration::days(1));
        let perpetual = insight(InsightSeverity::Info, now);

        for i in [&expired, &live, &perpetual] {
            store.insert(i).await.unwrap();
        }

        let filter = InsightFilter::for_child("chd-1");
        let active = store.fetch_active(&filter, now).await.unwrap();
        let ids: Vec<&str> = active.iter().map(|i| i.id.as_str()).collect();

        assert_eq!(active.len(), 2);
        assert!(ids.contains(&live.id.as_str()));
        assert!(ids.contains(&perpetual.id.as_str()));
        assert!(!ids.contains(&expired.id.as_str()));
    }

    #[tokio::test]
    async fn test_dismissed_excluded() {
        let store = MemoryInsightStore::default();
        let mut dismissed = insight(InsightSeverity::Critical, Utc::now());
        dismissed.is_dismissed = true;
        store.insert(&dismissed).await.unwrap();

        let filter = InsightFilter::for_child("chd-1");
        assert!(store.fetch_active(&filter, Utc::now()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_filter_clauses() {
        let store = MemoryInsightStore::default();
        let now = Utc::now();

        let mut milestone = insight(InsightSeverity::Info, now);
        milestone.insight_type = "milestone".to_string();
        milestone.is_read = true;
        let growth = insight(InsightSeverity::Warning, now);
        let mut other_child = insight(InsightSeverity::Warning, now);
        other_child.child_id = "chd-2".to_string();

        for i in [&milestone, &growth, &other_child] {
            store.insert(i).await.unwrap();
        }

        let by_type = InsightFilter::for_child("chd-1").insight_type("milestone");
        assert_eq!(store.fetch_active(&by_type, now).await.unwrap().len(), 1);

        let by_severity = InsightFilter::for_child("chd-1").severity(InsightSeverity::Warning);
        assert_eq!(store.fetch_active(&by_severity, now).await.unwrap().len(), 1);

        let unread = InsightFilter::for_child("chd-1").unread_only();
        let unread_rows = store.fetch_active(&unread, now).await.unwrap();
        assert_eq!(unread_rows.len(), 1);
        assert_eq!(unread_rows[0].id, growth.id);
    }

    #[tokio::test]
    async fn test_ranker_end_to_end() {
        let ranker = InsightRanker::new(MemoryInsightStore::default());
        let t0 = Utc::now();

        for (sev, minutes) in [
            (InsightSeverity::Info, 0),
            (InsightSeverity::Critical, 1),
            (InsightSeverity::Warning, 2),
        ] {
            ranker
                .add(&insight(sev, t0 + Duration::minutes(minutes)))
                .await
                .unwrap();
        }

        let page = ranker
            .list(&InsightFilter::for_child("chd-1").page(2, 0))
            .await
            .unwrap();

        assert_eq!(page.insights.len(), 2);
        assert_eq!(page.insights[0].severity, InsightSeverity::Critical);
        assert_eq!(page.insights[1].severity, InsightSeverity::Warning);
        assert_eq!(page.pagination.total, 3);
        assert!(page.pagination.has_more);
    }
}
