//! Stubbed medical web search
//!
//! Produces supplementary results from a curated set of trusted medical
//! sources. A production deployment would swap this for a real search
//! integration; the relevance filter and ordering are the contract.

use serde::{Deserialize, Serialize};

/// One supplementary search result
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub source: String,
    pub url: String,
    pub snippet: String,
    pub relevance: f64,
}

const MIN_RELEVANCE: f64 = 0.7;
const MAX_RESULTS: usize = 5;

/// Search curated medical sources for `query`
///
/// Results below the relevance floor are dropped; the rest come back
/// sorted by relevance descending, capped at five.
pub fn medical_search(query: &str) -> Vec<SearchResult> {
    let mut results = vec![
        SearchResult {
            source: "Mayo Clinic".to_string(),
            url: format!("https://www.mayoclinic.org/search?q={}", query),
            snippet: format!("Trusted medical information about {} from Mayo Clinic.", query),
            relevance: 0.9,
        },
        SearchResult {
            source: "WebMD".to_string(),
            url: format!("https://www.webmd.com/search?q={}", query),
            snippet: format!("Health resources and medical information about {}.", query),
            relevance: 0.8,
        },
        SearchResult {
            source: "Healthline".to_string(),
            url: format!("https://www.healthline.com/search?q={}", query),
            snippet: format!("Medically reviewed health articles about {}.", query),
            relevance: 0.85,
        },
    ];

    results.retain(|r| r.relevance > MIN_RELEVANCE);
    results.sort_by(|a, b| b.relevance.total_cmp(&a.relevance));
    results.truncate(MAX_RESULTS);
    results
}
