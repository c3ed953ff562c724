//! Probe report assembled from the live client, limiter and cache.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use qgate_core::ports::QueryParams;
use qgate_infra::{CacheParams, CacheStats, RateLimitStatus};

/// Result of one probe run.
#[derive(Debug, Clone, Serialize)]
pub struct ProbeReport {
    pub checked_at: DateTime<Utc>,
    pub base_url: String,
    pub reachable: bool,
    pub authenticated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_count: Option<u64>,
    pub rate_limit: RateLimitStatus,
    pub cache: CacheStats,
}

/// Cache key parameters for a request query, so the key tracks the query.
pub fn cache_params(query: &QueryParams) -> CacheParams {
    query
        .iter()
        .map(|(key, value)| (key.clone(), Value::String(value.clone())))
        .collect()
}

/// Number of projects in a `projects/search` payload: the paging total when
/// present, else the length of the `components` page.
pub fn project_count(payload: &Value) -> Option<u64> {
    payload
        .pointer("/paging/total")
        .and_then(Value::as_u64)
        .or_else(|| {
            payload
                .get("components")
                .and_then(Value::as_array)
                .map(|components| components.len() as u64)
        })
}
