//! In-memory cache implementation - used as fallback when Redis is unavailable.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;
use tokio::time::Instant;

use qgate_core::ports::{BackendStats, CacheBackend, CacheError};

use super::pattern::glob_to_regex;

/// Longest expiry an entry can be given; larger TTLs are clamped to it.
const MAX_TTL: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

struct CacheEntry {
    value: Value,
    created_at: Instant,
    expires_at: Instant,
    /// Serialized length of `value`, for size estimates.
    size: usize,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// In-memory cache using a HashMap behind an async RwLock.
///
/// Expired entries are evicted lazily on `get`/`exists`, or in bulk by
/// [`InMemoryCache::cleanup_expired`].
/// Note: Data is lost on process restart.
pub struct InMemoryCache {
    store: RwLock<HashMap<String, CacheEntry>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self {
            store: RwLock::new(HashMap::new()),
        }
    }

    /// Remove every expired entry. Returns how many were dropped.
    pub async fn cleanup_expired(&self) -> usize {
        let now = Instant::now();
        let mut store = self.store.write().await;
        let before = store.len();
        store.retain(|_, entry| !entry.is_expired(now));
        let removed = before - store.len();

        if removed > 0 {
            tracing::debug!(removed, "Swept expired cache entries");
        }
        removed
    }

    async fn live_value(&self, key: &str) -> Option<Value> {
        let now = Instant::now();
        let store = self.store.read().await;
        let entry = store.get(key)?;

        if entry.is_expired(now) {
            drop(store);
            let mut store = self.store.write().await;
            // Another writer may have replaced the entry in between.
            if store.get(key).is_some_and(|entry| entry.is_expired(now)) {
                store.remove(key);
            }
            return None;
        }

        Some(entry.value.clone())
    }
}

impl Default for InMemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheBackend for InMemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Value>, CacheError> {
        Ok(self.live_value(key).await)
    }

    async fn set(&self, key: &str, value: &Value, ttl: Duration) -> Result<(), CacheError> {
        let size = serde_json::to_vec(value)
            .map_err(|e| CacheError::Serialization(e.to_string()))?
            .len();
        let now = Instant::now();
        let expires_at = now
            .checked_add(ttl.min(MAX_TTL))
            .ok_or_else(|| CacheError::Operation(format!("TTL {ttl:?} is out of range")))?;

        let mut store = self.store.write().await;
        store.insert(
            key.to_string(),
            CacheEntry {
                value: value.clone(),
                created_at: now,
                expires_at,
                size,
            },
        );

        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut store = self.store.write().await;
        store.remove(key);
        Ok(())
    }

    async fn clear(&self) -> Result<(), CacheError> {
        let mut store = self.store.write().await;
        store.clear();
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        Ok(self.live_value(key).await.is_some())
    }

    async fn delete_matching(&self, pattern: &str) -> Result<usize, CacheError> {
        let matcher = glob_to_regex(pattern)?;
        let mut store = self.store.write().await;
        let before = store.len();
        store.retain(|key, _| !matcher.is_match(key));
        Ok(before - store.len())
    }

    async fn stats(&self) -> Result<BackendStats, CacheError> {
        let now = Instant::now();
        let store = self.store.read().await;

        Ok(BackendStats {
            backend: "memory",
            entries: store.len(),
            approx_bytes: Some(store.iter().map(|(key, entry)| key.len() + entry.size).sum()),
            oldest_entry_secs: store
                .values()
                .map(|entry| now.saturating_duration_since(entry.created_at).as_secs_f64())
                .reduce(f64::max),
        })
    }

    async fn close(&self) -> Result<(), CacheError> {
        self.clear().await
    }
}
