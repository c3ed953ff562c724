use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

/// Cache backend trait - abstraction over caching backends (Redis, in-memory).
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Get a value from the cache. Expired entries are reported as absent.
    async fn get(&self, key: &str) -> Result<Option<Value>, CacheError>;

    /// Set a value in the cache with a TTL.
    async fn set(&self, key: &str, value: &Value, ttl: Duration) -> Result<(), CacheError>;

    /// Delete a key from the cache.
    async fn delete(&self, key: &str) -> Result<(), CacheError>;

    /// Remove every entry this process controls.
    async fn clear(&self) -> Result<(), CacheError>;

    /// Check if a live key exists.
    async fn exists(&self, key: &str) -> Result<bool, CacheError>;

    /// Delete all keys matching a glob pattern (`*` and `?` wildcards).
    /// Returns the number of keys removed.
    async fn delete_matching(&self, pattern: &str) -> Result<usize, CacheError>;

    /// Backend-specific statistics.
    async fn stats(&self) -> Result<BackendStats, CacheError>;

    /// Release underlying resources. Calling it twice is a no-op.
    async fn close(&self) -> Result<(), CacheError>;
}

/// Statistics reported by a cache backend.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BackendStats {
    pub backend: &'static str,
    pub entries: usize,
    /// Approximate size of stored payloads in bytes, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approx_bytes: Option<usize>,
    /// Age of the oldest stored entry in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oldest_entry_secs: Option<f64>,
}

/// Cache operation errors.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Serialization failed: {0}")]
    Serialization(String),

    #[error("Operation failed: {0}")]
    Operation(String),
}
