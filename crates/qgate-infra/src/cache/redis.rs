//! Redis cache implementation with connection pooling and key namespacing.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use serde_json::Value;
use tokio::sync::RwLock;

use qgate_core::ports::{BackendStats, CacheBackend, CacheError};

use super::pattern::{check_glob, escape_glob};

const SCAN_BATCH: usize = 200;

/// Redis connection configuration.
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// Redis URL (e.g., redis://localhost:6379)
    pub url: String,
    /// Connection timeout
    pub connect_timeout: Duration,
    /// Prefix prepended to every key this process writes
    pub key_prefix: String,
}

/// Redis-backed cache implementation.
///
/// Values are stored as JSON text with a native TTL. Every key is namespaced
/// under `key_prefix`, so [`CacheBackend::clear`] only touches this
/// process's entries.
pub struct RedisCache {
    conn: RwLock<Option<ConnectionManager>>,
    config: RedisConfig,
}

impl RedisCache {
    pub async fn new(config: RedisConfig) -> Result<Self, CacheError> {
        let client =
            Client::open(config.url.as_str()).map_err(|e| CacheError::Connection(e.to_string()))?;

        // Use timeout to prevent hanging if Redis is unreachable
        let conn_manager_fut = ConnectionManager::new(client);
        let conn = tokio::time::timeout(config.connect_timeout, conn_manager_fut)
            .await
            .map_err(|_| CacheError::Connection("Connection timed out".to_string()))?
            .map_err(|e| CacheError::Connection(e.to_string()))?;

        tracing::info!(url = %config.url, prefix = %config.key_prefix, "Connected to Redis cache");

        Ok(Self {
            conn: RwLock::new(Some(conn)),
            config,
        })
    }

    fn namespaced(&self, key: &str) -> String {
        format!("{}{}", self.config.key_prefix, key)
    }

    /// `MATCH` pattern for `glob` within this namespace.
    fn namespaced_glob(&self, glob: &str) -> String {
        format!("{}{}", escape_glob(&self.config.key_prefix), glob)
    }

    async fn connection(&self) -> Result<ConnectionManager, CacheError> {
        self.conn
            .read()
            .await
            .clone()
            .ok_or_else(|| CacheError::Connection("Redis cache is closed".to_string()))
    }

    async fn scan_keys(
        conn: &mut ConnectionManager,
        pattern: &str,
    ) -> Result<Vec<String>, CacheError> {
        let mut keys = Vec::new();
        let mut cursor: u64 = 0;

        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(conn)
                .await
                .map_err(|e| CacheError::Operation(e.to_string()))?;

            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }

        Ok(keys)
    }

    async fn delete_pattern(&self, pattern: &str) -> Result<usize, CacheError> {
        let mut conn = self.connection().await?;
        let keys = Self::scan_keys(&mut conn, pattern).await?;
        if keys.is_empty() {
            return Ok(0);
        }

        conn.del::<_, ()>(keys.as_slice())
            .await
            .map_err(|e| CacheError::Operation(e.to_string()))?;
        Ok(keys.len())
    }
}

#[async_trait]
impl CacheBackend for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<Value>, CacheError> {
        let mut conn = self.connection().await?;
        let raw = conn
            .get::<_, Option<String>>(self.namespaced(key))
            .await
            .map_err(|e| CacheError::Operation(e.to_string()))?;

        raw.map(|text| {
            serde_json::from_str(&text).map_err(|e| CacheError::Serialization(e.to_string()))
        })
        .transpose()
    }

    async fn set(&self, key: &str, value: &Value, ttl: Duration) -> Result<(), CacheError> {
        let payload =
            serde_json::to_string(value).map_err(|e| CacheError::Serialization(e.to_string()))?;
        // SETEX rejects a zero expiry; round sub-second TTLs up.
        let ttl_secs = ttl.as_secs_f64().ceil().max(1.0) as u64;

        let mut conn = self.connection().await?;
        conn.set_ex::<_, _, ()>(self.namespaced(key), payload, ttl_secs)
            .await
            .map_err(|e| CacheError::Operation(e.to_string()))?;

        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        conn.del::<_, ()>(self.namespaced(key))
            .await
            .map_err(|e| CacheError::Operation(e.to_string()))?;
        Ok(())
    }

    async fn clear(&self) -> Result<(), CacheError> {
        let removed = self.delete_pattern(&self.namespaced_glob("*")).await?;
        tracing::info!(removed, prefix = %self.config.key_prefix, "Cleared Redis cache namespace");
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        let mut conn = self.connection().await?;
        conn.exists::<_, bool>(self.namespaced(key))
            .await
            .map_err(|e| CacheError::Operation(e.to_string()))
    }

    async fn delete_matching(&self, pattern: &str) -> Result<usize, CacheError> {
        check_glob(pattern)?;
        self.delete_pattern(&self.namespaced_glob(pattern)).await
    }

    async fn stats(&self) -> Result<BackendStats, CacheError> {
        let mut conn = self.connection().await?;
        let keys = Self::scan_keys(&mut conn, &self.namespaced_glob("*")).await?;

        Ok(BackendStats {
            backend: "redis",
            entries: keys.len(),
            approx_bytes: None,
            oldest_entry_secs: None,
        })
    }

    async fn close(&self) -> Result<(), CacheError> {
        if self.conn.write().await.take().is_some() {
            tracing::info!(url = %self.config.url, "Closed Redis cache connection");
        }
        Ok(())
    }
}
