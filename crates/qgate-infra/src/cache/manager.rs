//! Cache manager - key derivation, per-category TTLs and hit/miss accounting.

use std::collections::{BTreeMap, HashMap};
use std::env;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use sha2::{Digest, Sha256};

use qgate_core::ports::{BackendStats, CacheBackend};

use super::memory::InMemoryCache;

/// Extra parameters folded into a cache key. Sorted, so ordering never
/// affects the derived key.
pub type CacheParams = BTreeMap<String, Value>;

/// Number of hex characters of the parameter digest kept in a key.
const PARAMS_HASH_LEN: usize = 16;

/// Cache configuration.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// TTL used when neither the caller nor the category specifies one.
    pub default_ttl: Duration,
    /// TTL per category (e.g. `projects`, `issues`).
    pub category_ttls: HashMap<String, Duration>,
    /// Redis URL. `None` selects the in-memory backend.
    pub redis_url: Option<String>,
    /// Namespace prefix for Redis keys.
    pub key_prefix: String,
    /// Redis connection timeout.
    pub connect_timeout: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        let category_ttls = [
            ("projects", 300),
            ("metrics", 300),
            ("issues", 60),
            ("quality_gates", 600),
        ]
        .into_iter()
        .map(|(category, secs)| (category.to_string(), Duration::from_secs(secs)))
        .collect();

        Self {
            default_ttl: Duration::from_secs(300),
            category_ttls,
            redis_url: None,
            key_prefix: "qgate:".to_string(),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

impl CacheConfig {
    /// Load configuration from environment variables.
    ///
    /// Category TTLs are read from `CACHE_TTL_<CATEGORY>=<seconds>`, on top of
    /// the built-in defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(secs) = env::var("CACHE_DEFAULT_TTL_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
        {
            config.default_ttl = Duration::from_secs(secs);
        }

        for (key, value) in env::vars() {
            if let Some(category) = key.strip_prefix("CACHE_TTL_") {
                match value.parse() {
                    Ok(secs) => {
                        config
                            .category_ttls
                            .insert(category.to_lowercase(), Duration::from_secs(secs));
                    }
                    Err(_) => {
                        tracing::warn!(variable = %key, value = %value, "Ignoring non-numeric cache TTL");
                    }
                }
            }
        }

        config.redis_url = env::var("REDIS_URL").ok().filter(|url| !url.is_empty());
        if let Ok(prefix) = env::var("REDIS_KEY_PREFIX") {
            config.key_prefix = prefix;
        }
        if let Some(secs) = env::var("REDIS_CONNECT_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
        {
            config.connect_timeout = Duration::from_secs(secs);
        }

        config
    }
}

#[derive(Default)]
struct CacheCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
    deletes: AtomicU64,
}

/// Cache statistics snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub deletes: u64,
    pub total_requests: u64,
    pub hit_rate_percent: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend: Option<BackendStats>,
}

/// Cache facade used by callers.
///
/// Backend failures never reach the caller: reads degrade to a miss and
/// writes are dropped, both logged at error level.
pub struct CacheManager {
    backend: Arc<dyn CacheBackend>,
    /// Set when the backend is the in-process map, for expiry sweeps.
    memory: Option<Arc<InMemoryCache>>,
    config: CacheConfig,
    counters: CacheCounters,
    closed: AtomicBool,
}

impl CacheManager {
    pub fn new(backend: Arc<dyn CacheBackend>, config: CacheConfig) -> Self {
        Self {
            backend,
            memory: None,
            config,
            counters: CacheCounters::default(),
            closed: AtomicBool::new(false),
        }
    }

    pub fn in_memory(config: CacheConfig) -> Self {
        let memory = Arc::new(InMemoryCache::new());
        let backend: Arc<dyn CacheBackend> = memory.clone();
        let mut manager = Self::new(backend, config);
        manager.memory = Some(memory);
        manager
    }

    /// Build a manager for `config`, preferring Redis when a URL is set and
    /// falling back to the in-memory backend otherwise.
    pub async fn connect(config: CacheConfig) -> Self {
        match config.redis_url.clone() {
            Some(url) => Self::connect_redis(url, config).await,
            None => {
                tracing::info!("REDIS_URL not set, using in-memory cache");
                Self::in_memory(config)
            }
        }
    }

    #[cfg(feature = "redis")]
    async fn connect_redis(url: String, config: CacheConfig) -> Self {
        let redis_config = super::RedisConfig {
            url,
            connect_timeout: config.connect_timeout,
            key_prefix: config.key_prefix.clone(),
        };

        match super::RedisCache::new(redis_config).await {
            Ok(cache) => Self::new(Arc::new(cache), config),
            Err(e) => {
                tracing::warn!(error = %e, "Redis unavailable, falling back to in-memory cache");
                Self::in_memory(config)
            }
        }
    }

    #[cfg(not(feature = "redis"))]
    async fn connect_redis(url: String, config: CacheConfig) -> Self {
        tracing::warn!(url = %url, "Built without redis feature, using in-memory cache");
        Self::in_memory(config)
    }

    /// Derive the storage key for a logical identity.
    ///
    /// `category:identifier`, plus `:<digest>` of the sorted parameters when
    /// any are given.
    pub fn build_key(category: &str, identifier: &str, params: Option<&CacheParams>) -> String {
        match params.filter(|p| !p.is_empty()) {
            None => format!("{category}:{identifier}"),
            Some(params) => {
                let canonical = Value::Object(
                    params
                        .iter()
                        .map(|(key, value)| (key.clone(), value.clone()))
                        .collect(),
                )
                .to_string();
                let digest = hex::encode(Sha256::digest(canonical.as_bytes()));
                format!("{category}:{identifier}:{}", &digest[..PARAMS_HASH_LEN])
            }
        }
    }

    /// TTL applied to a category when the caller gives none.
    pub fn ttl_for(&self, category: &str) -> Duration {
        self.config
            .category_ttls
            .get(category)
            .copied()
            .unwrap_or(self.config.default_ttl)
    }

    pub async fn get(
        &self,
        category: &str,
        identifier: &str,
        params: Option<&CacheParams>,
    ) -> Option<Value> {
        let key = Self::build_key(category, identifier, params);
        let value = self.lookup(&key).await;
        self.record_lookup(&key, value.is_some());
        value
    }

    async fn lookup(&self, key: &str) -> Option<Value> {
        match self.backend.get(key).await {
            Ok(value) => value,
            Err(e) => {
                tracing::error!(key = %key, error = %e, "Cache get failed, treating as miss");
                None
            }
        }
    }

    fn record_lookup(&self, key: &str, hit: bool) {
        if hit {
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(key = %key, "Cache hit");
        } else {
            self.counters.misses.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(key = %key, "Cache miss");
        }
    }

    /// Store a value. TTL resolution: `ttl` → category TTL → default TTL.
    pub async fn set(
        &self,
        category: &str,
        identifier: &str,
        value: &Value,
        ttl: Option<Duration>,
        params: Option<&CacheParams>,
    ) {
        let key = Self::build_key(category, identifier, params);
        let ttl = ttl.unwrap_or_else(|| self.ttl_for(category));

        match self.backend.set(&key, value, ttl).await {
            Ok(()) => {
                self.counters.sets.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(key = %key, ttl_secs = ttl.as_secs_f64(), "Cache set");
            }
            Err(e) => {
                tracing::error!(key = %key, error = %e, "Cache set failed");
            }
        }
    }

    pub async fn delete(&self, category: &str, identifier: &str, params: Option<&CacheParams>) {
        let key = Self::build_key(category, identifier, params);

        match self.backend.delete(&key).await {
            Ok(()) => {
                self.counters.deletes.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(key = %key, "Cache delete");
            }
            Err(e) => {
                tracing::error!(key = %key, error = %e, "Cache delete failed");
            }
        }
    }

    /// Delete every key in `category` whose remainder matches `pattern`
    /// (glob syntax). Returns the number of keys removed.
    pub async fn invalidate_pattern(&self, category: &str, pattern: &str) -> usize {
        let glob = format!("{category}:{pattern}");

        match self.backend.delete_matching(&glob).await {
            Ok(removed) => {
                tracing::info!(pattern = %glob, removed, "Invalidated cache entries");
                removed
            }
            Err(e) => {
                tracing::error!(pattern = %glob, error = %e, "Cache invalidation failed");
                0
            }
        }
    }

    pub async fn clear_all(&self) {
        match self.backend.clear().await {
            Ok(()) => tracing::info!("Cache cleared"),
            Err(e) => tracing::error!(error = %e, "Cache clear failed"),
        }
    }

    /// Sweep expired entries from the in-process backend. Remote backends
    /// expire natively, so this reports 0 for them.
    pub async fn cleanup_expired(&self) -> usize {
        match &self.memory {
            Some(memory) => memory.cleanup_expired().await,
            None => 0,
        }
    }

    pub async fn stats(&self) -> CacheStats {
        let hits = self.counters.hits.load(Ordering::Relaxed);
        let misses = self.counters.misses.load(Ordering::Relaxed);
        let total_requests = hits + misses;
        let hit_rate_percent = if total_requests == 0 {
            0.0
        } else {
            (hits as f64 / total_requests as f64 * 10_000.0).round() / 100.0
        };

        let backend = match self.backend.stats().await {
            Ok(stats) => Some(stats),
            Err(e) => {
                tracing::error!(error = %e, "Failed to read cache backend stats");
                None
            }
        };

        CacheStats {
            hits,
            misses,
            sets: self.counters.sets.load(Ordering::Relaxed),
            deletes: self.counters.deletes.load(Ordering::Relaxed),
            total_requests,
            hit_rate_percent,
            backend,
        }
    }

    /// Release the backend. Only the first call has an effect.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Err(e) = self.backend.close().await {
            tracing::error!(error = %e, "Failed to close cache backend");
        }
    }

    /// Typed read. A stored value that no longer deserializes into `T` is
    /// reported as absent and counted as a miss.
    pub async fn get_as<T: DeserializeOwned>(
        &self,
        category: &str,
        identifier: &str,
        params: Option<&CacheParams>,
    ) -> Option<T> {
        let key = Self::build_key(category, identifier, params);
        let typed = match self.lookup(&key).await {
            Some(value) => match serde_json::from_value(value) {
                Ok(typed) => Some(typed),
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "Cached value has unexpected shape");
                    None
                }
            },
            None => None,
        };
        self.record_lookup(&key, typed.is_some());
        typed
    }

    /// Typed write.
    pub async fn set_from<T: Serialize>(
        &self,
        category: &str,
        identifier: &str,
        value: &T,
        ttl: Option<Duration>,
        params: Option<&CacheParams>,
    ) {
        match serde_json::to_value(value) {
            Ok(value) => self.set(category, identifier, &value, ttl, params).await,
            Err(e) => {
                tracing::error!(category, identifier, error = %e, "Failed to serialize value for cache");
            }
        }
    }

    /// Return the cached value, or run `fetch`, store its result and return
    /// it. Errors from `fetch` are propagated and never cached.
    pub async fn get_or_fetch<T, E, F, Fut>(
        &self,
        category: &str,
        identifier: &str,
        params: Option<&CacheParams>,
        ttl: Option<Duration>,
        fetch: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(cached) = self.get_as(category, identifier, params).await {
            return Ok(cached);
        }

        let fresh = fetch().await?;
        self.set_from(category, identifier, &fresh, ttl, params).await;
        Ok(fresh)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use qgate_core::ports::CacheError;
    use serde_json::json;

    fn params(pairs: &[(&str, Value)]) -> CacheParams {
        pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.clone()))
            .collect()
    }

    /// Backend whose every call fails.
    struct BrokenBackend;

    #[async_trait]
    impl CacheBackend for BrokenBackend {
        async fn get(&self, _key: &str) -> Result<Option<Value>, CacheError> {
            Err(CacheError::Connection("down".into()))
        }
        async fn set(&self, _key: &str, _value: &Value, _ttl: Duration) -> Result<(), CacheError> {
            Err(CacheError::Connection("down".into()))
        }
        async fn delete(&self, _key: &str) -> Result<(), CacheError> {
            Err(CacheError::Connection("down".into()))
        }
        async fn clear(&self) -> Result<(), CacheError> {
            Err(CacheError::Connection("down".into()))
        }
        async fn exists(&self, _key: &str) -> Result<bool, CacheError> {
            Err(CacheError::Connection("down".into()))
        }
        async fn delete_matching(&self, _pattern: &str) -> Result<usize, CacheError> {
            Err(CacheError::Connection("down".into()))
        }
        async fn stats(&self) -> Result<BackendStats, CacheError> {
            Err(CacheError::Connection("down".into()))
        }
        async fn close(&self) -> Result<(), CacheError> {
            Err(CacheError::Connection("down".into()))
        }
    }

    #[test]
    fn test_key_is_order_independent() {
        let ab = params(&[("a", json!(1)), ("b", json!(2))]);
        let mut ba = CacheParams::new();
        ba.insert("b".into(), json!(2));
        ba.insert("a".into(), json!(1));

        let key_ab = CacheManager::build_key("metrics", "proj1", Some(&ab));
        assert_eq!(key_ab, CacheManager::build_key("metrics", "proj1", Some(&ba)));
        assert_ne!(key_ab, CacheManager::build_key("metrics", "proj2", Some(&ab)));
        assert!(key_ab.starts_with("metrics:proj1:"));
        assert_eq!(key_ab.len(), "metrics:proj1:".len() + PARAMS_HASH_LEN);
    }

    #[test]
    fn test_key_without_params() {
        assert_eq!(CacheManager::build_key("projects", "all", None), "projects:all");
        assert_eq!(
            CacheManager::build_key("projects", "all", Some(&CacheParams::new())),
            "projects:all"
        );
    }

    #[test]
    fn test_key_depends_on_param_values() {
        let one = params(&[("page", json!(1))]);
        let two = params(&[("page", json!(2))]);
        assert_ne!(
            CacheManager::build_key("issues", "proj1", Some(&one)),
            CacheManager::build_key("issues", "proj1", Some(&two))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_round_trip_then_expiry() {
        let cache = CacheManager::in_memory(CacheConfig::default());
        let value = json!({"measures": [{"metric": "coverage", "value": "81.5"}]});

        cache
            .set("metrics", "proj1", &value, Some(Duration::from_secs(5)), None)
            .await;
        assert_eq!(cache.get("metrics", "proj1", None).await, Some(value));

        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(cache.get("metrics", "proj1", None).await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_ttl_does_not_panic() {
        let cache = CacheManager::in_memory(CacheConfig::default());

        cache
            .set("projects", "proj1", &json!(1), Some(Duration::from_secs(u64::MAX)), None)
            .await;

        tokio::time::advance(Duration::from_secs(3600)).await;
        assert_eq!(cache.get("projects", "proj1", None).await, Some(json!(1)));
        assert_eq!(cache.stats().await.sets, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_category_ttl_applies() {
        let cache = CacheManager::in_memory(CacheConfig::default());
        assert_eq!(cache.ttl_for("issues"), Duration::from_secs(60));
        assert_eq!(cache.ttl_for("unknown"), Duration::from_secs(300));

        cache.set("issues", "proj1", &json!([]), None, None).await;

        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(cache.get("issues", "proj1", None).await.is_some());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(cache.get("issues", "proj1", None).await.is_none());
    }

    #[tokio::test]
    async fn test_hit_rate_accounting() {
        let cache = CacheManager::in_memory(CacheConfig::default());
        cache.set("projects", "proj1", &json!("x"), None, None).await;

        for _ in 0..3 {
            assert!(cache.get("projects", "proj1", None).await.is_some());
        }
        assert!(cache.get("projects", "missing", None).await.is_none());

        let stats = cache.stats().await;
        assert_eq!(stats.hits, 3);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.sets, 1);
        assert_eq!(stats.total_requests, 4);
        assert_eq!(stats.hit_rate_percent, 75.0);
        assert_eq!(stats.backend.map(|b| b.entries), Some(1));
    }

    #[tokio::test]
    async fn test_backend_failures_are_swallowed() {
        let cache = CacheManager::new(Arc::new(BrokenBackend), CacheConfig::default());

        cache.set("projects", "proj1", &json!(1), None, None).await;
        assert_eq!(cache.get("projects", "proj1", None).await, None);
        cache.delete("projects", "proj1", None).await;
        assert_eq!(cache.invalidate_pattern("projects", "*").await, 0);
        cache.clear_all().await;

        let stats = cache.stats().await;
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.sets, 0);
        assert_eq!(stats.deletes, 0);
        assert!(stats.backend.is_none());
    }

    #[tokio::test]
    async fn test_invalidate_pattern_scoped_to_category() {
        let cache = CacheManager::in_memory(CacheConfig::default());
        let filter = params(&[("severity", json!("MAJOR"))]);

        cache.set("issues", "proj1", &json!(1), None, None).await;
        cache.set("issues", "proj1", &json!(2), None, Some(&filter)).await;
        cache.set("issues", "proj2", &json!(3), None, None).await;
        cache.set("metrics", "proj1", &json!(4), None, None).await;

        assert_eq!(cache.invalidate_pattern("issues", "proj1*").await, 2);
        assert!(cache.get("issues", "proj2", None).await.is_some());
        assert!(cache.get("metrics", "proj1", None).await.is_some());
    }

    #[tokio::test]
    async fn test_get_or_fetch_populates_once() {
        let cache = CacheManager::in_memory(CacheConfig::default());
        let mut calls = 0;

        for _ in 0..2 {
            let value: Vec<String> = cache
                .get_or_fetch("projects", "search", None, None, || {
                    calls += 1;
                    async { Ok::<_, String>(vec!["proj1".to_string()]) }
                })
                .await
                .unwrap();
            assert_eq!(value, vec!["proj1".to_string()]);
        }

        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn test_get_as_shape_mismatch_counts_as_miss() {
        let cache = CacheManager::in_memory(CacheConfig::default());
        cache
            .set("projects", "proj1", &json!({"key": "proj1"}), None, None)
            .await;

        assert_eq!(cache.get_as::<u32>("projects", "proj1", None).await, None);
        assert_eq!(
            cache.get_as::<Value>("projects", "proj1", None).await,
            Some(json!({"key": "proj1"}))
        );

        let stats = cache.stats().await;
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hit_rate_percent, 50.0);
    }

    #[tokio::test]
    async fn test_get_or_fetch_does_not_cache_errors() {
        let cache = CacheManager::in_memory(CacheConfig::default());

        let result: Result<u32, &str> = cache
            .get_or_fetch("metrics", "proj1", None, None, || async { Err("boom") })
            .await;
        assert_eq!(result, Err("boom"));
        assert_eq!(cache.stats().await.sets, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_expired_through_manager() {
        let cache = CacheManager::in_memory(CacheConfig::default());
        cache
            .set("issues", "proj1", &json!(1), Some(Duration::from_secs(1)), None)
            .await;

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(cache.cleanup_expired().await, 1);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let cache = CacheManager::in_memory(CacheConfig::default());
        cache.close().await;
        cache.close().await;
    }
}
