//! Application state - one limiter, one cache and one client per process.

use std::sync::Arc;

use anyhow::Context;
use qgate_infra::{AccessClient, CacheManager, RateLimiter};

use crate::config::AppConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub rate_limiter: Arc<RateLimiter>,
    pub cache: Arc<CacheManager>,
    pub client: Arc<AccessClient>,
}

impl AppState {
    /// Build the application state from configuration.
    ///
    /// The cache falls back to the in-memory backend when Redis is not
    /// configured or unreachable.
    pub async fn new(config: &AppConfig) -> anyhow::Result<Self> {
        let rate_limiter = Arc::new(
            RateLimiter::from_config(&config.rate_limit).context("invalid rate limit settings")?,
        );

        let cache = Arc::new(CacheManager::connect(config.cache.clone()).await);

        let client = Arc::new(
            AccessClient::new(config.client.clone(), rate_limiter.clone())
                .context("failed to build access client")?,
        );

        tracing::info!(base_url = %client.base_url(), "Application state initialized");

        Ok(Self {
            rate_limiter,
            cache,
            client,
        })
    }

    /// Release the client and cache connections.
    pub async fn shutdown(&self) {
        self.client.close().await;
        self.cache.close().await;
        tracing::info!("Application state shut down");
    }
}
