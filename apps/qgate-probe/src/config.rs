//! Application configuration loaded from environment variables.

use qgate_core::AccessError;
use qgate_infra::{CacheConfig, ClientConfig, RateLimitConfig};

/// Application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub client: ClientConfig,
    pub rate_limit: RateLimitConfig,
    pub cache: CacheConfig,
}

impl AppConfig {
    /// Load configuration from environment variables.
    ///
    /// Only the client section has required variables (`QGATE_URL`,
    /// `QGATE_TOKEN`); everything else falls back to defaults.
    pub fn from_env() -> Result<Self, AccessError> {
        Ok(Self {
            client: ClientConfig::from_env()?,
            rate_limit: RateLimitConfig::from_env(),
            cache: CacheConfig::from_env(),
        })
    }
}
