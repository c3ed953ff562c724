//! # qgate Infrastructure
//!
//! Concrete implementations of the ports defined in `qgate-core`, plus the
//! three pieces callers use directly: the token-bucket [`RateLimiter`], the
//! [`CacheManager`] and the [`AccessClient`].
//!
//! ## Feature Flags
//!
//! - `full` (default) - All features enabled
//! - `minimal` - No external cache service, in-memory only
//! - `redis` - Redis cache backend

pub mod cache;
pub mod client;
pub mod rate_limit;
pub mod validation;

// Re-exports
pub use cache::{CacheConfig, CacheManager, CacheParams, CacheStats, InMemoryCache};
pub use client::{AccessClient, ClientConfig, ReqwestTransport};
pub use rate_limit::{RateLimitConfig, RateLimitConfigError, RateLimitStatus, RateLimiter};
pub use validation::DefaultInputValidator;

// Re-exports - Redis
#[cfg(feature = "redis")]
pub use cache::{RedisCache, RedisConfig};
