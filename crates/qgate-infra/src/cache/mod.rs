//! Cache implementations - Redis and in-memory fallback, plus the manager
//! callers go through.

mod manager;
mod memory;
mod pattern;

pub use manager::{CacheConfig, CacheManager, CacheParams, CacheStats};
pub use memory::InMemoryCache;

#[cfg(feature = "redis")]
mod redis;
#[cfg(feature = "redis")]
pub use self::redis::{RedisCache, RedisConfig};
