//! Rate limiting for outbound requests.

mod token_bucket;

pub use token_bucket::{RateLimitConfig, RateLimitConfigError, RateLimitStatus, RateLimiter};
