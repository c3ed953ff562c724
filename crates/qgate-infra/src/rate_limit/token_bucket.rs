//! Token-bucket rate limiter shared by every outbound request.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

/// Rate limiter configuration.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Requests replenished per window.
    pub max_requests: u32,
    /// Window duration.
    pub window: Duration,
    /// Bucket size. Defaults to `max_requests`.
    pub burst_capacity: Option<f64>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 100,
            window: Duration::from_secs(60),
            burst_capacity: None,
        }
    }
}

impl RateLimitConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            max_requests: std::env::var("RATE_LIMIT_MAX_REQUESTS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(100),
            window: parse_window(std::env::var("RATE_LIMIT_WINDOW_SECS").ok().as_deref()),
            burst_capacity: std::env::var("RATE_LIMIT_BURST_CAPACITY")
                .ok()
                .and_then(|s| s.parse().ok()),
        }
    }
}

/// Window length in (fractional) seconds. Anything that is not a positive
/// duration representable as [`Duration`] falls back to 60 seconds.
fn parse_window(raw: Option<&str>) -> Duration {
    raw.and_then(|s| s.trim().parse::<f64>().ok())
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
        .filter(|window| !window.is_zero())
        .unwrap_or(Duration::from_secs(60))
}

#[derive(Debug, thiserror::Error)]
pub enum RateLimitConfigError {
    #[error("max_requests must be greater than zero")]
    ZeroRequests,

    #[error("time window must be positive, got {0}s")]
    InvalidWindow(f64),

    #[error("burst capacity must be a finite number >= 1, got {0}")]
    InvalidBurst(f64),

    #[error("requested {requested} tokens but the bucket only holds {capacity}")]
    ExceedsCapacity { requested: f64, capacity: f64 },
}

/// Point-in-time view of the bucket.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RateLimitStatus {
    pub available_tokens: f64,
    pub burst_capacity: f64,
    pub utilization_percent: f64,
    pub seconds_since_refill: f64,
}

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// Token bucket: `max_requests` tokens regenerate every `window`, up to
/// `burst_capacity`. The balance always stays within `[0, burst_capacity]`.
///
/// The bucket lock is a synchronous mutex that is only held for
/// refill-and-subtract, never across an `.await`, so a cancelled waiter
/// cannot leave it held.
pub struct RateLimiter {
    max_requests: f64,
    window_secs: f64,
    burst_capacity: f64,
    bucket: Mutex<Bucket>,
}

impl RateLimiter {
    pub fn new(
        max_requests: u32,
        window: Duration,
        burst_capacity: Option<f64>,
    ) -> Result<Self, RateLimitConfigError> {
        if max_requests == 0 {
            return Err(RateLimitConfigError::ZeroRequests);
        }

        let window_secs = window.as_secs_f64();
        if window_secs <= 0.0 {
            return Err(RateLimitConfigError::InvalidWindow(window_secs));
        }

        let burst_capacity = burst_capacity.unwrap_or(f64::from(max_requests));
        if !burst_capacity.is_finite() || burst_capacity < 1.0 {
            return Err(RateLimitConfigError::InvalidBurst(burst_capacity));
        }

        Ok(Self {
            max_requests: f64::from(max_requests),
            window_secs,
            burst_capacity,
            bucket: Mutex::new(Bucket {
                tokens: burst_capacity,
                last_refill: Instant::now(),
            }),
        })
    }

    pub fn from_config(config: &RateLimitConfig) -> Result<Self, RateLimitConfigError> {
        Self::new(config.max_requests, config.window, config.burst_capacity)
    }

    pub fn from_env() -> Result<Self, RateLimitConfigError> {
        Self::from_config(&RateLimitConfig::from_env())
    }

    /// Take `tokens` if the bucket holds at least that many.
    /// On failure the balance is left untouched.
    pub fn acquire(&self, tokens: u32) -> bool {
        self.try_take(f64::from(tokens)).is_ok()
    }

    /// Wait until `tokens` can be taken, sleeping for the computed deficit
    /// between attempts. Waiters are not queued; they race after each sleep.
    pub async fn wait_for_tokens(&self, tokens: u32) -> Result<(), RateLimitConfigError> {
        let requested = f64::from(tokens);
        if requested > self.burst_capacity {
            return Err(RateLimitConfigError::ExceedsCapacity {
                requested,
                capacity: self.burst_capacity,
            });
        }

        loop {
            let available = match self.try_take(requested) {
                Ok(()) => return Ok(()),
                Err(available) => available,
            };

            let wait_secs = (requested - available) / self.max_requests * self.window_secs;
            tracing::debug!(
                tokens,
                available,
                wait_secs,
                "Rate limit reached, waiting for tokens"
            );
            let wait = Duration::try_from_secs_f64(wait_secs).unwrap_or(Duration::MAX);
            tokio::time::sleep(wait).await;
        }
    }

    /// Read-only snapshot of the bucket.
    pub fn status(&self) -> RateLimitStatus {
        let bucket = self.lock();
        let utilization = (1.0 - bucket.tokens / self.burst_capacity) * 100.0;

        RateLimitStatus {
            available_tokens: bucket.tokens,
            burst_capacity: self.burst_capacity,
            utilization_percent: utilization.clamp(0.0, 100.0),
            seconds_since_refill: Instant::now()
                .saturating_duration_since(bucket.last_refill)
                .as_secs_f64(),
        }
    }

    /// Refill then subtract under one lock. Returns the balance seen when
    /// the request could not be satisfied.
    fn try_take(&self, requested: f64) -> Result<(), f64> {
        let mut bucket = self.lock();
        self.refill(&mut bucket, Instant::now());

        if bucket.tokens >= requested {
            bucket.tokens -= requested;
            Ok(())
        } else {
            Err(bucket.tokens)
        }
    }

    fn refill(&self, bucket: &mut Bucket, now: Instant) {
        let elapsed = now.saturating_duration_since(bucket.last_refill).as_secs_f64();
        let replenished = elapsed * self.max_requests / self.window_secs;
        bucket.tokens = (bucket.tokens + replenished).min(self.burst_capacity);
        bucket.last_refill = now;
    }

    fn lock(&self) -> MutexGuard<'_, Bucket> {
        // The bucket holds plain numbers, so a poisoned guard is still consistent.
        self.bucket.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("max_requests", &self.max_requests)
            .field("window_secs", &self.window_secs)
            .field("burst_capacity", &self.burst_capacity)
            .finish()
    }
}
