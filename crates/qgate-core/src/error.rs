//! Access-level error types.

use serde_json::Value;
use thiserror::Error;

/// Errors raised by the access client to its immediate caller.
///
/// Only [`AccessError::Network`] is ever produced by the retry loop itself;
/// every other kind is a definitive answer and is never retried.
#[derive(Debug, Clone, Error)]
pub enum AccessError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    #[error("Access denied: {message}")]
    Authorization { message: String },

    #[error("Rate limit exceeded: {message}")]
    RateLimited {
        message: String,
        /// Seconds suggested by the `Retry-After` header, if any.
        retry_after: Option<f64>,
    },

    #[error("API error ({status}): {message}")]
    Api {
        status: u16,
        message: String,
        body: Option<Value>,
    },

    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),
}

impl AccessError {
    /// HTTP status code carried by status-bearing kinds.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            AccessError::Authentication { .. } => Some(401),
            AccessError::Authorization { .. } => Some(403),
            AccessError::RateLimited { .. } => Some(429),
            AccessError::Api { status, .. } | AccessError::Server { status, .. } => Some(*status),
            AccessError::Validation(_) | AccessError::Network(_) => None,
        }
    }

    /// Stable, machine-readable name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            AccessError::Validation(_) => "validation_error",
            AccessError::Authentication { .. } => "authentication_error",
            AccessError::Authorization { .. } => "authorization_error",
            AccessError::RateLimited { .. } => "rate_limit_error",
            AccessError::Api { .. } => "api_error",
            AccessError::Server { .. } => "server_error",
            AccessError::Network(_) => "network_error",
        }
    }
}

pub type AccessResult<T> = Result<T, AccessError>;
