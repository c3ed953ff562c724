//! Input validation port.

use crate::error::AccessError;
use crate::ports::QueryParams;

/// Sanitizes outbound query parameters before any network attempt.
///
/// Implementations return [`AccessError::Validation`] for malformed input.
pub trait InputValidator: Send + Sync {
    fn validate(&self, params: QueryParams) -> Result<QueryParams, AccessError>;
}
