//! Default query parameter sanitizer.

use qgate_core::AccessError;
use qgate_core::ports::{InputValidator, QueryParams};

/// Trims values, drops empty ones, and rejects blank keys or control
/// characters anywhere in a parameter.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultInputValidator;

impl InputValidator for DefaultInputValidator {
    fn validate(&self, params: QueryParams) -> Result<QueryParams, AccessError> {
        let mut sanitized = QueryParams::new();

        for (key, value) in params {
            let key = key.trim();
            if key.is_empty() {
                return Err(AccessError::Validation(
                    "parameter names must not be empty".to_string(),
                ));
            }
            if key.chars().any(char::is_control) || value.chars().any(char::is_control) {
                return Err(AccessError::Validation(format!(
                    "parameter {key:?} contains control characters"
                )));
            }

            let value = value.trim();
            if !value.is_empty() {
                sanitized.insert(key.to_string(), value.to_string());
            }
        }

        Ok(sanitized)
    }
}
