//! Standardized response envelopes (RFC 7807 compliant for errors).

use serde::{Deserialize, Serialize};

use qgate_core::AccessError;

/// Standard successful response wrapper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
        }
    }
}

/// Problem types a qgate error can be reported as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProblemKind {
    InvalidInput,
    InvalidCredentials,
    Forbidden,
    RateLimited,
    BadRequest,
    ServiceUnavailable,
}

impl ProblemKind {
    /// Problem type URI used in the `type` member.
    pub fn uri(self) -> &'static str {
        match self {
            ProblemKind::InvalidInput => "urn:qgate:problem:invalid-input",
            ProblemKind::InvalidCredentials => "urn:qgate:problem:invalid-credentials",
            ProblemKind::Forbidden => "urn:qgate:problem:forbidden",
            ProblemKind::RateLimited => "urn:qgate:problem:rate-limited",
            ProblemKind::BadRequest => "urn:qgate:problem:bad-request",
            ProblemKind::ServiceUnavailable => "urn:qgate:problem:service-unavailable",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            ProblemKind::InvalidInput => "Invalid Input",
            ProblemKind::InvalidCredentials => "Invalid Credentials",
            ProblemKind::Forbidden => "Forbidden",
            ProblemKind::RateLimited => "Too Many Requests",
            ProblemKind::BadRequest => "Bad Request",
            ProblemKind::ServiceUnavailable => "Service Unavailable",
        }
    }
}

/// RFC 7807 Problem Details.
///
/// See: https://datatracker.ietf.org/doc/html/rfc7807
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// A URI reference that identifies the problem type.
    #[serde(rename = "type")]
    pub error_type: String,

    /// A short, human-readable summary of the problem type.
    pub title: String,

    /// The HTTP status code, when the problem has one.
    pub status: u16,

    /// A human-readable explanation specific to this occurrence.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,

    /// A URI reference that identifies the specific occurrence.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,

    /// Seconds the caller should wait before retrying.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<f64>,
}

impl ErrorResponse {
    pub fn new(status: u16, title: impl Into<String>) -> Self {
        Self {
            error_type: "about:blank".to_string(),
            title: title.into(),
            status,
            detail: None,
            instance: None,
            retry_after: None,
        }
    }

    pub fn from_kind(kind: ProblemKind, status: u16) -> Self {
        Self {
            error_type: kind.uri().to_string(),
            ..Self::new(status, kind.title())
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Translate an access error into a problem document.
    ///
    /// Validation and network failures carry no upstream status; they are
    /// reported as 400 and 503 respectively.
    pub fn from_access_error(err: &AccessError) -> Self {
        let problem = match err {
            AccessError::Validation(_) => Self::from_kind(ProblemKind::InvalidInput, 400),
            AccessError::Authentication { .. } => {
                Self::from_kind(ProblemKind::InvalidCredentials, 401)
            }
            AccessError::Authorization { .. } => Self::from_kind(ProblemKind::Forbidden, 403),
            AccessError::RateLimited { retry_after, .. } => {
                let mut problem = Self::from_kind(ProblemKind::RateLimited, 429);
                problem.retry_after = *retry_after;
                problem
            }
            AccessError::Api { status, .. } => Self::from_kind(ProblemKind::BadRequest, *status),
            AccessError::Server { status, .. } => {
                Self::from_kind(ProblemKind::ServiceUnavailable, *status)
            }
            AccessError::Network(_) => Self::from_kind(ProblemKind::ServiceUnavailable, 503),
        };

        problem.with_detail(err.to_string())
    }
}

impl From<&AccessError> for ErrorResponse {
    fn from(err: &AccessError) -> Self {
        Self::from_access_error(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ok_envelope_serializes_without_message() {
        let value = serde_json::to_value(ApiResponse::ok(json!({"status": "UP"}))).unwrap();
        assert_eq!(value, json!({"success": true, "data": {"status": "UP"}}));
    }

    #[test]
    fn test_authentication_maps_to_invalid_credentials() {
        let err = AccessError::Authentication {
            message: "bad token".to_string(),
        };
        let problem = ErrorResponse::from_access_error(&err);
        assert_eq!(problem.status, 401);
        assert_eq!(problem.error_type, ProblemKind::InvalidCredentials.uri());
        assert_eq!(
            problem.detail.as_deref(),
            Some("Authentication failed: bad token")
        );
    }

    #[test]
    fn test_rate_limited_keeps_retry_after() {
        let err = AccessError::RateLimited {
            message: "slow down".to_string(),
            retry_after: Some(7.0),
        };
        let value = serde_json::to_value(ErrorResponse::from(&err)).unwrap();
        assert_eq!(value["status"], 429);
        assert_eq!(value["retry_after"], 7.0);
        assert_eq!(value["type"], "urn:qgate:problem:rate-limited");
    }

    #[test]
    fn test_server_and_network_are_unavailable() {
        let server = ErrorResponse::from_access_error(&AccessError::Server {
            status: 502,
            message: "Bad Gateway".to_string(),
        });
        assert_eq!(server.status, 502);
        assert_eq!(server.title, "Service Unavailable");

        let network =
            ErrorResponse::from_access_error(&AccessError::Network("refused".to_string()));
        assert_eq!(network.status, 503);
        assert_eq!(network.error_type, ProblemKind::ServiceUnavailable.uri());
    }

    #[test]
    fn test_validation_and_api_errors() {
        let invalid = ErrorResponse::from_access_error(&AccessError::Validation("x".into()));
        assert_eq!(invalid.status, 400);
        assert_eq!(invalid.error_type, ProblemKind::InvalidInput.uri());

        let api = ErrorResponse::from_access_error(&AccessError::Api {
            status: 404,
            message: "Component key not found".to_string(),
            body: None,
        });
        assert_eq!(api.status, 404);
        assert_eq!(api.title, "Bad Request");
        assert!(api.retry_after.is_none());
    }
}
