//! Access client configuration loaded from environment variables.

use std::env;
use std::time::Duration;

use reqwest::Url;

use qgate_core::AccessError;

/// Path suffix every API base URL ends with.
pub const API_SUFFIX: &str = "/api";

/// Access client configuration.
#[derive(Clone)]
pub struct ClientConfig {
    /// Service address. Scheme and `/api` suffix are added when missing.
    pub base_url: String,
    /// Bearer token.
    pub token: String,
    /// Tenant qualifier injected as the `organization` query parameter.
    pub organization: Option<String>,
    /// Timeout for each HTTP attempt.
    pub timeout: Duration,
    /// Retries after the first attempt, for transport failures only.
    pub max_retries: u32,
    /// Verify the server's TLS certificate.
    pub verify_tls: bool,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: token.into(),
            organization: None,
            timeout: Duration::from_secs(30),
            max_retries: 3,
            verify_tls: true,
        }
    }

    pub fn with_organization(mut self, organization: impl Into<String>) -> Self {
        self.organization = Some(organization.into());
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, AccessError> {
        let base_url = env::var("QGATE_URL")
            .map_err(|_| AccessError::Validation("QGATE_URL is not set".to_string()))?;
        let token = env::var("QGATE_TOKEN")
            .map_err(|_| AccessError::Validation("QGATE_TOKEN is not set".to_string()))?;

        Ok(Self {
            base_url,
            token,
            organization: env::var("QGATE_ORGANIZATION")
                .ok()
                .filter(|org| !org.trim().is_empty()),
            timeout: Duration::from_secs(
                env::var("QGATE_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
            max_retries: env::var("QGATE_MAX_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(3),
            verify_tls: env::var("QGATE_VERIFY_TLS")
                .map(|v| v != "false" && v != "0")
                .unwrap_or(true),
        })
    }
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("base_url", &self.base_url)
            .field("token", &"[REDACTED]")
            .field("organization", &self.organization)
            .field("timeout", &self.timeout)
            .field("max_retries", &self.max_retries)
            .field("verify_tls", &self.verify_tls)
            .finish()
    }
}

/// Normalize a service address: default the scheme to `https`, drop query
/// and fragment, and force the path to end in [`API_SUFFIX`].
pub fn normalize_base_url(raw: &str) -> Result<String, AccessError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(AccessError::Validation("base URL is empty".to_string()));
    }

    let with_scheme = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    };

    let mut url = Url::parse(&with_scheme)
        .map_err(|e| AccessError::Validation(format!("invalid base URL {trimmed:?}: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(AccessError::Validation(format!(
            "unsupported URL scheme {:?}",
            url.scheme()
        )));
    }

    let path = url.path().trim_end_matches('/').to_string();
    let path = if path.ends_with(API_SUFFIX) {
        path
    } else {
        format!("{path}{API_SUFFIX}")
    };
    url.set_path(&path);
    url.set_query(None);
    url.set_fragment(None);

    Ok(url.as_str().trim_end_matches('/').to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_adds_scheme_and_suffix() {
        assert_eq!(
            normalize_base_url("quality.example.com").unwrap(),
            "https://quality.example.com/api"
        );
        assert_eq!(
            normalize_base_url("http://localhost:9000/").unwrap(),
            "http://localhost:9000/api"
        );
    }

    #[test]
    fn test_normalize_keeps_existing_suffix_and_context_path() {
        assert_eq!(
            normalize_base_url("https://ci.example.com/quality/api/").unwrap(),
            "https://ci.example.com/quality/api"
        );
        assert_eq!(
            normalize_base_url("https://ci.example.com/quality").unwrap(),
            "https://ci.example.com/quality/api"
        );
    }

    #[test]
    fn test_normalize_rejects_garbage() {
        assert!(matches!(normalize_base_url("   "), Err(AccessError::Validation(_))));
        assert!(matches!(
            normalize_base_url("ftp://example.com"),
            Err(AccessError::Validation(_))
        ));
    }

    #[test]
    fn test_debug_redacts_token() {
        let config = ClientConfig::new("https://quality.example.com", "squ_secret");
        assert!(!format!("{:?}", config).contains("squ_secret"));
    }
}
