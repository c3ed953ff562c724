//! Authenticated, rate-limited request execution.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

use qgate_core::ports::{HttpMethod, HttpRequest, InputValidator, QueryParams, Transport};
use qgate_core::{AccessError, AccessResult};

use super::classify::{backoff_delay, classify_error, parse_success};
use super::config::{ClientConfig, normalize_base_url};
use super::transport::ReqwestTransport;
use crate::rate_limit::{RateLimitStatus, RateLimiter};
use crate::validation::DefaultInputValidator;

/// Query parameter carrying the tenant qualifier.
const ORGANIZATION_PARAM: &str = "organization";

/// Client for the quality-analysis service API.
///
/// Every attempt first waits on the shared [`RateLimiter`]. Transport
/// failures are retried with capped exponential backoff; error responses are
/// classified and returned on the first attempt.
///
/// The client holds configuration only, so one instance can serve any number
/// of concurrent requests.
pub struct AccessClient {
    base_url: String,
    token: String,
    organization: Option<String>,
    timeout: Duration,
    max_retries: u32,
    rate_limiter: Arc<RateLimiter>,
    transport: Arc<dyn Transport>,
    validator: Arc<dyn InputValidator>,
}

impl AccessClient {
    /// Create a client that talks HTTP through reqwest.
    pub fn new(config: ClientConfig, rate_limiter: Arc<RateLimiter>) -> AccessResult<Self> {
        let transport = Arc::new(ReqwestTransport::new(config.verify_tls)?);
        Self::with_transport(config, rate_limiter, transport)
    }

    pub fn with_transport(
        config: ClientConfig,
        rate_limiter: Arc<RateLimiter>,
        transport: Arc<dyn Transport>,
    ) -> AccessResult<Self> {
        let base_url = normalize_base_url(&config.base_url)?;
        let token = config.token.trim().to_string();
        if token.is_empty() {
            return Err(AccessError::Validation("API token is empty".to_string()));
        }

        tracing::info!(
            base_url = %base_url,
            organization = ?config.organization,
            max_retries = config.max_retries,
            "Access client configured"
        );

        Ok(Self {
            base_url,
            token,
            organization: config.organization,
            timeout: config.timeout,
            max_retries: config.max_retries,
            rate_limiter,
            transport,
            validator: Arc::new(DefaultInputValidator),
        })
    }

    /// Replace the parameter validator.
    pub fn with_validator(mut self, validator: Arc<dyn InputValidator>) -> Self {
        self.validator = validator;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn get(&self, path: &str, params: Option<QueryParams>) -> AccessResult<Value> {
        self.request(HttpMethod::Get, path, params, None).await
    }

    pub async fn post(
        &self,
        path: &str,
        params: Option<QueryParams>,
        body: Option<Value>,
    ) -> AccessResult<Value> {
        self.request(HttpMethod::Post, path, params, body).await
    }

    pub async fn put(
        &self,
        path: &str,
        params: Option<QueryParams>,
        body: Option<Value>,
    ) -> AccessResult<Value> {
        self.request(HttpMethod::Put, path, params, body).await
    }

    pub async fn delete(&self, path: &str, params: Option<QueryParams>) -> AccessResult<Value> {
        self.request(HttpMethod::Delete, path, params, None).await
    }

    /// Execute a request against `path` (relative to the API base).
    pub async fn request(
        &self,
        method: HttpMethod,
        path: &str,
        params: Option<QueryParams>,
        body: Option<Value>,
    ) -> AccessResult<Value> {
        let span = tracing::info_span!(
            "access_request",
            request_id = %Uuid::new_v4(),
            method = %method,
            path = %path,
        );
        self.execute(method, path, params, body)
            .instrument(span)
            .await
    }

    async fn execute(
        &self,
        method: HttpMethod,
        path: &str,
        params: Option<QueryParams>,
        body: Option<Value>,
    ) -> AccessResult<Value> {
        let mut query = self.validator.validate(params.unwrap_or_default())?;
        if let Some(organization) = &self.organization {
            query
                .entry(ORGANIZATION_PARAM.to_string())
                .or_insert_with(|| organization.clone());
        }

        let url = self.endpoint(path);
        let started = Instant::now();

        for attempt in 0..=self.max_retries {
            self.rate_limiter
                .wait_for_tokens(1)
                .await
                .map_err(|e| AccessError::Validation(e.to_string()))?;

            let request = HttpRequest {
                method,
                url: url.clone(),
                query: query.clone(),
                headers: self.headers(),
                body: body.clone(),
                timeout: self.timeout,
            };
            tracing::debug!(attempt, query = ?query, "Sending request");

            match self.transport.send(request).await {
                Ok(response) if response.status < 400 => {
                    tracing::debug!(
                        attempt,
                        status = response.status,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Request succeeded"
                    );
                    return Ok(parse_success(response));
                }
                Ok(response) => {
                    let err = classify_error(&response);
                    tracing::warn!(
                        attempt,
                        status = response.status,
                        kind = err.kind(),
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Request rejected"
                    );
                    return Err(err);
                }
                Err(e) if attempt == self.max_retries => {
                    tracing::error!(
                        attempts = attempt + 1,
                        error = %e,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Request failed, giving up"
                    );
                    return Err(AccessError::Network(format!(
                        "{method} {path} failed after {} attempts: {e}",
                        attempt + 1
                    )));
                }
                Err(e) => {
                    let delay = backoff_delay(attempt);
                    tracing::warn!(
                        attempt,
                        error = %e,
                        retry_in_secs = delay.as_secs(),
                        "Transport failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }

        Err(AccessError::Network(format!("{method} {path}: retries exhausted")))
    }

    /// True iff the service reports itself `UP`. Never fails.
    pub async fn validate_connection(&self) -> bool {
        match self.get("system/status", None).await {
            Ok(status) => {
                let state = status.get("status").and_then(Value::as_str);
                tracing::info!(state = ?state, "Service status checked");
                state == Some("UP")
            }
            Err(e) => {
                tracing::warn!(error = %e, "Service status check failed");
                false
            }
        }
    }

    /// Check the configured credentials. Authentication failures yield
    /// `Ok(false)`; any other error is returned.
    pub async fn authenticate(&self) -> AccessResult<bool> {
        match self.get("authentication/validate", None).await {
            Ok(body) => Ok(body.get("valid").and_then(Value::as_bool).unwrap_or(true)),
            Err(AccessError::Authentication { message }) => {
                tracing::warn!(message = %message, "Credentials rejected");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    pub fn rate_limit_status(&self) -> RateLimitStatus {
        self.rate_limiter.status()
    }

    /// Pooled connections are released when the last handle is dropped.
    pub async fn close(&self) {
        tracing::debug!(base_url = %self.base_url, "Access client closed");
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn headers(&self) -> Vec<(String, String)> {
        vec![
            ("Authorization".to_string(), format!("Bearer {}", self.token)),
            ("Accept".to_string(), "application/json".to_string()),
        ]
    }
}

impl std::fmt::Debug for AccessClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessClient")
            .field("base_url", &self.base_url)
            .field("token", &"[REDACTED]")
            .field("organization", &self.organization)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use qgate_core::ports::{HttpResponse, TransportError};

    type Outcome = Result<HttpResponse, TransportError>;

    /// Transport that replays scripted outcomes and records every request.
    /// Once the script runs out, it keeps timing out.
    struct ScriptedTransport {
        script: Mutex<VecDeque<Outcome>>,
        requests: Mutex<Vec<(HttpRequest, Instant)>>,
    }

    impl ScriptedTransport {
        fn new(outcomes: Vec<Outcome>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(outcomes.into()),
                requests: Mutex::default(),
            })
        }

        fn attempts(&self) -> usize {
            self.requests.lock().unwrap().len()
        }

        fn request(&self, index: usize) -> HttpRequest {
            self.requests.lock().unwrap()[index].0.clone()
        }

        fn sent_at(&self) -> Vec<Instant> {
            self.requests.lock().unwrap().iter().map(|(_, at)| *at).collect()
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
            let timeout = request.timeout;
            self.requests.lock().unwrap().push((request, Instant::now()));
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(TransportError::Timeout(timeout)))
        }
    }

    fn json_ok(body: Value) -> Outcome {
        Ok(HttpResponse::new(200, body.to_string())
            .with_header("Content-Type", "application/json"))
    }

    fn roomy_limiter() -> Arc<RateLimiter> {
        Arc::new(RateLimiter::new(1000, Duration::from_secs(1), None).unwrap())
    }

    fn client(transport: Arc<ScriptedTransport>, config: ClientConfig) -> AccessClient {
        AccessClient::with_transport(config, roomy_limiter(), transport).unwrap()
    }

    fn config() -> ClientConfig {
        ClientConfig::new("quality.example.com", "squ_token")
    }

    #[tokio::test(start_paused = true)]
    async fn test_always_timing_out_exhausts_retries() {
        let transport = ScriptedTransport::new(vec![]);
        let client = client(transport.clone(), config().with_max_retries(3));

        let started = Instant::now();
        let err = client.get("/x", None).await.unwrap_err();

        assert!(matches!(err, AccessError::Network(_)));
        assert_eq!(transport.attempts(), 4);
        assert!(started.elapsed() >= Duration::from_secs(7));

        let gaps: Vec<u64> = transport
            .sent_at()
            .windows(2)
            .map(|pair| (pair[1] - pair[0]).as_secs())
            .collect();
        assert_eq!(gaps, vec![1, 2, 4]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_error_is_raised_without_retry() {
        let transport = ScriptedTransport::new(vec![Ok(HttpResponse::new(503, "maintenance"))]);
        let client = client(transport.clone(), config().with_max_retries(3));

        let err = client.get("measures/component", None).await.unwrap_err();

        assert!(matches!(err, AccessError::Server { status: 503, .. }));
        assert_eq!(transport.attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_client_errors_are_classified() {
        let transport = ScriptedTransport::new(vec![
            Ok(HttpResponse::new(401, "")),
            Ok(HttpResponse::new(403, "")),
            Ok(HttpResponse::new(404, r#"{"errors":[{"msg":"Project 'x' not found"}]}"#)),
        ]);
        let client = client(transport.clone(), config());

        assert!(matches!(
            client.get("a", None).await,
            Err(AccessError::Authentication { .. })
        ));
        assert!(matches!(
            client.get("b", None).await,
            Err(AccessError::Authorization { .. })
        ));
        match client.get("c", None).await {
            Err(AccessError::Api {
                status, message, ..
            }) => {
                assert_eq!(status, 404);
                assert_eq!(message, "Project 'x' not found");
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(transport.attempts(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_transport_failure() {
        let transport = ScriptedTransport::new(vec![
            Err(TransportError::Connect("connection refused".into())),
            json_ok(json!({"status": "UP"})),
        ]);
        let client = client(transport.clone(), config());

        let started = Instant::now();
        let value = client.get("system/status", None).await.unwrap();

        assert_eq!(value, json!({"status": "UP"}));
        assert_eq!(transport.attempts(), 2);
        assert!(started.elapsed() >= Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_retries_means_single_attempt() {
        let transport = ScriptedTransport::new(vec![]);
        let client = client(transport.clone(), config().with_max_retries(0));

        assert!(matches!(
            client.get("x", None).await,
            Err(AccessError::Network(_))
        ));
        assert_eq!(transport.attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_shape() {
        let transport = ScriptedTransport::new(vec![json_ok(json!({}))]);
        let client = client(transport.clone(), config().with_organization("acme"));

        let params = [("component".to_string(), "proj1".to_string())]
            .into_iter()
            .collect();
        client.get("/measures/component", Some(params)).await.unwrap();

        let request = transport.request(0);
        assert_eq!(request.method, HttpMethod::Get);
        assert_eq!(request.url, "https://quality.example.com/api/measures/component");
        assert_eq!(request.query.get("component").map(String::as_str), Some("proj1"));
        assert_eq!(request.query.get("organization").map(String::as_str), Some("acme"));
        assert!(request
            .headers
            .iter()
            .any(|(name, value)| name == "Authorization" && value == "Bearer squ_token"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_explicit_organization_param_wins() {
        let transport = ScriptedTransport::new(vec![json_ok(json!({}))]);
        let client = client(transport.clone(), config().with_organization("acme"));

        let params = [("organization".to_string(), "other".to_string())]
            .into_iter()
            .collect();
        client.get("projects/search", Some(params)).await.unwrap();

        assert_eq!(
            transport.request(0).query.get("organization").map(String::as_str),
            Some("other")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_params_never_reach_the_wire() {
        let transport = ScriptedTransport::new(vec![]);
        let client = client(transport.clone(), config());

        let params = [("".to_string(), "x".to_string())].into_iter().collect();
        let err = client.get("issues/search", Some(params)).await.unwrap_err();

        assert!(matches!(err, AccessError::Validation(_)));
        assert_eq!(transport.attempts(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_each_attempt_waits_for_a_token() {
        let transport = ScriptedTransport::new(vec![json_ok(json!(1)), json_ok(json!(2))]);
        let limiter = Arc::new(RateLimiter::new(1, Duration::from_secs(60), None).unwrap());
        let client = AccessClient::with_transport(config(), limiter, transport.clone()).unwrap();

        let started = Instant::now();
        client.get("a", None).await.unwrap();
        client.get("b", None).await.unwrap();

        assert!(started.elapsed() >= Duration::from_secs(60));
        assert_eq!(client.rate_limit_status().available_tokens, 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_validate_connection() {
        let transport = ScriptedTransport::new(vec![
            json_ok(json!({"status": "UP", "version": "10.4"})),
            json_ok(json!({"status": "STARTING"})),
            Ok(HttpResponse::new(500, "")),
        ]);
        let client = client(transport, config().with_max_retries(0));

        assert!(client.validate_connection().await);
        assert!(!client.validate_connection().await);
        assert!(!client.validate_connection().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_authenticate() {
        let transport = ScriptedTransport::new(vec![
            json_ok(json!({"valid": true})),
            json_ok(json!({"valid": false})),
            Ok(HttpResponse::new(401, "")),
            Ok(HttpResponse::new(500, "")),
        ]);
        let client = client(transport, config());

        assert!(client.authenticate().await.unwrap());
        assert!(!client.authenticate().await.unwrap());
        assert!(!client.authenticate().await.unwrap());
        assert!(matches!(
            client.authenticate().await,
            Err(AccessError::Server { status: 500, .. })
        ));
    }

    #[test]
    fn test_rejects_empty_token() {
        let err = AccessClient::with_transport(
            ClientConfig::new("quality.example.com", "  "),
            roomy_limiter(),
            ScriptedTransport::new(vec![]),
        )
        .unwrap_err();
        assert!(matches!(err, AccessError::Validation(_)));
    }
}
