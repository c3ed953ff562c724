//! Response parsing and error classification.

use std::time::Duration;

use reqwest::StatusCode;
use serde_json::{Value, json};

use qgate_core::AccessError;
use qgate_core::ports::HttpResponse;

/// Upper bound for the delay between transport retries.
pub const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Delay before retry number `attempt + 1`: `2^attempt` seconds, capped.
pub fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_secs(2u64.saturating_pow(attempt)).min(MAX_BACKOFF)
}

/// Decode a successful response. JSON bodies are parsed; anything else is
/// wrapped as `{"content": <text>, "status_code": <status>}`.
pub fn parse_success(response: HttpResponse) -> Value {
    if response.is_json() {
        match serde_json::from_str(&response.body) {
            Ok(value) => return value,
            Err(e) => {
                tracing::warn!(status = response.status, error = %e, "Response declared JSON but did not parse");
            }
        }
    }

    json!({
        "content": response.body,
        "status_code": response.status,
    })
}

/// Map an error response (status >= 400) onto the access error taxonomy.
pub fn classify_error(response: &HttpResponse) -> AccessError {
    let status = response.status;
    let body: Option<Value> = serde_json::from_str(&response.body).ok();
    let message = error_message(status, body.as_ref(), &response.body);

    match status {
        401 => AccessError::Authentication { message },
        403 => AccessError::Authorization { message },
        429 => AccessError::RateLimited {
            message,
            retry_after: response.header("retry-after").and_then(parse_retry_after),
        },
        500..=599 => AccessError::Server { status, message },
        _ => AccessError::Api {
            status,
            message,
            body,
        },
    }
}

/// Best human-readable message for an error body: the joined `errors[].msg`
/// list, else a top-level `message`, else the raw text, else the reason phrase.
fn error_message(status: u16, body: Option<&Value>, raw: &str) -> String {
    if let Some(body) = body {
        let joined = body
            .get("errors")
            .and_then(Value::as_array)
            .map(|errors| {
                errors
                    .iter()
                    .filter_map(|e| e.get("msg").and_then(Value::as_str))
                    .collect::<Vec<_>>()
                    .join("; ")
            })
            .filter(|joined| !joined.is_empty());
        if let Some(joined) = joined {
            return joined;
        }
        if let Some(message) = body.get("message").and_then(Value::as_str) {
            return message.to_string();
        }
    }

    let raw = raw.trim();
    if !raw.is_empty() {
        return raw.to_string();
    }

    StatusCode::from_u16(status)
        .ok()
        .and_then(|code| code.canonical_reason())
        .map(str::to_string)
        .unwrap_or_else(|| format!("HTTP {status}"))
}

/// `Retry-After` in seconds. HTTP-date values are not supported.
fn parse_retry_after(value: &str) -> Option<f64> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|secs| secs.is_finite() && *secs >= 0.0)
}
