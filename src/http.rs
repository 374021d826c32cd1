//! Shared HTTP client and response classification for remote adapters.

use std::sync::OnceLock;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};

use crate::error::HyvError;

static SHARED_CLIENT: OnceLock<reqwest::Client> = OnceLock::new();

/// Get (or create) the shared reqwest client.
pub fn shared_client() -> &'static reqwest::Client {
    SHARED_CLIENT.get_or_init(|| {
        reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .pool_max_idle_per_host(10)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new())
    })
}

/// JSON content-type headers, with a Bearer token when a key is present.
pub fn json_headers(api_key: Option<&str>) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    if let Some(key) = api_key.filter(|k| !k.trim().is_empty()) {
        if let Ok(val) = HeaderValue::from_str(&format!("Bearer {key}")) {
            headers.insert(AUTHORIZATION, val);
        }
    }
    headers
}

/// Parse a user-supplied header pair.
pub fn parse_header(name: &str, value: &str) -> Result<(HeaderName, HeaderValue), HyvError> {
    let name = HeaderName::from_bytes(name.as_bytes())
        .map_err(|e| HyvError::Configuration(format!("invalid header name `{name}`: {e}")))?;
    let value = HeaderValue::from_str(value)
        .map_err(|e| HyvError::Configuration(format!("invalid value for header `{name}`: {e}")))?;
    Ok((name, value))
}

/// Map a non-success HTTP status and body to an error.
pub fn status_to_error(status: u16, body: &str) -> HyvError {
    match status {
        401 | 403 => HyvError::Authentication(error_message(body)),
        429 => HyvError::RateLimited {
            retry_after_ms: extract_retry_after(body),
        },
        _ => HyvError::api(status, error_message(body)),
    }
}

/// Consume a failed response into an error.
pub async fn response_error(resp: reqwest::Response) -> HyvError {
    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_default();
    status_to_error(status, &body)
}

/// Pull a human-readable message out of the common JSON error envelopes,
/// falling back to the raw body.
fn error_message(body: &str) -> String {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(body) else {
        return body.to_string();
    };
    value
        .pointer("/error/message")
        .or_else(|| value.pointer("/error/0/message"))
        .or_else(|| value.get("message"))
        .and_then(|m| m.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| body.to_string())
}

fn extract_retry_after(body: &str) -> Option<u64> {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.pointer("/error/retry_after").and_then(|r| r.as_f64()))
        .map(|s| (s * 1000.0) as u64)
}
