//! Provider error mapping shared by every HTTP backend.

use std::time::Duration;

use serde_json::Value;

pub use learnpath_core::error::ProviderError;

/// Fallback when a 429 carries no usable `retry-after` header.
const DEFAULT_RETRY_AFTER_SECS: u64 = 5;

pub(crate) fn http_client(timeout_secs: u64) -> Result<reqwest::Client, ProviderError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| ProviderError::NetworkError(format!("failed to build HTTP client: {e}")))
}

pub(crate) fn send_error(e: reqwest::Error, timeout_secs: u64) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Timeout(timeout_secs)
    } else {
        ProviderError::NetworkError(e.to_string())
    }
}

/// Turn non-success HTTP statuses into a [`ProviderError`].
///
/// `subject` names what a 404 refers to (usually the model id).
pub(crate) async fn check_status(
    response: reqwest::Response,
    subject: &str,
) -> Result<reqwest::Response, ProviderError> {
    let status = response.status().as_u16();
    if status < 400 {
        return Ok(response);
    }

    if status == 429 {
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .unwrap_or(DEFAULT_RETRY_AFTER_SECS)
            * 1000;
        return Err(ProviderError::RateLimited {
            retry_after_ms: retry_after,
        });
    }
    if status == 404 {
        return Err(ProviderError::ModelNotFound(subject.to_string()));
    }

    let body = response.text().await.unwrap_or_default();
    let message = error_message(&body).unwrap_or(body);
    if status == 401 || status == 403 || (status == 400 && message.contains("API key")) {
        return Err(ProviderError::AuthenticationFailed(message));
    }
    Err(ProviderError::ApiError { status, message })
}

/// Best-effort extraction of a human-readable message from an error body.
///
/// Understands `{"error": {"message": ..}}`, `{"error": ".."}` and
/// `{"detail": {"error": ..}}`.
fn error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    let message = match &value["error"] {
        Value::String(s) => Some(s.as_str()),
        Value::Object(obj) => obj.get("message").and_then(Value::as_str),
        _ => None,
    }
    .or_else(|| value["detail"]["error"].as_str())
    .or_else(|| value["detail"].as_str())?;
    Some(message.to_string())
}

pub(crate) fn parse_error(e: reqwest::Error) -> ProviderError {
    ProviderError::ApiError {
        status: 0,
        message: format!("failed to parse response: {e}"),
    }
}
