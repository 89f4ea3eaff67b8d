//! Shared HTTP plumbing for the remote providers.
//!
//! Status mapping, timeout detection, and error-body scrubbing live here so
//! every backend reports failures the same way.

use std::time::Duration;

use storyloom_core::ProviderError;
use tracing::warn;

/// Longest error body carried into a `ProviderError`.
const MAX_ERROR_BODY: usize = 500;

/// Build a client with a request timeout.
pub(crate) fn build_client(timeout_secs: u64) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .unwrap_or_default()
}

/// Map a transport failure from `send()` or body reads.
pub(crate) fn send_error(err: reqwest::Error, timeout_secs: u64) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Timeout { timeout_secs }
    } else {
        ProviderError::Network(err.to_string())
    }
}

/// Remove the API key from text that may echo request headers, then cap it.
pub(crate) fn scrub(body: &str, api_key: &str) -> String {
    let mut cleaned = if api_key.len() >= 8 {
        body.replace(api_key, "[REDACTED]")
    } else {
        body.to_string()
    };
    if cleaned.chars().count() > MAX_ERROR_BODY {
        cleaned = cleaned.chars().take(MAX_ERROR_BODY).collect::<String>() + "...";
    }
    cleaned
}

/// Turn non-success statuses into typed errors; pass 2xx responses through.
pub(crate) async fn check_status(
    provider: &str,
    response: reqwest::Response,
    api_key: &str,
) -> Result<reqwest::Response, ProviderError> {
    let status = response.status().as_u16();
    if (200..300).contains(&status) {
        return Ok(response);
    }

    if status == 429 {
        let retry_after_secs = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(5);
        return Err(ProviderError::RateLimited { retry_after_secs });
    }

    if status == 401 || status == 403 {
        return Err(ProviderError::AuthenticationFailed(format!(
            "{provider} rejected the API key (status {status})"
        )));
    }

    let body = scrub(&response.text().await.unwrap_or_default(), api_key);
    warn!(provider, status, body = %body, "Provider returned error");
    Err(ProviderError::ApiError {
        status_code: status,
        message: body,
    })
}
