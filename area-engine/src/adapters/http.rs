//! HTTP plumbing shared by the provider adapters.

use crate::adapter::AdapterError;
use reqwest::{Client, Response, StatusCode};

/// Builds a client with the platform User-Agent (GitHub rejects requests
/// without one).
pub fn client() -> Result<Client, AdapterError> {
    Client::builder()
        .user_agent("area-engine/0.1")
        .build()
        .map_err(|e| AdapterError::Configuration(format!("failed to build HTTP client: {}", e)))
}

/// Passes successful responses through and classifies the rest.
///
/// - 401 → credential rejected
/// - 403 with `X-RateLimit-Remaining: 0`, 429, 5xx → transient
/// - other non-2xx → rejected
pub async fn check_status(response: Response) -> Result<Response, AdapterError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let rate_limited = status == StatusCode::TOO_MANY_REQUESTS
        || (status == StatusCode::FORBIDDEN
            && response
                .headers()
                .get("X-RateLimit-Remaining")
                .and_then(|v| v.to_str().ok())
                .map(|v| v == "0")
                .unwrap_or(false));

    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<failed to read body>".to_string());
    let message = format!("status {}: {}", status, body);

    Err(if status == StatusCode::UNAUTHORIZED {
        AdapterError::Unauthorized(message)
    } else if rate_limited || status.is_server_error() {
        AdapterError::Transient(message)
    } else {
        AdapterError::Rejected(message)
    })
}
