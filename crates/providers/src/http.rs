//! HTTP plumbing shared by the adapters.

use std::time::Duration;

use pipeline::{parse_retry_after, TransportError};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, StatusCode};
use thiserror::Error;

/// Tavily signals exhausted plan quota with these non-standard statuses.
/// Another credential may still succeed, so they are retryable.
const QUOTA_CODES: [u16; 2] = [432, 433];

/// The HTTP client could not be built.
#[derive(Debug, Error)]
#[error("failed to build HTTP client: {0}")]
pub struct ClientError(#[from] reqwest::Error);

/// Builds the shared client used by every adapter in this crate.
///
/// # Errors
///
/// Returns [`ClientError`] if the TLS backend cannot be initialised.
pub fn build_client(timeout: Duration) -> Result<Client, ClientError> {
    Ok(Client::builder()
        .timeout(timeout)
        .user_agent(concat!("quarry/", env!("CARGO_PKG_VERSION")))
        .build()?)
}

/// Parses a `Retry-After` header given in whole seconds.
pub(crate) fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_retry_after)
}

/// Maps a non-success status onto a transport error. On top of the standard
/// transient statuses, the search quota codes are retryable.
pub(crate) fn status_error(
    provider: &str,
    status: StatusCode,
    retry_after: Option<Duration>,
    body: &str,
) -> TransportError {
    TransportError::from_status(provider, status.as_u16(), &QUOTA_CODES, retry_after, body)
}

/// Maps a failed send or body read onto a retryable transport error.
pub(crate) fn request_error(provider: &str, error: &reqwest::Error) -> TransportError {
    TransportError::retryable(provider, format!("request failed: {error}"))
}

#[cfg(test)]
mod tests {
    use pipeline::{RetryPolicy, Retryable};

    use super::*;

    #[test]
    fn quota_and_server_errors_are_retryable() {
        for code in [408, 429, 432, 433, 500, 503] {
            let status = StatusCode::from_u16(code).expect("valid status");
            let err = status_error("test", status, None, "");
            assert_eq!(err.retry_policy(), RetryPolicy::Retryable { after: None }, "{code}");
        }
    }

    #[test]
    fn other_client_errors_are_fatal() {
        let err = status_error("test", StatusCode::UNAUTHORIZED, Some(Duration::from_secs(1)), "bad key");
        assert_eq!(err.retry_policy(), RetryPolicy::NonRetryable);
        assert_eq!(err.message, "HTTP 401: bad key");
    }
}
