//! Retry-wrapped request executor.
//!
//! Client errors (HTTP 4xx) fail immediately. Network failures, 5xx responses
//! and malformed bodies are retried with exponential backoff. The cancellation
//! token is observed before each attempt, while the request is in flight and
//! during backoff. This layer knows nothing about caching or debouncing.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

use super::ClientError;

/// Raw response handed back by a transport.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Performs a single GET. Transport-level failures map to [`ClientError::Transient`].
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn get(&self, url: &str) -> Result<HttpResponse, ClientError>;
}

/// Transport over a shared `reqwest` client.
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get(&self, url: &str) -> Result<HttpResponse, ClientError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ClientError::Transient(format!("Network error: {}", e)))?;
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| ClientError::Transient(format!("Failed to read response body: {}", e)))?;

        Ok(HttpResponse {
            status,
            body: body.to_vec(),
        })
    }
}

/// Attempt budget and backoff base.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(300),
        }
    }
}

impl RetryPolicy {
    /// Delay after the zero-based `attempt` failed: `base_delay * 2^attempt`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
    }
}

/// GET `url` and decode the JSON body, retrying transient failures.
pub async fn fetch_with_retry<T: DeserializeOwned>(
    transport: &dyn HttpTransport,
    url: &str,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
) -> Result<T, ClientError> {
    execute(transport, url, policy, cancel, |body| {
        serde_json::from_slice(&body)
            .map_err(|e| ClientError::Transient(format!("Malformed response body: {}", e)))
    })
    .await
}

/// GET `url` and return the raw body, retrying transient failures.
pub async fn fetch_bytes_with_retry(
    transport: &dyn HttpTransport,
    url: &str,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
) -> Result<Vec<u8>, ClientError> {
    execute(transport, url, policy, cancel, Ok).await
}

async fn execute<T>(
    transport: &dyn HttpTransport,
    url: &str,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    decode: impl Fn(Vec<u8>) -> Result<T, ClientError>,
) -> Result<T, ClientError> {
    let attempts = policy.max_attempts.max(1);
    let mut last_error = None;

    for attempt in 0..attempts {
        if cancel.is_cancelled() {
            return Err(ClientError::Cancelled);
        }

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ClientError::Cancelled),
            response = transport.get(url) => response,
        };

        let result = outcome.and_then(|response| classify(response).and_then(&decode));
        match result {
            Ok(value) => return Ok(value),
            Err(e) if !e.is_retryable() => return Err(e),
            Err(e) => {
                tracing::warn!(
                    "Request to {} failed (attempt {}/{}): {}",
                    url,
                    attempt + 1,
                    attempts,
                    e
                );
                last_error = Some(e);

                if attempt + 1 < attempts {
                    let delay = policy.delay_for(attempt);
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(ClientError::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }

    Err(last_error
        .unwrap_or_else(|| ClientError::Transient("Request failed with no specific error".into())))
}

/// Split a response into a usable body, a client error or a transient error.
fn classify(response: HttpResponse) -> Result<Vec<u8>, ClientError> {
    match response.status {
        200..=299 => Ok(response.body),
        400..=499 => Err(ClientError::ClientRequest {
            status: response.status,
            body: response.body_text(),
        }),
        status => Err(ClientError::Transient(format!(
            "Request failed: {} {}",
            status,
            response.body_text()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::mock::{json_response, text_response, MockTransport};
    use serde_json::{json, Value};

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_millis(300));
        assert_eq!(policy.delay_for(1), Duration::from_millis(600));
        assert_eq!(policy.delay_for(2), Duration::from_millis(1200));
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_found_is_not_retried() {
        let transport = MockTransport::new(|_| Ok(text_response(404, "Company not found")));

        let result: Result<Value, _> = fetch_with_retry(
            &transport,
            "http://registry.test/api/companies/x",
            &RetryPolicy::default(),
            &CancellationToken::new(),
        )
        .await;

        assert_eq!(
            result.unwrap_err(),
            ClientError::ClientRequest {
                status: 404,
                body: "Company not found".to_string()
            }
        );
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_error_retries_with_increasing_delay() {
        let transport = MockTransport::new(|_| Ok(text_response(503, "unavailable")));

        let result: Result<Value, _> = fetch_with_retry(
            &transport,
            "http://registry.test/api/companies",
            &RetryPolicy::default(),
            &CancellationToken::new(),
        )
        .await;

        let err = result.unwrap_err();
        assert!(err.is_retryable());
        assert!(err.to_string().contains("503"));

        let times = transport.call_times();
        assert_eq!(times.len(), 3);
        let first_gap = times[1] - times[0];
        let second_gap = times[2] - times[1];
        assert!(first_gap >= Duration::from_millis(300));
        assert!(second_gap > first_gap);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_transient_failure() {
        let transport = MockTransport::new(|n| {
            if n == 0 {
                Err(ClientError::Transient("connection reset".into()))
            } else {
                Ok(json_response(200, &json!({"ok": true})))
            }
        });

        let value: Value = fetch_with_retry(
            &transport,
            "http://registry.test/api/companies",
            &RetryPolicy::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(value["ok"], true);
        assert_eq!(transport.call_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_body_is_transient() {
        let transport = MockTransport::new(|_| Ok(text_response(200, "<html>oops</html>")));

        let result: Result<Value, _> = fetch_with_retry(
            &transport,
            "http://registry.test/api/companies",
            &RetryPolicy::default(),
            &CancellationToken::new(),
        )
        .await;

        assert!(result.unwrap_err().is_retryable());
        assert_eq!(transport.call_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_abandons_retries() {
        let transport = MockTransport::new(|_| Ok(text_response(500, "boom")));
        let cancel = CancellationToken::new();

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            canceller.cancel();
        });

        let result = fetch_bytes_with_retry(
            &transport,
            "http://registry.test/api/export",
            &RetryPolicy::default(),
            &cancel,
        )
        .await;

        assert_eq!(result.unwrap_err(), ClientError::Cancelled);
        assert_eq!(transport.call_count(), 1);
    }
}
