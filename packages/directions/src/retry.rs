//! HTTP retry helpers for transient provider errors.
//!
//! Provider clients call [`send_json`] instead of
//! `reqwest::RequestBuilder::send()` so every request gets exponential
//! backoff on timeouts, connection failures, HTTP 429, and HTTP 5xx.
//!
//! ```ignore
//! let body = retry::send_json(&policy, || client.get(url).query(&params)).await?;
//! ```

use std::time::Duration;

use crate::DirectionsError;

/// Retry limits for one logical request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry; doubled on every further retry.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    /// Three retries starting at 500ms (0.5s, 1s, 2s).
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::ZERO,
        }
    }

    /// Delay before retry number `attempt` (1-based).
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(factor)
    }
}

/// Sends an HTTP request and parses the response body as JSON.
///
/// The `build_request` closure is called on each attempt to construct a
/// fresh [`reqwest::RequestBuilder`], since builders are consumed by
/// `.send()`.
///
/// Does **not** retry HTTP 4xx (except 429); those are permanent.
///
/// # Errors
///
/// Returns [`DirectionsError`] if the request fails after all retries, the
/// server returns a non-retryable status code, or the body is not JSON.
#[allow(clippy::future_not_send)]
pub async fn send_json<F>(
    policy: &RetryPolicy,
    build_request: F,
) -> Result<serde_json::Value, DirectionsError>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let response = send_inner(policy, &build_request).await?;
    let text = response.text().await?;
    serde_json::from_str(&text).map_err(|e| DirectionsError::Malformed {
        message: format!("response body is not JSON: {e}"),
    })
}

#[allow(clippy::future_not_send)]
async fn send_inner<F>(
    policy: &RetryPolicy,
    build_request: &F,
) -> Result<reqwest::Response, DirectionsError>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let max_retries = policy.max_retries;
    let mut attempt = 0;

    loop {
        if attempt > 0 {
            let delay = policy.delay_for(attempt);
            log::warn!("  directions retry {attempt}/{max_retries} in {delay:?}...");
            tokio::time::sleep(delay).await;
        }

        match build_request().send().await {
            Err(e) => {
                if is_transient(&e) && attempt < max_retries {
                    log::warn!("  transient directions error: {e}");
                    attempt += 1;
                    continue;
                }
                return Err(DirectionsError::Http(e));
            }
            Ok(response) => {
                let status = response.status();

                if is_retryable_status(status) {
                    if attempt < max_retries {
                        log::warn!("  directions HTTP {status}");
                        attempt += 1;
                        continue;
                    }
                    return Err(DirectionsError::HttpStatus {
                        message: format!("HTTP {status} after {max_retries} retries"),
                    });
                }

                if status.is_client_error() {
                    return Err(DirectionsError::HttpStatus {
                        message: format!("HTTP {status}"),
                    });
                }

                return Ok(response);
            }
        }
    }
}

/// Returns `true` for statuses worth retrying (429 and 5xx).
#[must_use]
pub fn is_retryable_status(status: reqwest::StatusCode) -> bool {
    status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Returns `true` if the error is likely transient and worth retrying.
fn is_transient(e: &reqwest::Error) -> bool {
    e.is_timeout() || e.is_connect() || e.is_body() || e.is_request()
}
