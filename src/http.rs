//! Shared HTTP plumbing for the mail and ticketing clients.

use std::time::Duration;

use reqwest::{RequestBuilder, Response, StatusCode};
use tracing::warn;

/// Throttled requests are retried this many times before giving up.
pub const MAX_RATE_LIMIT_RETRIES: u32 = 5;

const INITIAL_BACKOFF_SECS: u64 = 1;
const MAX_BACKOFF_SECS: u64 = 32;
const MAX_LOGGED_BODY_LEN: usize = 300;

/// Build a client whose every request is bounded by `timeout`.
pub fn build_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|e| {
            warn!(error = %e, "Falling back to default HTTP client");
            reqwest::Client::new()
        })
}

/// Send a request, retrying on 429 Too Many Requests.
///
/// `build` is called once per attempt. The wait honors `Retry-After` (in
/// seconds) and otherwise doubles from 1s up to 32s. The final 429 response
/// is returned to the caller as-is.
pub async fn send_with_retry<F>(label: &str, build: F) -> Result<Response, reqwest::Error>
where
    F: Fn() -> RequestBuilder,
{
    let mut backoff_secs = INITIAL_BACKOFF_SECS;
    let mut attempt = 0;

    loop {
        let response = build().send().await?;
        if response.status() != StatusCode::TOO_MANY_REQUESTS || attempt >= MAX_RATE_LIMIT_RETRIES {
            return Ok(response);
        }

        let wait = retry_after(&response).unwrap_or(Duration::from_secs(backoff_secs));
        attempt += 1;
        warn!(
            request = label,
            attempt,
            wait_secs = wait.as_secs(),
            "Throttled; backing off"
        );
        tokio::time::sleep(wait).await;
        backoff_secs = (backoff_secs * 2).min(MAX_BACKOFF_SECS);
    }
}

fn retry_after(response: &Response) -> Option<Duration> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(|secs| Duration::from_secs(secs.min(MAX_BACKOFF_SECS)))
}

/// Truncate a response body for logs and error messages.
pub fn redact_body(body: &str) -> String {
    let body = body.trim();
    if body.len() <= MAX_LOGGED_BODY_LEN {
        return body.to_string();
    }
    let mut end = MAX_LOGGED_BODY_LEN;
    while end > 0 && !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... ({} bytes)", &body[..end], body.len())
}

/// Read a response body, never failing.
pub async fn body_text(response: Response) -> String {
    redact_body(&response.text().await.unwrap_or_default())
}
