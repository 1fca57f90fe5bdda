//! HTTP retry helper for transient routing errors.
//!
//! [`send_json`] retries connection failures, timeouts, HTTP 429 and HTTP
//! 5xx with exponential backoff. Client errors (4xx other than 429) are
//! permanent. The caller's batch timeout bounds the total time spent here.

use std::time::Duration;

use crate::RoutingError;

/// Delay before the first retry; doubles on each further attempt.
const BASE_DELAY: Duration = Duration::from_millis(500);

/// Maximum length of the response body preview included in error logs.
const BODY_PREVIEW_LEN: usize = 300;

/// Sends an HTTP request and parses the response body as JSON.
///
/// The `build_request` closure is called on each attempt to construct a
/// fresh [`reqwest::RequestBuilder`], since builders are consumed by
/// `.send()`.
///
/// # Errors
///
/// Returns [`RoutingError`] if the request fails after `max_retries`
/// retries, the server returns a non-retryable status, or the body is not
/// JSON.
pub async fn send_json<F>(build_request: F, max_retries: u32) -> Result<serde_json::Value, RoutingError>
where
    F: Fn() -> reqwest::RequestBuilder + Send + Sync,
{
    let response = send_inner(&build_request, max_retries).await?;
    let url = response.url().to_string();
    let text = response.text().await?;

    serde_json::from_str(&text).map_err(|e| {
        let preview: String = text.chars().take(BODY_PREVIEW_LEN).collect();
        log::warn!("JSON parse failed for {url}: {e}\n  body preview: {preview}");
        RoutingError::Payload {
            message: format!("invalid JSON: {e}"),
        }
    })
}

/// Core retry loop. Returns the first response with a 2xx/3xx status.
async fn send_inner<F>(build_request: &F, max_retries: u32) -> Result<reqwest::Response, RoutingError>
where
    F: Fn() -> reqwest::RequestBuilder + Send + Sync,
{
    let mut attempt = 0;

    loop {
        if attempt > 0 {
            let delay = BASE_DELAY * 2u32.pow(attempt - 1);
            log::debug!("  retry {attempt}/{max_retries} in {delay:?}...");
            tokio::time::sleep(delay).await;
        }

        match build_request().send().await {
            Err(e) => {
                if is_transient(&e) && attempt < max_retries {
                    log::debug!("  transient error: {e}");
                    attempt += 1;
                    continue;
                }
                return Err(RoutingError::Http(e));
            }
            Ok(response) => {
                let status = response.status();

                if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                    if attempt < max_retries {
                        log::debug!("  HTTP {status}, retrying");
                        attempt += 1;
                        continue;
                    }
                    return Err(RoutingError::Status {
                        status: status.as_u16(),
                    });
                }

                if status.is_client_error() {
                    return Err(RoutingError::Status {
                        status: status.as_u16(),
                    });
                }

                return Ok(response);
            }
        }
    }
}

/// Returns `true` if the error is likely transient and worth retrying.
fn is_transient(e: &reqwest::Error) -> bool {
    e.is_timeout() || e.is_connect() || e.is_body() || e.is_request()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unreachable_host_fails_without_hanging() {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(200))
            .build()
            .unwrap();
        // Port 9 (discard) on localhost is closed in test environments.
        let result = send_json(|| client.get("http://127.0.0.1:9/table"), 0).await;
        assert!(matches!(result, Err(RoutingError::Http(_))));
    }
}
