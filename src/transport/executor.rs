//! Single-attempt request execution.
//!
//! [`RequestExecutor::execute`] issues exactly one network attempt bounded
//! by the descriptor's timeout and turns the outcome into either a 2xx
//! [`HttpResponse`] or one classified [`GatewayError`]. Whether an error is
//! worth retrying is decided later by the retry coordinator.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::debug;

use super::http::{HttpResponse, HttpTransport, RequestDescriptor};
use crate::{GatewayError, Result};

/// Longest body excerpt carried in an HTTP error message.
const ERROR_BODY_LIMIT: usize = 256;

/// Runs one request through the injected transport.
#[derive(Clone)]
pub struct RequestExecutor {
    transport: Arc<dyn HttpTransport>,
}

impl RequestExecutor {
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &Arc<dyn HttpTransport> {
        &self.transport
    }

    /// Issue one attempt.
    ///
    /// On timeout the in-flight transport future is dropped and the call
    /// fails with [`GatewayError::Timeout`]. Non-2xx responses become
    /// `HttpClient`, `HttpServer` or `RateLimited`.
    pub async fn execute(&self, request: &RequestDescriptor) -> Result<HttpResponse> {
        let outcome = tokio::time::timeout(request.timeout, self.transport.send(request)).await;

        let response = match outcome {
            Err(_) => {
                debug!(
                    url = %request.target,
                    timeout_ms = request.timeout.as_millis() as u64,
                    "request timed out"
                );
                return Err(GatewayError::Timeout {
                    timeout: request.timeout,
                });
            }
            Ok(Err(e)) => return Err(e),
            Ok(Ok(response)) => response,
        };

        debug!(url = %request.target, status = response.status, "response received");
        if response.is_success() {
            return Ok(response);
        }

        let retry_after = response
            .header("retry-after")
            .and_then(|value| parse_retry_after(value, Utc::now()));
        Err(GatewayError::from_status(
            response.status,
            excerpt(&response.body),
            retry_after,
        ))
    }
}

fn excerpt(body: &str) -> String {
    match body.char_indices().nth(ERROR_BODY_LIMIT) {
        Some((cut, _)) => format!("{}...", &body[..cut]),
        None => body.to_string(),
    }
}

/// Parse a `Retry-After` header value.
///
/// Accepts delta-seconds (`"5"`) and an HTTP-date
/// (`"Wed, 21 Oct 2015 07:28:00 GMT"`). A date in the past yields zero.
pub fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<Duration> {
    let value = value.trim();
    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }
    let at = DateTime::parse_from_rfc2822(value).ok()?.with_timezone(&Utc);
    Some((at - now).to_std().unwrap_or(Duration::ZERO))
}
