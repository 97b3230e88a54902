//! Tidewire error types

use std::time::Duration;

/// Tidewire error types
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    // Executor-level errors
    #[error("request timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("client error ({status}): {message}")]
    HttpClient { status: u16, message: String },

    #[error("server error ({status}): {message}")]
    HttpServer { status: u16, message: String },

    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    // Resilience errors
    /// The breaker for `service` is open; no network attempt was made.
    #[error("circuit open for service '{service}'")]
    CircuitOpen { service: String },

    /// Every provider in a chain failed. With a synthetic terminal provider
    /// in place this indicates a misconfigured chain.
    #[error("all providers exhausted")]
    AllProvidersExhausted,

    // Data errors
    #[error("decode error: {0}")]
    Decode(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // Configuration errors
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl GatewayError {
    /// Map a non-2xx HTTP status to the matching error variant.
    ///
    /// 429 becomes [`RateLimited`](Self::RateLimited) carrying the parsed
    /// `Retry-After` hint, 5xx becomes [`HttpServer`](Self::HttpServer),
    /// and everything else [`HttpClient`](Self::HttpClient).
    pub fn from_status(status: u16, message: impl Into<String>, retry_after: Option<Duration>) -> Self {
        match status {
            429 => GatewayError::RateLimited { retry_after },
            500..=599 => GatewayError::HttpServer {
                status,
                message: message.into(),
            },
            _ => GatewayError::HttpClient {
                status,
                message: message.into(),
            },
        }
    }

    /// Whether the retry loop may try the same call again.
    ///
    /// Timeouts, connection-level failures, 5xx responses and 429s are
    /// transient. Client errors, open circuits and decode failures are not.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            GatewayError::Timeout { .. }
                | GatewayError::Transport(_)
                | GatewayError::HttpServer { .. }
                | GatewayError::RateLimited { .. }
        )
    }

    /// The `Retry-After` hint carried by a rate-limit error, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            GatewayError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }

    /// HTTP status associated with this error, if it came from a response.
    pub fn status(&self) -> Option<u16> {
        match self {
            GatewayError::HttpClient { status, .. } | GatewayError::HttpServer { status, .. } => {
                Some(*status)
            }
            GatewayError::RateLimited { .. } => Some(429),
            _ => None,
        }
    }
}

/// Result type alias for Tidewire operations
pub type Result<T> = std::result::Result<T, GatewayError>;
