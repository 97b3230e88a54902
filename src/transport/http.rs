//! Request/response envelopes and the injectable HTTP transport.
//!
//! The gateway never talks to the network directly. Every call goes through
//! an [`HttpTransport`], so tests (and alternative stacks) can swap the
//! reqwest-backed [`ReqwestTransport`] for anything that can answer a
//! [`RequestDescriptor`].

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;

use crate::cache::{CacheKey, Fingerprint};
use crate::{GatewayError, Result};

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(10_000);
/// Default retries after the first attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 2;
/// Default cache TTL for cacheable requests.
pub const DEFAULT_TTL: Duration = Duration::from_millis(300_000);

/// HTTP methods the gateway issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One outgoing request plus the policy it runs under.
///
/// ```rust
/// # use tidewire::RequestDescriptor;
/// # use std::time::Duration;
/// let request = RequestDescriptor::get("https://sst.example/point?lat=25.7&lon=-80.1")
///     .with_header("Accept", "application/json")
///     .with_timeout(Duration::from_secs(5))
///     .with_fallback_value("{}");
/// assert_eq!(request.max_retries, 2);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestDescriptor {
    pub target: String,
    pub method: HttpMethod,
    /// Header names are stored lowercased.
    pub headers: BTreeMap<String, String>,
    pub body: Option<String>,
    pub timeout: Duration,
    pub max_retries: u32,
    pub cacheable: bool,
    pub ttl: Duration,
    /// Body returned as a synthetic 200 when every attempt fails.
    pub fallback_value: Option<String>,
}

impl RequestDescriptor {
    pub fn new(method: HttpMethod, target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            method,
            headers: BTreeMap::new(),
            body: None,
            timeout: DEFAULT_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            cacheable: true,
            ttl: DEFAULT_TTL,
            fallback_value: None,
        }
    }

    pub fn get(target: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, target)
    }

    /// POST requests are not cacheable unless re-enabled.
    pub fn post(target: impl Into<String>, body: impl Into<String>) -> Self {
        let mut request = Self::new(HttpMethod::Post, target);
        request.body = Some(body.into());
        request.cacheable = false;
        request
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.into().to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_bearer(self, token: &str) -> Self {
        self.with_header("authorization", format!("Bearer {token}"))
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_cacheable(mut self, cacheable: bool) -> Self {
        self.cacheable = cacheable;
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_fallback_value(mut self, value: impl Into<String>) -> Self {
        self.fallback_value = Some(value.into());
        self
    }
}

impl CacheKey for RequestDescriptor {
    /// Method, target, headers and body. Timeouts and retry policy do not
    /// change what is fetched, so they are left out.
    fn fingerprint(&self) -> Fingerprint {
        let mut parts = vec![self.method.as_str(), self.target.as_str()];
        for (name, value) in &self.headers {
            parts.push(name);
            parts.push(value);
        }
        parts.push(self.body.as_deref().unwrap_or(""));
        Fingerprint::from_parts(&parts)
    }
}

/// Response envelope returned by a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    /// Header names are lowercased.
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: BTreeMap::new(),
            body: body.into(),
        }
    }

    /// A 200 carrying `body`.
    pub fn ok(body: impl Into<String>) -> Self {
        Self::new(200, body)
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.into().to_ascii_lowercase(), value.into());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Decode the body as JSON.
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_str(&self.body).map_err(|e| GatewayError::Decode(e.to_string()))
    }
}

/// The network primitive the executor wraps.
///
/// Implementations perform exactly one attempt and return whatever status
/// came back; classification and timeouts belong to the executor.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: &RequestDescriptor) -> Result<HttpResponse>;
}

/// Production transport backed by a shared `reqwest::Client`.
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("tidewire/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| GatewayError::Configuration(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    /// Use a preconfigured client (proxies, custom TLS roots).
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: &RequestDescriptor) -> Result<HttpResponse> {
        let mut builder = match request.method {
            HttpMethod::Get => self.client.get(&request.target),
            HttpMethod::Post => self.client.post(&request.target),
        };
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await.map_err(|e| map_reqwest_error(e, request))?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();
        let body = response
            .text()
            .await
            .map_err(|e| map_reqwest_error(e, request))?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

fn map_reqwest_error(error: reqwest::Error, request: &RequestDescriptor) -> GatewayError {
    if error.is_timeout() {
        GatewayError::Timeout {
            timeout: request.timeout,
        }
    } else {
        GatewayError::Transport(error.to_string())
    }
}
