//! HTTP adapter for conditions providers that speak the normalized shape.

use std::time::Duration;

use chrono::Utc;

use super::payload::{ConditionsRequest, MarineConditions};
use crate::providers::RequestAdapter;
use crate::providers::result::iso;
use crate::transport::{DEFAULT_MAX_RETRIES, DEFAULT_TIMEOUT, HttpResponse, RequestDescriptor};
use crate::{GatewayError, Result};

/// Builds `GET` requests from a URL template with `{lat}` and `{lon}`
/// placeholders and decodes a [`MarineConditions`] JSON document.
#[derive(Clone)]
pub struct ConditionsAdapter {
    url_template: String,
    api_key: Option<String>,
    timeout: Duration,
    max_retries: u32,
}

impl std::fmt::Debug for ConditionsAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConditionsAdapter")
            .field("url_template", &self.url_template)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("timeout", &self.timeout)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

impl ConditionsAdapter {
    pub fn new(url_template: impl Into<String>) -> Self {
        Self {
            url_template: url_template.into(),
            api_key: None,
            timeout: DEFAULT_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    /// Sent as a bearer token.
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// URL for `request`.
    pub fn url_for(&self, request: &ConditionsRequest) -> String {
        self.url_template
            .replace("{lat}", &format!("{:.4}", request.lat))
            .replace("{lon}", &format!("{:.4}", request.lon))
    }
}

impl RequestAdapter for ConditionsAdapter {
    type Request = ConditionsRequest;
    type Output = MarineConditions;

    fn build(&self, request: &ConditionsRequest) -> Result<RequestDescriptor> {
        let mut descriptor = RequestDescriptor::get(self.url_for(request))
            .with_header("accept", "application/json")
            .with_timeout(self.timeout)
            .with_max_retries(self.max_retries)
            // The chain caches decoded results, not raw bodies.
            .with_cacheable(false);
        if let Some(key) = &self.api_key {
            descriptor = descriptor.with_bearer(key);
        }
        Ok(descriptor)
    }

    fn parse(&self, _request: &ConditionsRequest, response: HttpResponse) -> Result<MarineConditions> {
        let value: serde_json::Value = response.json()?;
        if !value.is_object() {
            return Err(GatewayError::Decode(
                "expected a JSON object of conditions".to_string(),
            ));
        }
        let mut conditions: MarineConditions =
            serde_json::from_value(value).map_err(|e| GatewayError::Decode(e.to_string()))?;
        if conditions.last_iso.is_empty() {
            conditions.last_iso = iso(Utc::now());
        }
        Ok(conditions)
    }
}
