//! The provenance-tagged unit a chain hands back to callers.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use super::traits::SYNTHETIC_PROVIDER_ID;

/// Freshness of a chain result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ResultStatus {
    /// Live data, or synthetic data from the terminal provider.
    Ok,
    /// Last-known-good data served because every live provider failed.
    Stale,
    Error,
}

/// What happened to one provider during a resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SourceOutcome {
    Ok,
    Error,
    /// Breaker open; no call was made.
    Skipped,
}

/// One provider consulted during a resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceStatus {
    pub id: String,
    pub status: SourceOutcome,
    /// RFC 3339 time the outcome was observed.
    pub last_iso: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl SourceStatus {
    pub fn new(id: impl Into<String>, status: SourceOutcome, at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            status,
            last_iso: iso(at),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Result of resolving one logical request through a chain.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderResult<T> {
    pub provider_id: String,
    pub status: ResultStatus,
    pub payload: T,
    pub observed_at: DateTime<Utc>,
    /// Providers consulted for this answer, in the order they were tried.
    pub sources: Vec<SourceStatus>,
    /// Whether the answer came from the response cache.
    pub from_cache: bool,
}

impl<T> ProviderResult<T> {
    /// Whether the payload came from the synthetic generator.
    pub fn is_synthetic(&self) -> bool {
        self.provider_id == SYNTHETIC_PROVIDER_ID
    }

    /// Fresh data from a real provider.
    pub fn is_live(&self) -> bool {
        self.status == ResultStatus::Ok && !self.is_synthetic()
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ProviderResult<U> {
        ProviderResult {
            provider_id: self.provider_id,
            status: self.status,
            payload: f(self.payload),
            observed_at: self.observed_at,
            sources: self.sources,
            from_cache: self.from_cache,
        }
    }
}

pub(crate) fn iso(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_camel_case() {
        let at = DateTime::parse_from_rfc3339("2026-03-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let result = ProviderResult {
            provider_id: "secondary".to_string(),
            status: ResultStatus::Ok,
            payload: 24.3,
            observed_at: at,
            sources: vec![
                SourceStatus::new("primary", SourceOutcome::Error, at).with_detail("timeout"),
                SourceStatus::new("secondary", SourceOutcome::Ok, at),
            ],
            from_cache: false,
        };

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["providerId"], "secondary");
        assert_eq!(json["status"], "Ok");
        assert_eq!(json["payload"], 24.3);
        assert_eq!(json["sources"][0]["status"], "Error");
        assert_eq!(json["sources"][0]["lastIso"], "2026-03-01T12:00:00.000Z");
        assert!(json["sources"][1].get("detail").is_none());
    }

    #[test]
    fn synthetic_is_not_live() {
        let result = ProviderResult {
            provider_id: SYNTHETIC_PROVIDER_ID.to_string(),
            status: ResultStatus::Ok,
            payload: (),
            observed_at: Utc::now(),
            sources: Vec::new(),
            from_cache: false,
        };
        assert!(result.is_synthetic());
        assert!(!result.is_live());
    }
}
