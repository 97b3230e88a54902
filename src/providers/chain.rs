//! Provider chain with fallback semantics.
//!
//! A [`ProviderChain`] owns an ordered set of live providers, each with its
//! own circuit breaker and retry policy, and ends at an infallible synthetic
//! provider.
//!
//! # Resolution Flow
//!
//! ```text
//! resolve(request)
//!     │
//!     ▼
//! ┌──────────────┐  hit
//! │ response     │ ─────────────────────────────▶ cached ProviderResult
//! │ cache        │
//! └──────┬───────┘
//!        │ miss
//!        ▼
//! ┌──────────────┐  breaker open: skip, no failure recorded
//! │ provider 0   │  error after retries: next provider
//! │ provider 1   │  success: cache + last-good store, return Ok
//! │ ...          │
//! └──────┬───────┘
//!        │ all failed
//!        ▼
//! ┌──────────────┐  hit
//! │ last-good    │ ─────────────────────────────▶ Stale ProviderResult
//! │ store        │
//! └──────┬───────┘
//!        │ miss
//!        ▼
//!   synthetic provider ─────────────────────────▶ Ok, provider "mock"
//! ```
//!
//! Each live call runs as `breaker.call(retry.call(provider.fetch))`, so a
//! whole retried sequence counts once against the breaker.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, instrument, warn};

use super::result::{ProviderResult, ResultStatus, SourceOutcome, SourceStatus};
use super::traits::{DataProvider, SyntheticProvider};
use crate::cache::{CacheConfig, CacheKey, Fingerprint, ResponseCache, SharedCache};
use crate::resilience::{CircuitBreaker, RetryConfig, RetryCoordinator};
use crate::telemetry;
use crate::{GatewayError, Result};

/// How long a last-known-good result stays eligible for stale answers.
pub const DEFAULT_STALE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// A live provider plus the policy it runs under.
pub struct ProviderEntry<Req, T> {
    provider: Arc<dyn DataProvider<Req, T>>,
    breaker: Arc<CircuitBreaker>,
    priority: i32,
    retry: RetryConfig,
}

impl<Req, T> ProviderEntry<Req, T> {
    pub fn new(provider: Arc<dyn DataProvider<Req, T>>, breaker: Arc<CircuitBreaker>) -> Self {
        Self {
            provider,
            breaker,
            priority: 0,
            retry: RetryConfig::default(),
        }
    }

    /// Lower values are tried first. Equal priorities keep insertion order.
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn retry(mut self, config: RetryConfig) -> Self {
        self.retry = config;
        self
    }

    pub fn id(&self) -> &str {
        self.provider.id()
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }
}

/// Builder for [`ProviderChain`].
pub struct ChainBuilder<Req, T> {
    name: String,
    terminal: Arc<dyn SyntheticProvider<Req, T>>,
    entries: Vec<ProviderEntry<Req, T>>,
    cache: Option<SharedCache<ProviderResult<T>>>,
    stale: Option<ResponseCache<ProviderResult<T>>>,
    retry: RetryCoordinator,
}

impl<Req, T> ChainBuilder<Req, T>
where
    Req: CacheKey + Send + Sync,
    T: Clone + Send + Sync + 'static,
{
    pub fn provider(mut self, entry: ProviderEntry<Req, T>) -> Self {
        self.entries.push(entry);
        self
    }

    /// Share an existing response cache.
    pub fn cache(mut self, cache: SharedCache<ProviderResult<T>>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Give the chain its own response cache.
    pub fn cache_config(self, config: &CacheConfig) -> Self {
        let cache = Arc::new(ResponseCache::new(self.name.clone(), config));
        self.cache(cache)
    }

    /// Keep up to `capacity` last-known-good results for `ttl` and serve
    /// them as `Stale` when every live provider fails. Zero disables.
    pub fn stale_store(mut self, capacity: u64, ttl: Duration) -> Self {
        self.stale = (capacity > 0 && !ttl.is_zero()).then(|| {
            let config = CacheConfig::new()
                .max_entries(capacity)
                .ttl(ttl)
                .sweep_interval(Duration::ZERO);
            ResponseCache::new(format!("{}-stale", self.name), &config)
        });
        self
    }

    /// Share retry counters with other chains.
    pub fn retry_coordinator(mut self, retry: RetryCoordinator) -> Self {
        self.retry = retry;
        self
    }

    pub fn build(mut self) -> ProviderChain<Req, T> {
        // Stable: equal priorities keep insertion order.
        self.entries.sort_by_key(|entry| entry.priority);
        ProviderChain {
            name: self.name,
            entries: self.entries,
            terminal: self.terminal,
            cache: self.cache,
            stale: self.stale,
            retry: self.retry,
        }
    }
}

/// Ordered providers for one data domain, ending at a synthetic generator.
pub struct ProviderChain<Req, T> {
    name: String,
    entries: Vec<ProviderEntry<Req, T>>,
    terminal: Arc<dyn SyntheticProvider<Req, T>>,
    cache: Option<SharedCache<ProviderResult<T>>>,
    stale: Option<ResponseCache<ProviderResult<T>>>,
    retry: RetryCoordinator,
}

impl<Req, T> fmt::Debug for ProviderChain<Req, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderChain")
            .field("name", &self.name)
            .field(
                "providers",
                &self
                    .entries
                    .iter()
                    .map(|e| e.provider.id())
                    .collect::<Vec<_>>(),
            )
            .field("terminal", &self.terminal.id())
            .finish()
    }
}

impl<Req, T> ProviderChain<Req, T>
where
    Req: CacheKey + Send + Sync,
    T: Clone + Send + Sync + 'static,
{
    pub fn builder(
        name: impl Into<String>,
        terminal: Arc<dyn SyntheticProvider<Req, T>>,
    ) -> ChainBuilder<Req, T> {
        ChainBuilder {
            name: name.into(),
            terminal,
            entries: Vec::new(),
            cache: None,
            stale: None,
            retry: RetryCoordinator::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Live provider ids in the order they are tried.
    pub fn provider_ids(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.provider.id()).collect()
    }

    pub fn breakers(&self) -> impl Iterator<Item = &Arc<CircuitBreaker>> {
        self.entries.iter().map(|e| &e.breaker)
    }

    pub fn cache(&self) -> Option<&SharedCache<ProviderResult<T>>> {
        self.cache.as_ref()
    }

    pub fn retry_coordinator(&self) -> &RetryCoordinator {
        &self.retry
    }

    /// Resolve `request` to exactly one result. Never fails.
    #[instrument(skip(self, request), fields(chain = %self.name))]
    pub async fn resolve(&self, request: &Req) -> ProviderResult<T> {
        let key = request.fingerprint();
        if let Some(hit) = self.cached(&key) {
            return hit;
        }

        let mut sources = Vec::with_capacity(self.entries.len() + 1);
        if let Some(result) = self.resolve_providers(request, &key, &mut sources).await {
            return result;
        }

        if let Some(result) = self.stale(&key, &sources) {
            return result;
        }
        self.synthesize(request, sources)
    }

    /// Like [`resolve`](Self::resolve) but refuses degraded answers: fails
    /// with [`GatewayError::AllProvidersExhausted`] instead of serving stale
    /// or synthetic data.
    #[instrument(skip(self, request), fields(chain = %self.name))]
    pub async fn resolve_live(&self, request: &Req) -> Result<ProviderResult<T>> {
        let key = request.fingerprint();
        if let Some(hit) = self.cached(&key) {
            return Ok(hit);
        }
        let mut sources = Vec::with_capacity(self.entries.len());
        self.resolve_providers(request, &key, &mut sources)
            .await
            .ok_or(GatewayError::AllProvidersExhausted)
    }

    /// Drop any cached and last-good result for `request`.
    pub fn invalidate(&self, request: &Req) {
        let key = request.fingerprint();
        if let Some(cache) = &self.cache {
            cache.delete(&key);
        }
        if let Some(stale) = &self.stale {
            stale.delete(&key);
        }
    }

    fn cached(&self, key: &Fingerprint) -> Option<ProviderResult<T>> {
        let mut hit = self.cache.as_ref()?.get(key)?;
        debug!(chain = %self.name, provider = %hit.provider_id, "answered from cache");
        hit.from_cache = true;
        Some(hit)
    }

    async fn resolve_providers(
        &self,
        request: &Req,
        key: &Fingerprint,
        sources: &mut Vec<SourceStatus>,
    ) -> Option<ProviderResult<T>> {
        for entry in &self.entries {
            let id = entry.provider.id();
            let breaker = &entry.breaker;
            let start = Instant::now();

            let outcome = breaker
                .call(|| {
                    self.retry.call(&entry.retry, breaker.service(), id, || {
                        entry.provider.fetch(request)
                    })
                })
                .await;

            match outcome {
                Ok(payload) => {
                    record_request(id, "ok", start);
                    let now = Utc::now();
                    sources.push(SourceStatus::new(id, SourceOutcome::Ok, now));
                    let result = ProviderResult {
                        provider_id: id.to_string(),
                        status: ResultStatus::Ok,
                        payload,
                        observed_at: now,
                        sources: sources.clone(),
                        from_cache: false,
                    };
                    if let Some(cache) = &self.cache {
                        cache.set_default(key.clone(), result.clone());
                    }
                    if let Some(stale) = &self.stale {
                        stale.set_default(key.clone(), result.clone());
                    }
                    return Some(result);
                }
                Err(GatewayError::CircuitOpen { service }) => {
                    record_request(id, "skipped", start);
                    debug!(chain = %self.name, provider = id, service = %service, "breaker open, skipping provider");
                    sources.push(
                        SourceStatus::new(id, SourceOutcome::Skipped, Utc::now())
                            .with_detail("circuit open"),
                    );
                }
                Err(e) => {
                    record_request(id, "error", start);
                    warn!(chain = %self.name, provider = id, error = %e, "provider failed, trying next");
                    sources.push(
                        SourceStatus::new(id, SourceOutcome::Error, Utc::now())
                            .with_detail(e.to_string()),
                    );
                }
            }
        }
        None
    }

    fn stale(&self, key: &Fingerprint, sources: &[SourceStatus]) -> Option<ProviderResult<T>> {
        let mut last_good = self.stale.as_ref()?.get(key)?;
        warn!(
            chain = %self.name,
            provider = %last_good.provider_id,
            observed_at = %last_good.observed_at,
            "all providers failed, serving last known good result"
        );
        metrics::counter!(telemetry::STALE_RESPONSES_TOTAL, "chain" => self.name.clone())
            .increment(1);
        last_good.status = ResultStatus::Stale;
        last_good.sources = sources.to_vec();
        Some(last_good)
    }

    fn synthesize(&self, request: &Req, mut sources: Vec<SourceStatus>) -> ProviderResult<T> {
        let id = self.terminal.id();
        let now = Utc::now();
        if !self.entries.is_empty() {
            warn!(chain = %self.name, "all providers failed, using synthetic data");
        }
        metrics::counter!(telemetry::SYNTHETIC_FALLBACKS_TOTAL, "chain" => self.name.clone())
            .increment(1);
        sources.push(SourceStatus::new(id, SourceOutcome::Ok, now));
        ProviderResult {
            provider_id: id.to_string(),
            status: ResultStatus::Ok,
            payload: self.terminal.generate(request, now),
            observed_at: now,
            sources,
            from_cache: false,
        }
    }
}

/// Record one provider call (counter + histogram).
pub(crate) fn record_request(provider: &str, status: &'static str, start: Instant) {
    metrics::counter!(telemetry::REQUESTS_TOTAL,
        "provider" => provider.to_owned(),
        "status" => status,
    )
    .increment(1);
    metrics::histogram!(telemetry::REQUEST_DURATION_SECONDS, "provider" => provider.to_owned())
        .record(start.elapsed().as_secs_f64());
}
