//! EmbeddedGateway - the in-process resilience layer

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use tracing::instrument;

use crate::batch::BatchScheduler;
use crate::cache::{CacheKey, SharedCache};
use crate::conditions::{ConditionsRequest, MarineConditions};
use crate::config::GatewayConfig;
use crate::providers::chain::record_request;
use crate::providers::{ProviderChain, ProviderResult};
use crate::resilience::{BreakerRegistry, BreakerSnapshot, RetryCoordinator, RetryStatsSnapshot};
use crate::supersede::SupersedeTracker;
use crate::transport::{HttpResponse, RequestDescriptor, RequestExecutor};
use crate::Result;

/// Gateway that owns every shared resilience resource.
///
/// One instance per process is typical. All methods take `&self`; share
/// the gateway behind an `Arc` across tasks.
pub struct EmbeddedGateway {
    config: GatewayConfig,
    executor: RequestExecutor,
    retry: RetryCoordinator,
    breakers: Arc<BreakerRegistry>,
    http_cache: SharedCache<HttpResponse>,
    conditions: ProviderChain<ConditionsRequest, MarineConditions>,
    batch: BatchScheduler,
    supersede: SupersedeTracker,
}

impl fmt::Debug for EmbeddedGateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmbeddedGateway")
            .field("conditions", &self.conditions)
            .field("http_cache", &self.http_cache.name())
            .field("max_concurrent", &self.batch.max_concurrent())
            .finish_non_exhaustive()
    }
}

impl EmbeddedGateway {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        config: GatewayConfig,
        executor: RequestExecutor,
        retry: RetryCoordinator,
        breakers: Arc<BreakerRegistry>,
        http_cache: SharedCache<HttpResponse>,
        conditions: ProviderChain<ConditionsRequest, MarineConditions>,
        batch: BatchScheduler,
        supersede: SupersedeTracker,
    ) -> Self {
        Self {
            config,
            executor,
            retry,
            breakers,
            http_cache,
            conditions,
            batch,
            supersede,
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// A `GET` descriptor carrying the configured defaults.
    pub fn request(&self, target: impl Into<String>) -> RequestDescriptor {
        RequestDescriptor::get(target)
            .with_timeout(self.config.request_timeout())
            .with_max_retries(self.config.request.max_retries)
            .with_ttl(self.config.cache_ttl())
    }

    /// Fetch one request through cache, breaker, retry and executor.
    ///
    /// A cacheable 2xx response is stored under the request's fingerprint
    /// for `request.ttl`. When every attempt fails and the request carries a
    /// fallback value, that value is returned as a 200 (and not cached).
    #[instrument(skip(self, request), fields(url = %request.target))]
    pub async fn fetch(&self, request: &RequestDescriptor, service: &str) -> Result<HttpResponse> {
        let key = request.cacheable.then(|| request.fingerprint());
        if let Some(hit) = key.as_ref().and_then(|key| self.http_cache.get(key)) {
            return Ok(hit);
        }

        let breaker = self.breakers.service(service);
        let policy = self.config.retry_config().max_retries(request.max_retries);
        let start = Instant::now();
        let outcome = breaker
            .call(|| {
                self.retry.call(&policy, service, request.method.as_str(), || {
                    self.executor.execute(request)
                })
            })
            .await;

        match &outcome {
            Ok(response) => {
                record_request(service, "ok", start);
                if let Some(key) = key {
                    self.http_cache.set(key, response.clone(), request.ttl);
                }
            }
            Err(_) => record_request(service, "error", start),
        }

        let fallback = request.fallback_value.as_deref().map(HttpResponse::ok);
        self.retry.recover(outcome, fallback, service)
    }

    /// Resolve conditions for one point. Never fails.
    ///
    /// The payload's `sources` mirrors the result's provenance.
    pub async fn conditions(&self, request: &ConditionsRequest) -> ProviderResult<MarineConditions> {
        let mut result = self.conditions.resolve(request).await;
        result.payload.sources = result.sources.clone();
        result
    }

    /// Like [`conditions`](Self::conditions) but only live or cached data.
    pub async fn conditions_live(
        &self,
        request: &ConditionsRequest,
    ) -> Result<ProviderResult<MarineConditions>> {
        let mut result = self.conditions.resolve_live(request).await?;
        result.payload.sources = result.sources.clone();
        Ok(result)
    }

    /// Resolve conditions for a view, abandoning the view's previous request.
    ///
    /// Returns `None` when a newer call for the same `view` superseded
    /// this one.
    pub async fn conditions_for_view(
        &self,
        view: &str,
        request: &ConditionsRequest,
    ) -> Option<ProviderResult<MarineConditions>> {
        self.supersede.run(view, self.conditions(request)).await
    }

    /// Resolve many points under the batch concurrency cap. Results are in
    /// input order.
    pub async fn conditions_batch(
        &self,
        requests: Vec<ConditionsRequest>,
    ) -> Vec<ProviderResult<MarineConditions>> {
        self.batch
            .run_all(requests, |request| async move { self.conditions(&request).await })
            .await
    }

    pub fn conditions_chain(&self) -> &ProviderChain<ConditionsRequest, MarineConditions> {
        &self.conditions
    }

    pub fn breakers(&self) -> &BreakerRegistry {
        &self.breakers
    }

    pub fn breaker_snapshot(&self) -> Vec<BreakerSnapshot> {
        self.breakers.snapshot()
    }

    pub fn retry_stats(&self) -> RetryStatsSnapshot {
        self.retry.stats()
    }

    pub fn http_cache(&self) -> &SharedCache<HttpResponse> {
        &self.http_cache
    }

    /// Empty every cache.
    pub fn clear_caches(&self) {
        self.http_cache.clear();
        if let Some(cache) = self.conditions.cache() {
            cache.clear();
        }
    }

    /// Stop background sweeps. The gateway stays usable.
    pub fn close(&self) {
        self.http_cache.close();
        if let Some(cache) = self.conditions.cache() {
            cache.close();
        }
    }
}
