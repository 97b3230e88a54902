//! Builder for configuring gateway instances

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use super::EmbeddedGateway;
use crate::batch::BatchScheduler;
use crate::cache::ResponseCache;
use crate::conditions::{ConditionsAdapter, ConditionsRequest, MarineConditions, SyntheticConditions};
use crate::config::GatewayConfig;
use crate::providers::{DEFAULT_STALE_TTL, DataProvider, HttpProvider, ProviderChain, ProviderEntry};
use crate::resilience::{BreakerRegistry, RetryCoordinator};
use crate::supersede::SupersedeTracker;
use crate::transport::{HttpTransport, RequestExecutor, ReqwestTransport};
use crate::Result;

/// Main entry point for creating gateway instances.
pub struct Tidewire;

impl Tidewire {
    /// Create a new builder for configuring the gateway.
    pub fn builder() -> TidewireBuilder {
        TidewireBuilder::new()
    }
}

struct ExtraProvider {
    provider: Arc<dyn DataProvider<ConditionsRequest, MarineConditions>>,
    service: String,
    priority: i32,
}

/// Builder for configuring gateway instances.
pub struct TidewireBuilder {
    config: GatewayConfig,
    transport: Option<Arc<dyn HttpTransport>>,
    extra_providers: Vec<ExtraProvider>,
}

impl TidewireBuilder {
    pub fn new() -> Self {
        Self {
            config: GatewayConfig::default(),
            transport: None,
            extra_providers: Vec::new(),
        }
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: GatewayConfig) -> Self {
        self.config = config;
        self
    }

    /// Load configuration from `path`, or the standard locations when `None`.
    pub fn config_file(self, path: Option<&Path>) -> Result<Self> {
        Ok(self.config(GatewayConfig::load_or_default(path)?))
    }

    /// Use a custom transport instead of reqwest (tests, proxies).
    pub fn transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Set the default per-request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.request.timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the default retries after the first attempt.
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.config.request.max_retries = max_retries;
        self
    }

    /// Set the base retry delay (multiplied by the attempt number).
    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.config.request.base_delay_ms = delay.as_millis() as u64;
        self
    }

    /// Set the default cache TTL.
    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.config.cache.ttl_ms = ttl.as_millis() as u64;
        self
    }

    /// Set the cache capacity.
    pub fn max_entries(mut self, max_entries: u64) -> Self {
        self.config.cache.max_entries = max_entries;
        self
    }

    /// Set the batch concurrency cap.
    pub fn max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.config.batch.max_concurrent = max_concurrent;
        self
    }

    /// Add a conditions provider alongside the configured HTTP providers.
    ///
    /// `service` picks the breaker defaults when no override matches the
    /// provider id.
    pub fn conditions_provider(
        mut self,
        provider: Arc<dyn DataProvider<ConditionsRequest, MarineConditions>>,
        service: impl Into<String>,
        priority: i32,
    ) -> Self {
        self.extra_providers.push(ExtraProvider {
            provider,
            service: service.into(),
            priority,
        });
        self
    }

    /// Build the gateway.
    pub fn build(self) -> Result<EmbeddedGateway> {
        let config = self.config;
        config.validate()?;

        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::new()?),
        };
        let executor = RequestExecutor::new(transport);
        let breakers = Arc::new(BreakerRegistry::with_overrides(config.breaker_overrides()));
        let retry = RetryCoordinator::new();
        let cache_config = config.cache_config();

        // =====================================================================
        // Conditions chain: configured HTTP providers, then extras, then mock
        // =====================================================================

        let mut chain = ProviderChain::<ConditionsRequest, MarineConditions>::builder(
            "conditions",
            Arc::new(SyntheticConditions),
        )
        .cache_config(&cache_config)
        .stale_store(config.cache.stale_entries, DEFAULT_STALE_TTL)
        .retry_coordinator(retry.clone());

        for (id, settings) in &config.providers {
            let timeout = settings
                .timeout_ms
                .map_or_else(|| config.request_timeout(), Duration::from_millis);
            let max_retries = settings.max_retries.unwrap_or(config.request.max_retries);

            let mut adapter = ConditionsAdapter::new(&settings.url)
                .timeout(timeout)
                .max_retries(max_retries);
            if let Some(key) = settings.api_key() {
                adapter = adapter.api_key(key);
            }

            let provider: Arc<dyn DataProvider<ConditionsRequest, MarineConditions>> =
                Arc::new(HttpProvider::new(id.clone(), executor.clone(), adapter));
            let entry = ProviderEntry::new(provider, breakers.breaker(id, &settings.service))
                .priority(settings.priority)
                .retry(config.retry_config().max_retries(max_retries));
            debug!(
                provider = %id,
                service = %settings.service,
                priority = settings.priority,
                "registered conditions provider"
            );
            chain = chain.provider(entry);
        }

        for extra in self.extra_providers {
            let breaker = breakers.breaker(extra.provider.id(), &extra.service);
            chain = chain.provider(
                ProviderEntry::new(extra.provider, breaker)
                    .priority(extra.priority)
                    .retry(config.retry_config()),
            );
        }

        let conditions = chain.build();
        info!(providers = ?conditions.provider_ids(), "gateway ready");

        let http_cache = Arc::new(ResponseCache::new("http", &cache_config));
        let batch = BatchScheduler::new(config.batch.max_concurrent);

        Ok(EmbeddedGateway::new(
            config,
            executor,
            retry,
            breakers,
            http_cache,
            conditions,
            batch,
            SupersedeTracker::new(),
        ))
    }
}

impl Default for TidewireBuilder {
    fn default() -> Self {
        Self::new()
    }
}
