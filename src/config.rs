//! Configuration loading for the gateway.
//!
//! Configuration is loaded from TOML files with the following resolution order:
//! 1. explicit path (CLI flag or caller-supplied)
//! 2. `~/.tidewire/config.toml` (user)
//! 3. `/etc/tidewire/config.toml` (system)
//!
//! Every field has a default, so an empty file (or no file at all, via
//! [`GatewayConfig::load_or_default`]) yields the stock settings:
//!
//! | Parameter | Default |
//! |---|---|
//! | Request timeout | 10,000 ms |
//! | Max retries | 2 |
//! | Base retry delay | 1,000 ms × attempt |
//! | Cache TTL | 300,000 ms |
//! | Cache max size | 100 entries |
//! | Rate-limit wait (no `Retry-After`) | 60,000 ms |
//!
//! API keys never live in the config file. A provider section names the
//! environment variable holding its key via `api_key_env`.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::cache::CacheConfig;
use crate::resilience::{Backoff, BreakerConfig, RetryConfig};
use crate::{GatewayError, Result};

/// Gateway configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub request: RequestSettings,
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub batch: BatchSettings,
    /// Breaker overrides keyed by service or provider name.
    #[serde(default)]
    pub breakers: BTreeMap<String, BreakerSettings>,
    /// HTTP-backed conditions providers keyed by provider id.
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderSettings>,
}

/// Per-request defaults applied to every outgoing call.
#[derive(Debug, Clone, Deserialize)]
pub struct RequestSettings {
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_rate_limit_wait_ms")]
    pub rate_limit_wait_ms: u64,
}

impl Default for RequestSettings {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            rate_limit_wait_ms: default_rate_limit_wait_ms(),
        }
    }
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_max_retries() -> u32 {
    2
}

fn default_base_delay_ms() -> u64 {
    1_000
}

fn default_rate_limit_wait_ms() -> u64 {
    60_000
}

/// Response cache sizing.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheSettings {
    #[serde(default = "default_ttl_ms")]
    pub ttl_ms: u64,
    #[serde(default = "default_max_entries")]
    pub max_entries: u64,
    /// Interval of the background expiry sweep. 0 disables the sweep task.
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,
    /// Capacity of the last-known-good store used for stale answers.
    /// 0 disables stale answers.
    #[serde(default = "default_stale_entries")]
    pub stale_entries: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl_ms: default_ttl_ms(),
            max_entries: default_max_entries(),
            sweep_interval_ms: default_sweep_interval_ms(),
            stale_entries: default_stale_entries(),
        }
    }
}

fn default_ttl_ms() -> u64 {
    300_000
}

fn default_max_entries() -> u64 {
    100
}

fn default_sweep_interval_ms() -> u64 {
    60_000
}

fn default_stale_entries() -> u64 {
    500
}

/// Batch execution limits.
#[derive(Debug, Clone, Deserialize)]
pub struct BatchSettings {
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
        }
    }
}

fn default_max_concurrent() -> usize {
    4
}

/// Breaker threshold and cooldown for one service.
#[derive(Debug, Clone, Deserialize)]
pub struct BreakerSettings {
    pub threshold: u32,
    pub cooldown_ms: u64,
}

impl From<&BreakerSettings> for BreakerConfig {
    fn from(settings: &BreakerSettings) -> Self {
        BreakerConfig::new(settings.threshold, Duration::from_millis(settings.cooldown_ms))
    }
}

/// One HTTP conditions provider.
///
/// ```toml
/// [providers.primary]
/// url = "https://sst.example/v1/point?lat={lat}&lon={lon}"
/// service = "weather"
/// priority = 0
/// api_key_env = "TIDEWIRE_PRIMARY_KEY"
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderSettings {
    /// URL template; `{lat}` and `{lon}` are substituted per request.
    pub url: String,
    /// Service class used to pick breaker defaults (default: "weather").
    #[serde(default = "default_service")]
    pub service: String,
    /// Lower values are tried first.
    #[serde(default)]
    pub priority: i32,
    /// Environment variable holding the API key, sent as a bearer token.
    #[serde(default)]
    pub api_key_env: Option<String>,
    /// Overrides `request.timeout_ms` for this provider.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    /// Overrides `request.max_retries` for this provider.
    #[serde(default)]
    pub max_retries: Option<u32>,
}

fn default_service() -> String {
    "weather".to_string()
}

impl ProviderSettings {
    /// Read the API key from the configured environment variable.
    pub fn api_key(&self) -> Option<String> {
        self.api_key_env
            .as_deref()
            .and_then(|var| std::env::var(var).ok())
            .filter(|key| !key.is_empty())
    }
}

impl GatewayConfig {
    /// Load configuration from the standard locations.
    ///
    /// Resolution order:
    /// 1. Explicit path (if provided)
    /// 2. `~/.tidewire/config.toml`
    /// 3. `/etc/tidewire/config.toml`
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let path = Self::resolve_config_path(explicit_path)?.ok_or_else(|| {
            GatewayError::Configuration(
                "No config file found. Create ~/.tidewire/config.toml or /etc/tidewire/config.toml"
                    .to_string(),
            )
        })?;
        Self::load_from_file(&path)
    }

    /// Like [`load`](Self::load), but falls back to built-in defaults when
    /// no config file exists. An explicit path that does not exist is
    /// still an error.
    pub fn load_or_default(explicit_path: Option<&Path>) -> Result<Self> {
        match Self::resolve_config_path(explicit_path)? {
            Some(path) => Self::load_from_file(&path),
            None => Ok(Self::default()),
        }
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| GatewayError::Configuration(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            GatewayError::Configuration(format!("Failed to read config file {path:?}: {e}"))
        })?;
        Self::from_toml_str(&content)
    }

    /// Resolve the config file path, `None` when no candidate exists.
    fn resolve_config_path(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
        if let Some(path) = explicit {
            if path.exists() {
                return Ok(Some(path.to_path_buf()));
            }
            return Err(GatewayError::Configuration(format!(
                "Config file not found: {path:?}"
            )));
        }

        // User config
        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".tidewire").join("config.toml");
            if user_config.exists() {
                return Ok(Some(user_config));
            }
        }

        // System config
        let system_config = PathBuf::from("/etc/tidewire/config.toml");
        if system_config.exists() {
            return Ok(Some(system_config));
        }

        Ok(None)
    }

    /// Reject settings the gateway cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.cache.max_entries == 0 {
            return Err(GatewayError::Configuration(
                "cache.max_entries must be at least 1".to_string(),
            ));
        }
        for (name, breaker) in &self.breakers {
            if breaker.threshold == 0 {
                return Err(GatewayError::Configuration(format!(
                    "breakers.{name}.threshold must be at least 1"
                )));
            }
        }
        for (id, provider) in &self.providers {
            if !provider.url.contains("{lat}") || !provider.url.contains("{lon}") {
                return Err(GatewayError::Configuration(format!(
                    "providers.{id}.url must contain {{lat}} and {{lon}} placeholders"
                )));
            }
            if id == crate::providers::SYNTHETIC_PROVIDER_ID {
                return Err(GatewayError::Configuration(format!(
                    "provider id '{id}' is reserved for the synthetic generator"
                )));
            }
        }
        Ok(())
    }

    /// Default per-request timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request.timeout_ms)
    }

    /// Default cache TTL.
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache.ttl_ms)
    }

    /// Retry policy derived from `[request]`.
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig::new()
            .max_retries(self.request.max_retries)
            .base_delay(Duration::from_millis(self.request.base_delay_ms))
            .backoff(Backoff::Linear)
            .rate_limit_wait(Duration::from_millis(self.request.rate_limit_wait_ms))
    }

    /// Cache sizing derived from `[cache]`.
    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig::new()
            .max_entries(self.cache.max_entries)
            .ttl(self.cache_ttl())
            .sweep_interval(Duration::from_millis(self.cache.sweep_interval_ms))
    }

    /// Breaker overrides as typed configs.
    pub fn breaker_overrides(&self) -> BTreeMap<String, BreakerConfig> {
        self.breakers
            .iter()
            .map(|(name, settings)| (name.clone(), BreakerConfig::from(settings)))
            .collect()
    }
}
