//! Tidewire - resilient gateway for unreliable marine data providers
//!
//! This crate sits between an application and a set of flaky, rate-limited
//! third-party data sources (satellite SST, marine weather, vessel
//! tracking). Every request resolves to a structurally complete, typed
//! answer tagged with its provenance, even when providers time out, error,
//! or throttle.
//!
//! Control flow for one logical request:
//!
//! ```text
//! caller ─▶ BatchScheduler ─▶ ProviderChain ─▶ ResponseCache (hit: done)
//!                                   │
//!                                   ▼ per provider, in priority order
//!               CircuitBreaker.call(RetryCoordinator.call(RequestExecutor))
//!                                   │
//!                                   ▼ all failed
//!                      last-known-good (Stale) ─▶ synthetic ("mock")
//! ```
//!
//! # Conditions Example
//!
//! ```rust,no_run
//! use tidewire::{ConditionsRequest, Tidewire};
//!
//! #[tokio::main]
//! async fn main() -> tidewire::Result<()> {
//!     let gateway = Tidewire::builder().config_file(None)?.build()?;
//!
//!     let result = gateway
//!         .conditions(&ConditionsRequest::new(25.7, -80.1)?)
//!         .await;
//!
//!     println!(
//!         "{} ({:?}): sst {:?}",
//!         result.provider_id, result.status, result.payload.sst_c
//!     );
//!     Ok(())
//! }
//! ```
//!
//! # Raw Fetch Example
//!
//! ```rust,no_run
//! use tidewire::Tidewire;
//!
//! #[tokio::main]
//! async fn main() -> tidewire::Result<()> {
//!     let gateway = Tidewire::builder().build()?;
//!
//!     let request = gateway
//!         .request("https://ais.example/v1/vessels?bbox=-81,25,-80,26")
//!         .with_fallback_value("[]");
//!     let response = gateway.fetch(&request, "vessel-tracking").await?;
//!
//!     println!("{}", response.body);
//!     Ok(())
//! }
//! ```

pub mod batch;
pub mod cache;
pub mod conditions;
pub mod config;
pub mod error;
pub mod gateway;
pub mod providers;
pub mod resilience;
pub mod supersede;
pub mod telemetry;
pub mod transport;

// Re-export main types at crate root
pub use error::{GatewayError, Result};
pub use gateway::{EmbeddedGateway, Gateway, Tidewire, TidewireBuilder};

pub use batch::BatchScheduler;
pub use cache::{CacheConfig, CacheKey, Fingerprint, ResponseCache};
pub use conditions::{ConditionsRequest, MarineConditions, SyntheticConditions};
pub use config::GatewayConfig;
pub use providers::{
    DataProvider, ProviderChain, ProviderEntry, ProviderResult, ResultStatus, SourceOutcome,
    SourceStatus, SyntheticProvider,
};
pub use resilience::{
    Backoff, BreakerConfig, BreakerRegistry, CircuitBreaker, CircuitState, RetryConfig,
    RetryCoordinator,
};
pub use supersede::SupersedeTracker;
pub use transport::{HttpResponse, HttpTransport, RequestDescriptor, RequestExecutor};
