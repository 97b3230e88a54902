//! Resilience primitives: retry with backoff and per-service circuit breakers.
//!
//! Provider calls are wrapped as `breaker.call(retry.call(execute))`: a
//! whole retried sequence counts as one success or failure against the
//! breaker, and an open breaker rejects before any retry budget is spent.

pub mod breaker;
pub mod retry;

pub use breaker::{
    BreakerConfig, BreakerRegistry, BreakerSnapshot, CircuitBreaker, CircuitState, Permit,
    SERVICE_DEFAULTS,
};
pub use retry::{Backoff, RetryConfig, RetryCoordinator, RetryStats, RetryStatsSnapshot};
