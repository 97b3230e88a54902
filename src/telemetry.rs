//! Telemetry metric name constants.
//!
//! Centralised metric names for tidewire operations. Consumers install
//! their own `metrics` recorder (e.g. prometheus, statsd); without a
//! recorder installed, all metric calls are no-ops.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `tidewire_`. Counters end in `_total`,
//! histograms use meaningful units (e.g. `_seconds`).
//!
//! # Common labels
//!
//! - `provider`: provider id (e.g. "primary", "secondary", "mock")
//! - `service`: breaker/service name (e.g. "weather", "vessel-tracking")
//! - `status`: outcome: "ok", "error" or "skipped"
//! - `cache`: which cache emitted the event: "http" or a chain name

/// Total provider calls dispatched by a chain.
///
/// Labels: `provider`, `status` ("ok" | "error" | "skipped").
pub const REQUESTS_TOTAL: &str = "tidewire_requests_total";

/// Provider call duration in seconds (including retries).
///
/// Labels: `provider`.
pub const REQUEST_DURATION_SECONDS: &str = "tidewire_request_duration_seconds";

/// Total retry attempts (not counting the initial request).
///
/// Labels: `service`, `operation`.
pub const RETRIES_TOTAL: &str = "tidewire_retries_total";

/// Calls that failed after the retry budget was spent.
///
/// Labels: `service`, `operation`.
pub const RETRY_EXHAUSTED_TOTAL: &str = "tidewire_retry_exhausted_total";

/// Total cache hits.
///
/// Labels: `cache`.
pub const CACHE_HITS_TOTAL: &str = "tidewire_cache_hits_total";

/// Total cache misses (including expired entries).
///
/// Labels: `cache`.
pub const CACHE_MISSES_TOTAL: &str = "tidewire_cache_misses_total";

/// Entries removed by the cache itself.
///
/// Labels: `cache`, `cause` ("expired" | "size").
pub const CACHE_EVICTIONS_TOTAL: &str = "tidewire_cache_evictions_total";

/// Circuit breaker state transitions.
///
/// Labels: `service`, `to` ("closed" | "open" | "half_open").
pub const BREAKER_TRANSITIONS_TOTAL: &str = "tidewire_breaker_transitions_total";

/// Calls rejected without a network attempt because a breaker was open.
///
/// Labels: `service`.
pub const BREAKER_REJECTIONS_TOTAL: &str = "tidewire_breaker_rejections_total";

/// Chain resolutions that ended at the synthetic provider.
///
/// Labels: `chain`.
pub const SYNTHETIC_FALLBACKS_TOTAL: &str = "tidewire_synthetic_fallbacks_total";

/// Chain resolutions answered from the last-known-good store.
///
/// Labels: `chain`.
pub const STALE_RESPONSES_TOTAL: &str = "tidewire_stale_responses_total";

/// Batch items currently executing.
pub const BATCH_IN_FLIGHT: &str = "tidewire_batch_in_flight";
