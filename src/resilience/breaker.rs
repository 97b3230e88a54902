//! Per-service circuit breakers.
//!
//! # States
//!
//! ```text
//!            threshold consecutive failures
//!   Closed ─────────────────────────────────▶ Open
//!     ▲                                        │ cooldown elapsed,
//!     │ trial succeeds                         │ next call
//!     │                                        ▼
//!     └──────────────────────────────────── HalfOpen
//!                trial fails: back to Open, cooldown restarts
//! ```
//!
//! - **Closed**: calls pass through; each failure bumps the consecutive
//!   failure count, any success resets it.
//! - **Open**: calls fail with [`GatewayError::CircuitOpen`] without running
//!   the wrapped operation until the cooldown since the last failure has
//!   elapsed.
//! - **HalfOpen**: exactly one trial call runs; concurrent callers are
//!   rejected as if the circuit were open.
//!
//! Only the trial's outcome moves a half-open breaker. Calls that were
//! already running when the circuit opened never close it.
//!
//! All state lives behind one mutex per breaker and the mutex is never held
//! across an await point. Time is read from [`tokio::time::Instant`] so
//! tests can drive cooldowns on a paused clock.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::telemetry;
use crate::{GatewayError, Result};

/// Built-in breaker settings per service: (name, threshold, cooldown secs).
pub const SERVICE_DEFAULTS: &[(&str, u32, u64)] = &[
    ("vessel-tracking", 3, 30),
    ("weather", 5, 60),
    ("tile-imagery", 10, 30),
    ("analysis", 3, 120),
];

/// Observable breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    fn label(self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

/// Breaker threshold and cooldown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerConfig {
    /// Consecutive failures that trip the breaker.
    pub failure_threshold: u32,
    /// Time after the last failure before a trial call is allowed.
    pub cooldown: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown: Duration::from_secs(60),
        }
    }
}

impl BreakerConfig {
    pub fn new(failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            failure_threshold: failure_threshold.max(1),
            cooldown,
        }
    }

    /// Built-in settings for a known service, or the default (5 / 60s).
    pub fn for_service(service: &str) -> Self {
        SERVICE_DEFAULTS
            .iter()
            .find(|(name, _, _)| *name == service)
            .map(|(_, threshold, cooldown)| Self::new(*threshold, Duration::from_secs(*cooldown)))
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy)]
enum Phase {
    Closed,
    Open { since: Instant },
    HalfOpen { trial_in_flight: bool },
}

impl Phase {
    fn state(self) -> CircuitState {
        match self {
            Phase::Closed => CircuitState::Closed,
            Phase::Open { .. } => CircuitState::Open,
            Phase::HalfOpen { .. } => CircuitState::HalfOpen,
        }
    }
}

#[derive(Debug)]
struct Inner {
    phase: Phase,
    consecutive_failures: u32,
    last_failure_at: Option<Instant>,
}

impl Default for Inner {
    fn default() -> Self {
        Self {
            phase: Phase::Closed,
            consecutive_failures: 0,
            last_failure_at: None,
        }
    }
}

/// Point-in-time view of one breaker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BreakerSnapshot {
    pub service: String,
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub threshold: u32,
    pub cooldown_ms: u64,
}

/// Thread-safe circuit breaker for one downstream service.
#[derive(Debug)]
pub struct CircuitBreaker {
    service: String,
    config: BreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(service: impl Into<String>, config: BreakerConfig) -> Self {
        Self {
            service: service.into(),
            config,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Breaker seeded with the built-in settings for `service`.
    pub fn for_service(service: impl Into<String>) -> Self {
        let service = service.into();
        let config = BreakerConfig::for_service(&service);
        Self::new(service, config)
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn config(&self) -> BreakerConfig {
        self.config
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current state. Reading never transitions; an open breaker whose
    /// cooldown has elapsed reports `Open` until the next call.
    pub fn state(&self) -> CircuitState {
        self.lock().phase.state()
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.lock().consecutive_failures
    }

    pub fn last_failure_at(&self) -> Option<Instant> {
        self.lock().last_failure_at
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.lock();
        BreakerSnapshot {
            service: self.service.clone(),
            state: inner.phase.state(),
            consecutive_failures: inner.consecutive_failures,
            threshold: self.config.failure_threshold,
            cooldown_ms: self.config.cooldown.as_millis() as u64,
        }
    }

    /// Run `f` under the breaker.
    ///
    /// Fails with [`GatewayError::CircuitOpen`] without calling `f` while
    /// the circuit is open or a half-open trial is already running.
    pub async fn call<F, Fut, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let permit = self.acquire()?;
        match f().await {
            Ok(value) => {
                permit.succeed();
                Ok(value)
            }
            Err(e) => {
                permit.fail();
                Err(e)
            }
        }
    }

    /// Ask to run one call. The returned permit must be settled with
    /// [`Permit::succeed`] or [`Permit::fail`]; dropping it unsettled
    /// releases a half-open trial slot without recording an outcome.
    pub fn acquire(&self) -> Result<Permit<'_>> {
        let mut inner = self.lock();
        let trial = match inner.phase {
            Phase::Closed => false,
            Phase::HalfOpen {
                trial_in_flight: false,
            } => {
                inner.phase = Phase::HalfOpen {
                    trial_in_flight: true,
                };
                true
            }
            Phase::Open { since } if since.elapsed() >= self.config.cooldown => {
                self.transition(&mut inner, Phase::HalfOpen {
                    trial_in_flight: true,
                });
                true
            }
            Phase::Open { .. }
            | Phase::HalfOpen {
                trial_in_flight: true,
            } => {
                metrics::counter!(telemetry::BREAKER_REJECTIONS_TOTAL,
                    "service" => self.service.clone(),
                )
                .increment(1);
                return Err(GatewayError::CircuitOpen {
                    service: self.service.clone(),
                });
            }
        };
        Ok(Permit {
            breaker: self,
            trial,
            settled: false,
        })
    }

    /// Record a success from a call that was not the half-open trial.
    ///
    /// Resets the failure count while closed; ignored while open or
    /// half-open, where only the trial decides the outcome.
    pub fn record_success(&self) {
        self.settle(false, true);
    }

    /// Record a failure from a call that was not the half-open trial.
    ///
    /// Opens the circuit on reaching the threshold while closed. While open
    /// it restarts the cooldown; while half-open it only notes the time.
    pub fn record_failure(&self) {
        self.settle(false, false);
    }

    fn settle(&self, trial: bool, success: bool) {
        let mut inner = self.lock();
        let half_open = matches!(inner.phase, Phase::HalfOpen { .. });
        if success {
            match inner.phase {
                Phase::Closed => inner.consecutive_failures = 0,
                Phase::HalfOpen { .. } if trial => {
                    inner.consecutive_failures = 0;
                    self.transition(&mut inner, Phase::Closed);
                }
                Phase::Open { .. } | Phase::HalfOpen { .. } => {}
            }
            return;
        }

        let now = Instant::now();
        inner.last_failure_at = Some(now);
        if half_open && !trial {
            return;
        }
        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
        match inner.phase {
            Phase::Closed if inner.consecutive_failures >= self.config.failure_threshold => {
                self.transition(&mut inner, Phase::Open { since: now });
            }
            Phase::HalfOpen { .. } => {
                self.transition(&mut inner, Phase::Open { since: now });
            }
            Phase::Open { .. } => {
                // Started before the trip.
                inner.phase = Phase::Open { since: now };
            }
            Phase::Closed => {}
        }
    }

    /// Force the breaker closed with zero failures.
    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.consecutive_failures = 0;
        inner.last_failure_at = None;
        if !matches!(inner.phase, Phase::Closed) {
            self.transition(&mut inner, Phase::Closed);
        }
    }

    fn release_trial(&self) {
        let mut inner = self.lock();
        if let Phase::HalfOpen {
            trial_in_flight: true,
        } = inner.phase
        {
            inner.phase = Phase::HalfOpen {
                trial_in_flight: false,
            };
        }
    }

    fn transition(&self, inner: &mut Inner, to: Phase) {
        let from = inner.phase.state();
        inner.phase = to;
        let to = to.state();
        if from == to {
            return;
        }
        metrics::counter!(telemetry::BREAKER_TRANSITIONS_TOTAL,
            "service" => self.service.clone(),
            "to" => to.label(),
        )
        .increment(1);
        match to {
            CircuitState::Open => warn!(
                service = %self.service,
                from = from.label(),
                consecutive_failures = inner.consecutive_failures,
                cooldown_ms = self.config.cooldown.as_millis() as u64,
                "circuit opened"
            ),
            _ => info!(
                service = %self.service,
                from = from.label(),
                to = to.label(),
                "circuit state changed"
            ),
        }
    }
}

/// Permission to run one call through a breaker.
#[must_use = "settle the permit with succeed() or fail()"]
pub struct Permit<'a> {
    breaker: &'a CircuitBreaker,
    trial: bool,
    settled: bool,
}

impl Permit<'_> {
    /// Whether this permit is the half-open trial call.
    pub fn is_trial(&self) -> bool {
        self.trial
    }

    pub fn succeed(mut self) {
        self.settled = true;
        self.breaker.settle(self.trial, true);
    }

    pub fn fail(mut self) {
        self.settled = true;
        self.breaker.settle(self.trial, false);
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        if !self.settled && self.trial {
            self.breaker.release_trial();
        }
    }
}

// ============================================================================
// BreakerRegistry
// ============================================================================

/// Process-wide set of breakers, one per name.
///
/// Settings resolve in order: an override for the breaker's own name, an
/// override for its service, the built-in service defaults.
#[derive(Debug, Default)]
pub struct BreakerRegistry {
    overrides: BTreeMap<String, BreakerConfig>,
    breakers: Mutex<HashMap<String, Arc<CircuitBreaker>>>,
}

impl BreakerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_overrides(overrides: BTreeMap<String, BreakerConfig>) -> Self {
        Self {
            overrides,
            breakers: Mutex::new(HashMap::new()),
        }
    }

    /// Settings a breaker named `name` in `service` would get.
    pub fn config_for(&self, name: &str, service: &str) -> BreakerConfig {
        self.overrides
            .get(name)
            .or_else(|| self.overrides.get(service))
            .copied()
            .unwrap_or_else(|| BreakerConfig::for_service(service))
    }

    /// Get or create the breaker for `name`.
    pub fn breaker(&self, name: &str, service: &str) -> Arc<CircuitBreaker> {
        let mut breakers = self.breakers.lock().unwrap_or_else(PoisonError::into_inner);
        breakers
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(name, self.config_for(name, service))))
            .clone()
    }

    /// Get or create the breaker for a service addressed by its own name.
    pub fn service(&self, service: &str) -> Arc<CircuitBreaker> {
        self.breaker(service, service)
    }

    /// Snapshots of every breaker, sorted by name.
    pub fn snapshot(&self) -> Vec<BreakerSnapshot> {
        let breakers = self.breakers.lock().unwrap_or_else(PoisonError::into_inner);
        let mut snapshots: Vec<_> = breakers.values().map(|b| b.snapshot()).collect();
        snapshots.sort_by(|a, b| a.service.cmp(&b.service));
        snapshots
    }

    /// Force every breaker closed.
    pub fn reset_all(&self) {
        let breakers = self.breakers.lock().unwrap_or_else(PoisonError::into_inner);
        for breaker in breakers.values() {
            breaker.reset();
        }
    }
}
