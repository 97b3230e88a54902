//! Circuit breaker state machine tests.
//!
//! All tests run on a paused clock so cooldowns elapse instantly.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use tidewire::resilience::{BreakerConfig, BreakerRegistry, CircuitBreaker, CircuitState};
use tidewire::{GatewayError, Result};

fn breaker(threshold: u32, cooldown_secs: u64) -> CircuitBreaker {
    CircuitBreaker::new(
        "test",
        BreakerConfig::new(threshold, Duration::from_secs(cooldown_secs)),
    )
}

async fn fail(breaker: &CircuitBreaker) -> Result<()> {
    breaker
        .call(|| async { Err::<(), _>(GatewayError::from_status(503, "down", None)) })
        .await
}

async fn succeed(breaker: &CircuitBreaker) -> Result<()> {
    breaker.call(|| async { Ok(()) }).await
}

/// Call through the breaker, counting how often the operation actually ran.
async fn counted(breaker: &CircuitBreaker, calls: &AtomicU32) -> Result<()> {
    breaker
        .call(|| async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .await
}

// ============================================================================
// Closed
// ============================================================================

#[tokio::test(start_paused = true)]
async fn starts_closed() {
    let breaker = breaker(3, 30);
    assert_eq!(breaker.state(), CircuitState::Closed);
    assert_eq!(breaker.consecutive_failures(), 0);
    assert!(breaker.last_failure_at().is_none());
}

#[tokio::test(start_paused = true)]
async fn failures_below_threshold_stay_closed() {
    let breaker = breaker(3, 30);
    fail(&breaker).await.unwrap_err();
    fail(&breaker).await.unwrap_err();
    assert_eq!(breaker.state(), CircuitState::Closed);
    assert_eq!(breaker.consecutive_failures(), 2);
    assert!(breaker.last_failure_at().is_some());
}

#[tokio::test(start_paused = true)]
async fn success_resets_failure_count() {
    let breaker = breaker(3, 30);
    fail(&breaker).await.unwrap_err();
    fail(&breaker).await.unwrap_err();
    succeed(&breaker).await.unwrap();
    assert_eq!(breaker.consecutive_failures(), 0);

    // Failures must be consecutive to trip.
    fail(&breaker).await.unwrap_err();
    fail(&breaker).await.unwrap_err();
    assert_eq!(breaker.state(), CircuitState::Closed);
}

#[tokio::test(start_paused = true)]
async fn client_errors_count_as_failures() {
    let breaker = breaker(2, 30);
    for _ in 0..2 {
        breaker
            .call(|| async { Err::<(), _>(GatewayError::from_status(404, "gone", None)) })
            .await
            .unwrap_err();
    }
    assert_eq!(breaker.state(), CircuitState::Open);
}

// ============================================================================
// Open
// ============================================================================

#[tokio::test(start_paused = true)]
async fn trips_at_threshold_and_rejects_without_calling() {
    let breaker = breaker(3, 30);
    for _ in 0..3 {
        fail(&breaker).await.unwrap_err();
    }
    assert_eq!(breaker.state(), CircuitState::Open);

    let calls = AtomicU32::new(0);
    let err = counted(&breaker, &calls).await.unwrap_err();
    assert!(matches!(err, GatewayError::CircuitOpen { ref service } if service == "test"));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn stays_open_until_cooldown_elapses() {
    let breaker = breaker(3, 30);
    for _ in 0..3 {
        fail(&breaker).await.unwrap_err();
    }

    tokio::time::advance(Duration::from_secs(29)).await;
    let calls = AtomicU32::new(0);
    assert!(counted(&breaker, &calls).await.is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    // Reading the state after the cooldown does not transition.
    tokio::time::advance(Duration::from_secs(1)).await;
    assert_eq!(breaker.state(), CircuitState::Open);

    counted(&breaker, &calls).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

// ============================================================================
// Half-open
// ============================================================================

#[tokio::test(start_paused = true)]
async fn successful_trial_closes_circuit() {
    let breaker = breaker(3, 30);
    for _ in 0..3 {
        fail(&breaker).await.unwrap_err();
    }
    tokio::time::advance(Duration::from_secs(30)).await;

    succeed(&breaker).await.unwrap();
    assert_eq!(breaker.state(), CircuitState::Closed);
    assert_eq!(breaker.consecutive_failures(), 0);
}

#[tokio::test(start_paused = true)]
async fn failed_trial_reopens_and_restarts_cooldown() {
    let breaker = breaker(3, 30);
    for _ in 0..3 {
        fail(&breaker).await.unwrap_err();
    }
    tokio::time::advance(Duration::from_secs(30)).await;

    let err = fail(&breaker).await.unwrap_err();
    // The trial ran and failed with the real error, not CircuitOpen.
    assert!(matches!(err, GatewayError::HttpServer { .. }));
    assert_eq!(breaker.state(), CircuitState::Open);

    tokio::time::advance(Duration::from_secs(29)).await;
    let calls = AtomicU32::new(0);
    assert!(counted(&breaker, &calls).await.is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    tokio::time::advance(Duration::from_secs(1)).await;
    counted(&breaker, &calls).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(breaker.state(), CircuitState::Closed);
}

#[tokio::test(start_paused = true)]
async fn only_one_trial_in_flight() {
    let breaker = breaker(1, 10);
    fail(&breaker).await.unwrap_err();
    tokio::time::advance(Duration::from_secs(10)).await;

    let calls = AtomicU32::new(0);
    let trial = breaker.call(|| async {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(())
    });
    // join! polls the trial first, so it holds the half-open slot.
    let (trial, concurrent) = tokio::join!(trial, counted(&breaker, &calls));

    trial.unwrap();
    assert!(matches!(concurrent, Err(GatewayError::CircuitOpen { .. })));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(breaker.state(), CircuitState::Closed);
}

#[tokio::test(start_paused = true)]
async fn dropped_permit_frees_trial_slot() {
    let breaker = breaker(1, 10);
    fail(&breaker).await.unwrap_err();
    tokio::time::advance(Duration::from_secs(10)).await;

    let permit = breaker.acquire().unwrap();
    assert!(permit.is_trial());
    assert_eq!(breaker.state(), CircuitState::HalfOpen);
    assert!(breaker.acquire().is_err());
    drop(permit);

    // Slot released without recording an outcome.
    assert_eq!(breaker.state(), CircuitState::HalfOpen);
    let permit = breaker.acquire().unwrap();
    permit.succeed();
    assert_eq!(breaker.state(), CircuitState::Closed);
}

#[tokio::test(start_paused = true)]
async fn late_success_does_not_close_open_circuit() {
    let breaker = breaker(1, 30);

    // Started while closed, finishes after another call tripped the breaker.
    let slow = breaker.acquire().unwrap();
    let fast = breaker.acquire().unwrap();
    fast.fail();
    assert_eq!(breaker.state(), CircuitState::Open);

    slow.succeed();
    assert_eq!(breaker.state(), CircuitState::Open);
    assert_eq!(breaker.consecutive_failures(), 1);
    assert!(matches!(
        breaker.acquire(),
        Err(GatewayError::CircuitOpen { .. })
    ));

    // The cooldown and the trial still decide recovery.
    tokio::time::advance(Duration::from_secs(30)).await;
    let trial = breaker.acquire().unwrap();
    assert!(trial.is_trial());
    trial.succeed();
    assert_eq!(breaker.state(), CircuitState::Closed);
}

#[tokio::test(start_paused = true)]
async fn late_failure_does_not_decide_the_trial() {
    let breaker = breaker(2, 30);

    let slow = breaker.acquire().unwrap();
    fail(&breaker).await.unwrap_err();
    fail(&breaker).await.unwrap_err();
    assert_eq!(breaker.state(), CircuitState::Open);
    tokio::time::advance(Duration::from_secs(30)).await;

    let trial = breaker.acquire().unwrap();
    assert!(trial.is_trial());
    assert!(!slow.is_trial());

    slow.fail();
    assert_eq!(breaker.state(), CircuitState::HalfOpen);
    assert_eq!(breaker.consecutive_failures(), 2);

    trial.succeed();
    assert_eq!(breaker.state(), CircuitState::Closed);
    assert_eq!(breaker.consecutive_failures(), 0);
}

#[tokio::test(start_paused = true)]
async fn late_success_during_trial_is_ignored() {
    let breaker = breaker(1, 30);

    let slow = breaker.acquire().unwrap();
    fail(&breaker).await.unwrap_err();
    tokio::time::advance(Duration::from_secs(30)).await;

    let trial = breaker.acquire().unwrap();
    slow.succeed();
    assert_eq!(breaker.state(), CircuitState::HalfOpen);

    trial.fail();
    assert_eq!(breaker.state(), CircuitState::Open);
}

// ============================================================================
// Reset and snapshots
// ============================================================================

#[tokio::test(start_paused = true)]
async fn reset_closes_open_breaker() {
    let breaker = breaker(1, 3600);
    fail(&breaker).await.unwrap_err();
    assert_eq!(breaker.state(), CircuitState::Open);

    breaker.reset();
    assert_eq!(breaker.state(), CircuitState::Closed);
    assert_eq!(breaker.consecutive_failures(), 0);
    succeed(&breaker).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn snapshot_reports_settings() {
    let breaker = CircuitBreaker::for_service("vessel-tracking");
    fail(&breaker).await.unwrap_err();

    let snapshot = breaker.snapshot();
    assert_eq!(snapshot.service, "vessel-tracking");
    assert_eq!(snapshot.state, CircuitState::Closed);
    assert_eq!(snapshot.consecutive_failures, 1);
    assert_eq!(snapshot.threshold, 3);
    assert_eq!(snapshot.cooldown_ms, 30_000);
}

#[test]
fn threshold_is_at_least_one() {
    assert_eq!(BreakerConfig::new(0, Duration::ZERO).failure_threshold, 1);
}

#[test]
fn service_defaults() {
    let cases = [
        ("vessel-tracking", 3, 30),
        ("weather", 5, 60),
        ("tile-imagery", 10, 30),
        ("analysis", 3, 120),
        ("something-else", 5, 60),
    ];
    for (service, threshold, cooldown) in cases {
        let config = BreakerConfig::for_service(service);
        assert_eq!(config.failure_threshold, threshold, "{service}");
        assert_eq!(config.cooldown, Duration::from_secs(cooldown), "{service}");
    }
}

// ============================================================================
// Registry
// ============================================================================

#[test]
fn registry_shares_breakers_by_name() {
    let registry = BreakerRegistry::new();
    let a = registry.service("weather");
    let b = registry.service("weather");
    assert!(std::sync::Arc::ptr_eq(&a, &b));

    let other = registry.breaker("primary", "weather");
    assert!(!std::sync::Arc::ptr_eq(&a, &other));
}

#[test]
fn registry_override_precedence() {
    let mut overrides = BTreeMap::new();
    overrides.insert(
        "weather".to_string(),
        BreakerConfig::new(2, Duration::from_secs(5)),
    );
    overrides.insert(
        "primary".to_string(),
        BreakerConfig::new(7, Duration::from_secs(9)),
    );
    let registry = BreakerRegistry::with_overrides(overrides);

    // Own name wins over service.
    assert_eq!(registry.config_for("primary", "weather").failure_threshold, 7);
    // Service override wins over built-in defaults.
    assert_eq!(registry.config_for("secondary", "weather").failure_threshold, 2);
    // Built-in defaults otherwise.
    assert_eq!(
        registry.config_for("ais", "vessel-tracking").failure_threshold,
        3
    );
}

#[tokio::test(start_paused = true)]
async fn registry_snapshot_and_reset_all() {
    let registry = BreakerRegistry::new();
    let weather = registry.service("weather");
    let ais = registry.breaker("ais", "vessel-tracking");
    for _ in 0..3 {
        fail(&ais).await.unwrap_err();
    }
    fail(&weather).await.unwrap_err();

    let snapshot = registry.snapshot();
    let names: Vec<_> = snapshot.iter().map(|s| s.service.as_str()).collect();
    assert_eq!(names, ["ais", "weather"]);
    assert_eq!(snapshot[0].state, CircuitState::Open);
    assert_eq!(snapshot[1].consecutive_failures, 1);

    registry.reset_all();
    assert_eq!(ais.state(), CircuitState::Closed);
    assert_eq!(weather.consecutive_failures(), 0);
}
