//! End-to-end gateway tests over a scripted transport.

mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::{Reply, ScriptedTransport};
use tidewire::transport::RequestDescriptor;
use tidewire::{
    CircuitState, ConditionsRequest, DataProvider, EmbeddedGateway, GatewayConfig, GatewayError,
    MarineConditions, Result, ResultStatus, Tidewire,
};

const CONFIG: &str = r#"
[request]
timeout_ms = 5000
max_retries = 2
base_delay_ms = 1000

[cache]
sweep_interval_ms = 0

[providers.primary]
url = "http://primary.example/point?lat={lat}&lon={lon}"
priority = 0

[providers.secondary]
url = "http://secondary.example/point?lat={lat}&lon={lon}"
priority = 1
"#;

fn gateway(transport: &Arc<ScriptedTransport>) -> EmbeddedGateway {
    Tidewire::builder()
        .config(GatewayConfig::from_toml_str(CONFIG).unwrap())
        .transport(transport.clone())
        .build()
        .unwrap()
}

fn point() -> ConditionsRequest {
    ConditionsRequest::new(25.7, -80.1).unwrap()
}

// ============================================================================
// Conditions
// ============================================================================

#[tokio::test(start_paused = true)]
async fn conditions_fall_back_and_record_sources() {
    let transport = ScriptedTransport::new();
    transport.route("primary.example", Reply::Hang);
    transport.route("secondary.example", Reply::json(r#"{"sstC": 24.3, "windKt": 12}"#));
    let gateway = gateway(&transport);

    let result = gateway.conditions(&point()).await;

    assert_eq!(result.provider_id, "secondary");
    assert_eq!(result.status, ResultStatus::Ok);
    assert_eq!(result.payload.sst_c, Some(24.3));
    assert_eq!(result.payload.wind_kt, Some(12.0));
    assert_eq!(result.payload.sources, result.sources);
    assert_eq!(result.payload.sources.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn conditions_are_cached() {
    let transport = ScriptedTransport::new();
    transport.route("primary.example", Reply::json(r#"{"sstC": 21.0}"#));
    let gateway = gateway(&transport);

    gateway.conditions(&point()).await;
    let second = gateway.conditions(&point()).await;

    assert!(second.from_cache);
    assert_eq!(transport.total_calls(), 1);

    gateway.clear_caches();
    let third = gateway.conditions(&point()).await;
    assert!(!third.from_cache);
    assert_eq!(transport.total_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn conditions_never_fail() {
    let transport = ScriptedTransport::new();
    let gateway = gateway(&transport);

    // Every host answers 404.
    let result = gateway.conditions(&point()).await;
    assert_eq!(result.provider_id, "mock");
    assert!(result.payload.sst_c.is_some());
    assert_eq!(result.payload.sources.last().unwrap().id, "mock");
}

#[tokio::test(start_paused = true)]
async fn conditions_live_fails_when_nothing_is_live() {
    let transport = ScriptedTransport::new();
    let gateway = gateway(&transport);

    let err = gateway.conditions_live(&point()).await.unwrap_err();
    assert!(matches!(err, GatewayError::AllProvidersExhausted));
}

#[tokio::test(start_paused = true)]
async fn batch_respects_cap_and_order() {
    let transport = ScriptedTransport::new();
    transport.route(
        "primary.example",
        Reply::EchoLat {
            delay: Duration::from_millis(100),
            fail_odd: true,
        },
    );
    transport.route("secondary.example", Reply::Status(503));
    // Keep the primary breaker closed while odd points fail.
    let config = format!("{CONFIG}\n[breakers.primary]\nthreshold = 100\ncooldown_ms = 1000\n");
    let gateway = Tidewire::builder()
        .config(GatewayConfig::from_toml_str(&config).unwrap())
        .transport(transport.clone())
        .max_concurrent(4)
        .build()
        .unwrap();

    let points: Vec<_> = (0..20)
        .map(|lat| ConditionsRequest::new(f64::from(lat), 0.0).unwrap())
        .collect();
    let results = gateway.conditions_batch(points).await;

    assert_eq!(results.len(), 20);
    assert_eq!(transport.peak_in_flight(), 4);
    for (lat, result) in results.iter().enumerate() {
        if lat % 2 == 0 {
            assert_eq!(result.provider_id, "primary", "lat {lat}");
            assert_eq!(result.payload.sst_c, Some(lat as f64));
        } else {
            assert_eq!(result.provider_id, "mock", "lat {lat}");
        }
    }
}

#[tokio::test(start_paused = true)]
async fn newer_view_request_supersedes_older() {
    let transport = ScriptedTransport::new();
    transport.route(
        "primary.example",
        Reply::Delayed(Duration::from_secs(2), r#"{"sstC": 19.5}"#.to_string()),
    );
    let gateway = gateway(&transport);
    let pan_from = ConditionsRequest::new(10.0, 10.0).unwrap();
    let pan_to = ConditionsRequest::new(11.0, 11.0).unwrap();

    let (older, newer) = tokio::join!(
        gateway.conditions_for_view("chart", &pan_from),
        gateway.conditions_for_view("chart", &pan_to),
    );

    assert!(older.is_none());
    assert_eq!(newer.unwrap().payload.sst_c, Some(19.5));
}

struct Buoy;

#[async_trait]
impl DataProvider<ConditionsRequest, MarineConditions> for Buoy {
    fn id(&self) -> &str {
        "buoy"
    }

    async fn fetch(&self, _request: &ConditionsRequest) -> Result<MarineConditions> {
        Ok(MarineConditions {
            sst_c: Some(27.0),
            ..Default::default()
        })
    }
}

#[tokio::test(start_paused = true)]
async fn extra_provider_joins_by_priority() {
    let transport = ScriptedTransport::new();
    transport.route("primary.example", Reply::json(r#"{"sstC": 21.0}"#));
    let gateway = Tidewire::builder()
        .config(GatewayConfig::from_toml_str(CONFIG).unwrap())
        .transport(transport.clone())
        .conditions_provider(Arc::new(Buoy), "weather", -1)
        .build()
        .unwrap();

    assert_eq!(
        gateway.conditions_chain().provider_ids(),
        ["buoy", "primary", "secondary"]
    );
    let result = gateway.conditions(&point()).await;
    assert_eq!(result.provider_id, "buoy");
    assert_eq!(transport.total_calls(), 0);
}

// ============================================================================
// Raw fetch
// ============================================================================

#[tokio::test(start_paused = true)]
async fn fetch_caches_get_responses() {
    let transport = ScriptedTransport::new();
    transport.route("ais.example", Reply::json(r#"[{"mmsi":1}]"#));
    let gateway = gateway(&transport);
    let request = gateway.request("http://ais.example/v1/vessels");

    let first = gateway.fetch(&request, "vessel-tracking").await.unwrap();
    let second = gateway.fetch(&request, "vessel-tracking").await.unwrap();

    assert_eq!(first, second);
    assert_eq!(transport.calls("ais.example"), 1);
    assert_eq!(gateway.http_cache().size(), 1);
}

#[tokio::test(start_paused = true)]
async fn fetch_does_not_cache_post() {
    let transport = ScriptedTransport::new();
    transport.route("analysis.example", Reply::json(r#"{"job":7}"#));
    let gateway = gateway(&transport);
    let request = RequestDescriptor::post("http://analysis.example/run", "{}");

    gateway.fetch(&request, "analysis").await.unwrap();
    gateway.fetch(&request, "analysis").await.unwrap();

    assert_eq!(transport.calls("analysis.example"), 2);
    assert!(gateway.http_cache().is_empty());
}

#[tokio::test(start_paused = true)]
async fn fetch_fallback_value_answers_failure() {
    let transport = ScriptedTransport::new();
    transport.route("ais.example", Reply::Status(500));
    let gateway = gateway(&transport);
    let request = gateway
        .request("http://ais.example/v1/vessels")
        .with_fallback_value("[]");

    let response = gateway.fetch(&request, "vessel-tracking").await.unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(response.body, "[]");
    assert_eq!(transport.calls("ais.example"), 3);
    assert!(gateway.http_cache().is_empty());
    assert_eq!(gateway.retry_stats().fallbacks, 1);
    // The failure still counts against the breaker.
    assert_eq!(
        gateway.breakers().service("vessel-tracking").consecutive_failures(),
        1
    );
}

#[tokio::test(start_paused = true)]
async fn fetch_without_fallback_returns_error() {
    let transport = ScriptedTransport::new();
    transport.route("ais.example", Reply::Status(404));
    let gateway = gateway(&transport);
    let request = gateway.request("http://ais.example/v1/vessels/9");

    let err = gateway.fetch(&request, "vessel-tracking").await.unwrap_err();
    assert!(matches!(err, GatewayError::HttpClient { status: 404, .. }));
    assert_eq!(transport.calls("ais.example"), 1);
}

#[tokio::test(start_paused = true)]
async fn fetch_rejected_while_breaker_open() {
    let transport = ScriptedTransport::new();
    transport.route("ais.example", Reply::Status(503));
    let gateway = gateway(&transport);
    let request = gateway
        .request("http://ais.example/v1/vessels")
        .with_max_retries(0);

    // vessel-tracking trips after three consecutive failures.
    for _ in 0..3 {
        gateway.fetch(&request, "vessel-tracking").await.unwrap_err();
    }
    let err = gateway.fetch(&request, "vessel-tracking").await.unwrap_err();

    assert!(matches!(err, GatewayError::CircuitOpen { .. }));
    assert_eq!(transport.calls("ais.example"), 3);

    // An open breaker still honours the fallback value.
    let with_fallback = request.clone().with_fallback_value("[]");
    let response = gateway.fetch(&with_fallback, "vessel-tracking").await.unwrap();
    assert_eq!(response.body, "[]");
    assert_eq!(transport.calls("ais.example"), 3);
}

// ============================================================================
// Builder and lifecycle
// ============================================================================

#[tokio::test]
async fn request_carries_configured_defaults() {
    let transport = ScriptedTransport::new();
    let gateway = gateway(&transport);
    let request = gateway.request("http://x.example/");
    assert_eq!(request.timeout, Duration::from_millis(5000));
    assert_eq!(request.max_retries, 2);
    assert_eq!(request.ttl, Duration::from_secs(300));
}

#[tokio::test]
async fn breakers_exist_per_provider() {
    let transport = ScriptedTransport::new();
    let gateway = gateway(&transport);
    let snapshot = gateway.breaker_snapshot();
    let names: Vec<_> = snapshot.iter().map(|s| s.service.as_str()).collect();
    assert_eq!(names, ["primary", "secondary"]);
    assert!(snapshot.iter().all(|s| s.state == CircuitState::Closed));
    // Configured providers default to the weather service settings.
    assert_eq!(snapshot[0].threshold, 5);
}

#[test]
fn builder_rejects_bad_provider_url() {
    let mut config = GatewayConfig::default();
    config.providers.insert(
        "broken".to_string(),
        toml::from_str(r#"url = "http://x.example/no-placeholders""#).unwrap(),
    );
    let err = Tidewire::builder()
        .config(config)
        .transport(ScriptedTransport::new())
        .build()
        .unwrap_err();
    assert!(matches!(err, GatewayError::Configuration(_)));
}

#[tokio::test]
async fn debug_output_names_providers() {
    let transport = ScriptedTransport::new();
    let gateway = gateway(&transport);
    let debug = format!("{gateway:?}");
    assert!(debug.starts_with("EmbeddedGateway"));
    assert!(debug.contains("primary"));
    assert!(debug.contains("secondary"));
}

#[tokio::test]
async fn close_stops_background_sweeps() {
    let transport = ScriptedTransport::new();
    let gateway = Tidewire::builder()
        .transport(transport.clone())
        .build()
        .unwrap();

    assert!(gateway.http_cache().is_sweeping());
    gateway.close();
    assert!(!gateway.http_cache().is_sweeping());
    assert!(!gateway.conditions_chain().cache().unwrap().is_sweeping());
}
