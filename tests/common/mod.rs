//! Shared test helpers: an in-process transport scripted per host.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tidewire::Result;
use tidewire::transport::{HttpResponse, HttpTransport, RequestDescriptor};

/// What a scripted host answers.
#[derive(Debug, Clone)]
pub enum Reply {
    /// 200 with this body.
    Json(String),
    /// This status with a short error body.
    Status(u16),
    /// Never answers (within any sane timeout).
    Hang,
    /// 200 with this body after `delay`.
    Delayed(Duration, String),
    /// After `delay`, 200 with `{"sstC": <lat>}` taken from the `lat` query
    /// parameter. With `fail_odd`, odd integer latitudes get a 500 instead.
    EchoLat { delay: Duration, fail_odd: bool },
}

impl Reply {
    pub fn json(body: &str) -> Self {
        Reply::Json(body.to_string())
    }
}

/// Transport that routes by URL host and counts calls.
///
/// Unrouted hosts answer 404.
#[derive(Default)]
pub struct ScriptedTransport {
    routes: Mutex<HashMap<String, Reply>>,
    calls: Mutex<HashMap<String, u32>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn route(&self, host: &str, reply: Reply) {
        self.routes.lock().unwrap().insert(host.to_string(), reply);
    }

    pub fn calls(&self, host: &str) -> u32 {
        self.calls.lock().unwrap().get(host).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> u32 {
        self.calls.lock().unwrap().values().sum()
    }

    /// Most sends observed running at once.
    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn send(&self, request: &RequestDescriptor) -> Result<HttpResponse> {
        let host = host(&request.target).to_string();
        *self.calls.lock().unwrap().entry(host.clone()).or_default() += 1;
        let reply = self
            .routes
            .lock()
            .unwrap()
            .get(&host)
            .cloned()
            .unwrap_or(Reply::Status(404));

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        match reply {
            Reply::Json(body) => Ok(HttpResponse::ok(body)),
            Reply::Status(status) => Ok(HttpResponse::new(status, "scripted failure")),
            Reply::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(HttpResponse::ok("{}"))
            }
            Reply::Delayed(delay, body) => {
                tokio::time::sleep(delay).await;
                Ok(HttpResponse::ok(body))
            }
            Reply::EchoLat { delay, fail_odd } => {
                tokio::time::sleep(delay).await;
                let lat = query_param(&request.target, "lat").unwrap_or(0.0);
                if fail_odd && (lat as i64) % 2 != 0 {
                    return Ok(HttpResponse::new(500, "odd latitude"));
                }
                Ok(HttpResponse::ok(format!(r#"{{"sstC":{lat}}}"#)))
            }
        }
    }
}

fn host(url: &str) -> &str {
    let rest = url.split_once("://").map_or(url, |(_, rest)| rest);
    rest.split(['/', '?']).next().unwrap_or(rest)
}

fn query_param(url: &str, name: &str) -> Option<f64> {
    let (_, query) = url.split_once('?')?;
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| *key == name)
        .and_then(|(_, value)| value.parse().ok())
}
