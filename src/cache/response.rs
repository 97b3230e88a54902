//! Bounded in-memory response cache.
//!
//! [`ResponseCache`] is an LRU + TTL store keyed by [`Fingerprint`]. Each
//! entry carries its own TTL, so callers can cache short-lived and
//! long-lived responses side by side.
//!
//! # Semantics
//!
//! - `get` is a lazy-expiry read: an entry past its TTL is a miss and is
//!   dropped from the store.
//! - `set` inserts or replaces. When the store is full, the least recently
//!   read or written entry is evicted; capacity is enforced before `set`
//!   returns.
//! - A background sweep (started when a tokio runtime is available) and
//!   sweep-on-write both remove expired entries, bounding memory even when
//!   nothing is read.
//! - Values are cloned out; callers never hold a reference into the store.
//!
//! # Lifecycle
//!
//! The cache is an explicit object rather than global state. Construct one
//! per concern (the gateway keeps one for raw HTTP responses and one per
//! provider chain), call [`clear()`](ResponseCache::clear) in tests and
//! [`close()`](ResponseCache::close) to stop the sweep task. Dropping the
//! cache also stops the sweep.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use moka::Expiry;
use moka::notification::RemovalCause;
use moka::policy::EvictionPolicy;
use moka::sync::Cache;
use tokio::task::JoinHandle;
use tracing::debug;

use super::Fingerprint;
use crate::telemetry;

/// Configuration for a response cache.
///
/// ```rust
/// # use tidewire::CacheConfig;
/// # use std::time::Duration;
/// let config = CacheConfig::new()
///     .max_entries(500)
///     .ttl(Duration::from_secs(60));
/// ```
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of resident entries. Default: 100.
    pub max_entries: u64,
    /// Default time-to-live. Default: 5 minutes.
    pub ttl: Duration,
    /// Interval of the background expiry sweep. Default: 60s.
    /// `Duration::ZERO` disables the sweep task.
    pub sweep_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 100,
            ttl: Duration::from_secs(300),
            sweep_interval: Duration::from_secs(60),
        }
    }
}

impl CacheConfig {
    /// Create a new config with the stock defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of resident entries.
    pub fn max_entries(mut self, n: u64) -> Self {
        self.max_entries = n;
        self
    }

    /// Set the default time-to-live.
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Set the background sweep interval.
    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }
}

#[derive(Clone)]
struct Entry<V> {
    value: V,
    ttl: Duration,
    expires_at: Instant,
}

/// Expires each entry after its own TTL; overwrites restart the clock.
struct PerEntryTtl;

impl<V> Expiry<Fingerprint, Entry<V>> for PerEntryTtl {
    fn expire_after_create(
        &self,
        _key: &Fingerprint,
        value: &Entry<V>,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &Fingerprint,
        value: &Entry<V>,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// Deadline of every resident key.
///
/// moka retires expired entries on a coarse timer wheel, so expiry is also
/// tracked here and applied explicitly.
type Deadlines = Arc<Mutex<HashMap<Fingerprint, Instant>>>;

/// The moka store plus the deadlines that drive explicit expiry.
#[derive(Clone)]
struct Store<V> {
    entries: Cache<Fingerprint, Entry<V>>,
    deadlines: Deadlines,
}

impl<V> Store<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Drop `key` if its deadline has passed.
    fn evict_if_expired(&self, key: &Fingerprint, now: Instant) {
        let expired = {
            let mut deadlines = self.deadlines.lock().unwrap_or_else(PoisonError::into_inner);
            match deadlines.get(key) {
                Some(expires_at) if *expires_at <= now => {
                    deadlines.remove(key);
                    true
                }
                _ => false,
            }
        };
        if expired {
            self.entries.invalidate(key);
            self.entries.run_pending_tasks();
        }
    }

    /// Invalidate every entry whose deadline has passed.
    fn purge_expired(&self) {
        let now = Instant::now();
        let expired: Vec<Fingerprint> = {
            let mut deadlines = self.deadlines.lock().unwrap_or_else(PoisonError::into_inner);
            let expired = deadlines
                .iter()
                .filter(|(_, expires_at)| **expires_at <= now)
                .map(|(key, _)| key.clone())
                .collect::<Vec<_>>();
            for key in &expired {
                deadlines.remove(key);
            }
            expired
        };
        for key in &expired {
            self.entries.invalidate(key);
        }
        self.entries.run_pending_tasks();
    }
}

/// In-memory LRU + TTL cache.
pub struct ResponseCache<V> {
    name: String,
    store: Store<V>,
    config: CacheConfig,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl<V> ResponseCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Create a cache labelled `name` in metrics and logs.
    ///
    /// Starts the periodic sweep when called inside a tokio runtime.
    pub fn new(name: impl Into<String>, config: &CacheConfig) -> Self {
        let name = name.into();
        let label = name.clone();
        let deadlines: Deadlines = Arc::default();
        let listener_deadlines = deadlines.clone();
        let entries = Cache::<Fingerprint, Entry<V>>::builder()
            .max_capacity(config.max_entries)
            .eviction_policy(EvictionPolicy::lru())
            .expire_after(PerEntryTtl)
            .eviction_listener(move |key, value: Entry<V>, cause| {
                if !matches!(cause, RemovalCause::Replaced) {
                    let mut deadlines = listener_deadlines
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner);
                    // A newer write under the same key keeps its deadline.
                    if deadlines.get(&*key) == Some(&value.expires_at) {
                        deadlines.remove(&*key);
                    }
                }
                let cause = match cause {
                    RemovalCause::Expired => "expired",
                    RemovalCause::Size => "size",
                    RemovalCause::Explicit | RemovalCause::Replaced => return,
                };
                metrics::counter!(telemetry::CACHE_EVICTIONS_TOTAL,
                    "cache" => label.clone(),
                    "cause" => cause,
                )
                .increment(1);
            })
            .build();

        let store = Store { entries, deadlines };
        let sweeper = spawn_sweeper(store.clone(), config.sweep_interval);

        Self {
            name,
            store,
            config: config.clone(),
            sweeper: Mutex::new(sweeper),
        }
    }

    /// Cache name used in metric labels.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Default TTL configured for this cache.
    pub fn default_ttl(&self) -> Duration {
        self.config.ttl
    }

    /// Configured capacity.
    pub fn max_entries(&self) -> u64 {
        self.config.max_entries
    }

    /// Look up a live entry. Expired entries count as misses and are evicted.
    pub fn get(&self, key: &Fingerprint) -> Option<V> {
        let now = Instant::now();
        match self.store.entries.get(key).filter(|entry| entry.expires_at > now) {
            Some(entry) => {
                metrics::counter!(telemetry::CACHE_HITS_TOTAL, "cache" => self.name.clone())
                    .increment(1);
                debug!(cache = %self.name, key = %key, "cache hit");
                Some(entry.value)
            }
            None => {
                metrics::counter!(telemetry::CACHE_MISSES_TOTAL, "cache" => self.name.clone())
                    .increment(1);
                self.store.evict_if_expired(key, now);
                None
            }
        }
    }

    /// Insert or replace an entry with an explicit TTL.
    ///
    /// A zero TTL stores nothing. Capacity and expiry are enforced before
    /// this returns.
    pub fn set(&self, key: Fingerprint, value: V, ttl: Duration) {
        if ttl.is_zero() {
            return;
        }
        // Expired entries must not hold slots that LRU would free from live ones.
        self.store.purge_expired();
        let expires_at = Instant::now() + ttl;
        self.store
            .deadlines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.clone(), expires_at);
        self.store.entries.insert(key, Entry { value, ttl, expires_at });
        self.store.entries.run_pending_tasks();
    }

    /// Insert or replace an entry with the default TTL.
    pub fn set_default(&self, key: Fingerprint, value: V) {
        self.set(key, value, self.config.ttl);
    }

    /// Remove an entry. Returns whether anything was stored under `key`.
    pub fn delete(&self, key: &Fingerprint) -> bool {
        self.store
            .deadlines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        let removed = self.store.entries.remove(key).is_some();
        self.store.entries.run_pending_tasks();
        removed
    }

    /// Number of resident, unexpired entries.
    pub fn size(&self) -> u64 {
        self.store.purge_expired();
        self.store.entries.entry_count()
    }

    /// Whether the cache holds no live entries.
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Remove expired entries now.
    pub fn sweep(&self) {
        self.store.purge_expired();
    }

    /// Evict all entries.
    pub fn clear(&self) {
        self.store
            .deadlines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.store.entries.invalidate_all();
        self.store.entries.run_pending_tasks();
    }

    /// Stop the background sweep. Entries stay readable.
    pub fn close(&self) {
        let handle = self
            .sweeper
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            handle.abort();
            debug!(cache = %self.name, "cache sweep stopped");
        }
    }

    /// Whether the background sweep task is running.
    pub fn is_sweeping(&self) -> bool {
        self.sweeper
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl<V> Drop for ResponseCache<V> {
    fn drop(&mut self) {
        let handle = self
            .sweeper
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            handle.abort();
        }
    }
}

/// Spawn the periodic sweep if a runtime is available.
fn spawn_sweeper<V>(store: Store<V>, interval: Duration) -> Option<JoinHandle<()>>
where
    V: Clone + Send + Sync + 'static,
{
    if interval.is_zero() {
        return None;
    }
    let runtime = tokio::runtime::Handle::try_current().ok()?;
    Some(runtime.spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // First tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            store.purge_expired();
        }
    }))
}

/// Shared handle to a response cache.
pub type SharedCache<V> = Arc<ResponseCache<V>>;

#[cfg(test)]
mod tests {
    use super::*;

    fn key(s: &str) -> Fingerprint {
        Fingerprint::from_parts(&[s])
    }

    #[test]
    fn cache_config_defaults() {
        let config = CacheConfig::default();
        assert_eq!(config.max_entries, 100);
        assert_eq!(config.ttl, Duration::from_secs(300));
    }

    #[test]
    fn works_without_runtime() {
        let cache: ResponseCache<u32> = ResponseCache::new("test", &CacheConfig::default());
        assert!(!cache.is_sweeping());
        cache.set_default(key("a"), 1);
        assert_eq!(cache.get(&key("a")), Some(1));
    }

    #[test]
    fn zero_ttl_stores_nothing() {
        let cache: ResponseCache<u32> = ResponseCache::new("test", &CacheConfig::default());
        cache.set(key("a"), 1, Duration::ZERO);
        assert_eq!(cache.size(), 0);
    }

    #[tokio::test]
    async fn sweep_task_starts_and_stops() {
        let cache: ResponseCache<u32> = ResponseCache::new("test", &CacheConfig::default());
        assert!(cache.is_sweeping());
        cache.close();
        assert!(!cache.is_sweeping());
        // Still usable after close.
        cache.set_default(key("a"), 7);
        assert_eq!(cache.get(&key("a")), Some(7));
    }
}
