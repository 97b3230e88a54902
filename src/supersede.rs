//! Cooperative cancellation of superseded requests.
//!
//! When a newer request for the same key arrives (a view panned before the
//! previous fetch finished), the older one is aborted at its next await
//! point and quietly resolves to `None`. No error reaches the caller.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use futures_util::future::{AbortHandle, Abortable, Aborted};
use tracing::debug;

/// Tracks the latest in-flight future per key.
#[derive(Debug, Default)]
pub struct SupersedeTracker {
    generation: AtomicU64,
    in_flight: Mutex<HashMap<String, (u64, AbortHandle)>>,
}

impl SupersedeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `fut` as the current request for `key`, aborting any earlier one.
    ///
    /// Returns `None` if a later call for the same key superseded this one
    /// (or [`cancel`](Self::cancel) was called) before it finished.
    pub async fn run<F: Future>(&self, key: &str, fut: F) -> Option<F::Output> {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let (handle, registration) = AbortHandle::new_pair();

        let previous = self
            .lock()
            .insert(key.to_string(), (generation, handle));
        if let Some((_, previous)) = previous {
            debug!(key, "superseding in-flight request");
            previous.abort();
        }

        let _registered = Registered {
            tracker: self,
            key,
            generation,
        };
        match Abortable::new(fut, registration).await {
            Ok(output) => Some(output),
            Err(Aborted) => {
                debug!(key, "superseded request discarded");
                None
            }
        }
    }

    /// Abort the in-flight request for `key`, if any.
    pub fn cancel(&self, key: &str) -> bool {
        match self.lock().remove(key) {
            Some((_, handle)) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    /// Number of keys with a request in flight.
    pub fn in_flight(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, (u64, AbortHandle)>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Removes a request's registration when it finishes or is dropped.
struct Registered<'a> {
    tracker: &'a SupersedeTracker,
    key: &'a str,
    generation: u64,
}

impl Drop for Registered<'_> {
    fn drop(&mut self) {
        // Only the newest request for a key owns the registration.
        let mut in_flight = self.tracker.lock();
        if in_flight
            .get(self.key)
            .is_some_and(|(g, _)| *g == self.generation)
        {
            in_flight.remove(self.key);
        }
    }
}
