//! Concurrency-bounded batch execution.
//!
//! [`BatchScheduler::run_all`] keeps at most `max_concurrent` items in
//! flight. Whenever one finishes, its output is stored at the item's
//! original index and the next queued item starts. Outputs come back in
//! input order regardless of completion order, and one item's failure never
//! stops the rest: `T` is typically a `Result` or a `ProviderResult`.

use std::future::Future;

use futures_util::stream::{FuturesUnordered, StreamExt};
use tracing::debug;

use crate::telemetry;

/// Default number of items in flight.
pub const DEFAULT_MAX_CONCURRENT: usize = 4;

/// Runs independent async jobs under a concurrency cap.
#[derive(Debug, Clone, Copy)]
pub struct BatchScheduler {
    max_concurrent: usize,
}

impl Default for BatchScheduler {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CONCURRENT)
    }
}

impl BatchScheduler {
    /// A cap of zero is treated as one.
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            max_concurrent: max_concurrent.max(1),
        }
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Run `f` over every input and return the outputs in input order.
    pub async fn run_all<I, F, Fut, T>(&self, inputs: Vec<I>, f: F) -> Vec<T>
    where
        F: Fn(I) -> Fut,
        Fut: Future<Output = T>,
    {
        let total = inputs.len();
        let mut results: Vec<Option<T>> = std::iter::repeat_with(|| None).take(total).collect();
        let mut queue = inputs.into_iter().enumerate();
        let mut in_flight = FuturesUnordered::new();

        let spawn = |(index, input): (usize, I)| {
            let slot = InFlightSlot::take();
            let fut = f(input);
            async move {
                let output = fut.await;
                drop(slot);
                (index, output)
            }
        };

        for item in queue.by_ref().take(self.max_concurrent) {
            in_flight.push(spawn(item));
        }
        debug!(total, in_flight = in_flight.len(), "batch started");

        while let Some((index, output)) = in_flight.next().await {
            results[index] = Some(output);
            if let Some(item) = queue.next() {
                in_flight.push(spawn(item));
            }
        }

        debug!(total, "batch finished");
        // Every index was pushed exactly once and every future completed.
        results.into_iter().flatten().collect()
    }
}

/// Counts one item in the in-flight gauge until it finishes or is dropped.
struct InFlightSlot;

impl InFlightSlot {
    fn take() -> Self {
        metrics::gauge!(telemetry::BATCH_IN_FLIGHT).increment(1.0);
        Self
    }
}

impl Drop for InFlightSlot {
    fn drop(&mut self) {
        metrics::gauge!(telemetry::BATCH_IN_FLIGHT).decrement(1.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn zero_cap_becomes_one() {
        assert_eq!(BatchScheduler::new(0).max_concurrent(), 1);
        assert_eq!(BatchScheduler::default().max_concurrent(), 4);
    }

    #[tokio::test]
    async fn empty_batch() {
        let out: Vec<u32> = BatchScheduler::new(3)
            .run_all(Vec::<u32>::new(), |x| async move { x })
            .await;
        assert!(out.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn order_follows_input_not_completion() {
        let inputs = vec![30u64, 10, 20];
        let out = BatchScheduler::new(3)
            .run_all(inputs, |ms| async move {
                tokio::time::sleep(Duration::from_millis(ms)).await;
                ms
            })
            .await;
        assert_eq!(out, vec![30, 10, 20]);
    }
}
