//! Superseded requests resolve to `None` and stop running.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tidewire::SupersedeTracker;

#[tokio::test(start_paused = true)]
async fn newer_request_supersedes_older() {
    let tracker = SupersedeTracker::new();
    let finished = AtomicBool::new(false);

    let older = tracker.run("map-view", async {
        tokio::time::sleep(Duration::from_secs(10)).await;
        finished.store(true, Ordering::SeqCst);
        "older"
    });
    let newer = tracker.run("map-view", async {
        tokio::time::sleep(Duration::from_secs(1)).await;
        "newer"
    });

    // join! polls `older` first, so it registers before `newer` replaces it.
    let (older, newer) = tokio::join!(older, newer);

    assert_eq!(older, None);
    assert_eq!(newer, Some("newer"));
    assert!(!finished.load(Ordering::SeqCst));
    assert_eq!(tracker.in_flight(), 0);
}

#[tokio::test(start_paused = true)]
async fn completed_request_is_not_affected_by_later_one() {
    let tracker = SupersedeTracker::new();
    let first = tracker.run("view", async { 1 }).await;
    let second = tracker.run("view", async { 2 }).await;
    assert_eq!((first, second), (Some(1), Some(2)));
}

#[tokio::test(start_paused = true)]
async fn cancel_aborts_in_flight_request() {
    let tracker = SupersedeTracker::new();

    let running = tracker.run("view", async {
        tokio::time::sleep(Duration::from_secs(10)).await;
        "done"
    });
    let cancel = async {
        tokio::time::sleep(Duration::from_secs(1)).await;
        tracker.cancel("view")
    };

    let (result, cancelled) = tokio::join!(running, cancel);
    assert!(cancelled);
    assert_eq!(result, None);
    assert!(!tracker.cancel("view"));
}

#[tokio::test(start_paused = true)]
async fn keys_are_independent() {
    let tracker = SupersedeTracker::new();
    let (a, b) = tokio::join!(
        tracker.run("left", async {
            tokio::time::sleep(Duration::from_secs(2)).await;
            "left"
        }),
        tracker.run("right", async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            "right"
        })
    );
    assert_eq!((a, b), (Some("left"), Some("right")));
}

#[tokio::test(start_paused = true)]
async fn dropped_request_releases_its_key() {
    let tracker = SupersedeTracker::new();

    let outcome = tokio::time::timeout(
        Duration::from_secs(1),
        tracker.run("view", async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            "done"
        }),
    )
    .await;

    assert!(outcome.is_err());
    assert_eq!(tracker.in_flight(), 0);
    assert!(!tracker.cancel("view"));
}
