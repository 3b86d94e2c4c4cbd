//! Dual-channel job completion detection: event push and poll loop race
//! for the terminal state, the loser's observation is discarded, and
//! teardown stops both observers.

mod common;

use common::MockBackend;
use minutary::entitlement::EntitlementStore;
use minutary::jobs::tracker::TerminalCallback;
use minutary::jobs::{JobOutcome, JobStatus, JobTracker};
use minutary::usage::{CompletionOutcome, UsageCounter};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn capture(outcomes: Arc<Mutex<Vec<JobOutcome>>>) -> TerminalCallback {
    Box::new(move |outcome| outcomes.lock().unwrap().push(outcome))
}

async fn settle() {
    // Virtual time; each sleep yields so the observers get scheduled.
    for _ in 0..20 {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

#[tokio::test(start_paused = true)]
async fn test_event_wins_and_poll_observation_is_discarded() {
    let backend = Arc::new(MockBackend::new());
    backend.set_poll_status(r#"{"status": "processing"}"#);
    let tracker = JobTracker::new(backend.clone(), Duration::from_millis(200));

    let outcomes = Arc::new(Mutex::new(Vec::new()));
    tracker.track("j1", Some(capture(outcomes.clone()))).await;

    backend.push_event(r#"{"status": "done", "result": {"text": "minutes"}}"#);
    settle().await;

    {
        let outcomes = outcomes.lock().unwrap();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].status, JobStatus::Done);
        assert!(outcomes[0].result.is_some());
    }
    assert!(!tracker.is_tracked("j1").await);

    // The poll channel now also sees done; nothing further may fire.
    backend.set_poll_status(r#"{"status": "done"}"#);
    settle().await;
    assert_eq!(outcomes.lock().unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_poll_completes_when_event_channel_is_silent() {
    let backend = Arc::new(MockBackend::new());
    backend.set_poll_status(r#"{"status": "done", "result": {"text": "minutes"}}"#);
    let tracker = JobTracker::new(backend, Duration::from_millis(100));

    let outcomes = Arc::new(Mutex::new(Vec::new()));
    tracker.track("j1", Some(capture(outcomes.clone()))).await;

    settle().await;
    let outcomes = outcomes.lock().unwrap();
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].job_id, "j1");
    assert_eq!(outcomes[0].status, JobStatus::Done);
}

#[tokio::test(start_paused = true)]
async fn test_failure_is_terminal_and_reported_once() {
    let backend = Arc::new(MockBackend::new());
    backend.set_poll_status(r#"{"status": "failed", "error": "transcoder crashed"}"#);
    let tracker = JobTracker::new(backend.clone(), Duration::from_millis(100));

    let outcomes = Arc::new(Mutex::new(Vec::new()));
    tracker.track("j1", Some(capture(outcomes.clone()))).await;

    backend.push_event(r#"{"status": "failed", "error": "transcoder crashed"}"#);
    settle().await;

    let outcomes = outcomes.lock().unwrap();
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].status, JobStatus::Failed);
    assert_eq!(outcomes[0].error.as_deref(), Some("transcoder crashed"));
}

#[tokio::test(start_paused = true)]
async fn test_teardown_stops_both_observers() {
    let backend = Arc::new(MockBackend::new());
    backend.set_poll_status(r#"{"status": "processing"}"#);
    let tracker = JobTracker::new(backend.clone(), Duration::from_millis(100));

    let outcomes = Arc::new(Mutex::new(Vec::new()));
    tracker.track("j1", Some(capture(outcomes.clone()))).await;
    assert!(tracker.untrack("j1").await);

    backend.set_poll_status(r#"{"status": "done"}"#);
    backend.push_event(r#"{"status": "done"}"#);
    settle().await;

    assert!(outcomes.lock().unwrap().is_empty());
    assert_eq!(tracker.status("j1").await, None);
}

#[tokio::test(start_paused = true)]
async fn test_retracking_supersedes_previous_watch() {
    let backend = Arc::new(MockBackend::new());
    backend.set_poll_status(r#"{"status": "processing"}"#);
    let tracker = JobTracker::new(backend.clone(), Duration::from_millis(100));

    let first = Arc::new(Mutex::new(Vec::new()));
    let second = Arc::new(Mutex::new(Vec::new()));
    tracker.track("j1", Some(capture(first.clone()))).await;
    tracker.track("j1", Some(capture(second.clone()))).await;

    backend.set_poll_status(r#"{"status": "done"}"#);
    settle().await;

    assert!(first.lock().unwrap().is_empty());
    assert_eq!(second.lock().unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_completed_job_increments_usage_once() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(MockBackend::new());
    backend.set_user(Some(r#"{"id": "u1", "plan": "standard", "meetingCount": 0}"#));
    backend.set_poll_status(r#"{"status": "processing"}"#);

    let db_path = dir.path().join("minutary.db");
    let store = EntitlementStore::new(backend.clone(), db_path.clone());
    store.refresh(false).await.unwrap();
    let counter = Arc::new(UsageCounter::new(backend.clone(), store.clone(), db_path));
    let tracker = JobTracker::new(backend.clone(), Duration::from_millis(100));

    let counter_cb = counter.clone();
    let callback: TerminalCallback = Box::new(move |outcome: JobOutcome| {
        tokio::spawn(async move {
            counter_cb
                .record_completion(&outcome.job_id)
                .await
                .unwrap();
        });
    });
    tracker.track("m1", Some(callback)).await;

    backend.push_event(r#"{"status": "done", "result": {"text": "minutes"}}"#);
    settle().await;
    settle().await;

    assert!(!tracker.is_tracked("m1").await);
    assert_eq!(backend.increment_attempts(), 1);
    assert_eq!(store.get().await.unwrap().usage_count, 1);

    // A late duplicate completion signal is a no-op.
    let outcome = counter.record_completion("m1").await.unwrap();
    assert_eq!(outcome, CompletionOutcome::AlreadyCounted);
    assert_eq!(backend.increment_attempts(), 1);
}
