//! Dual-channel completion detection.
//!
//! Each tracked job gets two observers: one waits on the backend's event
//! push, one polls status on an interval. Removing the job's entry from
//! the tracking map is the single terminal gate; whichever observer first
//! sees `done` or `failed` removes the entry and applies the result, and
//! the loser finds the entry gone and discards its observation. Entries
//! carry an epoch so observers of a superseded tracking cannot touch the
//! entry that replaced theirs.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{JobOutcome, JobStatus, JobStatusReport};
use crate::backend::BackendApi;

/// Invoked exactly once per tracked job, with the terminal outcome.
pub type TerminalCallback = Box<dyn FnOnce(JobOutcome) + Send>;

struct TrackedJob {
    // Identifies which track() call owns this entry; a superseded
    // observer carries the old epoch.
    epoch: u64,
    cancel: CancellationToken,
    on_terminal: Option<TerminalCallback>,
    last_status: JobStatus,
}

#[derive(Clone)]
pub struct JobTracker {
    inner: Arc<Mutex<HashMap<String, TrackedJob>>>,
    backend: Arc<dyn BackendApi>,
    poll_interval: Duration,
    epochs: Arc<AtomicU64>,
}

impl JobTracker {
    pub fn new(backend: Arc<dyn BackendApi>, poll_interval: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
            backend,
            poll_interval,
            epochs: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Start observing a job. Tracking the same id again supersedes the
    /// previous tracking: its observers stop and its callback is dropped
    /// unfired.
    pub async fn track(&self, job_id: &str, on_terminal: Option<TerminalCallback>) {
        let cancel = CancellationToken::new();
        let epoch = self.epochs.fetch_add(1, Ordering::SeqCst);
        {
            let mut jobs = self.inner.lock().await;
            let previous = jobs.insert(
                job_id.to_string(),
                TrackedJob {
                    epoch,
                    cancel: cancel.clone(),
                    on_terminal,
                    last_status: JobStatus::Pending,
                },
            );
            if let Some(previous) = previous {
                previous.cancel.cancel();
                debug!("Superseded existing tracking for job {}", job_id);
            }
        }
        info!("Tracking job {}", job_id);

        self.spawn_event_observer(job_id.to_string(), epoch, cancel.clone());
        self.spawn_poll_observer(job_id.to_string(), epoch, cancel);
    }

    /// Stop observing without applying a terminal state. Returns whether
    /// the job was tracked.
    pub async fn untrack(&self, job_id: &str) -> bool {
        let mut jobs = self.inner.lock().await;
        match jobs.remove(job_id) {
            Some(job) => {
                job.cancel.cancel();
                info!("Stopped tracking job {}", job_id);
                true
            }
            None => false,
        }
    }

    pub async fn is_tracked(&self, job_id: &str) -> bool {
        self.inner.lock().await.contains_key(job_id)
    }

    /// Last status observed for a still-tracked job.
    pub async fn status(&self, job_id: &str) -> Option<JobStatus> {
        self.inner.lock().await.get(job_id).map(|job| job.last_status)
    }

    fn spawn_poll_observer(&self, job_id: String, epoch: u64, cancel: CancellationToken) {
        let tracker = self.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        debug!("Poll observer for job {} stopped", job_id);
                        return;
                    }
                    _ = tokio::time::sleep(tracker.poll_interval) => {}
                }

                let result = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return,
                    result = tracker.backend.fetch_job_status(&job_id) => result,
                };

                match result {
                    Ok(report) if report.status.is_terminal() => {
                        tracker.apply_terminal(&job_id, epoch, report).await;
                        return;
                    }
                    Ok(report) => tracker.note_status(&job_id, epoch, report.status).await,
                    Err(err) => {
                        // Transient; the next tick retries.
                        debug!("Poll for job {} failed: {}", job_id, err);
                    }
                }
            }
        });
    }

    fn spawn_event_observer(&self, job_id: String, epoch: u64, cancel: CancellationToken) {
        let tracker = self.clone();
        tokio::spawn(async move {
            loop {
                let result = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        debug!("Event observer for job {} stopped", job_id);
                        return;
                    }
                    result = tracker.backend.wait_job_event(&job_id) => result,
                };

                match result {
                    Ok(Some(report)) if report.status.is_terminal() => {
                        tracker.apply_terminal(&job_id, epoch, report).await;
                        return;
                    }
                    Ok(Some(report)) => tracker.note_status(&job_id, epoch, report.status).await,
                    // Wait window lapsed without a change. Pace the
                    // re-subscribe; a backend answering empty immediately
                    // must not turn this into a busy loop.
                    Ok(None) => {
                        tokio::select! {
                            biased;
                            _ = cancel.cancelled() => return,
                            _ = tokio::time::sleep(tracker.poll_interval) => {}
                        }
                    }
                    Err(err) => {
                        debug!("Event wait for job {} failed: {}", job_id, err);
                        tokio::select! {
                            biased;
                            _ = cancel.cancelled() => return,
                            _ = tokio::time::sleep(tracker.poll_interval) => {}
                        }
                    }
                }
            }
        });
    }

    /// Apply a terminal observation exactly once. The entry removal is the
    /// gate: a second observer, a stale one surviving cancellation, or one
    /// outlived by a superseding track() finds no entry of its own epoch
    /// and discards its report.
    async fn apply_terminal(&self, job_id: &str, epoch: u64, report: JobStatusReport) -> bool {
        let callback = {
            let mut jobs = self.inner.lock().await;
            match jobs.entry(job_id.to_string()) {
                Entry::Occupied(entry) if entry.get().epoch == epoch => {
                    let mut job = entry.remove();
                    job.cancel.cancel();
                    job.on_terminal.take()
                }
                _ => {
                    debug!(
                        "Discarding terminal report for job {}: applied, untracked or superseded",
                        job_id
                    );
                    return false;
                }
            }
        };

        let outcome = JobOutcome::from_report(job_id, report);
        match outcome.status {
            JobStatus::Failed => warn!(
                "Job {} failed: {}",
                job_id,
                outcome.error.as_deref().unwrap_or("unknown error")
            ),
            _ => info!("Job {} completed", job_id),
        }

        // Outside the lock so a callback touching the tracker cannot
        // deadlock.
        if let Some(callback) = callback {
            callback(outcome);
        }
        true
    }

    async fn note_status(&self, job_id: &str, epoch: u64, status: JobStatus) {
        let mut jobs = self.inner.lock().await;
        if let Some(job) = jobs.get_mut(job_id) {
            if job.epoch == epoch && job.last_status != status {
                debug!("Job {} status: {}", job_id, status);
                job.last_status = status;
            }
        }
    }
}
