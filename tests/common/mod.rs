//! Scriptable backend shared by the integration tests.

use async_trait::async_trait;
use minutary::backend::{BackendApi, BackendError, UsageReceipt};
use minutary::entitlement::{Entitlement, RawUser};
use minutary::jobs::JobStatusReport;
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// In-memory stand-in for the Minutary backend. The usage counter is
/// real (and idempotent per unit id, like the service it mimics) so
/// exactly-once claims can be asserted from the outside.
#[derive(Default)]
pub struct MockBackend {
    user_json: Mutex<Option<String>>,
    entitlement: Mutex<Option<Entitlement>>,
    privileged: AtomicBool,
    usage_count: AtomicU64,
    usage_limit: Mutex<Option<u64>>,
    counted_units: Mutex<HashSet<String>>,
    increment_attempts: AtomicU64,
    increment_fails: AtomicBool,
    poll_status: Mutex<Option<JobStatusReport>>,
    events: Mutex<VecDeque<JobStatusReport>>,
}

#[allow(dead_code)]
impl MockBackend {
    pub fn new() -> Self {
        let mock = Self::default();
        *mock.usage_limit.lock().unwrap() = Some(10);
        mock
    }

    pub fn set_user(&self, json: Option<&str>) {
        *self.user_json.lock().unwrap() = json.map(str::to_string);
    }

    pub fn set_entitlement(&self, entitlement: Option<Entitlement>) {
        *self.entitlement.lock().unwrap() = entitlement;
    }

    pub fn set_privileged(&self, privileged: bool) {
        self.privileged.store(privileged, Ordering::SeqCst);
    }

    pub fn set_usage(&self, count: u64, limit: Option<u64>) {
        self.usage_count.store(count, Ordering::SeqCst);
        *self.usage_limit.lock().unwrap() = limit;
    }

    pub fn fail_increments(&self, fail: bool) {
        self.increment_fails.store(fail, Ordering::SeqCst);
    }

    /// Number of increment calls that reached the backend, successful or
    /// not.
    pub fn increment_attempts(&self) -> u64 {
        self.increment_attempts.load(Ordering::SeqCst)
    }

    pub fn counted_units(&self) -> usize {
        self.counted_units.lock().unwrap().len()
    }

    pub fn set_poll_status(&self, json: &str) {
        *self.poll_status.lock().unwrap() = Some(serde_json::from_str(json).unwrap());
    }

    pub fn push_event(&self, json: &str) {
        self.events
            .lock()
            .unwrap()
            .push_back(serde_json::from_str(json).unwrap());
    }
}

#[async_trait]
impl BackendApi for MockBackend {
    async fn fetch_user_record(&self) -> Result<RawUser, BackendError> {
        let json = self.user_json.lock().unwrap().clone();
        match json {
            Some(json) => {
                serde_json::from_str(&json).map_err(|e| BackendError::Malformed(e.to_string()))
            }
            None => Err(BackendError::Network("connection refused".into())),
        }
    }

    async fn fetch_entitlement(&self, _user_id: &str) -> Result<Entitlement, BackendError> {
        self.entitlement
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| BackendError::Network("connection refused".into()))
    }

    async fn check_privileged_role(&self, _user_id: &str) -> Result<bool, BackendError> {
        Ok(self.privileged.load(Ordering::SeqCst))
    }

    async fn increment_usage(
        &self,
        _user_id: &str,
        unit_id: &str,
    ) -> Result<UsageReceipt, BackendError> {
        self.increment_attempts.fetch_add(1, Ordering::SeqCst);
        if self.increment_fails.load(Ordering::SeqCst) {
            return Err(BackendError::Api {
                status: 503,
                message: "usage service unavailable".into(),
            });
        }

        let mut counted = self.counted_units.lock().unwrap();
        if counted.insert(unit_id.to_string()) {
            self.usage_count.fetch_add(1, Ordering::SeqCst);
        }
        Ok(UsageReceipt {
            count: self.usage_count.load(Ordering::SeqCst),
            limit: *self.usage_limit.lock().unwrap(),
        })
    }

    async fn fetch_job_status(&self, _job_id: &str) -> Result<JobStatusReport, BackendError> {
        self.poll_status
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| BackendError::Network("connection refused".into()))
    }

    async fn wait_job_event(&self, _job_id: &str) -> Result<Option<JobStatusReport>, BackendError> {
        tokio::time::sleep(Duration::from_millis(50)).await;
        Ok(self.events.lock().unwrap().pop_front())
    }
}
