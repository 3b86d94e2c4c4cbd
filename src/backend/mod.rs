//! Backend service contract.
//!
//! Everything the core needs from the remote service sits behind the
//! `BackendApi` trait so the resolution and metering logic can be driven
//! by a mock in tests. `HttpBackend` is the production implementation.

pub mod http;

pub use http::HttpBackend;

use crate::entitlement::{Entitlement, RawUser};
use crate::jobs::JobStatusReport;
use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BackendError {
    /// Transient transport failure; safe to retry.
    #[error("network error: {0}")]
    Network(String),
    /// Session is invalid. Never silently absorbed; the caller must force
    /// a re-login.
    #[error("authentication failed: {0}")]
    Auth(String),
    /// Response body did not match the expected shape.
    #[error("malformed response: {0}")]
    Malformed(String),
    /// Backend accepted the connection but rejected the request.
    #[error("backend error ({status}): {message}")]
    Api { status: u16, message: String },
}

impl BackendError {
    pub fn is_auth(&self) -> bool {
        matches!(self, BackendError::Auth(_))
    }
}

/// Confirmation returned by a usage increment: the authoritative count and
/// limit after the unit was recorded.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageReceipt {
    pub count: u64,
    pub limit: Option<u64>,
}

/// Remote operations consumed by the entitlement store, usage counter and
/// job tracker.
#[async_trait]
pub trait BackendApi: Send + Sync {
    /// Fetch the authenticated user's record. The shape is loose; the
    /// normalizer tolerates partial and aliased data.
    async fn fetch_user_record(&self) -> Result<RawUser, BackendError>;

    /// Fetch the backend's canonical entitlement for a user. This is the
    /// background-verify source.
    async fn fetch_entitlement(&self, user_id: &str) -> Result<Entitlement, BackendError>;

    /// Whether the user currently holds a privileged (staff) role.
    /// Callers treat any failure as `false`.
    async fn check_privileged_role(&self, user_id: &str) -> Result<bool, BackendError>;

    /// Record one consumed unit. The claim protocol guarantees at most one
    /// call per unit id from this client; the backend is expected to be
    /// idempotent per unit id as well.
    async fn increment_usage(
        &self,
        user_id: &str,
        unit_id: &str,
    ) -> Result<UsageReceipt, BackendError>;

    /// One-shot status read for the poll channel.
    async fn fetch_job_status(&self, job_id: &str) -> Result<JobStatusReport, BackendError>;

    /// Block until the backend pushes a status change for the job, or the
    /// wait window lapses (`Ok(None)`). Best effort; the poll channel must
    /// not depend on this ever delivering.
    async fn wait_job_event(&self, job_id: &str)
        -> Result<Option<JobStatusReport>, BackendError>;
}
