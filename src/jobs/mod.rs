//! Asynchronous transcription job tracking.
//!
//! A tracked job is watched over two racing channels (event wait and poll
//! loop); whichever first observes a terminal status applies it exactly
//! once and cancels the other.

pub mod tracker;

pub use tracker::JobTracker;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of a transcription job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Done,
    Failed,
}

impl JobStatus {
    /// Terminal statuses are applied once and never re-applied.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Done => "done",
            JobStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One observation of a job, as reported by either channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusReport {
    pub status: JobStatus,
    /// Present only when the job is done.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Terminal state delivered to the job's completion callback and kept for
/// later status reads. Failures share the shape of successes; callers
/// distinguish them by `status` alone.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobOutcome {
    pub job_id: String,
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JobOutcome {
    pub fn from_report(job_id: &str, report: JobStatusReport) -> Self {
        Self {
            job_id: job_id.to_string(),
            status: report.status,
            result: report.result,
            error: report.error,
        }
    }
}
