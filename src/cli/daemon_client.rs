//! HTTP client for the local Minutary daemon API.
//!
//! Used by CLI subcommands to read entitlement state, trigger refreshes,
//! and manage job tracking in an already-running daemon.

use anyhow::{Context, Result};
use serde::Deserialize;

/// Client for the daemon's localhost API.
pub struct DaemonClient {
    client: reqwest::Client,
    base_url: String,
}

/// Entitlement payload as served by the daemon.
#[derive(Debug, Deserialize)]
pub struct EntitlementView {
    pub tier: String,
    #[serde(rename = "usageCount")]
    pub usage_count: u64,
    #[serde(rename = "usageLimit")]
    pub usage_limit: Option<u64>,
    #[serde(rename = "secondaryUsageCount")]
    pub secondary_usage_count: u64,
    #[serde(rename = "secondaryUsageLimit")]
    pub secondary_usage_limit: Option<u64>,
    #[serde(rename = "renewalDate")]
    pub renewal_date: Option<String>,
    pub cancellation: Option<CancellationView>,
}

/// Pending cancellation details.
#[derive(Debug, Deserialize)]
pub struct CancellationView {
    #[serde(rename = "effectiveAt")]
    pub effective_at: String,
}

#[derive(Debug, Deserialize)]
struct EntitlementEnvelope {
    entitlement: Option<EntitlementView>,
}

/// Answer from the allowance endpoint.
#[derive(Debug, Deserialize)]
pub struct AllowanceView {
    pub allowed: bool,
    pub reason: Option<String>,
    pub remaining: Option<u64>,
}

/// Answer from the job status endpoint.
#[derive(Debug, Deserialize)]
#[allow(dead_code)]
pub struct JobStatusView {
    #[serde(rename = "jobId")]
    pub job_id: String,
    pub status: String,
    pub tracked: bool,
    pub error: Option<String>,
}

impl DaemonClient {
    /// Create a client against the daemon listening on `port`.
    pub fn new(port: u16) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: format!("http://127.0.0.1:{}", port),
        }
    }

    /// Read the daemon's resolved entitlement. `None` means the daemon has
    /// nothing cached yet.
    pub async fn get_entitlement(&self) -> Result<Option<EntitlementView>> {
        let body = self.get("/entitlement").await?;
        let envelope: EntitlementEnvelope =
            serde_json::from_str(&body).context("Failed to parse entitlement response")?;
        Ok(envelope.entitlement)
    }

    /// Ask whether another meeting may start right now.
    pub async fn get_allowance(&self) -> Result<AllowanceView> {
        let body = self.get("/entitlement/allowance").await?;
        serde_json::from_str(&body).context("Failed to parse allowance response")
    }

    /// Trigger a backend refresh and return the resulting entitlement.
    pub async fn refresh(&self, force: bool) -> Result<EntitlementView> {
        let body = self
            .post(
                "/entitlement/refresh",
                Some(serde_json::json!({ "force": force })),
            )
            .await?;
        let envelope: EntitlementEnvelope =
            serde_json::from_str(&body).context("Failed to parse refresh response")?;
        envelope
            .entitlement
            .context("Refresh response carried no entitlement")
    }

    /// Start dual-channel tracking of a job.
    pub async fn track_job(&self, job_id: &str) -> Result<()> {
        self.post(&format!("/jobs/{}/track", job_id), None).await?;
        Ok(())
    }

    /// Stop tracking a job.
    pub async fn untrack_job(&self, job_id: &str) -> Result<()> {
        let url = format!("{}/jobs/{}", self.base_url, job_id);
        let response = self
            .client
            .delete(&url)
            .send()
            .await
            .context("Failed to reach the Minutary daemon")?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(anyhow::anyhow!("Untrack failed ({}): {}", status, body));
        }
        Ok(())
    }

    /// Read a job's status, tracked or not.
    pub async fn job_status(&self, job_id: &str) -> Result<JobStatusView> {
        let body = self.get(&format!("/jobs/{}", job_id)).await?;
        serde_json::from_str(&body).context("Failed to parse job status response")
    }

    async fn get(&self, path: &str) -> Result<String> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("Failed to reach the Minutary daemon (is it running?)")?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(anyhow::anyhow!("Request failed ({}): {}", status, body));
        }
        Ok(body)
    }

    async fn post(&self, path: &str, json: Option<serde_json::Value>) -> Result<String> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self.client.post(&url);
        if let Some(json) = json {
            request = request.json(&json);
        }
        let response = request
            .send()
            .await
            .context("Failed to reach the Minutary daemon (is it running?)")?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(anyhow::anyhow!("Request failed ({}): {}", status, body));
        }
        Ok(body)
    }
}
