//! HTTP implementation of the backend contract.
//!
//! JSON over HTTPS with bearer-token auth. Auth statuses map to
//! `BackendError::Auth`, transport failures to `Network`, bad bodies to
//! `Malformed`; everything else the backend rejects comes back as `Api`.

use super::{BackendApi, BackendError, UsageReceipt};
use crate::config::Config;
use crate::entitlement::{Entitlement, RawUser};
use crate::jobs::JobStatusReport;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::info;

/// Per-request timeout for the event wait. Outlasts the server's 60s hold
/// so an idle window ends with a 204, not a client-side timeout.
const EVENT_WAIT: Duration = Duration::from_secs(75);

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

#[derive(Debug, Deserialize)]
struct PrivilegedRoleResponse {
    privileged: bool,
}

pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpBackend {
    pub fn new(config: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.backend.request_timeout_seconds))
            .build()
            .context("Failed to build HTTP client")?;

        let base_url = config.backend.base_url.trim_end_matches('/').to_string();
        info!("Backend client initialized for {}", base_url);

        Ok(Self {
            client,
            base_url,
            token: config.api_token(),
        })
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.authed(self.client.get(format!("{}{}", self.base_url, path)))
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.authed(self.client.post(format!("{}{}", self.base_url, path)))
    }

    fn authed(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn read_body(response: reqwest::Response) -> Result<String, BackendError> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| BackendError::Network(e.to_string()))?;

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(BackendError::Auth(error_message(&body)));
        }
        if !status.is_success() {
            return Err(BackendError::Api {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }
        Ok(body)
    }
}

fn send_err(err: reqwest::Error) -> BackendError {
    BackendError::Network(err.to_string())
}

fn parse<T: DeserializeOwned>(body: &str, what: &str) -> Result<T, BackendError> {
    serde_json::from_str(body).map_err(|e| BackendError::Malformed(format!("{what}: {e}")))
}

fn error_message(body: &str) -> String {
    if let Ok(parsed) = serde_json::from_str::<ErrorResponse>(body) {
        return parsed.error.message;
    }
    body.trim().to_string()
}

#[async_trait]
impl BackendApi for HttpBackend {
    async fn fetch_user_record(&self) -> Result<RawUser, BackendError> {
        let response = self.get("/v1/me").send().await.map_err(send_err)?;
        let body = Self::read_body(response).await?;
        parse(&body, "user record")
    }

    async fn fetch_entitlement(&self, user_id: &str) -> Result<Entitlement, BackendError> {
        let response = self
            .get(&format!("/v1/users/{user_id}/entitlement"))
            .send()
            .await
            .map_err(send_err)?;
        let body = Self::read_body(response).await?;
        parse(&body, "entitlement")
    }

    async fn check_privileged_role(&self, user_id: &str) -> Result<bool, BackendError> {
        let response = self
            .get(&format!("/v1/users/{user_id}/roles/privileged"))
            .send()
            .await
            .map_err(send_err)?;
        let body = Self::read_body(response).await?;
        let parsed: PrivilegedRoleResponse = parse(&body, "privileged role")?;
        Ok(parsed.privileged)
    }

    async fn increment_usage(
        &self,
        user_id: &str,
        unit_id: &str,
    ) -> Result<UsageReceipt, BackendError> {
        let response = self
            .post(&format!("/v1/users/{user_id}/usage"))
            .json(&json!({ "unitId": unit_id }))
            .send()
            .await
            .map_err(send_err)?;
        let body = Self::read_body(response).await?;
        parse(&body, "usage receipt")
    }

    async fn fetch_job_status(&self, job_id: &str) -> Result<JobStatusReport, BackendError> {
        let response = self
            .get(&format!("/v1/jobs/{job_id}/status"))
            .send()
            .await
            .map_err(send_err)?;
        let body = Self::read_body(response).await?;
        parse(&body, "job status")
    }

    async fn wait_job_event(
        &self,
        job_id: &str,
    ) -> Result<Option<JobStatusReport>, BackendError> {
        let response = self
            .get(&format!("/v1/jobs/{job_id}/events"))
            .timeout(EVENT_WAIT)
            .send()
            .await
            .map_err(send_err)?;

        // The server answers 204 when the wait window lapses without a
        // status change.
        if response.status() == StatusCode::NO_CONTENT {
            return Ok(None);
        }
        let body = Self::read_body(response).await?;
        Ok(Some(parse(&body, "job event")?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_message_extracts_structured_error() {
        let body = r#"{"error": {"message": "quota exceeded"}}"#;
        assert_eq!(error_message(body), "quota exceeded");
    }

    #[test]
    fn test_error_message_falls_back_to_raw_body() {
        assert_eq!(error_message("  internal error\n"), "internal error");
    }

    #[test]
    fn test_base_url_trailing_slash_is_trimmed() {
        let mut config = Config::default();
        config.backend.base_url = "https://api.example.test/".to_string();
        let backend = HttpBackend::new(&config).unwrap();
        assert_eq!(backend.base_url, "https://api.example.test");
    }
}
