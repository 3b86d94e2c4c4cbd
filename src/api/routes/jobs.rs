//! Job tracking API endpoints.
//!
//! Provides HTTP endpoints for:
//! - Starting dual-channel tracking of a job (POST /jobs/:id/track)
//! - Reading a job's status (GET /jobs/:id)
//! - Dropping tracking, e.g. when the owning view closes (DELETE /jobs/:id)

use crate::api::error::{ApiError, ApiResult};
use crate::backend::BackendApi;
use crate::jobs::JobTracker;
use axum::{
    extract::{Path, State},
    response::Json,
    routing::{delete, post},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

/// Shared state for job routes.
#[derive(Clone)]
pub struct JobsState {
    pub tracker: JobTracker,
    pub backend: Arc<dyn BackendApi>,
}

pub fn router(state: JobsState) -> Router {
    Router::new()
        .route("/jobs/:id/track", post(track))
        .route("/jobs/:id", delete(untrack).get(job_status))
        .with_state(state)
}

async fn track(Path(id): Path<String>, State(state): State<JobsState>) -> Json<Value> {
    info!("Job tracking requested via API: {}", id);
    state.tracker.track(&id, None).await;
    Json(json!({ "success": true, "jobId": id }))
}

async fn untrack(
    Path(id): Path<String>,
    State(state): State<JobsState>,
) -> ApiResult<Json<Value>> {
    if state.tracker.untrack(&id).await {
        Ok(Json(json!({ "success": true, "jobId": id })))
    } else {
        Err(ApiError::not_found(format!("Job {} is not tracked", id)))
    }
}

/// Tracked jobs answer from the tracker's last observation; anything else
/// is read through to the backend.
async fn job_status(
    Path(id): Path<String>,
    State(state): State<JobsState>,
) -> ApiResult<Json<Value>> {
    if let Some(status) = state.tracker.status(&id).await {
        return Ok(Json(json!({
            "jobId": id,
            "status": status,
            "tracked": true,
        })));
    }

    let report = state.backend.fetch_job_status(&id).await?;
    Ok(Json(json!({
        "jobId": id,
        "status": report.status,
        "tracked": false,
        "result": report.result,
        "error": report.error,
    })))
}
