//! Usage metering API endpoints.
//!
//! Provides HTTP endpoints for:
//! - Recording a completed billable unit (POST /usage/complete)
//!
//! Completion is idempotent per unit id: reporting the same unit twice
//! answers `counted: false` the second time instead of double billing.

use crate::api::error::{ApiError, ApiResult};
use crate::usage::{CompletionOutcome, UsageCounter};
use axum::{extract::State, response::Json, routing::post, Router};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

/// Shared state for usage routes.
#[derive(Clone)]
pub struct UsageState {
    pub counter: Arc<UsageCounter>,
}

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteRequest {
    pub unit_id: String,
}

pub fn router(state: UsageState) -> Router {
    Router::new()
        .route("/usage/complete", post(complete))
        .with_state(state)
}

async fn complete(
    State(state): State<UsageState>,
    Json(req): Json<CompleteRequest>,
) -> ApiResult<Json<Value>> {
    if req.unit_id.is_empty() {
        return Err(ApiError::bad_request("unitId must not be empty"));
    }
    info!("Unit completion reported via API: {}", req.unit_id);

    match state.counter.record_completion(&req.unit_id).await? {
        CompletionOutcome::Counted { count, limit } => Ok(Json(json!({
            "counted": true,
            "count": count,
            "limit": limit,
        }))),
        CompletionOutcome::AlreadyCounted => Ok(Json(json!({
            "counted": false,
            "reason": "already counted",
        }))),
    }
}
