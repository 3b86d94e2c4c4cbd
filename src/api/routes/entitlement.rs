//! Entitlement API endpoints.
//!
//! Provides HTTP endpoints for:
//! - Reading the resolved entitlement (GET /entitlement)
//! - Refreshing it from the backend (POST /entitlement/refresh)
//! - Checking whether another meeting may start (GET /entitlement/allowance)

use crate::api::error::ApiResult;
use crate::entitlement::EntitlementStore;
use axum::{
    extract::State,
    response::Json,
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};
use tracing::info;

/// Shared state for entitlement routes.
#[derive(Clone)]
pub struct EntitlementState {
    pub store: EntitlementStore,
}

/// Request body for the refresh endpoint.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct RefreshRequest {
    pub force: bool,
}

pub fn router(state: EntitlementState) -> Router {
    Router::new()
        .route("/entitlement", get(current))
        .route("/entitlement/refresh", post(refresh))
        .route("/entitlement/allowance", get(allowance))
        .with_state(state)
}

async fn current(State(state): State<EntitlementState>) -> Json<Value> {
    Json(json!({ "entitlement": state.store.get().await }))
}

async fn refresh(
    State(state): State<EntitlementState>,
    body: Option<Json<RefreshRequest>>,
) -> ApiResult<Json<Value>> {
    let force = body.map(|Json(req)| req.force).unwrap_or(false);
    info!("Entitlement refresh requested via API (force={})", force);

    let entitlement = state.store.refresh(force).await?;
    Ok(Json(json!({ "entitlement": entitlement })))
}

async fn allowance(State(state): State<EntitlementState>) -> Json<Value> {
    Json(json!(state.store.allowance().await))
}
