//! REST API server for Minutary.
//!
//! Localhost surface the desktop UI talks to:
//! - Entitlement state, refresh and allowance checks
//! - Usage completion recording
//! - Transcription job tracking

pub mod error;
pub mod routes;

use crate::backend::BackendApi;
use crate::config::Config;
use crate::entitlement::EntitlementStore;
use crate::jobs::JobTracker;
use crate::usage::UsageCounter;
use anyhow::Result;
use axum::{response::Json, routing::get, Router};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceBuilder;
use tracing::info;

pub use routes::entitlement::EntitlementState;
pub use routes::jobs::JobsState;
pub use routes::usage::UsageState;

pub struct ApiServer {
    port: u16,
    entitlement: EntitlementState,
    usage: UsageState,
    jobs: JobsState,
}

impl ApiServer {
    pub fn new(
        config: &Config,
        store: EntitlementStore,
        counter: Arc<UsageCounter>,
        tracker: JobTracker,
        backend: Arc<dyn BackendApi>,
    ) -> Self {
        Self {
            port: config.api.port,
            entitlement: EntitlementState { store },
            usage: UsageState { counter },
            jobs: JobsState { tracker, backend },
        }
    }

    pub async fn start(self) -> Result<()> {
        let app = Router::new()
            // Root and version endpoints
            .route("/", get(status))
            .route("/version", get(version))
            // Domain routes
            .merge(routes::entitlement::router(self.entitlement))
            .merge(routes::usage::router(self.usage))
            .merge(routes::jobs::router(self.jobs))
            .layer(ServiceBuilder::new());

        let listener = tokio::net::TcpListener::bind(&format!("127.0.0.1:{}", self.port)).await?;

        info!("API server listening on http://127.0.0.1:{}", self.port);
        info!("Endpoints:");
        info!("  GET    /                      - Service info");
        info!("  GET    /version               - Version info");
        info!("  GET    /entitlement           - Current entitlement");
        info!("  POST   /entitlement/refresh   - Refresh entitlement");
        info!("  GET    /entitlement/allowance - Meeting allowance check");
        info!("  POST   /usage/complete        - Record unit completion");
        info!("  POST   /jobs/:id/track        - Track a job");
        info!("  GET    /jobs/:id              - Job status");
        info!("  DELETE /jobs/:id              - Stop tracking a job");

        axum::serve(listener, app).await?;

        Ok(())
    }
}

async fn status() -> Json<Value> {
    Json(json!({
        "service": "minutary",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running"
    }))
}

async fn version() -> Json<Value> {
    Json(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "name": "minutary"
    }))
}
