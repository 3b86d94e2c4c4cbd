use crate::api::ApiServer;
use crate::backend::{BackendApi, HttpBackend};
use crate::config::Config;
use crate::db;
use crate::db::snapshot::SnapshotRepository;
use crate::db::units::UnitLedger;
use crate::entitlement::EntitlementStore;
use crate::jobs::JobTracker;
use crate::usage::UsageCounter;
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Claims older than this are released at startup. A crash between claim
/// and confirm must not pin a unit in `counting` forever.
const STALE_CLAIM_MINUTES: i64 = 10;

pub async fn run_service() -> Result<()> {
    info!("Starting Minutary service");

    let config = Config::load()?;
    let db_path = crate::global::db_file()?;

    // Migrate and recover the ledger before anything else touches it.
    let snapshot = tokio::task::spawn_blocking(move || {
        let conn = db::open()?;
        let released = UnitLedger::release_stale(&conn, STALE_CLAIM_MINUTES)?;
        if released > 0 {
            warn!(
                "Released {} stale usage claim(s) from a previous run",
                released
            );
        }
        SnapshotRepository::load(&conn)
    })
    .await
    .context("Database startup task failed")??;

    let backend: Arc<dyn BackendApi> = Arc::new(HttpBackend::new(&config)?);
    let store = EntitlementStore::new(backend.clone(), db_path.clone());
    info!("Entitlement session {}", store.session_id());

    if let Some(snapshot) = snapshot {
        store.restore(snapshot).await;
    }

    if config.entitlement.refresh_on_start {
        match store.refresh(false).await {
            Ok(entitlement) => info!("Entitlement ready (tier={})", entitlement.tier),
            Err(err) => error!("Initial entitlement refresh failed: {}", err),
        }
    }

    store.spawn_background_verify(Duration::from_secs(
        config.entitlement.verify_interval_seconds,
    ));

    let counter = Arc::new(UsageCounter::new(
        backend.clone(),
        store.clone(),
        db_path,
    ));
    let tracker = JobTracker::new(
        backend.clone(),
        Duration::from_secs(config.jobs.poll_interval_seconds),
    );

    let api_server = ApiServer::new(&config, store, counter, tracker, backend);
    info!("Minutary is ready");
    api_server.start().await
}
