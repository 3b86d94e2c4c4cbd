//! Session entitlement cache.
//!
//! Owns the resolved `Entitlement` for the logged-in user. Every write
//! funnels through the reconciler, so optimistic upgrades survive stale
//! background fetches no matter how the async chains interleave. The last
//! good state is mirrored to the snapshot table for the next start.

use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::normalizer::normalize;
use super::overrides::UsageOverride;
use super::reconciler::reconcile;
use super::Entitlement;
use crate::backend::{BackendApi, BackendError, UsageReceipt};
use crate::db::snapshot::{SnapshotRepository, StoredSnapshot};

/// Answer to "may the user start another meeting right now".
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Allowance {
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining: Option<u64>,
}

#[derive(Default)]
struct StoreState {
    entitlement: Option<Entitlement>,
    user_id: Option<String>,
}

/// Cloneable handle to the per-session cache.
#[derive(Clone)]
pub struct EntitlementStore {
    inner: Arc<Mutex<StoreState>>,
    backend: Arc<dyn BackendApi>,
    db_path: PathBuf,
    session_id: Uuid,
}

impl EntitlementStore {
    pub fn new(backend: Arc<dyn BackendApi>, db_path: PathBuf) -> Self {
        let session_id = Uuid::new_v4();
        debug!("Entitlement store created (session {})", session_id);
        Self {
            inner: Arc::new(Mutex::new(StoreState::default())),
            backend,
            db_path,
            session_id,
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub async fn get(&self) -> Option<Entitlement> {
        self.inner.lock().await.entitlement.clone()
    }

    pub async fn user_id(&self) -> Option<String> {
        self.inner.lock().await.user_id.clone()
    }

    /// Whether another metered unit may be consumed. With nothing cached
    /// yet this answers from the free-tier defaults.
    pub async fn allowance(&self) -> Allowance {
        let entitlement = self
            .get()
            .await
            .unwrap_or_else(Entitlement::free_default);

        match entitlement.usage_limit {
            None => Allowance {
                allowed: true,
                reason: None,
                remaining: None,
            },
            Some(limit) if entitlement.usage_count < limit => Allowance {
                allowed: true,
                reason: None,
                remaining: Some(limit - entitlement.usage_count),
            },
            Some(limit) => Allowance {
                allowed: false,
                reason: Some(format!(
                    "Meeting limit reached ({}/{})",
                    entitlement.usage_count, limit
                )),
                remaining: Some(0),
            },
        }
    }

    /// Seed the cache from a stored snapshot. Does nothing once live data
    /// is present.
    pub async fn restore(&self, snapshot: StoredSnapshot) {
        let mut state = self.inner.lock().await;
        if state.entitlement.is_some() {
            return;
        }
        info!(
            "Restored entitlement snapshot (tier={})",
            snapshot.entitlement.tier
        );
        state.user_id = snapshot.user_id;
        state.entitlement = Some(snapshot.entitlement);
    }

    /// Fetch the latest user record and fold it into the cache.
    ///
    /// `force` marks an explicit user-initiated refresh, the only path
    /// allowed to regress tier. Transient fetch failures keep the cached
    /// state (seeding the free default when there is nothing cached yet);
    /// auth failures always propagate.
    pub async fn refresh(&self, force: bool) -> Result<Entitlement, BackendError> {
        let raw = match self.backend.fetch_user_record().await {
            Ok(raw) => raw,
            Err(err) if err.is_auth() => return Err(err),
            Err(err) => {
                if let Some(current) = self.get().await {
                    warn!("Entitlement refresh failed, keeping cached state: {}", err);
                    return Ok(current);
                }
                warn!(
                    "Entitlement refresh failed with empty cache, using free default: {}",
                    err
                );
                return Ok(self
                    .apply_candidate(Entitlement::free_default(), false, None)
                    .await);
            }
        };

        let user_id = raw.id.clone();
        let privileged = match &user_id {
            Some(id) => match self.backend.check_privileged_role(id).await {
                Ok(privileged) => privileged,
                Err(err) => {
                    // Fail closed: an unverifiable role never grants
                    // unlimited access.
                    warn!("Privileged role check failed: {}", err);
                    false
                }
            },
            None => false,
        };

        let candidate = UsageOverride::from_raw(&raw).apply(&normalize(&raw, privileged));
        Ok(self.apply_candidate(candidate, force, user_id).await)
    }

    /// Fetch the backend's canonical entitlement and reconcile it in,
    /// non-forced. The background loop calls this on an interval. Before a
    /// user id is known this falls back to a full refresh, so a session
    /// that started offline still resolves once the backend is reachable.
    pub async fn verify(&self) -> Result<(), BackendError> {
        let user_id = self.user_id().await;
        let Some(user_id) = user_id else {
            debug!("No user id yet, verifying via full refresh");
            return self.refresh(false).await.map(|_| ());
        };

        let incoming = self.backend.fetch_entitlement(&user_id).await?;
        self.apply_candidate(incoming, false, Some(user_id)).await;
        Ok(())
    }

    /// Fold an increment receipt into the cache. The receipt count is
    /// authoritative; its limit is ignored while an unlimited state is
    /// active so a grant is not clobbered by a plan-level number.
    pub async fn apply_usage_receipt(&self, receipt: &UsageReceipt) -> Option<Entitlement> {
        let current = self.get().await?;
        let incoming = Entitlement {
            usage_count: receipt.count,
            usage_limit: if current.usage_limit.is_some() {
                receipt.limit
            } else {
                None
            },
            ..current.clone()
        };
        Some(self.apply_candidate(incoming, false, None).await)
    }

    pub fn spawn_background_verify(&self, interval: Duration) -> JoinHandle<()> {
        let store = self.clone();
        tokio::spawn(async move {
            info!(
                "Starting entitlement verification loop (interval={}s)",
                interval.as_secs()
            );
            loop {
                tokio::time::sleep(interval).await;
                if let Err(err) = store.verify().await {
                    warn!("Entitlement verification failed: {}", err);
                }
            }
        })
    }

    async fn apply_candidate(
        &self,
        incoming: Entitlement,
        force: bool,
        user_id: Option<String>,
    ) -> Entitlement {
        let mut state = self.inner.lock().await;
        let merged = reconcile(state.entitlement.as_ref(), incoming, force);
        match &state.entitlement {
            Some(previous) if previous.tier != merged.tier => {
                info!(
                    "Entitlement tier changed: {} -> {}",
                    previous.tier, merged.tier
                );
            }
            None => info!("Entitlement resolved (tier={})", merged.tier),
            _ => debug!("Entitlement reconciled (tier={})", merged.tier),
        }
        state.entitlement = Some(merged.clone());
        if user_id.is_some() {
            state.user_id = user_id;
        }

        // Persisting inside the critical section keeps snapshot writes in
        // merge order; overlapping writes cannot leave an older
        // entitlement on disk.
        self.persist(state.user_id.clone(), merged.clone()).await;
        merged
    }

    /// Best effort: a snapshot write failure degrades restart behavior but
    /// never the live session. Callers hold the state lock across this.
    async fn persist(&self, user_id: Option<String>, entitlement: Entitlement) {
        let db_path = self.db_path.clone();
        let result = tokio::task::spawn_blocking(move || -> Result<()> {
            let conn = crate::db::open_at(&db_path)?;
            SnapshotRepository::save(&conn, user_id.as_deref(), &entitlement)
        })
        .await;

        match result {
            Ok(Ok(())) => {}
            Ok(Err(err)) => warn!("Failed to persist entitlement snapshot: {}", err),
            Err(err) => warn!("Snapshot persistence task failed: {}", err),
        }
    }
}
