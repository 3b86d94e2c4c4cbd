//! Unit completion recording.

use anyhow::{bail, Context, Result};
use rusqlite::Connection;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::backend::BackendApi;
use crate::db;
use crate::db::units::UnitLedger;
use crate::entitlement::EntitlementStore;

/// Result of recording a completion. `AlreadyCounted` is a normal no-op,
/// not a failure: some other caller won the claim for this unit.
#[derive(Debug, Clone, PartialEq)]
pub enum CompletionOutcome {
    Counted { count: u64, limit: Option<u64> },
    AlreadyCounted,
}

pub struct UsageCounter {
    backend: Arc<dyn BackendApi>,
    store: EntitlementStore,
    db_path: PathBuf,
}

impl UsageCounter {
    pub fn new(backend: Arc<dyn BackendApi>, store: EntitlementStore, db_path: PathBuf) -> Self {
        Self {
            backend,
            store,
            db_path,
        }
    }

    /// Record one completed unit. Safe to call any number of times for the
    /// same unit id; only the caller that wins the persisted claim reaches
    /// the backend. On backend failure the claim is released so a later
    /// call can retry, and the error surfaces to the caller.
    pub async fn record_completion(&self, unit_id: &str) -> Result<CompletionOutcome> {
        let claimed = {
            let unit = unit_id.to_string();
            self.with_ledger(move |conn| UnitLedger::claim(conn, &unit))
                .await?
        };
        if !claimed {
            debug!("Unit {} already counted or being counted", unit_id);
            return Ok(CompletionOutcome::AlreadyCounted);
        }

        let user_id = match self.store.user_id().await {
            Some(user_id) => user_id,
            None => {
                self.release(unit_id).await;
                bail!("Cannot record usage for {}: user identity not resolved", unit_id);
            }
        };

        let receipt = match self.backend.increment_usage(&user_id, unit_id).await {
            Ok(receipt) => receipt,
            Err(err) => {
                self.release(unit_id).await;
                return Err(err).context(format!("Failed to record completion of {}", unit_id));
            }
        };

        {
            let unit = unit_id.to_string();
            self.with_ledger(move |conn| UnitLedger::confirm(conn, &unit))
                .await?;
        }

        self.store.apply_usage_receipt(&receipt).await;
        info!(
            "Counted unit {} (usage {}/{})",
            unit_id,
            receipt.count,
            receipt
                .limit
                .map(|l| l.to_string())
                .unwrap_or_else(|| "unlimited".to_string())
        );

        Ok(CompletionOutcome::Counted {
            count: receipt.count,
            limit: receipt.limit,
        })
    }

    /// Put the unit back to `uncounted`. Best effort: if this also fails
    /// the stale-claim sweep at next startup will recover the unit.
    async fn release(&self, unit_id: &str) {
        let unit = unit_id.to_string();
        if let Err(err) = self
            .with_ledger(move |conn| UnitLedger::release(conn, &unit))
            .await
        {
            warn!("Failed to release claim on unit {}: {}", unit_id, err);
        }
    }

    async fn with_ledger<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let conn = db::open_at(&db_path)?;
            op(&conn)
        })
        .await
        .context("Usage ledger task failed")?
    }
}
