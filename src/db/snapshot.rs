//! Last-good entitlement snapshot.
//!
//! Single-row table so a restart can show the previous entitlement
//! immediately instead of flashing the free default while the first
//! refresh is in flight.

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::warn;

use crate::entitlement::Entitlement;

#[derive(Debug, Clone)]
pub struct StoredSnapshot {
    pub user_id: Option<String>,
    pub entitlement: Entitlement,
}

pub struct SnapshotRepository;

impl SnapshotRepository {
    pub fn save(conn: &Connection, user_id: Option<&str>, entitlement: &Entitlement) -> Result<()> {
        let payload =
            serde_json::to_string(entitlement).context("Failed to serialize entitlement")?;

        conn.execute(
            "INSERT OR REPLACE INTO entitlement_snapshot (id, user_id, payload, updated_at) \
             VALUES (1, ?1, ?2, CURRENT_TIMESTAMP)",
            params![user_id, payload],
        )
        .context("Failed to save entitlement snapshot")?;
        Ok(())
    }

    /// Load the stored snapshot. A corrupt payload is dropped with a
    /// warning rather than failing startup.
    pub fn load(conn: &Connection) -> Result<Option<StoredSnapshot>> {
        let row: Option<(Option<String>, String)> = conn
            .query_row(
                "SELECT user_id, payload FROM entitlement_snapshot WHERE id = 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .context("Failed to load entitlement snapshot")?;

        let Some((user_id, payload)) = row else {
            return Ok(None);
        };

        match serde_json::from_str(&payload) {
            Ok(entitlement) => Ok(Some(StoredSnapshot {
                user_id,
                entitlement,
            })),
            Err(e) => {
                warn!("Discarding unreadable entitlement snapshot: {}", e);
                Ok(None)
            }
        }
    }
}
