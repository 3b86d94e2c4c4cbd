//! Usage-unit counted-state ledger.
//!
//! Tri-state guard against double increment: `uncounted -> counting ->
//! counted`, with `counting -> uncounted` on backend failure. The claim is
//! a single conditional UPDATE, so exactly one caller wins no matter how
//! many completion signals arrive for the same unit.

use anyhow::{bail, Context, Result};
use rusqlite::{params, Connection, OptionalExtension};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitState {
    Uncounted,
    Counting,
    Counted,
}

impl UnitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnitState::Uncounted => "uncounted",
            UnitState::Counting => "counting",
            UnitState::Counted => "counted",
        }
    }

    pub fn from_str(s: &str) -> Result<UnitState> {
        match s {
            "uncounted" => Ok(UnitState::Uncounted),
            "counting" => Ok(UnitState::Counting),
            "counted" => Ok(UnitState::Counted),
            _ => bail!("Invalid unit state: {}", s),
        }
    }
}

/// Repository for usage-unit rows.
pub struct UnitLedger;

impl UnitLedger {
    /// Make sure a row exists for the unit, in `uncounted` state if new.
    pub fn ensure(conn: &Connection, unit_id: &str) -> Result<()> {
        conn.execute(
            "INSERT OR IGNORE INTO usage_units (unit_id, state) VALUES (?1, 'uncounted')",
            params![unit_id],
        )
        .context("Failed to ensure usage unit row")?;
        Ok(())
    }

    /// Atomically claim the unit for counting. Returns true for the single
    /// caller that moved it from `uncounted` to `counting`; false when the
    /// unit is already being counted or was counted before.
    pub fn claim(conn: &Connection, unit_id: &str) -> Result<bool> {
        Self::ensure(conn, unit_id)?;

        let updated = conn
            .execute(
                "UPDATE usage_units SET state = 'counting', claimed_at = CURRENT_TIMESTAMP \
                 WHERE unit_id = ?1 AND state = 'uncounted'",
                params![unit_id],
            )
            .context("Failed to claim usage unit")?;

        Ok(updated == 1)
    }

    /// Mark a claimed unit as counted after the backend confirmed the
    /// increment.
    pub fn confirm(conn: &Connection, unit_id: &str) -> Result<()> {
        let updated = conn
            .execute(
                "UPDATE usage_units SET state = 'counted', counted_at = CURRENT_TIMESTAMP \
                 WHERE unit_id = ?1 AND state = 'counting'",
                params![unit_id],
            )
            .context("Failed to confirm usage unit")?;

        if updated != 1 {
            bail!("Cannot confirm unit {}: not in counting state", unit_id);
        }
        Ok(())
    }

    /// Return a claimed unit to `uncounted` so a later call can retry.
    /// A release of a unit that is not `counting` is a no-op.
    pub fn release(conn: &Connection, unit_id: &str) -> Result<()> {
        conn.execute(
            "UPDATE usage_units SET state = 'uncounted', claimed_at = NULL \
             WHERE unit_id = ?1 AND state = 'counting'",
            params![unit_id],
        )
        .context("Failed to release usage unit")?;
        Ok(())
    }

    /// Release claims older than `minutes`. A crash between claim and
    /// confirm would otherwise pin the unit in `counting` forever.
    pub fn release_stale(conn: &Connection, minutes: i64) -> Result<usize> {
        let cutoff = format!("-{} minutes", minutes);
        let released = conn
            .execute(
                "UPDATE usage_units SET state = 'uncounted', claimed_at = NULL \
                 WHERE state = 'counting' AND claimed_at <= datetime('now', ?1)",
                params![cutoff],
            )
            .context("Failed to release stale claims")?;
        Ok(released)
    }

    pub fn state(conn: &Connection, unit_id: &str) -> Result<Option<UnitState>> {
        let state: Option<String> = conn
            .query_row(
                "SELECT state FROM usage_units WHERE unit_id = ?1",
                params![unit_id],
                |row| row.get(0),
            )
            .optional()
            .context("Failed to query unit state")?;

        state.as_deref().map(UnitState::from_str).transpose()
    }
}
