//! Local persistence.
//!
//! Raw SQL over rusqlite, no ORM. Holds the usage-unit counted-state
//! ledger (the double-billing guard, which must survive restarts) and the
//! last good entitlement snapshot.

pub mod snapshot;
pub mod units;

use anyhow::{Context, Result};
use rusqlite::Connection;
use std::path::Path;
use std::time::Duration;

/// Open the database at the default location, creating it if needed.
pub fn open() -> Result<Connection> {
    let db_path = crate::global::db_file()?;

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent).context("Failed to create database directory")?;
    }

    open_at(&db_path)
}

/// Open a database at an explicit path. Used directly by tests.
pub fn open_at(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path).context("Failed to open database connection")?;

    // Completion signals can race in from separate blocking tasks; wait out
    // a writer instead of failing with SQLITE_BUSY.
    conn.busy_timeout(Duration::from_secs(5))
        .context("Failed to set busy timeout")?;

    migrate(&conn)?;

    Ok(conn)
}

pub fn migrate(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS usage_units (
            unit_id TEXT PRIMARY KEY,
            state TEXT NOT NULL DEFAULT 'uncounted',
            claimed_at TIMESTAMP,
            counted_at TIMESTAMP,
            created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )
    .context("Failed to create usage_units table")?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_usage_units_state ON usage_units(state)",
        [],
    )
    .context("Failed to create usage_units state index")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS entitlement_snapshot (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            user_id TEXT,
            payload TEXT NOT NULL,
            updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )
    .context("Failed to create entitlement_snapshot table")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrate_creates_tables() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();

        for table in ["usage_units", "entitlement_snapshot"] {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
                    [table],
                    |row| row.get(0),
                )
                .unwrap();
            assert_eq!(count, 1, "missing table {table}");
        }
    }

    #[test]
    fn test_migrate_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        migrate(&conn).unwrap();
    }
}
