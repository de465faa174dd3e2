//! Schema migrations for the document store.
//!
//! `PRAGMA user_version` records the last applied step; opening a store
//! applies whatever steps remain, each inside its own transaction.

pub mod v001_initial;

use rusqlite::Connection;

use crate::error::{Result, StoreError};

type Step = fn(&Connection) -> std::result::Result<(), rusqlite::Error>;

/// Ordered steps. Entry `i` upgrades the schema from version `i` to `i + 1`.
const STEPS: &[(&str, Step)] = &[("v001_initial", v001_initial::up)];

/// Schema version a fully migrated database reports.
pub fn latest_version() -> u32 {
    STEPS.len() as u32
}

pub fn run_migrations(conn: &mut Connection) -> Result<()> {
    let current: u32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    let target = latest_version();

    if current > target {
        return Err(StoreError::Migration(format!(
            "database schema v{current} is newer than this build (v{target})"
        )));
    }
    if current == target {
        tracing::debug!(version = current, "document schema up to date");
        return Ok(());
    }

    for (index, (name, step)) in STEPS.iter().enumerate().skip(current as usize) {
        let version = index as u32 + 1;
        tracing::info!(migration = name, version, "applying document schema step");

        let tx = conn.transaction()?;
        step(&tx).map_err(|e| StoreError::Migration(format!("{name}: {e}")))?;
        tx.pragma_update(None, "user_version", version)?;
        tx.commit()?;
    }
    Ok(())
}
