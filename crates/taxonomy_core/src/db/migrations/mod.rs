//! Taxonomy schema migrations.
//!
//! Migration 1 creates the two record tables (`tags`, `categories`) and the
//! two membership relations (`category_tags`, `category_categories`), each
//! keyed by both participant ids.
//!
//! # Invariants
//! - Versions increase by one per entry; the last entry is the schema this
//!   binary reads and writes.
//! - All pending migrations commit together and `PRAGMA user_version` moves
//!   with them, so a half-migrated file is never observed.

use crate::db::{DbError, DbResult};
use log::info;
use rusqlite::Connection;

#[derive(Debug, Clone, Copy)]
struct Migration {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "taxonomy_records_and_memberships",
    sql: include_str!("0001_taxonomy.sql"),
}];

/// Schema version written by the newest migration.
pub fn latest_version() -> u32 {
    MIGRATIONS.last().map_or(0, |migration| migration.version)
}

/// Brings `conn` up to `latest_version()`.
///
/// # Errors
/// - `DbError::UnsupportedSchemaVersion` when the file was written by a newer
///   binary; nothing is changed in that case.
pub fn apply_migrations(conn: &mut Connection) -> DbResult<()> {
    let stored_version: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    let target_version = latest_version();
    if stored_version > target_version {
        return Err(DbError::UnsupportedSchemaVersion {
            db_version: stored_version,
            latest_supported: target_version,
        });
    }

    let pending: Vec<&Migration> = MIGRATIONS
        .iter()
        .filter(|migration| migration.version > stored_version)
        .collect();
    if pending.is_empty() {
        return Ok(());
    }

    let tx = conn.transaction()?;
    for migration in &pending {
        tx.execute_batch(migration.sql)?;
        tx.pragma_update(None, "user_version", migration.version)?;
        info!(
            "event=db_migrate module=db status=applied version={} name={}",
            migration.version, migration.name
        );
    }
    tx.commit()?;

    info!(
        "event=db_migrate module=db status=ok from_version={stored_version} to_version={target_version}"
    );
    Ok(())
}
