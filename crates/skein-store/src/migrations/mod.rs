//! Schema migrations, applied in order each time the index is opened.
//! `PRAGMA user_version` records the last one applied.

pub mod v001_initial;

use rusqlite::Connection;

use crate::error::{Result, StoreError};

type Migration = fn(&Connection) -> rusqlite::Result<()>;

/// Ordered list; a migration's version is its position plus one.
const MIGRATIONS: &[(&str, Migration)] = &[("v001_initial", v001_initial::up)];

pub fn run_migrations(conn: &Connection) -> Result<()> {
    let applied: u32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    let pending = MIGRATIONS.iter().zip(1u32..).skip(applied as usize);

    for ((name, up), version) in pending {
        tracing::info!(migration = *name, "Applying index migration");
        up(conn).map_err(|e| StoreError::Migration(format!("{name}: {e}")))?;
        conn.pragma_update(None, "user_version", version)?;
    }

    tracing::debug!(version = MIGRATIONS.len(), "Index schema up to date");
    Ok(())
}
