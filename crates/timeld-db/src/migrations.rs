//! Forward-only schema migrations.
//!
//! `PRAGMA user_version` records how many entries of [`MIGRATIONS`] have
//! been applied. A replica written by a newer build is refused rather than
//! guessed at; it can be rebuilt from the domain's other replicas.

use rusqlite::Connection;
use tracing::{debug, info};

use crate::{schema, DbError, Result};

/// Migration scripts, oldest first. Entry `n` upgrades version `n` to `n + 1`.
const MIGRATIONS: &[&str] = &[schema::SCHEMA_V1];

/// Schema version after all migrations.
pub const fn latest() -> u32 {
    MIGRATIONS.len() as u32
}

fn user_version(conn: &Connection) -> Result<u32> {
    Ok(conn.pragma_query_value(None, "user_version", |row| row.get(0))?)
}

/// Bring the schema up to [`latest`].
pub fn run(conn: &Connection) -> Result<()> {
    let current = user_version(conn)?;
    if current > latest() {
        return Err(DbError::Migration(format!(
            "replica schema v{current} is newer than supported v{}",
            latest()
        )));
    }
    if current == latest() {
        debug!(version = current, "Replica schema up to date");
        return Ok(());
    }

    for (version, script) in (current..).zip(&MIGRATIONS[current as usize..]) {
        let next = version + 1;
        let tx = conn.unchecked_transaction()?;
        tx.execute_batch(script)
            .map_err(|e| DbError::Migration(format!("v{version} -> v{next}: {e}")))?;
        tx.pragma_update(None, "user_version", next)?;
        tx.commit()?;
        info!(version = next, "Replica schema migrated");
    }
    Ok(())
}
