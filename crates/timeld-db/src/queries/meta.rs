//! Replica metadata query functions.

use rusqlite::Connection;

use crate::{DbError, Result};

/// Metadata key: the domain name this replica belongs to.
pub const DOMAIN: &str = "domain";
/// Metadata key: whether this replica created its domain.
pub const GENESIS: &str = "genesis";

/// Get a metadata value by key.
pub fn get(conn: &Connection, key: &str) -> Result<String> {
    conn.query_row("SELECT value FROM meta WHERE key = ?1", [key], |row| {
        row.get(0)
    })
    .map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => DbError::NotFound(format!("meta '{key}'")),
        other => DbError::Sqlite(other),
    })
}

/// Get a metadata value, or `None` if unset.
pub fn get_opt(conn: &Connection, key: &str) -> Result<Option<String>> {
    match get(conn, key) {
        Ok(v) => Ok(Some(v)),
        Err(DbError::NotFound(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Set a metadata value.
pub fn set(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO meta (key, value) VALUES (?1, ?2)",
        rusqlite::params![key, value],
    )?;
    Ok(())
}

/// Get a metadata value as a boolean, defaulting to `default` if not found.
pub fn get_bool(conn: &Connection, key: &str, default: bool) -> Result<bool> {
    Ok(get_opt(conn, key)?
        .map(|v| v == "true" || v == "1")
        .unwrap_or(default))
}
