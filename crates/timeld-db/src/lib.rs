//! # timeld-db
//!
//! SQLite storage for one domain replica. Each replica directory holds a
//! single [`REPLICA_FILE`].
//!
//! Tables:
//! - `subjects`: one JSON document per subject, in first-insertion order
//! - `meta`: replica metadata (domain name, genesis flag)
//!
//! The schema version lives in `PRAGMA user_version`; see [`migrations`].

pub mod migrations;
pub mod queries;
pub mod schema;

use rusqlite::Connection;
use std::path::Path;

/// File name of the replica database inside a replica directory.
pub const REPLICA_FILE: &str = "replica.db";

/// Database error types.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("migration failed: {0}")]
    Migration(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// A stored subject body is not valid JSON, or a subject failed to encode.
    #[error("serialization error: {0}")]
    Serialization(String),
}

pub type Result<T> = std::result::Result<T, DbError>;

/// Open or create a replica database at the given path, in WAL mode and
/// migrated to the latest schema.
pub fn open(path: &Path) -> Result<Connection> {
    prepare(Connection::open(path)?)
}

/// Open an in-memory database (for testing).
pub fn open_memory() -> Result<Connection> {
    prepare(Connection::open_in_memory()?)
}

fn prepare(conn: Connection) -> Result<Connection> {
    // Writers are serialised above this layer; the timeout only covers
    // readers racing a checkpoint.
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA busy_timeout = 5000;
         PRAGMA synchronous = NORMAL;",
    )?;
    migrations::run(&conn)?;
    Ok(conn)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn version(conn: &Connection) -> u32 {
        conn.pragma_query_value(None, "user_version", |row| row.get(0))
            .expect("get user_version")
    }

    #[test]
    fn test_open_memory() {
        let conn = open_memory().expect("open in-memory db");
        assert_eq!(version(&conn), migrations::latest());
    }

    #[test]
    fn test_reopen_keeps_data() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(REPLICA_FILE);

        let conn = open(&path).expect("first open");
        queries::meta::set(&conn, queries::meta::DOMAIN, "ts1.acme.example.org")
            .expect("set domain");
        drop(conn);

        let conn = open(&path).expect("second open");
        assert_eq!(version(&conn), migrations::latest());
        assert_eq!(
            queries::meta::get(&conn, queries::meta::DOMAIN).expect("domain"),
            "ts1.acme.example.org"
        );
    }
}
