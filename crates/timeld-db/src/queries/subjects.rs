//! Subject query functions.

use rusqlite::{Connection, OptionalExtension};
use timeld_types::{Subject, Update};

use crate::{DbError, Result};

/// Get a subject by `@id`.
pub fn get(conn: &Connection, id: &str) -> Result<Option<Subject>> {
    let body: Option<String> = conn
        .query_row("SELECT body FROM subjects WHERE id = ?1", [id], |row| {
            row.get(0)
        })
        .optional()?;
    body.map(|b| decode(&b)).transpose()
}

/// List subjects in read order, optionally restricted to one `@type`.
pub fn list(conn: &Connection, kind: Option<&str>) -> Result<Vec<Subject>> {
    let bodies: Vec<String> = match kind {
        Some(kind) => {
            let mut stmt =
                conn.prepare("SELECT body FROM subjects WHERE type = ?1 ORDER BY seq")?;
            let rows = stmt
                .query_map([kind], |row| row.get(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows
        }
        None => {
            let mut stmt = conn.prepare("SELECT body FROM subjects ORDER BY seq")?;
            let rows = stmt
                .query_map([], |row| row.get(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows
        }
    };
    bodies.iter().map(|b| decode(b)).collect()
}

/// Insert or replace a subject, keeping its read position if it exists.
pub fn put(conn: &Connection, subject: &Subject) -> Result<()> {
    let body =
        serde_json::to_string(subject).map_err(|e| DbError::Serialization(e.to_string()))?;
    conn.execute(
        "INSERT INTO subjects (id, type, body) VALUES (?1, ?2, ?3)
         ON CONFLICT(id) DO UPDATE SET type = excluded.type, body = excluded.body",
        rusqlite::params![subject.id, subject.kind, body],
    )?;
    Ok(())
}

/// Remove a subject.
pub fn remove(conn: &Connection, id: &str) -> Result<()> {
    conn.execute("DELETE FROM subjects WHERE id = ?1", [id])?;
    Ok(())
}

/// Count stored subjects.
pub fn count(conn: &Connection) -> Result<u64> {
    let n: i64 = conn.query_row("SELECT COUNT(*) FROM subjects", [], |row| row.get(0))?;
    Ok(n as u64)
}

/// Apply an update atomically.
///
/// Deletes are applied before inserts. A subject left with no type and no
/// properties is removed.
pub fn apply(conn: &Connection, update: &Update) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    for deleted in &update.deletes {
        if let Some(mut existing) = get(&tx, &deleted.id)? {
            existing.subtract(deleted);
            if existing.is_empty() {
                remove(&tx, &existing.id)?;
            } else {
                put(&tx, &existing)?;
            }
        }
    }
    for inserted in &update.inserts {
        let mut subject = get(&tx, &inserted.id)?.unwrap_or_else(|| Subject::new(&inserted.id));
        subject.merge(inserted);
        if !subject.is_empty() {
            put(&tx, &subject)?;
        }
    }
    tx.commit()?;
    Ok(())
}

fn decode(body: &str) -> Result<Subject> {
    serde_json::from_str(body).map_err(|e| DbError::Serialization(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn test_db() -> Connection {
        crate::open_memory().expect("open test db")
    }

    #[test]
    fn test_put_and_get() {
        let conn = test_db();
        let subject = Subject::typed("acme", "Account").with("email", json!("a@acme.com"));
        put(&conn, &subject).expect("put");
        assert_eq!(get(&conn, "acme").expect("get"), Some(subject));
        assert_eq!(get(&conn, "nobody").expect("get"), None);
    }

    #[test]
    fn test_list_keeps_first_insertion_order() {
        let conn = test_db();
        put(&conn, &Subject::typed("e2", "Entry")).expect("put");
        put(&conn, &Subject::typed("e1", "Entry")).expect("put");
        put(&conn, &Subject::typed("acme/ts1", "Timesheet")).expect("put");
        // Rewriting e2 must not move it to the end.
        put(&conn, &Subject::typed("e2", "Entry").with("duration", json!(30))).expect("put");

        let entries = list(&conn, Some("Entry")).expect("list");
        let ids: Vec<&str> = entries.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["e2", "e1"]);
        assert_eq!(list(&conn, None).expect("list all").len(), 3);
    }

    #[test]
    fn test_apply_merges_and_removes() {
        let conn = test_db();
        apply(
            &conn,
            &Update::inserting(Subject::typed("acme", "Account").with_ref("timesheet", "acme/ts1")),
        )
        .expect("insert");
        apply(
            &conn,
            &Update::inserting(Subject::new("acme").with_ref("timesheet", "acme/ts2")),
        )
        .expect("merge");

        let acme = get(&conn, "acme").expect("get").expect("exists");
        assert_eq!(acme.refs("timesheet"), vec!["acme/ts1", "acme/ts2"]);

        apply(
            &conn,
            &Update::deleting(
                Subject::typed("acme", "Account")
                    .with_ref("timesheet", "acme/ts1")
                    .with_ref("timesheet", "acme/ts2"),
            ),
        )
        .expect("delete");
        assert_eq!(get(&conn, "acme").expect("get"), None);
        assert_eq!(count(&conn).expect("count"), 0);
    }

    #[test]
    fn test_delete_of_missing_subject_is_noop() {
        let conn = test_db();
        apply(&conn, &Update::deleting(Subject::new("ghost").with("x", json!(1))))
            .expect("apply");
        assert_eq!(count(&conn).expect("count"), 0);
    }
}
