//! SQL schema for a single domain replica.

/// Schema v1.
///
/// `subjects.seq` fixes the read order of a domain: a subject keeps the
/// position of its first insertion for as long as it exists.
pub const SCHEMA_V1: &str = r#"
CREATE TABLE IF NOT EXISTS subjects (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    id TEXT NOT NULL UNIQUE,
    type TEXT,
    body TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_subjects_type ON subjects(type, seq);

CREATE TABLE IF NOT EXISTS meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;
