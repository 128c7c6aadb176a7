//! Database schema definitions.
//!
//! Bugs are stored as their operation logs: one `bugs` row per bug and one
//! `operations` row per operation, ordered by `seq`. The operation payload
//! (kind-specific fields) and its metadata are JSON columns.

use rusqlite::{Connection, Result};

/// Current schema version for migration tracking.
pub const CURRENT_SCHEMA_VERSION: i32 = 1;

/// The complete SQL schema for the bugbridge database.
///
/// Timestamps are INTEGER Unix seconds, matching operation timestamps.
pub const SCHEMA_SQL: &str = r"
CREATE TABLE IF NOT EXISTS schema_migrations (
    version TEXT PRIMARY KEY,
    applied_at INTEGER NOT NULL
);

-- Bugs: one row per operation log
CREATE TABLE IF NOT EXISTS bugs (
    id TEXT PRIMARY KEY,
    created_at INTEGER NOT NULL
);

-- Operations: append-only, never updated
CREATE TABLE IF NOT EXISTS operations (
    bug_id TEXT NOT NULL REFERENCES bugs(id) ON DELETE CASCADE,
    seq INTEGER NOT NULL,
    id TEXT NOT NULL UNIQUE,
    author TEXT NOT NULL,
    unix_time INTEGER NOT NULL,
    kind TEXT NOT NULL,
    payload TEXT NOT NULL,
    metadata TEXT NOT NULL DEFAULT '{}',
    PRIMARY KEY (bug_id, seq)
);

CREATE INDEX IF NOT EXISTS idx_operations_bug ON operations(bug_id, seq);

-- Identities: local actors
CREATE TABLE IF NOT EXISTS identities (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    login TEXT NOT NULL,
    email TEXT,
    avatar_url TEXT,
    metadata TEXT NOT NULL DEFAULT '{}',
    created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_identities_login ON identities(login);
";

/// Apply pragmas and the schema to a connection.
///
/// # Errors
///
/// Returns an error if any statement fails.
pub fn apply_schema(conn: &Connection) -> Result<()> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;

    conn.execute_batch(SCHEMA_SQL)?;

    conn.execute(
        "INSERT OR IGNORE INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
        rusqlite::params![
            format!("v{CURRENT_SCHEMA_VERSION}"),
            chrono::Utc::now().timestamp()
        ],
    )?;

    Ok(())
}
