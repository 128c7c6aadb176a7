//! SQLite storage implementation.
//!
//! Every write goes through [`SqliteStore::mutate`], which wraps the closure
//! in an IMMEDIATE transaction. A bug commit therefore lands completely or not
//! at all, which is what makes each commit a safe resume point for the sync
//! drivers.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use rusqlite::{Connection, OptionalExtension, Row, Transaction};
use tracing::debug;

use crate::error::{Error, Result};
use crate::model::{Bug, Identity, Operation, OperationKind};
use crate::storage::schema::apply_schema;
use crate::storage::{BugStore, match_id_prefix, single_identity};

/// SQLite-based [`BugStore`].
#[derive(Debug)]
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open a database at the given path.
    ///
    /// Creates the database and applies schema if it doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established or schema fails.
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with_timeout(path, None)
    }

    /// Open a database with an optional busy timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established or schema fails.
    pub fn open_with_timeout(path: &Path, timeout_ms: Option<u64>) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_millis(timeout_ms.unwrap_or(5000)))?;
        apply_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        apply_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Execute a mutation inside an IMMEDIATE transaction.
    ///
    /// The transaction is rolled back if the closure fails.
    ///
    /// # Errors
    ///
    /// Returns an error if any step fails.
    pub fn mutate<F, R>(&mut self, op: &str, f: F) -> Result<R>
    where
        F: FnOnce(&Transaction) -> Result<R>,
    {
        let tx = self
            .conn
            .transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;
        let result = f(&tx)?;
        tx.commit()?;
        debug!(op, "committed");
        Ok(result)
    }

    fn load(&self, id: &str) -> Result<Bug> {
        let mut stmt = self.conn.prepare(
            "SELECT id, author, unix_time, payload, metadata
             FROM operations WHERE bug_id = ?1 ORDER BY seq",
        )?;
        let rows = stmt.query_map([id], map_operation_row)?;

        let mut operations = Vec::new();
        for row in rows {
            let (op_id, author, unix_time, payload, metadata) = row?;
            operations.push(Operation {
                id: op_id,
                author,
                unix_time,
                kind: parse_payload(&payload)?,
                metadata: serde_json::from_str(&metadata)?,
            });
        }

        if operations.is_empty() {
            let exists: Option<String> = self
                .conn
                .query_row("SELECT id FROM bugs WHERE id = ?1", [id], |row| row.get(0))
                .optional()?;
            if exists.is_none() {
                return Err(Error::BugNotFound { id: id.to_string() });
            }
        }

        Bug::from_operations(id.to_string(), operations)
    }
}

type OperationRow = (String, String, i64, String, String);

fn map_operation_row(row: &Row) -> rusqlite::Result<OperationRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
    ))
}

/// Decode a stored payload. Anything outside the closed operation set means
/// the log was written by something else or is corrupted.
fn parse_payload(payload: &str) -> Result<OperationKind> {
    serde_json::from_str(payload)
        .map_err(|e| Error::InvariantViolation(format!("undecodable operation payload: {e}")))
}

fn map_identity_row(row: &Row) -> rusqlite::Result<(Identity, String)> {
    Ok((
        Identity {
            id: row.get(0)?,
            name: row.get(1)?,
            login: row.get(2)?,
            email: row.get(3)?,
            avatar_url: row.get(4)?,
            metadata: BTreeMap::new(),
        },
        row.get(5)?,
    ))
}

impl BugStore for SqliteStore {
    fn all_bug_ids(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id FROM bugs ORDER BY created_at, rowid")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(ids)
    }

    fn resolve_bug(&self, id: &str) -> Result<Bug> {
        let ids = self.all_bug_ids()?;
        let full = match_id_prefix(&ids, id)?;
        self.load(full)
    }

    fn commit(&mut self, bug: &mut Bug) -> Result<()> {
        if !bug.need_commit() {
            return Ok(());
        }

        let first_seq = bug.operations().len() - bug.staged().len();
        let created_at = bug.operations().first().map_or(0, |op| op.unix_time);
        let bug_id = bug.id().to_string();
        let staged = bug.staged().to_vec();

        self.mutate("commit_bug", |tx| {
            tx.execute(
                "INSERT OR IGNORE INTO bugs (id, created_at) VALUES (?1, ?2)",
                rusqlite::params![bug_id, created_at],
            )?;

            for (offset, op) in staged.iter().enumerate() {
                tx.execute(
                    "INSERT INTO operations (bug_id, seq, id, author, unix_time, kind, payload, metadata)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    rusqlite::params![
                        bug_id,
                        i64::try_from(first_seq + offset).unwrap_or(i64::MAX),
                        op.id,
                        op.author,
                        op.unix_time,
                        op.kind.name(),
                        serde_json::to_string(&op.kind)?,
                        serde_json::to_string(&op.metadata)?,
                    ],
                )?;
            }
            Ok(())
        })?;

        bug.mark_committed();
        Ok(())
    }

    fn resolve_identity(&self, id: &str) -> Result<Identity> {
        let row = self
            .conn
            .query_row(
                "SELECT id, name, login, email, avatar_url, metadata FROM identities WHERE id = ?1",
                [id],
                map_identity_row,
            )
            .optional()?;

        let (mut identity, metadata) = row.ok_or_else(|| Error::IdentityNotFound {
            key: "id".to_string(),
            value: id.to_string(),
        })?;
        identity.metadata = serde_json::from_str(&metadata)?;
        Ok(identity)
    }

    fn resolve_identity_by_metadata(&self, key: &str, value: &str) -> Result<Identity> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, login, email, avatar_url, metadata FROM identities
             WHERE json_extract(metadata, '$.' || json_quote(?1)) = ?2
             ORDER BY created_at, rowid",
        )?;
        let rows = stmt.query_map(rusqlite::params![key, value], map_identity_row)?;

        let mut matches = Vec::new();
        for row in rows {
            let (mut identity, metadata) = row?;
            identity.metadata = serde_json::from_str(&metadata)?;
            matches.push(identity);
        }
        single_identity(matches, key, value)
    }

    fn create_identity(&mut self, identity: &Identity) -> Result<()> {
        let metadata = serde_json::to_string(&identity.metadata)?;
        let now = chrono::Utc::now().timestamp();
        self.mutate("create_identity", |tx| {
            tx.execute(
                "INSERT INTO identities (id, name, login, email, avatar_url, metadata, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    identity.id,
                    identity.name,
                    identity.login,
                    identity.email,
                    identity.avatar_url,
                    metadata,
                    now
                ],
            )?;
            Ok(())
        })
    }

    fn add_identity_metadata(&mut self, id: &str, key: &str, value: &str) -> Result<()> {
        let changed = self.mutate("add_identity_metadata", |tx| {
            Ok(tx.execute(
                "UPDATE identities
                 SET metadata = json_insert(metadata, '$.' || json_quote(?2), ?3)
                 WHERE id = ?1",
                rusqlite::params![id, key, value],
            )?)
        })?;
        if changed == 0 {
            return Err(Error::IdentityNotFound {
                key: "id".to_string(),
                value: id.to_string(),
            });
        }
        Ok(())
    }

    fn all_identities(&self) -> Result<Vec<Identity>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, login, email, avatar_url, metadata FROM identities
             ORDER BY created_at, rowid",
        )?;
        let rows = stmt.query_map([], map_identity_row)?;

        let mut identities = Vec::new();
        for row in rows {
            let (mut identity, metadata) = row?;
            identity.metadata = serde_json::from_str(&metadata)?;
            identities.push(identity);
        }
        Ok(identities)
    }
}
