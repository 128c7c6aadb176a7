//! Local bug store.
//!
//! The sync drivers only need a narrow capability set from the store: list
//! and load bugs, find one by its creation metadata, commit staged
//! operations, and look identities up by metadata. [`BugStore`] is that seam.
//!
//! # Submodules
//!
//! - [`memory`] - HashMap-backed store (tests, dry runs)
//! - [`schema`] - SQLite schema definitions
//! - [`sqlite`] - SQLite store used by the CLI

pub mod memory;
pub mod schema;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::error::{Error, Result};
use crate::model::{Bug, Identity};

/// Persistence for bugs and identities.
///
/// Methods are synchronous: the store is owned by the single task driving a
/// sync pass and is never shared across tasks while the pass runs.
pub trait BugStore {
    /// Ids of every bug in the store, in a stable order.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    fn all_bug_ids(&self) -> Result<Vec<String>>;

    /// Load a bug by full id or unique id prefix.
    ///
    /// # Errors
    ///
    /// Returns `BugNotFound` or `AmbiguousBug`.
    fn resolve_bug(&self, id: &str) -> Result<Bug>;

    /// Persist the bug's staged operations and mark them committed.
    ///
    /// Committing a bug with nothing staged is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails; nothing is persisted in that case.
    fn commit(&mut self, bug: &mut Bug) -> Result<()>;

    /// Load an identity by id.
    ///
    /// # Errors
    ///
    /// Returns `IdentityNotFound` if absent.
    fn resolve_identity(&self, id: &str) -> Result<Identity>;

    /// Find the single identity carrying `key=value` in its metadata.
    ///
    /// # Errors
    ///
    /// Returns `IdentityNotFound` if none match and `AmbiguousIdentity` if
    /// several do.
    fn resolve_identity_by_metadata(&self, key: &str, value: &str) -> Result<Identity>;

    /// Persist a new identity.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn create_identity(&mut self, identity: &Identity) -> Result<()>;

    /// Record `key=value` on a stored identity unless the key is already set.
    ///
    /// # Errors
    ///
    /// Returns `IdentityNotFound` if no identity has this id.
    fn add_identity_metadata(&mut self, id: &str, key: &str, value: &str) -> Result<()>;

    /// Every identity in the store.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    fn all_identities(&self) -> Result<Vec<Identity>>;
}

/// Pick the single identity carrying `key=value`.
pub(crate) fn single_identity(
    mut matches: Vec<Identity>,
    key: &str,
    value: &str,
) -> Result<Identity> {
    match matches.len() {
        0 => Err(Error::IdentityNotFound {
            key: key.to_string(),
            value: value.to_string(),
        }),
        1 => Ok(matches.remove(0)),
        count => Err(Error::AmbiguousIdentity {
            key: key.to_string(),
            value: value.to_string(),
            count,
        }),
    }
}

/// Resolve a full id or unique prefix against a list of ids.
pub(crate) fn match_id_prefix<'a>(ids: &'a [String], wanted: &str) -> Result<&'a str> {
    if let Some(exact) = ids.iter().find(|id| id.as_str() == wanted) {
        return Ok(exact);
    }
    let candidates: Vec<&String> = ids.iter().filter(|id| id.starts_with(wanted)).collect();
    match candidates.as_slice() {
        [] => Err(Error::BugNotFound {
            id: wanted.to_string(),
        }),
        [one] => Ok(one.as_str()),
        many => Err(Error::AmbiguousBug {
            ids: many.iter().map(|s| (*s).clone()).collect(),
        }),
    }
}
