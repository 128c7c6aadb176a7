//! In-memory storage backend.
//!
//! Bugs are kept as committed operation logs in a `HashMap`, with a separate
//! insertion-order list so listing is stable. Suitable for tests and dry runs;
//! nothing survives the process.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::model::{Bug, Identity, Operation};
use crate::storage::{BugStore, match_id_prefix, single_identity};

/// HashMap-backed [`BugStore`].
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    bugs: HashMap<String, Vec<Operation>>,
    bug_order: Vec<String>,
    identities: HashMap<String, Identity>,
    identity_order: Vec<String>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of committed operations across all bugs.
    #[must_use]
    pub fn operation_count(&self) -> usize {
        self.bugs.values().map(Vec::len).sum()
    }

    fn load(&self, id: &str) -> Result<Bug> {
        let ops = self.bugs.get(id).ok_or_else(|| Error::BugNotFound {
            id: id.to_string(),
        })?;
        Bug::from_operations(id.to_string(), ops.clone())
    }
}

impl BugStore for MemoryStore {
    fn all_bug_ids(&self) -> Result<Vec<String>> {
        Ok(self.bug_order.clone())
    }

    fn resolve_bug(&self, id: &str) -> Result<Bug> {
        let full = match_id_prefix(&self.bug_order, id)?;
        self.load(full)
    }

    fn commit(&mut self, bug: &mut Bug) -> Result<()> {
        if !bug.need_commit() {
            return Ok(());
        }
        let staged = bug.staged().to_vec();
        match self.bugs.get_mut(bug.id()) {
            Some(ops) => ops.extend(staged),
            None => {
                self.bug_order.push(bug.id().to_string());
                self.bugs.insert(bug.id().to_string(), staged);
            }
        }
        bug.mark_committed();
        Ok(())
    }

    fn resolve_identity(&self, id: &str) -> Result<Identity> {
        self.identities
            .get(id)
            .cloned()
            .ok_or_else(|| Error::IdentityNotFound {
                key: "id".to_string(),
                value: id.to_string(),
            })
    }

    fn resolve_identity_by_metadata(&self, key: &str, value: &str) -> Result<Identity> {
        let matches = self
            .identity_order
            .iter()
            .filter_map(|id| self.identities.get(id))
            .filter(|i| i.get_metadata(key) == Some(value))
            .cloned()
            .collect();
        single_identity(matches, key, value)
    }

    fn create_identity(&mut self, identity: &Identity) -> Result<()> {
        if self
            .identities
            .insert(identity.id.clone(), identity.clone())
            .is_none()
        {
            self.identity_order.push(identity.id.clone());
        }
        Ok(())
    }

    fn add_identity_metadata(&mut self, id: &str, key: &str, value: &str) -> Result<()> {
        let identity = self
            .identities
            .get_mut(id)
            .ok_or_else(|| Error::IdentityNotFound {
                key: "id".to_string(),
                value: id.to_string(),
            })?;
        identity
            .metadata
            .entry(key.to_string())
            .or_insert_with(|| value.to_string());
        Ok(())
    }

    fn all_identities(&self) -> Result<Vec<Identity>> {
        Ok(self
            .identity_order
            .iter()
            .filter_map(|id| self.identities.get(id))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Metadata, metadata};

    #[test]
    fn test_commit_and_reload() {
        let mut store = MemoryStore::new();
        let mut bug = Bug::new_raw("alice", 1, "title", "body", Metadata::new()).unwrap();
        store.commit(&mut bug).unwrap();
        assert!(!bug.need_commit());

        bug.add_comment_raw("alice", 2, "more", Metadata::new()).unwrap();
        store.commit(&mut bug).unwrap();

        let loaded = store.resolve_bug(&bug.id()[..8]).unwrap();
        assert_eq!(loaded.operations().len(), 2);
        assert_eq!(store.operation_count(), 2);
    }

    #[test]
    fn test_resolve_bug_by_prefix() {
        let mut store = MemoryStore::new();
        let mut a = Bug::new_raw("alice", 1, "a", "", metadata([("gitea-id", "1")])).unwrap();
        let mut b = Bug::new_raw("alice", 1, "b", "", metadata([("gitea-id", "2")])).unwrap();
        store.commit(&mut a).unwrap();
        store.commit(&mut b).unwrap();

        let found = store.resolve_bug(b.id()).unwrap();
        assert_eq!(found.snapshot().get_create_metadata("gitea-id"), Some("2"));

        let err = store.resolve_bug("zz-not-an-id").unwrap_err();
        assert!(matches!(err, Error::BugNotFound { .. }));

        let err = store.resolve_bug("").unwrap_err();
        assert!(matches!(err, Error::AmbiguousBug { .. }));
    }

    #[test]
    fn test_add_identity_metadata_is_insert_only() {
        let mut store = MemoryStore::new();
        let one = Identity::new_raw("A", "a", None, None, metadata([("gitea-login", "a")]));
        store.create_identity(&one).unwrap();

        store.add_identity_metadata(&one.id, "gitea-id", "9").unwrap();
        store.add_identity_metadata(&one.id, "gitea-id", "10").unwrap();
        let stored = store.resolve_identity(&one.id).unwrap();
        assert_eq!(stored.get_metadata("gitea-id"), Some("9"));
        assert_eq!(stored.get_metadata("gitea-login"), Some("a"));

        let err = store.add_identity_metadata("nope", "gitea-id", "9").unwrap_err();
        assert!(matches!(err, Error::IdentityNotFound { .. }));
    }

    #[test]
    fn test_identity_lookup_is_never_auto_merged() {
        let mut store = MemoryStore::new();
        let one = Identity::new_raw("A", "a", None, None, metadata([("gitea-id", "9")]));
        let two = Identity::new_raw("B", "b", None, None, metadata([("gitea-id", "9")]));
        store.create_identity(&one).unwrap();

        assert_eq!(
            store.resolve_identity_by_metadata("gitea-id", "9").unwrap().id,
            one.id
        );

        store.create_identity(&two).unwrap();
        let err = store
            .resolve_identity_by_metadata("gitea-id", "9")
            .unwrap_err();
        assert!(matches!(err, Error::AmbiguousIdentity { count: 2, .. }));
    }
}
