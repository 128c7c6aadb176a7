//! Remote user → local identity mapping.
//!
//! Lookup order: the per-pass cache, then the store by remote id, then the
//! remote profile. A fetched profile whose login matches a local identity
//! that has no remote id yet (one created locally for that login) reuses it
//! and records the remote id on it, so later passes find it by id;
//! otherwise a new identity is created and tagged with the remote id and
//! login. Several identities claiming one remote id is an error, never merged.

use std::collections::HashMap;
use std::time::Duration;

use tracing::{debug, info};

use crate::bridge::{KEY_ID, KEY_LOGIN, bounded};
use crate::error::{Error, Result};
use crate::model::{Identity, metadata};
use crate::remote::RemoteApi;
use crate::storage::BugStore;

/// Identity cache for one sync pass.
#[derive(Debug, Default)]
pub struct IdentityResolver {
    cache: HashMap<i64, Identity>,
}

impl IdentityResolver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve a remote user id to a local identity.
    ///
    /// Returns the identity and whether it was created by this call.
    ///
    /// # Errors
    ///
    /// Returns `AmbiguousIdentity` if several local identities carry the
    /// remote id (or, for an untagged match, the login), and any store or
    /// remote error.
    pub async fn resolve<R, S>(
        &mut self,
        client: &R,
        store: &mut S,
        remote_id: i64,
        timeout: Duration,
    ) -> Result<(Identity, bool)>
    where
        R: RemoteApi,
        S: BugStore,
    {
        if let Some(identity) = self.cache.get(&remote_id) {
            return Ok((identity.clone(), false));
        }

        let id_value = remote_id.to_string();
        match store.resolve_identity_by_metadata(KEY_ID, &id_value) {
            Ok(identity) => {
                self.cache.insert(remote_id, identity.clone());
                return Ok((identity, false));
            }
            Err(Error::IdentityNotFound { .. }) => {}
            Err(err) => return Err(err),
        }

        let user = bounded(timeout, client.get_user(remote_id)).await?;

        match store.resolve_identity_by_metadata(KEY_LOGIN, &user.login) {
            Ok(mut identity) if identity.get_metadata(KEY_ID).is_none() => {
                debug!(login = %user.login, identity = %identity.id, "matched local identity by login");
                store.add_identity_metadata(&identity.id, KEY_ID, &id_value)?;
                identity.metadata.insert(KEY_ID.to_string(), id_value);
                self.cache.insert(remote_id, identity.clone());
                return Ok((identity, false));
            }
            Ok(_) | Err(Error::IdentityNotFound { .. }) => {}
            Err(err) => return Err(err),
        }

        let identity = Identity::new_raw(
            &user.full_name,
            &user.login,
            Some(&user.email),
            Some(&user.avatar_url),
            metadata([(KEY_ID, id_value.as_str()), (KEY_LOGIN, user.login.as_str())]),
        );
        store.create_identity(&identity)?;
        info!(login = %user.login, identity = %identity.id, "created identity");

        self.cache.insert(remote_id, identity.clone());
        Ok((identity, true))
    }
}
