//! Bidirectional synchronization between the local bug store and a remote
//! tracker.
//!
//! # Submodules
//!
//! - [`iterator`] - resumable pagination (cursor + composite issue iterator)
//! - [`classify`] - remote activity record → typed event kind
//! - [`identity`] - remote user → local identity, cached per pass
//! - [`import`] - remote → local driver
//! - [`export`] - local → remote driver
//! - [`events`] - notifications streamed by both drivers
//!
//! Import and export are independent passes. Each runs as one task and
//! streams [`ImportEvent`]s / [`ExportEvent`]s over an unbounded channel. Both
//! mutate the store; the caller must not run them concurrently on one store.

pub mod classify;
pub mod events;
pub mod export;
pub mod identity;
pub mod import;
pub mod iterator;

pub use classify::{NoteKind, classify};
pub use events::{ExportEvent, ImportEvent};
pub use export::Exporter;
pub use identity::IdentityResolver;
pub use import::Importer;
pub use iterator::{Cursor, IssueIterator};

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::{Error, Result};
use crate::model::Snapshot;

/// Value of the origin tag for bugs that belong to this remote.
pub const TARGET: &str = "gitea";

/// Metadata key naming the system a bug was first created on.
pub const KEY_ORIGIN: &str = "origin";
/// Remote identifier of the record an operation came from or was pushed to.
pub const KEY_ID: &str = "gitea-id";
pub const KEY_URL: &str = "gitea-url";
pub const KEY_LOGIN: &str = "gitea-login";
pub const KEY_BASE_URL: &str = "gitea-base-url";
pub const KEY_PROJECT: &str = "gitea-project";

/// Default per-call timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
/// Default listing page size.
pub const DEFAULT_PAGE_SIZE: u32 = 10;

/// The remote repository a pass synchronizes with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeTarget {
    pub base_url: String,
    pub owner: String,
    pub project: String,
}

impl BridgeTarget {
    #[must_use]
    pub fn new(base_url: &str, owner: &str, project: &str) -> Self {
        Self {
            base_url: base_url.to_string(),
            owner: owner.to_string(),
            project: project.to_string(),
        }
    }

    /// Value of the project metadata tag: `owner/project`.
    #[must_use]
    pub fn project_key(&self) -> String {
        format!("{}/{}", self.owner, self.project)
    }

    /// True if a bug's creation metadata ties it to `number` on this target.
    #[must_use]
    pub fn owns(&self, snapshot: &Snapshot, number: i64) -> bool {
        snapshot.get_create_metadata(KEY_ORIGIN) == Some(TARGET)
            && snapshot.get_create_metadata(KEY_ID) == Some(number.to_string().as_str())
            && snapshot.get_create_metadata(KEY_PROJECT) == Some(self.project_key().as_str())
            && snapshot
                .get_create_metadata(KEY_BASE_URL)
                .is_some_and(|url| same_base_url(url, &self.base_url))
    }
}

/// Compare base URLs ignoring a trailing slash.
#[must_use]
pub fn same_base_url(a: &str, b: &str) -> bool {
    a.trim_end_matches('/') == b.trim_end_matches('/')
}

/// Tunables shared by both drivers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOptions {
    /// Bound on each remote call
    pub timeout: Duration,
    /// Items requested per listing page
    pub page_size: u32,
    /// Import: only issues updated since. Export: only bugs created since.
    pub since: Option<DateTime<Utc>>,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            page_size: DEFAULT_PAGE_SIZE,
            since: None,
        }
    }
}

/// Run a remote call under the per-call timeout.
pub(crate) async fn bounded<T, F>(timeout: Duration, call: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::time::timeout(timeout, call)
        .await
        .unwrap_or_else(|_| Err(Error::Timeout(timeout)))
}

/// Whether an error stops the whole pass rather than the current bug/issue.
pub(crate) fn aborts_pass(err: &Error) -> bool {
    !err.is_local_to_entity()
}
