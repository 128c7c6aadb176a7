//! Remote issue tracker boundary.
//!
//! [`RemoteApi`] is the read/write capability set the sync drivers need from a
//! remote tracker. [`GiteaClient`] implements it over the Gitea REST API; the
//! test-only `fake` module implements it in memory.
//!
//! Listings are paginated and 1-based. Each page reports the total page count
//! so the caller can tell when it has consumed the last one.

pub mod gitea;

#[cfg(test)]
pub mod fake;

pub use gitea::GiteaClient;

use std::future::Future;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// One page of a remote listing.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Total page count reported by the remote for this listing
    pub total_pages: u32,
}

impl<T> Page<T> {
    #[must_use]
    pub fn new(items: Vec<T>, total_pages: u32) -> Self {
        Self { items, total_pages }
    }
}

/// A remote user as referenced from issues, notes and events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRef {
    pub id: i64,
    #[serde(default)]
    pub login: String,
}

/// A remote user profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteUser {
    pub id: i64,
    pub login: String,
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub avatar_url: String,
}

/// A remote issue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteIssue {
    /// Per-repository issue number, used to address the issue
    pub number: i64,
    pub title: String,
    pub description: String,
    pub author: UserRef,
    pub created_at: DateTime<Utc>,
    pub url: String,
}

/// A remote activity record: a user comment or a system-generated event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteNote {
    pub id: i64,
    /// True for system-generated activity, false for plain comments
    pub system: bool,
    pub body: String,
    pub author: UserRef,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// New title of a title-change event, when the remote reports it as a field
    pub new_title: Option<String>,
}

/// Direction of a label event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelAction {
    Add,
    Remove,
}

/// A label added to or removed from an issue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteLabelEvent {
    pub id: i64,
    pub action: LabelAction,
    pub label: String,
    pub actor: UserRef,
    pub created_at: DateTime<Utc>,
}

/// Result of creating an issue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedIssue {
    pub id: i64,
    pub number: i64,
    pub url: String,
}

/// Issue state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateEvent {
    Reopen,
    Close,
}

impl StateEvent {
    /// Value of the remote `state` field after the transition.
    #[must_use]
    pub const fn remote_state(&self) -> &'static str {
        match self {
            Self::Reopen => "open",
            Self::Close => "closed",
        }
    }
}

/// Partial issue update. `None` fields are left untouched.
///
/// `labels`, when present, replaces the issue's whole label set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IssueUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub labels: Option<Vec<String>>,
    pub state_event: Option<StateEvent>,
}

impl IssueUpdate {
    #[must_use]
    pub fn title(title: &str) -> Self {
        Self {
            title: Some(title.to_string()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn description(body: &str) -> Self {
        Self {
            description: Some(body.to_string()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn labels(labels: Vec<String>) -> Self {
        Self {
            labels: Some(labels),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn state(event: StateEvent) -> Self {
        Self {
            state_event: Some(event),
            ..Self::default()
        }
    }
}

/// Remote tracker capabilities used by the sync drivers.
///
/// A client is bound to one repository (owner + project) and one credential.
/// Issues are addressed by their per-repository number.
pub trait RemoteApi: Send + Sync {
    /// List issues of every state, oldest first.
    fn list_issues(
        &self,
        page: u32,
        per_page: u32,
        since: Option<DateTime<Utc>>,
    ) -> impl Future<Output = Result<Page<RemoteIssue>>> + Send;

    /// List an issue's activity records, sorted ascending by creation time.
    fn list_notes(
        &self,
        issue: i64,
        page: u32,
        per_page: u32,
    ) -> impl Future<Output = Result<Page<RemoteNote>>> + Send;

    /// List an issue's label events.
    fn list_label_events(
        &self,
        issue: i64,
        page: u32,
        per_page: u32,
    ) -> impl Future<Output = Result<Page<RemoteLabelEvent>>> + Send;

    /// Fetch a user profile by numeric id.
    fn get_user(&self, id: i64) -> impl Future<Output = Result<RemoteUser>> + Send;

    /// Create an issue.
    fn create_issue(
        &self,
        title: &str,
        body: &str,
    ) -> impl Future<Output = Result<CreatedIssue>> + Send;

    /// Add a comment to an issue, returning the comment id.
    fn create_note(&self, issue: i64, body: &str) -> impl Future<Output = Result<i64>> + Send;

    /// Replace a comment's body.
    fn update_note(
        &self,
        issue: i64,
        note: i64,
        body: &str,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Apply a partial update to an issue.
    fn update_issue(
        &self,
        issue: i64,
        update: &IssueUpdate,
    ) -> impl Future<Output = Result<()>> + Send;
}

/// Page count from a total item count.
#[must_use]
pub fn total_pages(total_items: u64, per_page: u32) -> u32 {
    if per_page == 0 {
        return 0;
    }
    u32::try_from(total_items.div_ceil(u64::from(per_page))).unwrap_or(u32::MAX)
}
