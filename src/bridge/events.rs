//! Notifications streamed by the sync drivers.
//!
//! Every event names the local entity it concerns. `Error` events are
//! terminal for the pass unless the error was local to one bug or issue.

use std::fmt;

use crate::error::Error;

/// Import pass notification.
#[derive(Debug)]
pub enum ImportEvent {
    /// A new local bug was created for a remote issue
    Bug { bug: String },
    /// A new local identity was created for a remote user
    Identity { identity: String },
    Comment { bug: String, op: String },
    CommentEdition { bug: String, op: String },
    StatusChange { bug: String, op: String },
    TitleEdition { bug: String, op: String },
    LabelChange { bug: String, op: String },
    /// Nothing was imported for this bug
    Nothing { bug: String, reason: String },
    /// `entity` is the remote record or local bug being processed, if known
    Error { entity: Option<String>, error: Error },
}

impl ImportEvent {
    #[must_use]
    pub const fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }
}

impl fmt::Display for ImportEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bug { bug } => write!(f, "new issue: {bug}"),
            Self::Identity { identity } => write!(f, "new identity: {identity}"),
            Self::Comment { bug, op } => write!(f, "new comment: {bug} {}", short(op)),
            Self::CommentEdition { bug, op } => {
                write!(f, "updated comment: {bug} {}", short(op))
            }
            Self::StatusChange { bug, op } => write!(f, "changed status: {bug} {}", short(op)),
            Self::TitleEdition { bug, op } => write!(f, "changed title: {bug} {}", short(op)),
            Self::LabelChange { bug, op } => write!(f, "changed label: {bug} {}", short(op)),
            Self::Nothing { bug, reason } => write!(f, "no action taken for {bug}: {reason}"),
            Self::Error {
                entity: Some(entity),
                error,
            } => write!(f, "import error at {entity}: {error}"),
            Self::Error {
                entity: None,
                error,
            } => write!(f, "import error: {error}"),
        }
    }
}

/// Export pass notification.
#[derive(Debug)]
pub enum ExportEvent {
    /// A remote issue was created for a local bug
    Bug { bug: String },
    Comment { bug: String, op: String },
    CommentEdition { bug: String, op: String },
    StatusChange { bug: String, op: String },
    TitleEdition { bug: String, op: String },
    LabelChange { bug: String, op: String },
    /// Nothing was exported for this bug
    Nothing { bug: String, reason: String },
    Error { bug: Option<String>, error: Error },
}

impl ExportEvent {
    #[must_use]
    pub const fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }
}

impl fmt::Display for ExportEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bug { bug } => write!(f, "new issue: {bug}"),
            Self::Comment { bug, op } => write!(f, "new comment: {bug} {}", short(op)),
            Self::CommentEdition { bug, op } => {
                write!(f, "updated comment: {bug} {}", short(op))
            }
            Self::StatusChange { bug, op } => write!(f, "changed status: {bug} {}", short(op)),
            Self::TitleEdition { bug, op } => write!(f, "changed title: {bug} {}", short(op)),
            Self::LabelChange { bug, op } => write!(f, "changed label: {bug} {}", short(op)),
            Self::Nothing { bug, reason } => write!(f, "no action taken for {bug}: {reason}"),
            Self::Error {
                bug: Some(bug),
                error,
            } => write!(f, "export error at {bug}: {error}"),
            Self::Error { bug: None, error } => write!(f, "export error: {error}"),
        }
    }
}

/// Operation ids are 64 hex chars; 8 are enough to tell them apart in output.
fn short(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}
