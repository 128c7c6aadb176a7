//! Bug model: an append-only operation log and the snapshot derived from it.
//!
//! A bug is never edited in place. Every change (new comment, title edit,
//! label change, ...) is a new [`Operation`] appended to the log, and the
//! current state is recomputed by folding the log into a [`Snapshot`].
//!
//! The only way to touch an existing operation is [`Bug::set_metadata`], which
//! appends a `SetMetadata` operation whose entries are merged into the target
//! operation's metadata when the snapshot is built. Existing keys are never
//! overwritten.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::hash::content_hash;

/// Metadata attached to an operation (key → value).
pub type Metadata = BTreeMap<String, String>;

/// Bug status values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Open,
    Closed,
}

impl Status {
    /// Get the string representation for storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Closed => "closed",
        }
    }

    /// Parse from string.
    ///
    /// # Errors
    ///
    /// Returns an invariant violation for anything but `open` or `closed`:
    /// the status set is closed and a stored value outside it means a
    /// corrupted log.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "open" => Ok(Self::Open),
            "closed" => Ok(Self::Closed),
            other => Err(Error::InvariantViolation(format!(
                "unknown bug status: {other}"
            ))),
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The payload of an operation.
///
/// The set is closed: every dispatch site matches exhaustively, so adding a
/// variant is a compile error until each site handles it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OperationKind {
    Create { title: String, message: String },
    AddComment { message: String },
    EditComment { target: String, message: String },
    SetStatus { status: Status },
    SetTitle { title: String, was: String },
    LabelChange { added: Vec<String>, removed: Vec<String> },
    SetMetadata { target: String, metadata: Metadata },
}

impl OperationKind {
    /// Short name used in logs and listings.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Create { .. } => "create",
            Self::AddComment { .. } => "add_comment",
            Self::EditComment { .. } => "edit_comment",
            Self::SetStatus { .. } => "set_status",
            Self::SetTitle { .. } => "set_title",
            Self::LabelChange { .. } => "label_change",
            Self::SetMetadata { .. } => "set_metadata",
        }
    }
}

/// One authored, timestamped entry in a bug's log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    /// Content hash of the operation
    pub id: String,

    /// Local identity that authored the operation
    pub author: String,

    /// Unix timestamp (seconds)
    pub unix_time: i64,

    #[serde(flatten)]
    pub kind: OperationKind,

    /// Metadata recorded at creation; grows only through `SetMetadata`
    #[serde(default)]
    pub metadata: Metadata,
}

impl Operation {
    /// Look up a metadata value.
    #[must_use]
    pub fn get_metadata(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    #[must_use]
    pub fn time(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.unix_time, 0).unwrap_or_default()
    }
}

/// Fields hashed into an operation id.
#[derive(Serialize)]
struct OperationDigest<'a> {
    bug_id: &'a str,
    seq: usize,
    author: &'a str,
    unix_time: i64,
    kind: &'a OperationKind,
    metadata: &'a Metadata,
}

/// A comment as seen in the snapshot.
///
/// The comment id is the id of the operation that created it; the bug
/// description is comment #0, created by the `Create` operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Comment {
    pub id: String,
    pub author: String,
    pub message: String,
    pub unix_time: i64,
    pub edited: bool,
}

/// Current state of a bug, computed from its log.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub id: String,
    pub status: Status,
    pub title: String,
    pub comments: Vec<Comment>,
    pub labels: BTreeSet<String>,
    pub author: String,
    pub actors: BTreeSet<String>,
    pub create_time: i64,
    pub edit_time: i64,
    /// Operations with `SetMetadata` entries merged into their targets
    pub operations: Vec<Operation>,
}

impl Snapshot {
    /// Metadata of the creation operation.
    #[must_use]
    pub fn get_create_metadata(&self, key: &str) -> Option<&str> {
        self.operations.first().and_then(|op| op.get_metadata(key))
    }

    /// The creation operation.
    #[must_use]
    pub fn create_operation(&self) -> Option<&Operation> {
        self.operations.first()
    }

    /// Find a comment by the id of the operation that created it.
    #[must_use]
    pub fn search_comment(&self, id: &str) -> Option<&Comment> {
        self.comments.iter().find(|c| c.id == id)
    }

    /// True if any of the given identities authored an operation.
    #[must_use]
    pub fn has_any_actor<'a>(&self, ids: impl IntoIterator<Item = &'a str>) -> bool {
        ids.into_iter().any(|id| self.actors.contains(id))
    }

    #[must_use]
    pub fn create_time_utc(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.create_time, 0).unwrap_or_default()
    }
}

/// A bug: its id and its operation log.
///
/// Operations past `committed` are staged: they exist in memory and are
/// persisted by the next `BugStore::commit`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bug {
    id: String,
    operations: Vec<Operation>,
    committed: usize,
}

impl Bug {
    /// Create a new, uncommitted bug with its creation operation.
    ///
    /// # Errors
    ///
    /// Returns an error if the operation cannot be hashed.
    pub fn new_raw(
        author: &str,
        unix_time: i64,
        title: &str,
        message: &str,
        metadata: Metadata,
    ) -> Result<Self> {
        let id = format!("bug_{}", &uuid::Uuid::new_v4().simple().to_string()[..12]);
        let mut bug = Self {
            id,
            operations: Vec::new(),
            committed: 0,
        };
        bug.append(
            author,
            unix_time,
            OperationKind::Create {
                title: title.to_string(),
                message: message.to_string(),
            },
            metadata,
        )?;
        Ok(bug)
    }

    /// Rebuild a bug from persisted operations (all committed).
    ///
    /// # Errors
    ///
    /// Returns an invariant violation if the log is empty or does not start
    /// with a `Create` operation.
    pub fn from_operations(id: String, operations: Vec<Operation>) -> Result<Self> {
        match operations.first().map(|op| &op.kind) {
            Some(OperationKind::Create { .. }) => {}
            _ => {
                return Err(Error::InvariantViolation(format!(
                    "bug {id} does not start with a create operation"
                )));
            }
        }
        let committed = operations.len();
        Ok(Self {
            id,
            operations,
            committed,
        })
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Raw operations, without merged metadata.
    #[must_use]
    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    /// Operations appended since the last commit.
    #[must_use]
    pub fn staged(&self) -> &[Operation] {
        &self.operations[self.committed..]
    }

    #[must_use]
    pub fn need_commit(&self) -> bool {
        self.operations.len() > self.committed
    }

    /// Mark every staged operation as persisted. Called by stores.
    pub(crate) fn mark_committed(&mut self) {
        self.committed = self.operations.len();
    }

    /// Fold the log into the current state.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        let mut snap = Snapshot {
            id: self.id.clone(),
            status: Status::Open,
            title: String::new(),
            comments: Vec::new(),
            labels: BTreeSet::new(),
            author: String::new(),
            actors: BTreeSet::new(),
            create_time: 0,
            edit_time: 0,
            operations: Vec::with_capacity(self.operations.len()),
        };

        for op in &self.operations {
            snap.actors.insert(op.author.clone());
            snap.edit_time = snap.edit_time.max(op.unix_time);

            match &op.kind {
                OperationKind::Create { title, message } => {
                    snap.title.clone_from(title);
                    snap.author.clone_from(&op.author);
                    snap.create_time = op.unix_time;
                    snap.comments.push(Comment {
                        id: op.id.clone(),
                        author: op.author.clone(),
                        message: message.clone(),
                        unix_time: op.unix_time,
                        edited: false,
                    });
                }
                OperationKind::AddComment { message } => snap.comments.push(Comment {
                    id: op.id.clone(),
                    author: op.author.clone(),
                    message: message.clone(),
                    unix_time: op.unix_time,
                    edited: false,
                }),
                OperationKind::EditComment { target, message } => {
                    if let Some(comment) = snap.comments.iter_mut().find(|c| &c.id == target) {
                        comment.message.clone_from(message);
                        comment.edited = true;
                    }
                }
                OperationKind::SetStatus { status } => snap.status = *status,
                OperationKind::SetTitle { title, .. } => snap.title.clone_from(title),
                OperationKind::LabelChange { added, removed } => {
                    for label in added {
                        snap.labels.insert(label.clone());
                    }
                    for label in removed {
                        snap.labels.remove(label);
                    }
                }
                OperationKind::SetMetadata { target, metadata } => {
                    if let Some(target_op) = snap.operations.iter_mut().find(|o| &o.id == target) {
                        for (key, value) in metadata {
                            target_op
                                .metadata
                                .entry(key.clone())
                                .or_insert_with(|| value.clone());
                        }
                    }
                }
            }

            snap.operations.push(op.clone());
        }

        snap
    }

    // ==================
    // Operation builders
    // ==================

    /// Append a comment.
    ///
    /// # Errors
    ///
    /// Returns an error if the operation cannot be hashed.
    pub fn add_comment_raw(
        &mut self,
        author: &str,
        unix_time: i64,
        message: &str,
        metadata: Metadata,
    ) -> Result<String> {
        self.append(
            author,
            unix_time,
            OperationKind::AddComment {
                message: message.to_string(),
            },
            metadata,
        )
    }

    /// Append an edit of an existing comment (or of the description, comment #0).
    ///
    /// # Errors
    ///
    /// Returns `OperationNotFound` if `target` is not a comment of this bug.
    pub fn edit_comment_raw(
        &mut self,
        author: &str,
        unix_time: i64,
        target: &str,
        message: &str,
        metadata: Metadata,
    ) -> Result<String> {
        let known = self.operations.iter().any(|op| {
            op.id == target
                && matches!(
                    op.kind,
                    OperationKind::Create { .. } | OperationKind::AddComment { .. }
                )
        });
        if !known {
            return Err(Error::OperationNotFound {
                id: target.to_string(),
            });
        }
        self.append(
            author,
            unix_time,
            OperationKind::EditComment {
                target: target.to_string(),
                message: message.to_string(),
            },
            metadata,
        )
    }

    /// Append a status change.
    ///
    /// # Errors
    ///
    /// Returns an error if the operation cannot be hashed.
    pub fn set_status_raw(
        &mut self,
        author: &str,
        unix_time: i64,
        status: Status,
        metadata: Metadata,
    ) -> Result<String> {
        self.append(author, unix_time, OperationKind::SetStatus { status }, metadata)
    }

    /// Append a title change, recording the previous title.
    ///
    /// # Errors
    ///
    /// Returns an error if the operation cannot be hashed.
    pub fn set_title_raw(
        &mut self,
        author: &str,
        unix_time: i64,
        title: &str,
        metadata: Metadata,
    ) -> Result<String> {
        let was = self.snapshot().title;
        self.append(
            author,
            unix_time,
            OperationKind::SetTitle {
                title: title.to_string(),
                was,
            },
            metadata,
        )
    }

    /// Append a label change without checking the current label set.
    ///
    /// # Errors
    ///
    /// Returns an error if the operation cannot be hashed.
    pub fn force_change_labels_raw(
        &mut self,
        author: &str,
        unix_time: i64,
        added: &[String],
        removed: &[String],
        metadata: Metadata,
    ) -> Result<String> {
        self.append(
            author,
            unix_time,
            OperationKind::LabelChange {
                added: added.to_vec(),
                removed: removed.to_vec(),
            },
            metadata,
        )
    }

    /// Attach metadata to an existing operation.
    ///
    /// The new entries are carried by a `SetMetadata` operation authored by
    /// the target's author, so tagging never adds an actor to the bug.
    ///
    /// # Errors
    ///
    /// Returns `OperationNotFound` if `target` is not in the log.
    pub fn set_metadata(&mut self, target: &str, metadata: Metadata) -> Result<String> {
        let (author, unix_time) = self
            .operations
            .iter()
            .find(|op| op.id == target)
            .map(|op| (op.author.clone(), op.unix_time))
            .ok_or_else(|| Error::OperationNotFound {
                id: target.to_string(),
            })?;

        let now = chrono::Utc::now().timestamp().max(unix_time);
        self.append(
            &author,
            now,
            OperationKind::SetMetadata {
                target: target.to_string(),
                metadata,
            },
            Metadata::new(),
        )
    }

    fn append(
        &mut self,
        author: &str,
        unix_time: i64,
        kind: OperationKind,
        metadata: Metadata,
    ) -> Result<String> {
        let id = content_hash(&OperationDigest {
            bug_id: &self.id,
            seq: self.operations.len(),
            author,
            unix_time,
            kind: &kind,
            metadata: &metadata,
        })?;

        self.operations.push(Operation {
            id: id.clone(),
            author: author.to_string(),
            unix_time,
            kind,
            metadata,
        });
        Ok(id)
    }
}

/// Build a metadata map from pairs.
#[must_use]
pub fn metadata<const N: usize>(pairs: [(&str, &str); N]) -> Metadata {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}
