//! Import driver: remote issues → local bugs.
//!
//! Walks issues, then each issue's notes and label events, and appends only
//! the local operations that are missing. Every appended operation is tagged
//! with the remote record id it came from, which is what makes a second pass
//! over an unchanged remote a no-op.

use std::collections::HashMap;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::bridge::classify::{NoteKind, classify};
use crate::bridge::events::ImportEvent;
use crate::bridge::identity::IdentityResolver;
use crate::bridge::iterator::IssueIterator;
use crate::bridge::{
    BridgeTarget, KEY_BASE_URL, KEY_ID, KEY_ORIGIN, KEY_PROJECT, KEY_URL, SyncOptions, TARGET,
    aborts_pass,
};
use crate::error::{Error, Result};
use crate::model::{Bug, Identity, Operation, Status, metadata};
use crate::remote::{LabelAction, RemoteApi, RemoteIssue, RemoteLabelEvent, RemoteNote};
use crate::storage::BugStore;
use crate::text::{cleanup, cleanup_one_line};

/// Remote → local driver.
pub struct Importer<R> {
    target: BridgeTarget,
    client: R,
    options: SyncOptions,
}

impl<R: RemoteApi> Importer<R> {
    /// Create an importer. `client` must hold the default login's credential.
    #[must_use]
    pub fn new(target: BridgeTarget, client: R, options: SyncOptions) -> Self {
        Self {
            target,
            client,
            options,
        }
    }

    #[must_use]
    pub fn client(&self) -> &R {
        &self.client
    }

    /// Run one import pass, streaming events to `out`.
    ///
    /// Stops at the first error that is not local to an issue, after
    /// reporting it once. Bugs committed before the error stay committed.
    /// Cancellation stops the pass quietly.
    pub async fn run<S: BugStore>(
        &self,
        store: &mut S,
        cancel: &CancellationToken,
        out: &UnboundedSender<ImportEvent>,
    ) {
        let mut pass = ImportPass {
            target: &self.target,
            client: &self.client,
            options: &self.options,
            identities: IdentityResolver::new(),
            owners: None,
            out,
        };
        let mut iter = IssueIterator::new(&self.client, &self.options, cancel.clone());

        while iter.next_issue().await {
            let Some(issue) = iter.issue().cloned() else {
                break;
            };
            debug!(issue = issue.number, "importing issue");

            if let Err(error) = pass.import_issue(store, &mut iter, &issue).await {
                let fatal = aborts_pass(&error);
                pass.emit(ImportEvent::Error {
                    entity: Some(format!("issue #{}", issue.number)),
                    error,
                });
                if fatal {
                    return;
                }
            }
        }

        if let Some(error) = iter.take_error() {
            pass.emit(ImportEvent::Error {
                entity: None,
                error,
            });
        } else if cancel.is_cancelled() {
            info!("import cancelled");
        }
    }

    /// Spawn a pass on its own task.
    ///
    /// The task hands the store back when the pass ends; the channel closes
    /// at the same time.
    pub fn import_all<S>(
        self,
        mut store: S,
        cancel: CancellationToken,
    ) -> (UnboundedReceiver<ImportEvent>, JoinHandle<S>)
    where
        R: 'static,
        S: BugStore + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(async move {
            self.run(&mut store, &cancel, &tx).await;
            store
        });
        (rx, handle)
    }
}

/// State scoped to one import pass.
struct ImportPass<'a, R> {
    target: &'a BridgeTarget,
    client: &'a R,
    options: &'a SyncOptions,
    identities: IdentityResolver,
    /// Local bug ids per remote issue number, built on first use.
    owners: Option<HashMap<i64, Vec<String>>>,
    out: &'a UnboundedSender<ImportEvent>,
}

/// Index the bugs this target owns by remote issue number.
///
/// # Errors
///
/// Returns an error if a bug cannot be loaded.
fn owner_index<S: BugStore>(
    target: &BridgeTarget,
    store: &S,
) -> Result<HashMap<i64, Vec<String>>> {
    let mut owners: HashMap<i64, Vec<String>> = HashMap::new();
    for id in store.all_bug_ids()? {
        let snap = store.resolve_bug(&id)?.snapshot();
        let number = snap
            .get_create_metadata(KEY_ID)
            .and_then(|raw| raw.parse::<i64>().ok());
        if let Some(number) = number.filter(|&n| target.owns(&snap, n)) {
            owners.entry(number).or_default().push(id);
        }
    }
    Ok(owners)
}

impl<R: RemoteApi> ImportPass<'_, R> {
    fn emit(&self, event: ImportEvent) {
        debug!(%event, "import event");
        // a dropped receiver only loses notifications
        let _ = self.out.send(event);
    }

    async fn person<S: BugStore>(&mut self, store: &mut S, remote_id: i64) -> Result<Identity> {
        let (identity, created) = self
            .identities
            .resolve(self.client, store, remote_id, self.options.timeout)
            .await?;
        if created {
            self.emit(ImportEvent::Identity {
                identity: identity.id.clone(),
            });
        }
        Ok(identity)
    }

    async fn import_issue<S: BugStore>(
        &mut self,
        store: &mut S,
        iter: &mut IssueIterator<'_, R>,
        issue: &RemoteIssue,
    ) -> Result<()> {
        let mut bug = self.ensure_bug(store, issue).await?;

        while iter.next_note().await {
            let Some(note) = iter.note().cloned() else {
                break;
            };
            self.ensure_note(store, &mut bug, issue, &note).await?;
        }

        while iter.next_label_event().await {
            let Some(event) = iter.label_event().cloned() else {
                break;
            };
            self.ensure_label_event(store, &mut bug, &event).await?;
        }

        if bug.need_commit() {
            store.commit(&mut bug)?;
        } else if !iter.halted() {
            self.emit(ImportEvent::Nothing {
                bug: bug.id().to_string(),
                reason: "no imported operation".to_string(),
            });
        }
        Ok(())
    }

    /// Find the bug for `issue`, or create and commit it.
    async fn ensure_bug<S: BugStore>(&mut self, store: &mut S, issue: &RemoteIssue) -> Result<Bug> {
        if self.owners.is_none() {
            self.owners = Some(owner_index(self.target, store)?);
        }
        let owned = self
            .owners
            .as_ref()
            .and_then(|owners| owners.get(&issue.number))
            .cloned()
            .unwrap_or_default();
        match owned.as_slice() {
            [] => {}
            [id] => return store.resolve_bug(id),
            _ => return Err(Error::AmbiguousBug { ids: owned }),
        }

        let author = self.person(store, issue.author.id).await?;
        let number = issue.number.to_string();
        let project = self.target.project_key();

        let mut bug = Bug::new_raw(
            &author.id,
            issue.created_at.timestamp(),
            &cleanup_one_line(&issue.title),
            &cleanup(&issue.description),
            metadata([
                (KEY_ORIGIN, TARGET),
                (KEY_ID, number.as_str()),
                (KEY_URL, issue.url.as_str()),
                (KEY_PROJECT, project.as_str()),
                (KEY_BASE_URL, self.target.base_url.as_str()),
            ]),
        )?;
        store.commit(&mut bug)?;
        if let Some(owners) = self.owners.as_mut() {
            owners
                .entry(issue.number)
                .or_default()
                .push(bug.id().to_string());
        }

        info!(issue = issue.number, bug = %bug.id(), "imported new issue");
        self.emit(ImportEvent::Bug {
            bug: bug.id().to_string(),
        });
        Ok(bug)
    }

    async fn ensure_note<S: BugStore>(
        &mut self,
        store: &mut S,
        bug: &mut Bug,
        issue: &RemoteIssue,
        note: &RemoteNote,
    ) -> Result<()> {
        let remote_id = note.id.to_string();
        let mapped = mapped_operation(bug, &remote_id);
        let tag = || metadata([(KEY_ID, remote_id.as_str())]);
        let kind = classify(note.system, &note.body);
        debug!(note = note.id, kind = kind.name(), mapped = mapped.is_some(), "note");

        match kind {
            NoteKind::Closed => {
                if mapped.is_none() {
                    self.set_status(store, bug, note, Status::Closed).await?;
                }
            }

            NoteKind::Reopened => {
                if mapped.is_none() {
                    self.set_status(store, bug, note, Status::Open).await?;
                }
            }

            NoteKind::DescriptionChanged => {
                // the remote exposes no description history: compare the
                // current description against comment #0
                if mapped.is_some() {
                    return Ok(());
                }
                let description = cleanup(&issue.description);
                let first = bug
                    .snapshot()
                    .comments
                    .first()
                    .map(|c| (c.id.clone(), c.message.clone()))
                    .ok_or_else(|| {
                        Error::InvariantViolation(format!("bug {} has no description", bug.id()))
                    })?;
                if first.1 == description {
                    return Ok(());
                }
                let author = self.person(store, note.author.id).await?;
                let op = bug.edit_comment_raw(
                    &author.id,
                    note.updated_at.timestamp(),
                    &first.0,
                    &description,
                    tag(),
                )?;
                self.emit(ImportEvent::CommentEdition {
                    bug: bug.id().to_string(),
                    op,
                });
            }

            NoteKind::Comment(body) => {
                let body = cleanup(&body);
                let Some(mapped) = mapped else {
                    let author = self.person(store, note.author.id).await?;
                    let op =
                        bug.add_comment_raw(&author.id, note.created_at.timestamp(), &body, tag())?;
                    self.emit(ImportEvent::Comment {
                        bug: bug.id().to_string(),
                        op,
                    });
                    return Ok(());
                };

                let snapshot = bug.snapshot();
                let comment = snapshot.search_comment(&mapped.id).ok_or_else(|| {
                    Error::Mapping(format!(
                        "note {} maps to operation {} which is not a comment",
                        note.id, mapped.id
                    ))
                })?;
                if comment.message == body {
                    return Ok(());
                }

                let author = self.person(store, note.author.id).await?;
                let op = bug.edit_comment_raw(
                    &author.id,
                    note.updated_at.timestamp(),
                    &comment.id,
                    &body,
                    tag(),
                )?;
                self.emit(ImportEvent::CommentEdition {
                    bug: bug.id().to_string(),
                    op,
                });
            }

            NoteKind::TitleChanged(parsed) => {
                if mapped.is_some() {
                    return Ok(());
                }
                let title = note.new_title.clone().unwrap_or(parsed);
                let author = self.person(store, note.author.id).await?;
                let op = bug.set_title_raw(
                    &author.id,
                    note.created_at.timestamp(),
                    &cleanup_one_line(&title),
                    tag(),
                )?;
                self.emit(ImportEvent::TitleEdition {
                    bug: bug.id().to_string(),
                    op,
                });
            }

            NoteKind::Unknown
            | NoteKind::Assigned
            | NoteKind::Unassigned
            | NoteKind::MilestoneChanged
            | NoteKind::MilestoneRemoved
            | NoteKind::DueDateChanged
            | NoteKind::DueDateRemoved
            | NoteKind::Locked
            | NoteKind::Unlocked
            | NoteKind::MentionedInIssue
            | NoteKind::MentionedInMergeRequest => {}
        }

        Ok(())
    }

    async fn set_status<S: BugStore>(
        &mut self,
        store: &mut S,
        bug: &mut Bug,
        note: &RemoteNote,
        status: Status,
    ) -> Result<()> {
        let author = self.person(store, note.author.id).await?;
        let op = bug.set_status_raw(
            &author.id,
            note.created_at.timestamp(),
            status,
            metadata([(KEY_ID, note.id.to_string().as_str())]),
        )?;
        self.emit(ImportEvent::StatusChange {
            bug: bug.id().to_string(),
            op,
        });
        Ok(())
    }

    async fn ensure_label_event<S: BugStore>(
        &mut self,
        store: &mut S,
        bug: &mut Bug,
        event: &RemoteLabelEvent,
    ) -> Result<()> {
        let remote_id = event.id.to_string();
        if mapped_operation(bug, &remote_id).is_some() {
            return Ok(());
        }
        if event.label.trim().is_empty() {
            warn!(event = event.id, "label event without a label name");
            return Err(Error::Mapping(format!("label event {} has no label", event.id)));
        }

        let author = self.person(store, event.actor.id).await?;
        let label = [event.label.clone()];
        let (added, removed): (&[String], &[String]) = match event.action {
            LabelAction::Add => (&label, &[]),
            LabelAction::Remove => (&[], &label),
        };
        let op = bug.force_change_labels_raw(
            &author.id,
            event.created_at.timestamp(),
            added,
            removed,
            metadata([(KEY_ID, remote_id.as_str())]),
        )?;
        self.emit(ImportEvent::LabelChange {
            bug: bug.id().to_string(),
            op,
        });
        Ok(())
    }
}

/// First operation after the creation one tagged with `remote_id`.
///
/// The creation operation carries the issue number under the same key, so it
/// is excluded.
fn mapped_operation(bug: &Bug, remote_id: &str) -> Option<Operation> {
    bug.snapshot()
        .operations
        .into_iter()
        .skip(1)
        .find(|op| op.get_metadata(KEY_ID) == Some(remote_id))
}
