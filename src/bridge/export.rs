//! Export driver: local bugs → remote issues.
//!
//! For every bug with at least one actor holding a credential, creates the
//! remote issue if needed and replays the untagged operations in log order.
//! Each successful write is followed by a `SetMetadata` tag and a commit, so
//! an interrupted pass never pushes the same operation twice.

use std::collections::{BTreeSet, HashMap};

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::bridge::events::ExportEvent;
use crate::bridge::{
    BridgeTarget, KEY_BASE_URL, KEY_ID, KEY_LOGIN, KEY_ORIGIN, KEY_PROJECT, KEY_URL, SyncOptions,
    TARGET, aborts_pass, bounded, same_base_url,
};
use crate::config::Credential;
use crate::error::{Error, Result};
use crate::model::{Bug, OperationKind, Status, metadata};
use crate::remote::{IssueUpdate, RemoteApi, StateEvent};
use crate::storage::BugStore;

/// Local → remote driver.
///
/// Holds one client per local identity that has a credential. Only
/// operations authored by those identities are pushed.
pub struct Exporter<C> {
    target: BridgeTarget,
    options: SyncOptions,
    clients: HashMap<String, C>,
}

impl<C: RemoteApi> Exporter<C> {
    #[must_use]
    pub fn new(target: BridgeTarget, options: SyncOptions) -> Self {
        Self {
            target,
            options,
            clients: HashMap::new(),
        }
    }

    /// Build a client for every credential whose login maps to a local
    /// identity.
    ///
    /// Credentials for another instance are ignored. A login with no local
    /// identity is skipped with a warning.
    ///
    /// # Errors
    ///
    /// Returns `AmbiguousIdentity` if several identities claim one login, or
    /// any error from `connect`.
    pub fn cache_clients<S, F>(
        &mut self,
        store: &S,
        credentials: &[Credential],
        connect: F,
    ) -> Result<()>
    where
        S: BugStore,
        F: Fn(&Credential) -> Result<C>,
    {
        for credential in credentials {
            if !credential.applies_to(&self.target.base_url) {
                debug!(login = %credential.login, "credential for another instance");
                continue;
            }
            let identity = match store.resolve_identity_by_metadata(KEY_LOGIN, &credential.login) {
                Ok(identity) => identity,
                Err(Error::IdentityNotFound { .. }) => {
                    warn!(login = %credential.login, "no local identity for credential");
                    continue;
                }
                Err(err) => return Err(err),
            };
            let client = connect(credential)?;
            self.clients.insert(identity.id, client);
        }
        info!(clients = self.clients.len(), "export clients ready");
        Ok(())
    }

    /// Register a client for a local identity.
    pub fn add_client(&mut self, identity: &str, client: C) {
        self.clients.insert(identity.to_string(), client);
    }

    #[must_use]
    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Run one export pass, streaming events to `out`.
    ///
    /// Errors local to a bug are reported and the pass moves on; any other
    /// error is reported once and ends the pass. An edit of a comment that
    /// never reached the remote is reported against its bug, which stops
    /// there while the pass continues. Every write already tagged
    /// and committed stays so.
    pub async fn run<S: BugStore>(
        &self,
        store: &mut S,
        cancel: &CancellationToken,
        out: &UnboundedSender<ExportEvent>,
    ) {
        let emit = |event: ExportEvent| {
            debug!(%event, "export event");
            let _ = out.send(event);
        };

        let ids = match store.all_bug_ids() {
            Ok(ids) => ids,
            Err(error) => {
                emit(ExportEvent::Error { bug: None, error });
                return;
            }
        };

        for id in ids {
            if cancel.is_cancelled() {
                info!("export cancelled");
                return;
            }
            let result = match store.resolve_bug(&id) {
                Ok(mut bug) => self.export_bug(store, &mut bug, cancel, &emit).await,
                Err(error) => Err(error),
            };
            if let Err(error) = result {
                let fatal = aborts_pass(&error);
                emit(ExportEvent::Error {
                    bug: Some(id),
                    error,
                });
                if fatal {
                    return;
                }
            }
        }
    }

    /// Spawn a pass on its own task; the task hands the store back.
    pub fn export_all<S>(
        self,
        mut store: S,
        cancel: CancellationToken,
    ) -> (UnboundedReceiver<ExportEvent>, JoinHandle<S>)
    where
        C: 'static,
        S: BugStore + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(async move {
            self.run(&mut store, &cancel, &tx).await;
            store
        });
        (rx, handle)
    }

    async fn export_bug<S, E>(
        &self,
        store: &mut S,
        bug: &mut Bug,
        cancel: &CancellationToken,
        emit: &E,
    ) -> Result<()>
    where
        S: BugStore,
        E: Fn(ExportEvent),
    {
        let snapshot = bug.snapshot();
        let bug_id = bug.id().to_string();
        let nothing = |reason: &str| {
            emit(ExportEvent::Nothing {
                bug: bug_id.clone(),
                reason: reason.to_string(),
            });
        };

        if let Some(since) = self.options.since {
            if snapshot.create_time_utc() < since {
                nothing("bug created before the since date");
                return Ok(());
            }
        }

        if !snapshot.has_any_actor(self.clients.keys().map(String::as_str)) {
            return Ok(());
        }

        let create = snapshot.create_operation().cloned().ok_or_else(|| {
            Error::InvariantViolation(format!("bug {bug_id} has no create operation"))
        })?;

        if let Some(origin) = create.get_metadata(KEY_ORIGIN) {
            if origin != TARGET {
                nothing(&format!("issue tagged with origin: {origin}"));
                return Ok(());
            }
        }

        let mut wrote = false;
        let number = if let Some(remote_id) = create.get_metadata(KEY_ID) {
            if !create
                .get_metadata(KEY_BASE_URL)
                .is_some_and(|url| same_base_url(url, &self.target.base_url))
            {
                nothing("skipping issue imported from another Gitea instance");
                return Ok(());
            }
            let project = create.get_metadata(KEY_PROJECT).ok_or_else(|| {
                Error::Mapping(format!("bug {bug_id} has a remote id but no project"))
            })?;
            if project != self.target.project_key() {
                nothing("skipping issue imported from another repository");
                return Ok(());
            }
            parse_remote_id(remote_id)?
        } else {
            let Some(client) = self.clients.get(&create.author) else {
                nothing("missing author token");
                return Ok(());
            };
            let (title, message) = match &create.kind {
                OperationKind::Create { title, message } => (title.as_str(), message.as_str()),
                other => {
                    return Err(Error::InvariantViolation(format!(
                        "first operation of {bug_id} is {}",
                        other.name()
                    )));
                }
            };

            let created = bounded(self.options.timeout, client.create_issue(title, message)).await?;
            info!(bug = %bug_id, issue = created.number, "created remote issue");
            emit(ExportEvent::Bug {
                bug: bug_id.clone(),
            });

            let number = created.number.to_string();
            let project = self.target.project_key();
            bug.set_metadata(
                &create.id,
                metadata([
                    (KEY_ID, number.as_str()),
                    (KEY_URL, created.url.as_str()),
                    (KEY_BASE_URL, self.target.base_url.as_str()),
                    (KEY_PROJECT, project.as_str()),
                    (KEY_ORIGIN, TARGET),
                ]),
            )?;
            store.commit(bug)?;
            wrote = true;
            created.number
        };

        let mut labels: BTreeSet<String> = BTreeSet::new();
        // local operation id → remote record id
        let mut exported: HashMap<String, String> = HashMap::new();

        for op in &snapshot.operations[1..] {
            if cancel.is_cancelled() {
                break;
            }
            if let OperationKind::SetMetadata { .. } = op.kind {
                continue;
            }
            if let OperationKind::LabelChange { added, removed } = &op.kind {
                labels.extend(added.iter().cloned());
                for label in removed {
                    labels.remove(label);
                }
            }
            if let Some(remote_id) = op.get_metadata(KEY_ID) {
                exported.insert(op.id.clone(), remote_id.to_string());
                continue;
            }
            let Some(client) = self.clients.get(&op.author) else {
                continue;
            };

            let timeout = self.options.timeout;
            let (remote_id, event) = match &op.kind {
                OperationKind::AddComment { message } => {
                    let note = bounded(timeout, client.create_note(number, message)).await?;
                    (note.to_string(), ExportEvent::Comment {
                        bug: bug_id.clone(),
                        op: op.id.clone(),
                    })
                }

                OperationKind::EditComment { target, message } => {
                    if *target == create.id {
                        bounded(
                            timeout,
                            client.update_issue(number, &IssueUpdate::description(message)),
                        )
                        .await?;
                    } else {
                        let Some(note) = exported.get(target) else {
                            warn!(bug = %bug_id, comment = %target, "edit of unexported comment");
                            emit(ExportEvent::Error {
                                bug: Some(bug_id.clone()),
                                error: Error::InvariantViolation(format!(
                                    "edited comment {target} was never exported"
                                )),
                            });
                            return Ok(());
                        };
                        let note = parse_remote_id(note)?;
                        bounded(timeout, client.update_note(number, note, message)).await?;
                    }
                    (number.to_string(), ExportEvent::CommentEdition {
                        bug: bug_id.clone(),
                        op: op.id.clone(),
                    })
                }

                OperationKind::SetStatus { status } => {
                    let event = match status {
                        Status::Open => StateEvent::Reopen,
                        Status::Closed => StateEvent::Close,
                    };
                    bounded(timeout, client.update_issue(number, &IssueUpdate::state(event)))
                        .await?;
                    (number.to_string(), ExportEvent::StatusChange {
                        bug: bug_id.clone(),
                        op: op.id.clone(),
                    })
                }

                OperationKind::SetTitle { title, .. } => {
                    bounded(timeout, client.update_issue(number, &IssueUpdate::title(title)))
                        .await?;
                    (number.to_string(), ExportEvent::TitleEdition {
                        bug: bug_id.clone(),
                        op: op.id.clone(),
                    })
                }

                OperationKind::LabelChange { .. } => {
                    let update = IssueUpdate::labels(labels.iter().cloned().collect());
                    bounded(timeout, client.update_issue(number, &update)).await?;
                    (number.to_string(), ExportEvent::LabelChange {
                        bug: bug_id.clone(),
                        op: op.id.clone(),
                    })
                }

                OperationKind::Create { .. } | OperationKind::SetMetadata { .. } => {
                    return Err(Error::InvariantViolation(format!(
                        "unexpected {} operation {} in {bug_id}",
                        op.kind.name(),
                        op.id
                    )));
                }
            };

            bug.set_metadata(&op.id, metadata([(KEY_ID, remote_id.as_str())]))?;
            store.commit(bug)?;
            exported.insert(op.id.clone(), remote_id);
            wrote = true;
            emit(event);
        }

        if !wrote && !cancel.is_cancelled() {
            nothing("nothing has been exported");
        }
        Ok(())
    }
}

fn parse_remote_id(value: &str) -> Result<i64> {
    value
        .parse()
        .map_err(|_| Error::Mapping(format!("unexpected remote id format: {value}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::Importer;
    use crate::model::Identity;
    use crate::remote::fake::{FakeRemote, Write};
    use crate::storage::MemoryStore;
    use chrono::DateTime;

    fn target() -> BridgeTarget {
        BridgeTarget::new("https://gitea.test/", "acme", "widgets")
    }

    fn local_identity(store: &mut MemoryStore, login: &str) -> Identity {
        let identity = Identity::new_raw(login, login, None, None, metadata([(KEY_LOGIN, login)]));
        store.create_identity(&identity).unwrap();
        identity
    }

    fn exporter(identity: &Identity, options: SyncOptions) -> Exporter<FakeRemote> {
        let mut exporter = Exporter::new(target(), options);
        exporter.add_client(&identity.id, FakeRemote::new());
        exporter
    }

    fn client<'a>(exporter: &'a Exporter<FakeRemote>, identity: &Identity) -> &'a FakeRemote {
        exporter.clients.get(&identity.id).unwrap()
    }

    async fn run(exporter: &Exporter<FakeRemote>, store: &mut MemoryStore) -> Vec<ExportEvent> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        exporter.run(store, &CancellationToken::new(), &tx).await;
        drop(tx);
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    fn count(events: &[ExportEvent], pred: impl Fn(&ExportEvent) -> bool) -> usize {
        events.iter().filter(|e| pred(e)).count()
    }

    fn label_updates(writes: &[Write]) -> Vec<Vec<String>> {
        writes
            .iter()
            .filter_map(|w| match w {
                Write::UpdateIssue { update, .. } => update.labels.clone(),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_export_new_bug_and_operations() {
        let mut store = MemoryStore::new();
        let alice = local_identity(&mut store, "alice");
        let mut bug = Bug::new_raw(&alice.id, 100, "Crash", "It crashes", metadata([])).unwrap();
        let comment = bug.add_comment_raw(&alice.id, 101, "details", metadata([])).unwrap();
        bug.edit_comment_raw(&alice.id, 102, &comment, "more details", metadata([]))
            .unwrap();
        bug.set_status_raw(&alice.id, 103, Status::Closed, metadata([])).unwrap();
        store.commit(&mut bug).unwrap();

        let exporter = exporter(&alice, SyncOptions::default());
        let events = run(&exporter, &mut store).await;
        assert_eq!(count(&events, ExportEvent::is_error), 0, "{events:?}");
        assert_eq!(count(&events, |e| matches!(e, ExportEvent::Bug { .. })), 1);

        let writes = client(&exporter, &alice).writes();
        assert_eq!(writes.len(), 4);
        assert_eq!(
            writes[0],
            Write::CreateIssue {
                title: "Crash".into(),
                body: "It crashes".into()
            }
        );
        assert!(matches!(&writes[1], Write::CreateNote { issue: 1, body } if body == "details"));
        assert!(matches!(&writes[2], Write::UpdateNote { issue: 1, note: 1002, .. }));
        assert!(matches!(
            &writes[3],
            Write::UpdateIssue { issue: 1, update } if update.state_event == Some(StateEvent::Close)
        ));

        let snap = store.resolve_bug(bug.id()).unwrap().snapshot();
        assert_eq!(snap.get_create_metadata(KEY_ID), Some("1"));
        assert_eq!(snap.get_create_metadata(KEY_PROJECT), Some("acme/widgets"));
        assert_eq!(snap.get_create_metadata(KEY_ORIGIN), Some(TARGET));
        assert_eq!(snap.get_create_metadata(KEY_BASE_URL), Some("https://gitea.test/"));
    }

    #[tokio::test]
    async fn test_second_export_writes_nothing() {
        let mut store = MemoryStore::new();
        let alice = local_identity(&mut store, "alice");
        let mut bug = Bug::new_raw(&alice.id, 100, "Crash", "", metadata([])).unwrap();
        bug.add_comment_raw(&alice.id, 101, "details", metadata([])).unwrap();
        store.commit(&mut bug).unwrap();

        let exporter = exporter(&alice, SyncOptions::default());
        run(&exporter, &mut store).await;
        client(&exporter, &alice).clear_writes();

        let events = run(&exporter, &mut store).await;
        assert!(client(&exporter, &alice).writes().is_empty());
        assert_eq!(count(&events, |e| matches!(e, ExportEvent::Nothing { .. })), 1);
    }

    #[tokio::test]
    async fn test_labels_push_whole_set() {
        let mut store = MemoryStore::new();
        let alice = local_identity(&mut store, "alice");
        let mut bug = Bug::new_raw(&alice.id, 100, "Crash", "", metadata([])).unwrap();
        bug.force_change_labels_raw(&alice.id, 101, &["A".into(), "B".into()], &[], metadata([]))
            .unwrap();
        bug.force_change_labels_raw(&alice.id, 102, &[], &["A".into()], metadata([]))
            .unwrap();
        store.commit(&mut bug).unwrap();

        let exporter = exporter(&alice, SyncOptions::default());
        run(&exporter, &mut store).await;

        let updates = label_updates(&client(&exporter, &alice).writes());
        assert_eq!(
            updates,
            vec![vec!["A".to_string(), "B".to_string()], vec!["B".to_string()]]
        );
    }

    #[tokio::test]
    async fn test_label_set_includes_already_exported_changes() {
        let mut store = MemoryStore::new();
        let alice = local_identity(&mut store, "alice");
        let mut bug = Bug::new_raw(&alice.id, 100, "Crash", "", metadata([])).unwrap();
        bug.force_change_labels_raw(&alice.id, 101, &["bug".into()], &[], metadata([(KEY_ID, "77")]))
            .unwrap();
        bug.force_change_labels_raw(&alice.id, 102, &["p1".into()], &[], metadata([]))
            .unwrap();
        store.commit(&mut bug).unwrap();

        let exporter = exporter(&alice, SyncOptions::default());
        run(&exporter, &mut store).await;

        let updates = label_updates(&client(&exporter, &alice).writes());
        assert_eq!(updates, vec![vec!["bug".to_string(), "p1".to_string()]]);
    }

    #[tokio::test]
    async fn test_missing_author_token() {
        let mut store = MemoryStore::new();
        let alice = local_identity(&mut store, "alice");
        let bob = local_identity(&mut store, "bob");
        let mut bug = Bug::new_raw(&bob.id, 100, "Crash", "", metadata([])).unwrap();
        bug.add_comment_raw(&alice.id, 101, "me too", metadata([])).unwrap();
        store.commit(&mut bug).unwrap();

        let exporter = exporter(&alice, SyncOptions::default());
        let events = run(&exporter, &mut store).await;

        assert!(client(&exporter, &alice).writes().is_empty());
        assert!(events.iter().any(|e| matches!(
            e,
            ExportEvent::Nothing { reason, .. } if reason == "missing author token"
        )));
    }

    #[tokio::test]
    async fn test_bug_without_known_actor_is_skipped_silently() {
        let mut store = MemoryStore::new();
        let alice = local_identity(&mut store, "alice");
        let bob = local_identity(&mut store, "bob");
        let mut bug = Bug::new_raw(&bob.id, 100, "Crash", "", metadata([])).unwrap();
        store.commit(&mut bug).unwrap();

        let exporter = exporter(&alice, SyncOptions::default());
        let events = run(&exporter, &mut store).await;
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn test_foreign_bugs_are_skipped() {
        let mut store = MemoryStore::new();
        let alice = local_identity(&mut store, "alice");

        let mut other_origin =
            Bug::new_raw(&alice.id, 100, "a", "", metadata([(KEY_ORIGIN, "github")])).unwrap();
        store.commit(&mut other_origin).unwrap();

        let mut other_repo = Bug::new_raw(
            &alice.id,
            100,
            "b",
            "",
            metadata([
                (KEY_ORIGIN, TARGET),
                (KEY_ID, "3"),
                (KEY_BASE_URL, "https://gitea.test"),
                (KEY_PROJECT, "acme/gadgets"),
            ]),
        )
        .unwrap();
        store.commit(&mut other_repo).unwrap();

        let mut other_instance = Bug::new_raw(
            &alice.id,
            100,
            "c",
            "",
            metadata([
                (KEY_ORIGIN, TARGET),
                (KEY_ID, "3"),
                (KEY_BASE_URL, "https://other.test/"),
                (KEY_PROJECT, "acme/widgets"),
            ]),
        )
        .unwrap();
        store.commit(&mut other_instance).unwrap();

        let exporter = exporter(&alice, SyncOptions::default());
        let events = run(&exporter, &mut store).await;
        let reasons: Vec<String> = events
            .iter()
            .filter_map(|e| match e {
                ExportEvent::Nothing { reason, .. } => Some(reason.clone()),
                _ => None,
            })
            .collect();

        assert_eq!(
            reasons,
            vec![
                "issue tagged with origin: github".to_string(),
                "skipping issue imported from another repository".to_string(),
                "skipping issue imported from another Gitea instance".to_string(),
            ]
        );
        assert!(client(&exporter, &alice).writes().is_empty());
    }

    #[tokio::test]
    async fn test_bad_remote_id_is_local_to_bug() {
        let mut store = MemoryStore::new();
        let alice = local_identity(&mut store, "alice");
        let mut broken = Bug::new_raw(
            &alice.id,
            100,
            "a",
            "",
            metadata([
                (KEY_ORIGIN, TARGET),
                (KEY_ID, "not-a-number"),
                (KEY_BASE_URL, "https://gitea.test/"),
                (KEY_PROJECT, "acme/widgets"),
            ]),
        )
        .unwrap();
        store.commit(&mut broken).unwrap();
        let mut fine = Bug::new_raw(&alice.id, 100, "b", "", metadata([])).unwrap();
        store.commit(&mut fine).unwrap();

        let exporter = exporter(&alice, SyncOptions::default());
        let events = run(&exporter, &mut store).await;

        assert_eq!(count(&events, ExportEvent::is_error), 1);
        assert_eq!(count(&events, |e| matches!(e, ExportEvent::Bug { .. })), 1);
    }

    #[tokio::test]
    async fn test_transient_write_error_aborts_pass() {
        let mut store = MemoryStore::new();
        let alice = local_identity(&mut store, "alice");
        for title in ["a", "b"] {
            let mut bug = Bug::new_raw(&alice.id, 100, title, "", metadata([])).unwrap();
            store.commit(&mut bug).unwrap();
        }

        let exporter = exporter(&alice, SyncOptions::default());
        client(&exporter, &alice).fail_writes(503);
        let events = run(&exporter, &mut store).await;

        assert_eq!(events.len(), 1);
        assert!(events[0].is_error());
    }

    #[tokio::test]
    async fn test_tag_is_committed_right_after_create() {
        let mut store = MemoryStore::new();
        let alice = local_identity(&mut store, "alice");
        let mut bug = Bug::new_raw(&alice.id, 100, "Crash", "", metadata([])).unwrap();
        bug.add_comment_raw(&alice.id, 101, "details", metadata([])).unwrap();
        store.commit(&mut bug).unwrap();

        // the issue gets created, then the comment write fails
        let exporter = exporter(&alice, SyncOptions::default());
        let remote = client(&exporter, &alice);
        let events = std::cell::RefCell::new(Vec::new());
        let emit = |e: ExportEvent| {
            if matches!(e, ExportEvent::Bug { .. }) {
                remote.fail_writes(500);
            }
            events.borrow_mut().push(e);
        };
        let mut bug = store.resolve_bug(bug.id()).unwrap();
        let result = exporter
            .export_bug(&mut store, &mut bug, &CancellationToken::new(), &emit)
            .await;

        assert!(result.is_err());
        assert_eq!(events.borrow().len(), 1);
        assert_eq!(remote.writes().len(), 1);
        let reloaded = store.resolve_bug(bug.id()).unwrap().snapshot();
        assert_eq!(reloaded.get_create_metadata(KEY_ID), Some("1"));
    }

    #[tokio::test]
    async fn test_since_filter() {
        let mut store = MemoryStore::new();
        let alice = local_identity(&mut store, "alice");
        let mut old = Bug::new_raw(&alice.id, 100, "old", "", metadata([])).unwrap();
        store.commit(&mut old).unwrap();

        let options = SyncOptions {
            since: DateTime::from_timestamp(200, 0),
            ..SyncOptions::default()
        };
        let exporter = exporter(&alice, options);
        let events = run(&exporter, &mut store).await;

        assert!(client(&exporter, &alice).writes().is_empty());
        assert!(events.iter().any(|e| matches!(
            e,
            ExportEvent::Nothing { reason, .. } if reason == "bug created before the since date"
        )));
    }

    #[tokio::test]
    async fn test_cache_clients_by_login() {
        let mut store = MemoryStore::new();
        let alice = local_identity(&mut store, "alice");
        let credentials = vec![
            Credential {
                login: "alice".into(),
                token: "a".into(),
                base_url: None,
            },
            Credential {
                login: "ghost".into(),
                token: "g".into(),
                base_url: None,
            },
            Credential {
                login: "alice".into(),
                token: "x".into(),
                base_url: Some("https://other.test".into()),
            },
        ];

        let mut exporter: Exporter<FakeRemote> = Exporter::new(target(), SyncOptions::default());
        exporter
            .cache_clients(&store, &credentials, |_| Ok(FakeRemote::new()))
            .unwrap();
        assert_eq!(exporter.client_count(), 1);
        assert!(exporter.clients.contains_key(&alice.id));
    }

    #[tokio::test]
    async fn test_issue_updates_by_operation_kind() {
        type Edit = fn(&mut Bug, &str);
        let cases: [(&str, Edit, Vec<Write>); 3] = [
            (
                "description edit",
                |bug, author| {
                    let create = bug.operations()[0].id.clone();
                    bug.edit_comment_raw(author, 101, &create, "It crashes on boot", metadata([]))
                        .unwrap();
                },
                vec![Write::UpdateIssue {
                    issue: 1,
                    update: IssueUpdate::description("It crashes on boot"),
                }],
            ),
            (
                "title change",
                |bug, author| {
                    bug.set_title_raw(author, 101, "Crash on boot", metadata([])).unwrap();
                },
                vec![Write::UpdateIssue {
                    issue: 1,
                    update: IssueUpdate::title("Crash on boot"),
                }],
            ),
            (
                "close then reopen",
                |bug, author| {
                    bug.set_status_raw(author, 101, Status::Closed, metadata([])).unwrap();
                    bug.set_status_raw(author, 102, Status::Open, metadata([])).unwrap();
                },
                vec![
                    Write::UpdateIssue {
                        issue: 1,
                        update: IssueUpdate::state(StateEvent::Close),
                    },
                    Write::UpdateIssue {
                        issue: 1,
                        update: IssueUpdate::state(StateEvent::Reopen),
                    },
                ],
            ),
        ];

        for (name, edit, expected) in cases {
            let mut store = MemoryStore::new();
            let alice = local_identity(&mut store, "alice");
            let mut bug = Bug::new_raw(&alice.id, 100, "Crash", "It crashes", metadata([])).unwrap();
            edit(&mut bug, &alice.id);
            store.commit(&mut bug).unwrap();

            let exporter = exporter(&alice, SyncOptions::default());
            let events = run(&exporter, &mut store).await;
            assert_eq!(count(&events, ExportEvent::is_error), 0, "{name}: {events:?}");

            let mut want = vec![Write::CreateIssue {
                title: "Crash".into(),
                body: "It crashes".into(),
            }];
            want.extend(expected);
            assert_eq!(client(&exporter, &alice).writes(), want, "{name}");

            let snap = store.resolve_bug(bug.id()).unwrap().snapshot();
            for op in &snap.operations[1..] {
                if !matches!(op.kind, OperationKind::SetMetadata { .. }) {
                    assert!(op.get_metadata(KEY_ID).is_some(), "{name}: untagged {op:?}");
                }
            }
        }
    }

    #[tokio::test]
    async fn test_edit_of_unexported_comment_stops_only_its_bug() {
        let mut store = MemoryStore::new();
        let alice = local_identity(&mut store, "alice");
        let bob = local_identity(&mut store, "bob");

        // bob has no token, so his comment never reaches the remote
        let mut first = Bug::new_raw(&alice.id, 100, "first", "", metadata([])).unwrap();
        let comment = first.add_comment_raw(&bob.id, 101, "typo", metadata([])).unwrap();
        first
            .edit_comment_raw(&alice.id, 102, &comment, "fixed", metadata([]))
            .unwrap();
        first.set_status_raw(&alice.id, 103, Status::Closed, metadata([])).unwrap();
        store.commit(&mut first).unwrap();
        let mut second = Bug::new_raw(&alice.id, 200, "second", "", metadata([])).unwrap();
        store.commit(&mut second).unwrap();

        let exporter = exporter(&alice, SyncOptions::default());
        let events = run(&exporter, &mut store).await;

        let errors: Vec<&ExportEvent> = events.iter().filter(|e| e.is_error()).collect();
        assert_eq!(errors.len(), 1, "{events:?}");
        assert!(matches!(
            errors[0],
            ExportEvent::Error { bug: Some(id), error } if id == first.id() && error.is_invariant_violation()
        ));
        assert_eq!(count(&events, |e| matches!(e, ExportEvent::Bug { .. })), 2);
        assert_eq!(
            client(&exporter, &alice).writes(),
            vec![
                Write::CreateIssue {
                    title: "first".into(),
                    body: String::new()
                },
                Write::CreateIssue {
                    title: "second".into(),
                    body: String::new()
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_cancelled_export_reports_nothing() {
        let mut store = MemoryStore::new();
        let alice = local_identity(&mut store, "alice");
        let mut bug = Bug::new_raw(
            &alice.id,
            100,
            "Crash",
            "",
            metadata([
                (KEY_ORIGIN, TARGET),
                (KEY_ID, "1"),
                (KEY_BASE_URL, "https://gitea.test/"),
                (KEY_PROJECT, "acme/widgets"),
            ]),
        )
        .unwrap();
        bug.add_comment_raw(&alice.id, 101, "details", metadata([])).unwrap();
        store.commit(&mut bug).unwrap();

        let exporter = exporter(&alice, SyncOptions::default());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let events = std::cell::RefCell::new(Vec::new());
        let emit = |e: ExportEvent| events.borrow_mut().push(e);
        exporter
            .export_bug(&mut store, &mut bug, &cancel, &emit)
            .await
            .unwrap();

        assert!(events.borrow().is_empty(), "{:?}", events.borrow());
        assert!(client(&exporter, &alice).writes().is_empty());
    }

    #[tokio::test]
    async fn test_imported_bug_round_trip_writes_nothing() {
        let remote = FakeRemote::new();
        let alice_ref = remote.add_user(1, "alice");
        remote.add_issue(1, "Crash", "It crashes", &alice_ref);
        remote.add_note(1, 10, false, "me too", &alice_ref);
        remote.add_note(1, 11, true, "closed", &alice_ref);
        remote.add_label_event(1, 20, crate::remote::LabelAction::Add, "bug", &alice_ref);

        let mut store = MemoryStore::new();
        let importer = Importer::new(target(), remote, SyncOptions::default());
        let (tx, _rx) = mpsc::unbounded_channel();
        importer.run(&mut store, &CancellationToken::new(), &tx).await;

        let alice = store.resolve_identity_by_metadata(KEY_LOGIN, "alice").unwrap();
        let exporter = exporter(&alice, SyncOptions::default());
        run(&exporter, &mut store).await;

        assert!(client(&exporter, &alice).writes().is_empty());
    }

    #[tokio::test]
    async fn test_exported_bug_is_not_reimported_as_new() {
        let mut store = MemoryStore::new();
        let alice = local_identity(&mut store, "alice");
        let mut bug = Bug::new_raw(&alice.id, 100, "Crash", "boom", metadata([])).unwrap();
        bug.add_comment_raw(&alice.id, 101, "details", metadata([])).unwrap();
        store.commit(&mut bug).unwrap();

        let exporter = exporter(&alice, SyncOptions::default());
        run(&exporter, &mut store).await;

        // replay the pushed issue and comment as the remote would serve them
        let remote = FakeRemote::new();
        let alice_ref = remote.add_user(1, "alice");
        remote.add_issue(1, "Crash", "boom", &alice_ref);
        remote.add_note(1, 1002, false, "details", &alice_ref);

        let importer = Importer::new(target(), remote, SyncOptions::default());
        let before = store.operation_count();
        let (tx, _rx) = mpsc::unbounded_channel();
        importer.run(&mut store, &CancellationToken::new(), &tx).await;

        assert_eq!(store.all_bug_ids().unwrap().len(), 1);
        assert_eq!(store.operation_count(), before);
    }
}
