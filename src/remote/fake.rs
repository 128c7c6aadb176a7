//! In-memory remote used by driver tests.
//!
//! Serves issues, notes and label events with real pagination, counts every
//! listing fetch, and records every write. Created issues are added to the
//! served listing.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};

use crate::error::{Error, Result};
use crate::remote::{
    CreatedIssue, IssueUpdate, LabelAction, Page, RemoteApi, RemoteIssue, RemoteLabelEvent,
    RemoteNote, RemoteUser, UserRef, total_pages,
};

/// A write received by the fake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Write {
    CreateIssue { title: String, body: String },
    CreateNote { issue: i64, body: String },
    UpdateNote { issue: i64, note: i64, body: String },
    UpdateIssue { issue: i64, update: IssueUpdate },
}

#[derive(Debug, Default)]
struct FakeIssue {
    issue: Option<RemoteIssue>,
    notes: Vec<RemoteNote>,
    label_events: Vec<RemoteLabelEvent>,
}

#[derive(Debug, Default)]
struct State {
    issues: Vec<FakeIssue>,
    users: HashMap<i64, RemoteUser>,
    writes: Vec<Write>,
    issue_fetches: usize,
    note_fetches: HashMap<i64, usize>,
    label_fetches: HashMap<i64, usize>,
    user_fetches: usize,
    fail_issue_page: Option<u32>,
    fail_notes_of: Option<i64>,
    fail_writes: Option<u16>,
    next_id: i64,
}

/// In-memory [`RemoteApi`].
#[derive(Debug, Default)]
pub struct FakeRemote {
    state: Mutex<State>,
}

pub fn at(seconds: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000 + seconds, 0).unwrap()
}

fn paginate<T: Clone>(items: &[T], page: u32, per_page: u32) -> Page<T> {
    let per = per_page as usize;
    let start = (page.saturating_sub(1) as usize) * per;
    let chunk = items.iter().skip(start).take(per).cloned().collect();
    Page::new(chunk, total_pages(items.len() as u64, per_page))
}

impl FakeRemote {
    pub fn new() -> Self {
        let fake = Self::default();
        fake.state.lock().unwrap().next_id = 1000;
        fake
    }

    pub fn add_user(&self, id: i64, login: &str) -> UserRef {
        self.state.lock().unwrap().users.insert(
            id,
            RemoteUser {
                id,
                login: login.to_string(),
                full_name: format!("{login} full"),
                email: format!("{login}@example.com"),
                avatar_url: String::new(),
            },
        );
        UserRef {
            id,
            login: login.to_string(),
        }
    }

    pub fn add_issue(&self, number: i64, title: &str, description: &str, author: &UserRef) {
        let mut state = self.state.lock().unwrap();
        state.issues.push(FakeIssue {
            issue: Some(RemoteIssue {
                number,
                title: title.to_string(),
                description: description.to_string(),
                author: author.clone(),
                created_at: at(number),
                url: format!("https://gitea.test/acme/widgets/issues/{number}"),
            }),
            ..FakeIssue::default()
        });
    }

    pub fn add_note(&self, issue: i64, id: i64, system: bool, body: &str, author: &UserRef) {
        let mut state = self.state.lock().unwrap();
        let target = Self::issue_mut(&mut state, issue);
        target.notes.push(RemoteNote {
            id,
            system,
            body: body.to_string(),
            author: author.clone(),
            created_at: at(id),
            updated_at: at(id),
            new_title: None,
        });
    }

    /// Record a title change the way Gitea's timeline reports it.
    pub fn add_title_change(&self, issue: i64, id: i64, old: &str, new: &str, author: &UserRef) {
        let mut state = self.state.lock().unwrap();
        let target = Self::issue_mut(&mut state, issue);
        target.notes.push(RemoteNote {
            id,
            system: true,
            body: format!("changed title from **{old}** to **{new}**"),
            author: author.clone(),
            created_at: at(id),
            updated_at: at(id),
            new_title: Some(new.to_string()),
        });
    }

    pub fn edit_note(&self, issue: i64, id: i64, body: &str) {
        let mut state = self.state.lock().unwrap();
        let target = Self::issue_mut(&mut state, issue);
        let note = target.notes.iter_mut().find(|n| n.id == id).unwrap();
        note.body = body.to_string();
        note.updated_at = at(id + 500);
    }

    pub fn set_description(&self, issue: i64, body: &str) {
        let mut state = self.state.lock().unwrap();
        let target = Self::issue_mut(&mut state, issue);
        target.issue.as_mut().unwrap().description = body.to_string();
    }

    pub fn add_label_event(
        &self,
        issue: i64,
        id: i64,
        action: LabelAction,
        label: &str,
        actor: &UserRef,
    ) {
        let mut state = self.state.lock().unwrap();
        let target = Self::issue_mut(&mut state, issue);
        target.label_events.push(RemoteLabelEvent {
            id,
            action,
            label: label.to_string(),
            actor: actor.clone(),
            created_at: at(id),
        });
    }

    /// Make the issue listing fail when `page` is requested.
    pub fn fail_issues_on_page(&self, page: u32) {
        self.state.lock().unwrap().fail_issue_page = Some(page);
    }

    /// Make the notes listing of `issue` fail.
    pub fn fail_notes_of(&self, issue: i64) {
        self.state.lock().unwrap().fail_notes_of = Some(issue);
    }

    /// Make every write fail with the given HTTP status.
    pub fn fail_writes(&self, status: u16) {
        self.state.lock().unwrap().fail_writes = Some(status);
    }

    pub fn writes(&self) -> Vec<Write> {
        self.state.lock().unwrap().writes.clone()
    }

    pub fn clear_writes(&self) {
        self.state.lock().unwrap().writes.clear();
    }

    pub fn issue_fetches(&self) -> usize {
        self.state.lock().unwrap().issue_fetches
    }

    pub fn note_fetches(&self, issue: i64) -> usize {
        *self.state.lock().unwrap().note_fetches.get(&issue).unwrap_or(&0)
    }

    pub fn label_fetches(&self, issue: i64) -> usize {
        *self.state.lock().unwrap().label_fetches.get(&issue).unwrap_or(&0)
    }

    pub fn user_fetches(&self) -> usize {
        self.state.lock().unwrap().user_fetches
    }

    fn issue_mut(state: &mut State, number: i64) -> &mut FakeIssue {
        state
            .issues
            .iter_mut()
            .find(|i| i.issue.as_ref().is_some_and(|i| i.number == number))
            .unwrap()
    }

    fn record(state: &mut State, write: Write) -> Result<()> {
        if let Some(status) = state.fail_writes {
            return Err(Error::Remote {
                status,
                message: "write rejected".to_string(),
            });
        }
        state.writes.push(write);
        Ok(())
    }
}

impl RemoteApi for FakeRemote {
    async fn list_issues(
        &self,
        page: u32,
        per_page: u32,
        _since: Option<DateTime<Utc>>,
    ) -> Result<Page<RemoteIssue>> {
        let mut state = self.state.lock().unwrap();
        state.issue_fetches += 1;
        if state.fail_issue_page == Some(page) {
            return Err(Error::Remote {
                status: 502,
                message: "bad gateway".to_string(),
            });
        }
        let issues: Vec<RemoteIssue> = state.issues.iter().filter_map(|i| i.issue.clone()).collect();
        Ok(paginate(&issues, page, per_page))
    }

    async fn list_notes(&self, issue: i64, page: u32, per_page: u32) -> Result<Page<RemoteNote>> {
        let mut state = self.state.lock().unwrap();
        *state.note_fetches.entry(issue).or_default() += 1;
        if state.fail_notes_of == Some(issue) {
            return Err(Error::Timeout(std::time::Duration::from_secs(60)));
        }
        let notes = Self::issue_mut(&mut state, issue).notes.clone();
        Ok(paginate(&notes, page, per_page))
    }

    async fn list_label_events(
        &self,
        issue: i64,
        page: u32,
        per_page: u32,
    ) -> Result<Page<RemoteLabelEvent>> {
        let mut state = self.state.lock().unwrap();
        *state.label_fetches.entry(issue).or_default() += 1;
        let events = Self::issue_mut(&mut state, issue).label_events.clone();
        Ok(paginate(&events, page, per_page))
    }

    async fn get_user(&self, id: i64) -> Result<RemoteUser> {
        let mut state = self.state.lock().unwrap();
        state.user_fetches += 1;
        state.users.get(&id).cloned().ok_or_else(|| Error::Remote {
            status: 404,
            message: format!("user {id} not found"),
        })
    }

    async fn create_issue(&self, title: &str, body: &str) -> Result<CreatedIssue> {
        let mut state = self.state.lock().unwrap();
        Self::record(
            &mut state,
            Write::CreateIssue {
                title: title.to_string(),
                body: body.to_string(),
            },
        )?;
        let number = i64::try_from(state.issues.len()).unwrap() + 1;
        state.next_id += 1;
        let id = state.next_id;
        let url = format!("https://gitea.test/acme/widgets/issues/{number}");
        state.issues.push(FakeIssue {
            issue: Some(RemoteIssue {
                number,
                title: title.to_string(),
                description: body.to_string(),
                author: UserRef {
                    id: 0,
                    login: String::new(),
                },
                created_at: at(0),
                url: url.clone(),
            }),
            ..FakeIssue::default()
        });
        Ok(CreatedIssue { id, number, url })
    }

    async fn create_note(&self, issue: i64, body: &str) -> Result<i64> {
        let mut state = self.state.lock().unwrap();
        Self::record(
            &mut state,
            Write::CreateNote {
                issue,
                body: body.to_string(),
            },
        )?;
        state.next_id += 1;
        Ok(state.next_id)
    }

    async fn update_note(&self, issue: i64, note: i64, body: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        Self::record(
            &mut state,
            Write::UpdateNote {
                issue,
                note,
                body: body.to_string(),
            },
        )
    }

    async fn update_issue(&self, issue: i64, update: &IssueUpdate) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        Self::record(
            &mut state,
            Write::UpdateIssue {
                issue,
                update: update.clone(),
            },
        )
    }
}
