//! Gitea REST API client.
//!
//! Gitea has no dedicated notes or label-event listings. Both come from the
//! issue timeline: plain comments and system events become notes (system
//! events rendered to a fixed sentence grammar), label entries become label
//! events. A timeline page can therefore be empty for one listing and not for
//! the other.

use chrono::{DateTime, Utc};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::remote::{
    CreatedIssue, IssueUpdate, LabelAction, Page, RemoteApi, RemoteIssue, RemoteLabelEvent,
    RemoteNote, RemoteUser, UserRef, total_pages,
};

/// Gitea API client bound to one repository and one token.
#[derive(Debug, Clone)]
pub struct GiteaClient {
    client: reqwest::Client,
    api: String,
    owner: String,
    project: String,
    token: String,
}

impl GiteaClient {
    /// Create a client for `owner/project` on the instance at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base_url: &str, owner: &str, project: &str, token: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("bugbridge/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            api: format!("{}/api/v1", base_url.trim_end_matches('/')),
            owner: owner.to_string(),
            project: project.to_string(),
            token: token.to_string(),
        })
    }

    fn repo_url(&self, path: &str) -> String {
        format!("{}/repos/{}/{}{path}", self.api, self.owner, self.project)
    }

    /// Send a request with the token attached, mapping non-2xx answers to
    /// `Error::Remote`.
    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = request
            .header("Authorization", format!("token {}", self.token))
            .header("Accept", "application/json")
            .send()
            .await?;

        let status = response.status();
        trace!(url = %response.url(), status = status.as_u16(), "gitea response");

        if status.is_client_error() || status.is_server_error() {
            let message = response.text().await.unwrap_or_default();
            return Err(Error::Remote {
                status: status.as_u16(),
                message: remote_message(status, &message),
            });
        }

        Ok(response)
    }

    async fn timeline(
        &self,
        issue: i64,
        page: u32,
        per_page: u32,
    ) -> Result<(Vec<TimelineEntry>, u32)> {
        let response = self
            .send(
                self.client
                    .get(self.repo_url(&format!("/issues/{issue}/timeline")))
                    .query(&[("page", page), ("limit", per_page)]),
            )
            .await?;

        let header_total = header_total_count(&response);
        let entries: Vec<TimelineEntry> = response.json().await?;
        let pages = pages_for(header_total, entries.len(), page, per_page);
        Ok((entries, pages))
    }
}

/// Prefer the JSON `message` field Gitea puts in error bodies.
fn remote_message(status: StatusCode, body: &str) -> String {
    #[derive(Deserialize)]
    struct ApiError {
        message: String,
    }

    serde_json::from_str::<ApiError>(body)
        .map(|e| e.message)
        .ok()
        .filter(|m| !m.is_empty())
        .or_else(|| (!body.trim().is_empty()).then(|| body.trim().to_string()))
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed").to_string())
}

fn header_total_count(response: &Response) -> Option<u64> {
    response
        .headers()
        .get("X-Total-Count")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
}

/// Total page count from `X-Total-Count`, or guessed from the page fill when
/// the header is missing.
fn pages_for(total: Option<u64>, fetched: usize, page: u32, per_page: u32) -> u32 {
    match total {
        Some(total) => total_pages(total, per_page),
        None if fetched < per_page as usize => page,
        None => page.saturating_add(1),
    }
}

// ── Wire types ────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct IssueDto {
    number: i64,
    title: String,
    #[serde(default)]
    body: String,
    user: UserRef,
    created_at: DateTime<Utc>,
    #[serde(default)]
    html_url: String,
}

impl From<IssueDto> for RemoteIssue {
    fn from(dto: IssueDto) -> Self {
        Self {
            number: dto.number,
            title: dto.title,
            description: dto.body,
            author: dto.user,
            created_at: dto.created_at,
            url: dto.html_url,
        }
    }
}

#[derive(Debug, Deserialize)]
struct CreatedIssueDto {
    id: i64,
    number: i64,
    #[serde(default)]
    html_url: String,
}

#[derive(Debug, Deserialize)]
struct CommentDto {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct NamedDto {
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct UserSearchDto {
    #[serde(default)]
    data: Vec<RemoteUser>,
}

#[derive(Debug, Deserialize)]
struct TimelineEntry {
    id: i64,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    body: String,
    user: Option<UserRef>,
    created_at: DateTime<Utc>,
    updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    old_title: String,
    #[serde(default)]
    new_title: String,
    label: Option<NamedDto>,
    assignee: Option<UserRef>,
    #[serde(default)]
    removed_assignee: bool,
    milestone: Option<NamedDto>,
}

#[derive(Debug, Serialize)]
struct CreateIssueBody<'a> {
    title: &'a str,
    body: &'a str,
}

#[derive(Debug, Serialize)]
struct BodyOnly<'a> {
    body: &'a str,
}

#[derive(Debug, Serialize)]
struct EditIssueBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    body: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    state: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct ReplaceLabelsBody<'a> {
    labels: &'a [String],
}

/// Render a timeline entry as a note, or `None` for label entries.
fn render_note(entry: &TimelineEntry) -> Option<RemoteNote> {
    let system_body = match entry.kind.as_str() {
        "comment" => None,
        "label" => return None,
        "close" => Some("closed".to_string()),
        "reopen" => Some("reopened".to_string()),
        "change_title" => Some(format!(
            "changed title from **{}** to **{}**",
            entry.old_title, entry.new_title
        )),
        "lock" => Some("locked this issue".to_string()),
        "unlock" => Some("unlocked this issue".to_string()),
        "added_deadline" | "modified_deadline" => {
            Some(format!("changed due date to {}", entry.body))
        }
        "removed_deadline" => Some("removed due date".to_string()),
        "assignees" => {
            let login = entry.assignee.as_ref().map_or("", |a| a.login.as_str());
            if entry.removed_assignee {
                Some(format!("unassigned @{login}"))
            } else {
                Some(format!("assigned to @{login}"))
            }
        }
        "milestone" => match &entry.milestone {
            Some(m) => Some(format!("changed milestone to %{}", m.name)),
            None => Some("removed milestone".to_string()),
        },
        "issue_ref" | "comment_ref" => Some("mentioned in issue".to_string()),
        "pull_ref" => Some("mentioned in merge request".to_string()),
        other => Some(other.to_string()),
    };

    let author = entry.user.clone().unwrap_or(UserRef {
        id: -1,
        login: "ghost".to_string(),
    });

    Some(RemoteNote {
        id: entry.id,
        system: system_body.is_some(),
        body: system_body.unwrap_or_else(|| entry.body.clone()),
        author,
        created_at: entry.created_at,
        updated_at: entry.updated_at.unwrap_or(entry.created_at),
        new_title: (entry.kind == "change_title").then(|| entry.new_title.clone()),
    })
}

/// Render a `label` timeline entry. Gitea marks an addition with body `"1"`.
fn render_label_event(entry: &TimelineEntry) -> Option<RemoteLabelEvent> {
    if entry.kind != "label" {
        return None;
    }
    let label = entry.label.as_ref()?;
    let action = if entry.body == "1" {
        LabelAction::Add
    } else {
        LabelAction::Remove
    };

    Some(RemoteLabelEvent {
        id: entry.id,
        action,
        label: label.name.clone(),
        actor: entry.user.clone().unwrap_or(UserRef {
            id: -1,
            login: "ghost".to_string(),
        }),
        created_at: entry.created_at,
    })
}

impl RemoteApi for GiteaClient {
    async fn list_issues(
        &self,
        page: u32,
        per_page: u32,
        since: Option<DateTime<Utc>>,
    ) -> Result<Page<RemoteIssue>> {
        let mut request = self
            .client
            .get(self.repo_url("/issues"))
            .query(&[("state", "all"), ("type", "issues")])
            .query(&[("page", page), ("limit", per_page)]);
        if let Some(since) = since {
            request = request.query(&[("since", since.to_rfc3339())]);
        }

        let response = self.send(request).await?;
        let header_total = header_total_count(&response);
        let issues: Vec<IssueDto> = response.json().await?;
        let pages = pages_for(header_total, issues.len(), page, per_page);
        debug!(page, pages, count = issues.len(), "listed issues");

        Ok(Page::new(issues.into_iter().map(Into::into).collect(), pages))
    }

    async fn list_notes(&self, issue: i64, page: u32, per_page: u32) -> Result<Page<RemoteNote>> {
        let (entries, pages) = self.timeline(issue, page, per_page).await?;
        let mut notes: Vec<RemoteNote> = entries.iter().filter_map(render_note).collect();
        notes.sort_by_key(|n| (n.created_at, n.id));
        Ok(Page::new(notes, pages))
    }

    async fn list_label_events(
        &self,
        issue: i64,
        page: u32,
        per_page: u32,
    ) -> Result<Page<RemoteLabelEvent>> {
        let (entries, pages) = self.timeline(issue, page, per_page).await?;
        Ok(Page::new(
            entries.iter().filter_map(render_label_event).collect(),
            pages,
        ))
    }

    async fn get_user(&self, id: i64) -> Result<RemoteUser> {
        let response = self
            .send(
                self.client
                    .get(format!("{}/users/search", self.api))
                    .query(&[("uid", id)]),
            )
            .await?;
        let found: UserSearchDto = response.json().await?;

        found
            .data
            .into_iter()
            .find(|u| u.id == id)
            .ok_or_else(|| Error::Remote {
                status: 404,
                message: format!("user {id} not found"),
            })
    }

    async fn create_issue(&self, title: &str, body: &str) -> Result<CreatedIssue> {
        let response = self
            .send(
                self.client
                    .post(self.repo_url("/issues"))
                    .json(&CreateIssueBody { title, body }),
            )
            .await?;
        let created: CreatedIssueDto = response.json().await?;

        Ok(CreatedIssue {
            id: created.id,
            number: created.number,
            url: created.html_url,
        })
    }

    async fn create_note(&self, issue: i64, body: &str) -> Result<i64> {
        let response = self
            .send(
                self.client
                    .post(self.repo_url(&format!("/issues/{issue}/comments")))
                    .json(&BodyOnly { body }),
            )
            .await?;
        let comment: CommentDto = response.json().await?;
        Ok(comment.id)
    }

    async fn update_note(&self, _issue: i64, note: i64, body: &str) -> Result<()> {
        self.send(
            self.client
                .patch(self.repo_url(&format!("/issues/comments/{note}")))
                .json(&BodyOnly { body }),
        )
        .await?;
        Ok(())
    }

    async fn update_issue(&self, issue: i64, update: &IssueUpdate) -> Result<()> {
        let edit = EditIssueBody {
            title: update.title.as_deref(),
            body: update.description.as_deref(),
            state: update.state_event.map(|s| s.remote_state()),
        };
        if edit.title.is_some() || edit.body.is_some() || edit.state.is_some() {
            self.send(
                self.client
                    .patch(self.repo_url(&format!("/issues/{issue}")))
                    .json(&edit),
            )
            .await?;
        }

        if let Some(labels) = &update.labels {
            self.send(
                self.client
                    .put(self.repo_url(&format!("/issues/{issue}/labels")))
                    .json(&ReplaceLabelsBody { labels }),
            )
            .await?;
        }

        Ok(())
    }
}
