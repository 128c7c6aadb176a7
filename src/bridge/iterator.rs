//! Resumable pagination over remote listings.
//!
//! A [`Cursor`] walks one paginated listing scope as a state machine:
//!
//! ```text
//! Empty ──advance──▶ Fetching ──page──▶ Cached ◀─┐
//!                        │                 │     │ next page
//!                        │ error           │ ────┘
//!                        ▼                 ▼ last page consumed
//!                     Errored          Exhausted
//! ```
//!
//! `Errored` and `Exhausted` are terminal until [`Cursor::reset`] moves the
//! cursor to a new scope. A cursor never retries a failed fetch by itself.
//!
//! [`IssueIterator`] composes one issues cursor with two per-issue cursors
//! (notes and label events) and owns the sticky error for the whole pass.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::bridge::{SyncOptions, bounded};
use crate::error::{Error, Result};
use crate::remote::{Page, RemoteApi, RemoteIssue, RemoteLabelEvent, RemoteNote};

/// Pagination state of one listing scope.
#[derive(Debug)]
enum CursorState<T> {
    /// Nothing fetched yet for the current scope
    Empty,
    /// A page request is in flight (or was dropped while in flight)
    Fetching,
    /// A page is buffered; `index` points at the current item
    Cached {
        items: Vec<T>,
        index: usize,
        last_page: bool,
    },
    /// Every page of the scope has been consumed
    Exhausted,
    /// The last fetch failed; the error was handed to the caller
    Errored,
}

/// Resumable cursor over one paginated listing.
#[derive(Debug)]
pub struct Cursor<T> {
    state: CursorState<T>,
    scope: Option<i64>,
    page: u32,
    per_page: u32,
    timeout: Duration,
}

impl<T> Cursor<T> {
    #[must_use]
    pub fn new(per_page: u32, timeout: Duration) -> Self {
        Self {
            state: CursorState::Empty,
            scope: None,
            page: 1,
            per_page: per_page.max(1),
            timeout,
        }
    }

    /// Start over on a new scope (e.g. the next issue's notes).
    pub fn reset(&mut self, scope: Option<i64>) {
        self.state = CursorState::Empty;
        self.scope = scope;
        self.page = 1;
    }

    #[must_use]
    pub fn scope(&self) -> Option<i64> {
        self.scope
    }

    /// The item under the cursor, if positioned on one.
    #[must_use]
    pub fn current(&self) -> Option<&T> {
        match &self.state {
            CursorState::Cached { items, index, .. } => items.get(*index),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        matches!(self.state, CursorState::Exhausted)
    }

    #[must_use]
    pub fn is_errored(&self) -> bool {
        matches!(self.state, CursorState::Errored)
    }

    /// Move to the next item, fetching the next page when the buffer is used up.
    ///
    /// Returns `Ok(false)` once the scope is exhausted, and on every call after
    /// an error until [`Cursor::reset`]. Each fetch is bounded by the cursor's
    /// timeout. A page that comes back empty ends the scope, unless the remote
    /// reports more pages after it.
    ///
    /// # Errors
    ///
    /// Returns the fetch error (or `Error::Timeout`); the cursor is then
    /// `Errored`.
    pub async fn advance<F, Fut>(&mut self, mut fetch: F) -> Result<bool>
    where
        F: FnMut(u32, u32) -> Fut,
        Fut: Future<Output = Result<Page<T>>>,
    {
        loop {
            match &mut self.state {
                CursorState::Exhausted | CursorState::Errored => return Ok(false),
                CursorState::Cached {
                    items,
                    index,
                    last_page,
                } => {
                    if *index + 1 < items.len() {
                        *index += 1;
                        return Ok(true);
                    }
                    if *last_page {
                        self.state = CursorState::Exhausted;
                        return Ok(false);
                    }
                }
                CursorState::Empty | CursorState::Fetching => {}
            }

            let page = self.page;
            self.state = CursorState::Fetching;
            trace!(scope = ?self.scope, page, "fetching page");

            let fetched = match bounded(self.timeout, fetch(page, self.per_page)).await {
                Ok(fetched) => fetched,
                Err(err) => {
                    self.state = CursorState::Errored;
                    self.page = 1;
                    return Err(err);
                }
            };

            let last_page = fetched.total_pages <= page;
            self.page = page.saturating_add(1);

            if fetched.items.is_empty() {
                if last_page {
                    self.state = CursorState::Exhausted;
                    return Ok(false);
                }
                continue;
            }

            self.state = CursorState::Cached {
                items: fetched.items,
                index: 0,
                last_page,
            };
            return Ok(true);
        }
    }
}

/// Composite iterator: issues, and for the current issue its notes and label
/// events.
///
/// The child cursors are reset to the new issue every time the issues cursor
/// moves. The first error from any cursor becomes sticky: it halts every
/// cursor, siblings included, until the iterator is dropped.
pub struct IssueIterator<'a, R> {
    client: &'a R,
    since: Option<chrono::DateTime<chrono::Utc>>,
    cancel: CancellationToken,
    issues: Cursor<RemoteIssue>,
    notes: Cursor<RemoteNote>,
    label_events: Cursor<RemoteLabelEvent>,
    error: Option<Error>,
}

impl<'a, R: RemoteApi> IssueIterator<'a, R> {
    #[must_use]
    pub fn new(client: &'a R, options: &SyncOptions, cancel: CancellationToken) -> Self {
        Self {
            client,
            since: options.since,
            cancel,
            issues: Cursor::new(options.page_size, options.timeout),
            notes: Cursor::new(options.page_size, options.timeout),
            label_events: Cursor::new(options.page_size, options.timeout),
            error: None,
        }
    }

    /// True once an error was recorded or the pass was cancelled.
    #[must_use]
    pub fn halted(&self) -> bool {
        self.error.is_some() || self.cancel.is_cancelled()
    }

    fn record(&mut self, result: Result<bool>) -> bool {
        match result {
            Ok(more) => more,
            Err(err) => {
                debug!(error = %err, "iterator halted");
                self.error = Some(err);
                false
            }
        }
    }

    /// Advance to the next issue and rescope the child cursors to it.
    pub async fn next_issue(&mut self) -> bool {
        if self.halted() {
            return false;
        }

        let client = self.client;
        let since = self.since;
        let result = self
            .issues
            .advance(|page, per_page| client.list_issues(page, per_page, since))
            .await;
        let more = self.record(result);

        if more {
            let number = self.issues.current().map(|issue| issue.number);
            self.notes.reset(number);
            self.label_events.reset(number);
        }
        more
    }

    #[must_use]
    pub fn issue(&self) -> Option<&RemoteIssue> {
        self.issues.current()
    }

    /// Advance to the next note of the current issue.
    pub async fn next_note(&mut self) -> bool {
        if self.halted() {
            return false;
        }
        let Some(issue) = self.notes.scope() else {
            return false;
        };

        let client = self.client;
        let result = self
            .notes
            .advance(|page, per_page| client.list_notes(issue, page, per_page))
            .await;
        self.record(result)
    }

    #[must_use]
    pub fn note(&self) -> Option<&RemoteNote> {
        self.notes.current()
    }

    /// Advance to the next label event of the current issue.
    pub async fn next_label_event(&mut self) -> bool {
        if self.halted() {
            return false;
        }
        let Some(issue) = self.label_events.scope() else {
            return false;
        };

        let client = self.client;
        let result = self
            .label_events
            .advance(|page, per_page| client.list_label_events(issue, page, per_page))
            .await;
        self.record(result)
    }

    #[must_use]
    pub fn label_event(&self) -> Option<&RemoteLabelEvent> {
        self.label_events.current()
    }

    /// The sticky error, if any cursor failed.
    #[must_use]
    pub fn error(&self) -> Option<&Error> {
        self.error.as_ref()
    }

    /// Take the sticky error out, for reporting it exactly once.
    pub fn take_error(&mut self) -> Option<Error> {
        self.error.take()
    }
}
