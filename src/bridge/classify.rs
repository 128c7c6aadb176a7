//! Classification of remote activity records.
//!
//! System-generated records carry their meaning in a fixed sentence. This
//! module maps `(system, body)` to a typed [`NoteKind`] without any I/O.

/// What a remote activity record means.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoteKind {
    /// A user comment; carries the body verbatim
    Comment(String),
    Closed,
    Reopened,
    DescriptionChanged,
    Locked,
    Unlocked,
    /// Carries the extracted new title
    TitleChanged(String),
    DueDateChanged,
    DueDateRemoved,
    Assigned,
    Unassigned,
    MilestoneChanged,
    MilestoneRemoved,
    MentionedInIssue,
    MentionedInMergeRequest,
    /// No rule matched
    Unknown,
}

impl NoteKind {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Comment(_) => "comment",
            Self::Closed => "closed",
            Self::Reopened => "reopened",
            Self::DescriptionChanged => "description_changed",
            Self::Locked => "locked",
            Self::Unlocked => "unlocked",
            Self::TitleChanged(_) => "title_changed",
            Self::DueDateChanged => "due_date_changed",
            Self::DueDateRemoved => "due_date_removed",
            Self::Assigned => "assigned",
            Self::Unassigned => "unassigned",
            Self::MilestoneChanged => "milestone_changed",
            Self::MilestoneRemoved => "milestone_removed",
            Self::MentionedInIssue => "mentioned_in_issue",
            Self::MentionedInMergeRequest => "mentioned_in_merge_request",
            Self::Unknown => "unknown",
        }
    }
}

enum Rule {
    Exact(&'static str),
    Prefix(&'static str),
}

/// Ordered match table for system-generated bodies.
const RULES: &[(Rule, fn(&str) -> NoteKind)] = &[
    (Rule::Exact("closed"), |_| NoteKind::Closed),
    (Rule::Exact("reopened"), |_| NoteKind::Reopened),
    (Rule::Exact("changed the description"), |_| {
        NoteKind::DescriptionChanged
    }),
    (Rule::Exact("locked this issue"), |_| NoteKind::Locked),
    (Rule::Exact("unlocked this issue"), |_| NoteKind::Unlocked),
    (Rule::Prefix("changed title from"), |body| {
        NoteKind::TitleChanged(extract_new_title(body))
    }),
    (Rule::Prefix("changed due date to"), |_| {
        NoteKind::DueDateChanged
    }),
    (Rule::Exact("removed due date"), |_| NoteKind::DueDateRemoved),
    (Rule::Prefix("assigned to @"), |_| NoteKind::Assigned),
    (Rule::Prefix("unassigned @"), |_| NoteKind::Unassigned),
    (Rule::Prefix("changed milestone to %"), |_| {
        NoteKind::MilestoneChanged
    }),
    (Rule::Prefix("removed milestone"), |_| {
        NoteKind::MilestoneRemoved
    }),
    (Rule::Prefix("mentioned in issue"), |_| {
        NoteKind::MentionedInIssue
    }),
    (Rule::Prefix("mentioned in merge request"), |_| {
        NoteKind::MentionedInMergeRequest
    }),
];

/// Classify a remote activity record.
#[must_use]
pub fn classify(system: bool, body: &str) -> NoteKind {
    if !system {
        return NoteKind::Comment(body.to_string());
    }

    RULES
        .iter()
        .find(|(rule, _)| match rule {
            Rule::Exact(text) => body == *text,
            Rule::Prefix(prefix) => body.starts_with(prefix),
        })
        .map_or(NoteKind::Unknown, |(_, kind)| kind(body))
}

/// Extract the new title from `changed title from **old** to **new**`.
///
/// The titles may carry inline diff markers (`{+added+}`, `{-removed-}`);
/// the markers are dropped and the enclosed text kept.
#[must_use]
pub fn extract_new_title(body: &str) -> String {
    let new = body.split_once("** to **").map_or("", |(_, new)| new);
    let new = ["{+", "+}", "{-", "-}"]
        .iter()
        .fold(new.to_string(), |acc, marker| acc.replace(marker, ""));
    new.strip_suffix("**").unwrap_or(&new).to_string()
}
