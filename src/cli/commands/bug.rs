//! Local bug authoring commands.
//!
//! These append operations to the local store only; `bugbridge export`
//! pushes them. The author is a local identity looked up by login, created
//! on first use.

use std::collections::HashMap;
use std::path::PathBuf;

use colored::Colorize;
use serde::Serialize;

use crate::bridge::{KEY_ID, KEY_LOGIN, KEY_URL};
use crate::cli::BugCommands;
use crate::cli::commands::{load_config, open_store};
use crate::error::{Error, Result};
use crate::model::{Bug, Identity, Snapshot, Status, metadata};
use crate::storage::{BugStore, SqliteStore};
use crate::text::{cleanup, cleanup_one_line};

#[derive(Serialize)]
struct BugListOutput {
    count: usize,
    bugs: Vec<BugSummary>,
}

#[derive(Serialize)]
struct BugSummary {
    id: String,
    status: Status,
    title: String,
    labels: Vec<String>,
    comments: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    remote_id: Option<String>,
}

impl From<&Snapshot> for BugSummary {
    fn from(snap: &Snapshot) -> Self {
        Self {
            id: snap.id.clone(),
            status: snap.status,
            title: snap.title.clone(),
            labels: snap.labels.iter().cloned().collect(),
            comments: snap.comments.len().saturating_sub(1),
            remote_id: snap.get_create_metadata(KEY_ID).map(ToString::to_string),
        }
    }
}

/// Execute bug commands.
pub fn execute(
    command: &BugCommands,
    author: Option<&str>,
    db_path: Option<&PathBuf>,
    config_path: Option<&PathBuf>,
    json: bool,
) -> Result<()> {
    let mut store = open_store(db_path)?;

    match command {
        BugCommands::List { status } => list(&store, status.as_deref(), json),
        BugCommands::Show { id } => show(&store, id, json),
        BugCommands::New { title, message } => {
            let title = cleanup_one_line(title);
            if title.is_empty() {
                return Err(Error::InvalidArgument("title must not be empty".to_string()));
            }
            let author = resolve_author(&mut store, author, config_path)?;
            let mut bug = Bug::new_raw(&author.id, now(), &title, &cleanup(message), metadata([]))?;
            store.commit(&mut bug)?;
            report(json, bug.id(), "created", bug.id())
        }
        BugCommands::Comment { id, message } => {
            let message = cleanup(message);
            if message.is_empty() {
                return Err(Error::InvalidArgument("comment must not be empty".to_string()));
            }
            append(&mut store, id, author, config_path, json, "commented", |bug, who| {
                bug.add_comment_raw(who, now(), &message, metadata([]))
            })
        }
        BugCommands::Close { id } => {
            append(&mut store, id, author, config_path, json, "closed", |bug, who| {
                bug.set_status_raw(who, now(), Status::Closed, metadata([]))
            })
        }
        BugCommands::Open { id } => {
            append(&mut store, id, author, config_path, json, "reopened", |bug, who| {
                bug.set_status_raw(who, now(), Status::Open, metadata([]))
            })
        }
        BugCommands::Title { id, title } => {
            let title = cleanup_one_line(title);
            if title.is_empty() {
                return Err(Error::InvalidArgument("title must not be empty".to_string()));
            }
            append(&mut store, id, author, config_path, json, "retitled", |bug, who| {
                bug.set_title_raw(who, now(), &title, metadata([]))
            })
        }
        BugCommands::Label { id, add, remove } => {
            let current = store.resolve_bug(id)?.snapshot().labels;
            let added: Vec<String> = add
                .iter()
                .map(|l| cleanup_one_line(l))
                .filter(|l| !l.is_empty() && !current.contains(l))
                .collect();
            let removed: Vec<String> = remove
                .iter()
                .map(|l| cleanup_one_line(l))
                .filter(|l| current.contains(l))
                .collect();
            if added.is_empty() && removed.is_empty() {
                return Err(Error::InvalidArgument("no label change".to_string()));
            }
            append(&mut store, id, author, config_path, json, "relabeled", |bug, who| {
                bug.force_change_labels_raw(who, now(), &added, &removed, metadata([]))
            })
        }
    }
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// The local identity for `--author`, or for the configured login.
fn resolve_author(
    store: &mut SqliteStore,
    author: Option<&str>,
    config_path: Option<&PathBuf>,
) -> Result<Identity> {
    let login = match author {
        Some(login) => login.to_string(),
        None => load_config(config_path)?.1.default_login,
    };
    if login.trim().is_empty() {
        return Err(Error::Config(
            "no author: pass --author or set a default login".to_string(),
        ));
    }

    match store.resolve_identity_by_metadata(KEY_LOGIN, &login) {
        Ok(identity) => Ok(identity),
        Err(Error::IdentityNotFound { .. }) => {
            let identity = Identity::new_raw(
                &login,
                &login,
                None,
                None,
                metadata([(KEY_LOGIN, login.as_str())]),
            );
            store.create_identity(&identity)?;
            tracing::info!(login = %login, identity = %identity.id, "created local identity");
            Ok(identity)
        }
        Err(err) => Err(err),
    }
}

fn append<F>(
    store: &mut SqliteStore,
    id: &str,
    author: Option<&str>,
    config_path: Option<&PathBuf>,
    json: bool,
    verb: &str,
    build: F,
) -> Result<()>
where
    F: FnOnce(&mut Bug, &str) -> Result<String>,
{
    let mut bug = store.resolve_bug(id)?;
    let author = resolve_author(store, author, config_path)?;
    let op = build(&mut bug, &author.id)?;
    store.commit(&mut bug)?;
    report(json, bug.id(), verb, &op)
}

fn report(json: bool, bug: &str, verb: &str, op: &str) -> Result<()> {
    if json {
        let output = serde_json::json!({
            "success": true,
            "bug": bug,
            "operation": op,
        });
        println!("{output}");
    } else {
        println!("{} {bug}", verb.green());
    }
    Ok(())
}

fn list(store: &SqliteStore, status: Option<&str>, json: bool) -> Result<()> {
    let status = status
        .map(|s| {
            Status::parse(s).map_err(|_| {
                Error::InvalidArgument(format!("unknown status '{s}' (use open or closed)"))
            })
        })
        .transpose()?;

    let mut bugs = Vec::new();
    for id in store.all_bug_ids()? {
        let snap = store.resolve_bug(&id)?.snapshot();
        if status.is_none_or(|s| snap.status == s) {
            bugs.push(BugSummary::from(&snap));
        }
    }

    if json {
        let output = BugListOutput {
            count: bugs.len(),
            bugs,
        };
        println!("{}", serde_json::to_string(&output)?);
        return Ok(());
    }

    if bugs.is_empty() {
        println!("No bugs found.");
        return Ok(());
    }
    println!("Bugs ({} found):", bugs.len());
    println!();
    for bug in &bugs {
        let icon = match bug.status {
            Status::Open => "○".green(),
            Status::Closed => "✓".dimmed(),
        };
        let remote = bug
            .remote_id
            .as_deref()
            .map(|n| format!(" #{n}"))
            .unwrap_or_default();
        print!("{icon} [{}]{} {}", bug.id, remote.cyan(), bug.title);
        if !bug.labels.is_empty() {
            print!(" {}", format!("[{}]", bug.labels.join(", ")).dimmed());
        }
        println!();
    }
    Ok(())
}

fn show(store: &SqliteStore, id: &str, json: bool) -> Result<()> {
    let snap = store.resolve_bug(id)?.snapshot();

    if json {
        println!("{}", serde_json::to_string(&snap)?);
        return Ok(());
    }

    let names: HashMap<String, String> = store
        .all_identities()?
        .into_iter()
        .map(|i| (i.id.clone(), i.display_name()))
        .collect();
    let name = |id: &str| names.get(id).cloned().unwrap_or_else(|| id.to_string());

    println!("[{}] {}", snap.id, snap.title.bold());
    println!();
    println!("Status:  {}", snap.status);
    println!("Author:  {}", name(&snap.author));
    println!("Created: {}", snap.create_time_utc().to_rfc3339());
    if !snap.labels.is_empty() {
        let labels: Vec<&str> = snap.labels.iter().map(String::as_str).collect();
        println!("Labels:  {}", labels.join(", "));
    }
    if let Some(url) = snap.get_create_metadata(KEY_URL) {
        println!("Remote:  {url}");
    }

    for (index, comment) in snap.comments.iter().enumerate() {
        println!();
        let edited = if comment.edited { " (edited)" } else { "" };
        println!(
            "{} {}{}",
            format!("#{index}").cyan(),
            name(&comment.author).bold(),
            edited.dimmed()
        );
        if !comment.message.is_empty() {
            println!("{}", comment.message);
        }
    }
    Ok(())
}
