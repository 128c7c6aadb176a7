//! Import / export command implementations.
//!
//! Both commands run one pass on a tokio runtime, print each event as it
//! arrives, and fail with the first error the pass reported. Ctrl-C cancels
//! the pass; everything committed so far stays committed.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use colored::Colorize;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::bridge::{ExportEvent, Exporter, ImportEvent, Importer};
use crate::cli::commands::{load_config, open_store};
use crate::error::{Error, Result};
use crate::remote::GiteaClient;

/// Event counts for the closing summary.
#[derive(Debug, Default, Serialize)]
struct SyncStats {
    bugs: usize,
    identities: usize,
    comments: usize,
    comment_edits: usize,
    status_changes: usize,
    title_edits: usize,
    label_changes: usize,
    skipped: usize,
    errors: usize,
}

impl SyncStats {
    fn total(&self) -> usize {
        self.bugs
            + self.identities
            + self.comments
            + self.comment_edits
            + self.status_changes
            + self.title_edits
            + self.label_changes
    }
}

/// Parse an RFC 3339 `--since` value.
fn parse_since(since: Option<&str>) -> Result<Option<DateTime<Utc>>> {
    since
        .map(|value| {
            DateTime::parse_from_rfc3339(value)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|e| Error::InvalidArgument(format!("invalid --since '{value}': {e}")))
        })
        .transpose()
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new()
        .map_err(|e| Error::Other(format!("Failed to create async runtime: {e}")))
}

/// Cancel `token` on Ctrl-C.
fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, stopping after the current item");
            token.cancel();
        }
    });
}

fn print_line(message: String, is_error: bool, is_nothing: bool, json: bool) {
    if json {
        return;
    }
    if is_error {
        eprintln!("{}", message.red());
    } else if is_nothing {
        println!("{}", message.dimmed());
    } else {
        println!("{message}");
    }
}

fn print_summary(label: &str, stats: &SyncStats, json: bool, failed: bool) -> Result<()> {
    if json {
        let output = serde_json::json!({
            "success": !failed,
            "command": label,
            "stats": stats,
        });
        println!("{}", serde_json::to_string(&output)?);
    } else if stats.total() == 0 && !failed {
        println!("{label}: nothing to do");
    } else {
        println!();
        println!(
            "{label}: {} change(s), {} skipped, {} error(s)",
            stats.total().to_string().green(),
            stats.skipped,
            stats.errors
        );
    }
    Ok(())
}

/// Pull remote issues into the local store.
pub fn import(
    since: Option<&str>,
    db_path: Option<&PathBuf>,
    config_path: Option<&PathBuf>,
    json: bool,
) -> Result<()> {
    let (_, config) = load_config(config_path)?;
    config.validate()?;
    let credential = config.default_credential()?;
    let client = GiteaClient::new(
        &config.base_url,
        &config.owner,
        &config.project,
        &credential.token,
    )?;

    let mut options = config.sync_options();
    options.since = parse_since(since)?;
    let store = open_store(db_path)?;
    let importer = Importer::new(config.target(), client, options);

    runtime()?.block_on(async {
        let cancel = CancellationToken::new();
        cancel_on_ctrl_c(cancel.clone());

        let (mut events, handle) = importer.import_all(store, cancel);
        let mut stats = SyncStats::default();
        let mut first_error = None;

        while let Some(event) = events.recv().await {
            print_line(
                event.to_string(),
                event.is_error(),
                matches!(event, ImportEvent::Nothing { .. }),
                json,
            );
            match event {
                ImportEvent::Bug { .. } => stats.bugs += 1,
                ImportEvent::Identity { .. } => stats.identities += 1,
                ImportEvent::Comment { .. } => stats.comments += 1,
                ImportEvent::CommentEdition { .. } => stats.comment_edits += 1,
                ImportEvent::StatusChange { .. } => stats.status_changes += 1,
                ImportEvent::TitleEdition { .. } => stats.title_edits += 1,
                ImportEvent::LabelChange { .. } => stats.label_changes += 1,
                ImportEvent::Nothing { .. } => stats.skipped += 1,
                ImportEvent::Error { error, .. } => {
                    stats.errors += 1;
                    first_error.get_or_insert(error);
                }
            }
        }

        handle
            .await
            .map_err(|e| Error::Other(format!("import task failed: {e}")))?;
        print_summary("import", &stats, json, first_error.is_some())?;
        first_error.map_or(Ok(()), Err)
    })
}

/// Push local changes to the remote.
pub fn export(
    since: Option<&str>,
    db_path: Option<&PathBuf>,
    config_path: Option<&PathBuf>,
    json: bool,
) -> Result<()> {
    let (_, config) = load_config(config_path)?;
    config.validate()?;

    let mut options = config.sync_options();
    options.since = parse_since(since)?;
    let store = open_store(db_path)?;

    let mut exporter = Exporter::new(config.target(), options);
    exporter.cache_clients(&store, &config.resolved_credentials(), |credential| {
        GiteaClient::new(
            &config.base_url,
            &config.owner,
            &config.project,
            &credential.token,
        )
    })?;
    if exporter.client_count() == 0 {
        warn!("no credential maps to a local identity, nothing can be exported");
    }

    runtime()?.block_on(async {
        let cancel = CancellationToken::new();
        cancel_on_ctrl_c(cancel.clone());

        let (mut events, handle) = exporter.export_all(store, cancel);
        let mut stats = SyncStats::default();
        let mut first_error = None;

        while let Some(event) = events.recv().await {
            print_line(
                event.to_string(),
                event.is_error(),
                matches!(event, ExportEvent::Nothing { .. }),
                json,
            );
            match event {
                ExportEvent::Bug { .. } => stats.bugs += 1,
                ExportEvent::Comment { .. } => stats.comments += 1,
                ExportEvent::CommentEdition { .. } => stats.comment_edits += 1,
                ExportEvent::StatusChange { .. } => stats.status_changes += 1,
                ExportEvent::TitleEdition { .. } => stats.title_edits += 1,
                ExportEvent::LabelChange { .. } => stats.label_changes += 1,
                ExportEvent::Nothing { .. } => stats.skipped += 1,
                ExportEvent::Error { error, .. } => {
                    stats.errors += 1;
                    first_error.get_or_insert(error);
                }
            }
        }

        handle
            .await
            .map_err(|e| Error::Other(format!("export task failed: {e}")))?;
        print_summary("export", &stats, json, first_error.is_some())?;
        first_error.map_or(Ok(()), Err)
    })
}
