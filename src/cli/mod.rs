//! CLI definitions using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub mod commands;

/// bugbridge - sync a local bug store with a Gitea repository
#[derive(Parser, Debug)]
#[command(name = "bugbridge", author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Database path (default: ~/.bugbridge/bugs.db)
    #[arg(long, global = true, env = "BUGBRIDGE_DB")]
    pub db: Option<PathBuf>,

    /// Config file path (default: ~/.bugbridge/config.json)
    #[arg(long, global = true, env = "BUGBRIDGE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Increase logging verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (no output except errors)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Pull remote issues into the local store
    Import {
        /// Only issues updated since this time (RFC 3339)
        #[arg(long)]
        since: Option<String>,
    },

    /// Push local changes to the remote
    Export {
        /// Only bugs created since this time (RFC 3339)
        #[arg(long)]
        since: Option<String>,
    },

    /// Bridge configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Local bug authoring
    Bug {
        /// Login of the author (defaults to the configured login)
        #[arg(long, global = true)]
        author: Option<String>,

        #[command(subcommand)]
        command: BugCommands,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Supported shells for completions.
#[derive(clap::ValueEnum, Clone, Debug)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}

// ============================================================================
// Config Commands
// ============================================================================

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Print the current configuration (tokens masked)
    Show,

    /// Set target and tunables
    Set {
        /// Remote base URL
        #[arg(long)]
        base_url: Option<String>,

        /// Repository owner
        #[arg(long)]
        owner: Option<String>,

        /// Repository name
        #[arg(long)]
        project: Option<String>,

        /// Default login, used for import and local authoring
        #[arg(long)]
        login: Option<String>,

        /// Per-call timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Listing page size
        #[arg(long)]
        page_size: Option<u32>,
    },

    /// Store a token for a login
    AddToken {
        #[arg(long)]
        login: String,

        #[arg(long)]
        token: String,

        /// Instance the token belongs to (defaults to the configured one)
        #[arg(long)]
        base_url: Option<String>,
    },
}

// ============================================================================
// Bug Commands
// ============================================================================

#[derive(Subcommand, Debug)]
pub enum BugCommands {
    /// List local bugs
    List {
        /// Filter by status (open, closed)
        #[arg(short, long)]
        status: Option<String>,
    },

    /// Show a bug with its comments
    Show {
        /// Bug ID (full or unique prefix)
        id: String,
    },

    /// Create a bug
    New {
        title: String,

        /// Description
        #[arg(short, long, default_value = "")]
        message: String,
    },

    /// Add a comment
    Comment { id: String, message: String },

    /// Close a bug
    Close { id: String },

    /// Reopen a bug
    Open { id: String },

    /// Change the title
    Title { id: String, title: String },

    /// Add or remove labels
    Label {
        id: String,

        /// Labels to add (comma-separated)
        #[arg(short, long, value_delimiter = ',')]
        add: Vec<String>,

        /// Labels to remove (comma-separated)
        #[arg(short, long, value_delimiter = ',')]
        remove: Vec<String>,
    },
}
