//! Error types for bugbridge.
//!
//! Provides structured error handling with:
//! - Machine-readable error codes (`ErrorCode`)
//! - Category-based exit codes (2=storage, 3=not_found, 6=remote, 10=invariant, etc.)
//! - Transient/invariant classification used by the sync drivers
//! - Context-aware recovery hints
//! - Structured JSON output for piped / non-TTY consumers

use std::time::Duration;
use thiserror::Error;

/// Result type alias for bugbridge operations.
pub type Result<T> = std::result::Result<T, Error>;

// ── Error Code ────────────────────────────────────────────────

/// Machine-readable error codes grouped by category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Storage (exit 2)
    DatabaseError,

    // Not Found (exit 3)
    BugNotFound,
    IdentityNotFound,
    OperationNotFound,
    AmbiguousMatch,

    // Validation (exit 4)
    InvalidArgument,
    MappingError,

    // Credentials (exit 5)
    MissingCredential,

    // Remote (exit 6)
    RemoteError,
    Timeout,

    // Config (exit 7)
    ConfigError,

    // I/O (exit 8)
    IoError,
    JsonError,

    // Invariant (exit 10)
    InvariantViolation,

    // Internal (exit 1)
    InternalError,
}

impl ErrorCode {
    /// Machine-readable SCREAMING_SNAKE code string.
    #[must_use]
    pub const fn as_str(&self) -> &str {
        match self {
            Self::DatabaseError => "DATABASE_ERROR",
            Self::BugNotFound => "BUG_NOT_FOUND",
            Self::IdentityNotFound => "IDENTITY_NOT_FOUND",
            Self::OperationNotFound => "OPERATION_NOT_FOUND",
            Self::AmbiguousMatch => "AMBIGUOUS_MATCH",
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::MappingError => "MAPPING_ERROR",
            Self::MissingCredential => "MISSING_CREDENTIAL",
            Self::RemoteError => "REMOTE_ERROR",
            Self::Timeout => "TIMEOUT",
            Self::ConfigError => "CONFIG_ERROR",
            Self::IoError => "IO_ERROR",
            Self::JsonError => "JSON_ERROR",
            Self::InvariantViolation => "INVARIANT_VIOLATION",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Category-based exit code.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::InternalError => 1,
            Self::DatabaseError => 2,
            Self::BugNotFound
            | Self::IdentityNotFound
            | Self::OperationNotFound
            | Self::AmbiguousMatch => 3,
            Self::InvalidArgument | Self::MappingError => 4,
            Self::MissingCredential => 5,
            Self::RemoteError | Self::Timeout => 6,
            Self::ConfigError => 7,
            Self::IoError | Self::JsonError => 8,
            Self::InvariantViolation => 10,
        }
    }

    /// Whether re-running the whole pass may succeed.
    ///
    /// True for network failures and timeouts: every prior commit is an
    /// idempotent checkpoint, so a re-run picks up where this one stopped.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::RemoteError | Self::Timeout | Self::DatabaseError)
    }
}

// ── Error Enum ────────────────────────────────────────────────

/// Errors that can occur in bugbridge operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Remote API error ({status}): {message}")]
    Remote { status: u16, message: String },

    #[error("Remote call timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("Bug not found: {id}")]
    BugNotFound { id: String },

    #[error("Multiple bugs match: {}", ids.join(", "))]
    AmbiguousBug { ids: Vec<String> },

    #[error("Identity not found: {key}={value}")]
    IdentityNotFound { key: String, value: String },

    #[error("{count} identities share {key}={value}")]
    AmbiguousIdentity {
        key: String,
        value: String,
        count: usize,
    },

    #[error("Operation not found: {id}")]
    OperationNotFound { id: String },

    #[error("Missing credential for {login}")]
    MissingCredential { login: String },

    #[error("Mapping error: {0}")]
    Mapping(String),

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Map this error to its structured `ErrorCode`.
    #[must_use]
    pub const fn error_code(&self) -> ErrorCode {
        match self {
            Self::Http(_) | Self::Remote { .. } => ErrorCode::RemoteError,
            Self::Timeout(_) => ErrorCode::Timeout,
            Self::BugNotFound { .. } => ErrorCode::BugNotFound,
            Self::IdentityNotFound { .. } => ErrorCode::IdentityNotFound,
            Self::OperationNotFound { .. } => ErrorCode::OperationNotFound,
            Self::AmbiguousBug { .. } | Self::AmbiguousIdentity { .. } => {
                ErrorCode::AmbiguousMatch
            }
            Self::MissingCredential { .. } => ErrorCode::MissingCredential,
            Self::Mapping(_) => ErrorCode::MappingError,
            Self::InvariantViolation(_) => ErrorCode::InvariantViolation,
            Self::Database(_) => ErrorCode::DatabaseError,
            Self::Io(_) => ErrorCode::IoError,
            Self::Json(_) => ErrorCode::JsonError,
            Self::Config(_) => ErrorCode::ConfigError,
            Self::InvalidArgument(_) => ErrorCode::InvalidArgument,
            Self::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Category-based exit code, delegating to the `ErrorCode`.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        self.error_code().exit_code()
    }

    /// Network or timeout failure on a remote call.
    ///
    /// Client errors (4xx) are not transient: repeating the request
    /// returns the same answer.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(_) | Self::Timeout(_) => true,
            Self::Remote { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }

    /// A closed-set dispatch point received a value it cannot handle.
    #[must_use]
    pub const fn is_invariant_violation(&self) -> bool {
        matches!(self, Self::InvariantViolation(_))
    }

    /// Errors that stop only the bug or issue being processed.
    #[must_use]
    pub const fn is_local_to_entity(&self) -> bool {
        matches!(self, Self::Mapping(_))
    }

    /// Context-aware recovery hint for humans and scripts.
    ///
    /// Returns `None` if no actionable suggestion exists.
    #[must_use]
    pub fn hint(&self) -> Option<String> {
        match self {
            Self::MissingCredential { login } => Some(format!(
                "Add a token for '{login}': bugbridge config add-token --login {login} --token <TOKEN>"
            )),

            Self::Config(_) => Some(
                "Configure the target first: bugbridge config set --owner <OWNER> --project <PROJECT> --login <LOGIN>"
                    .to_string(),
            ),

            Self::BugNotFound { id } => Some(format!(
                "No bug with ID '{id}'. Use `bugbridge bug list` to see local bugs."
            )),

            Self::AmbiguousIdentity { key, value, .. } => Some(format!(
                "Several local identities carry {key}={value}. Merge them before syncing again."
            )),

            Self::Remote { status: 401 | 403, .. } => {
                Some("The remote rejected the token. Check its scopes or replace it.".to_string())
            }

            Self::Http(_) | Self::Timeout(_) => {
                Some("Re-run the same command: already synchronized items are skipped.".to_string())
            }

            Self::InvariantViolation(_) => Some(
                "This is a bug in bugbridge or a corrupted store. Please report it with -vv output."
                    .to_string(),
            ),

            Self::Remote { .. }
            | Self::AmbiguousBug { .. }
            | Self::IdentityNotFound { .. }
            | Self::OperationNotFound { .. }
            | Self::Mapping(_)
            | Self::Database(_)
            | Self::Io(_)
            | Self::Json(_)
            | Self::InvalidArgument(_)
            | Self::Other(_) => None,
        }
    }

    /// Structured JSON representation for machine consumption.
    #[must_use]
    pub fn to_structured_json(&self) -> serde_json::Value {
        let code = self.error_code();
        let mut obj = serde_json::json!({
            "error": {
                "code": code.as_str(),
                "message": self.to_string(),
                "retryable": code.is_retryable(),
                "exit_code": code.exit_code(),
            }
        });

        if let Some(hint) = self.hint() {
            obj["error"]["hint"] = serde_json::Value::String(hint);
        }

        obj
    }
}
