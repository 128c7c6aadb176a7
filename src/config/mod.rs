//! Configuration management.
//!
//! Bridge settings live in `~/.bugbridge/config.json` (or the path given by
//! `--config` / `BUGBRIDGE_CONFIG`). The local store defaults to
//! `~/.bugbridge/bugs.db`.
//!
//! Tokens are stored per login. `GITEA_TOKEN` in the environment supplies a
//! token for the default login without writing it to disk.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::bridge::{BridgeTarget, DEFAULT_PAGE_SIZE, SyncOptions, same_base_url};
use crate::error::{Error, Result};

/// Default remote instance.
pub const DEFAULT_BASE_URL: &str = "https://gitea.com/";

const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// A remote access token tied to a login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub login: String,
    pub token: String,
    /// Instance the token belongs to; `None` means the configured base URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

impl Credential {
    /// True if this credential can be used against `base_url`.
    #[must_use]
    pub fn applies_to(&self, base_url: &str) -> bool {
        self.base_url
            .as_deref()
            .is_none_or(|url| same_base_url(url, base_url))
    }
}

/// Persisted bridge configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub base_url: String,
    pub owner: String,
    pub project: String,
    pub default_login: String,
    pub timeout_secs: u64,
    pub page_size: u32,
    pub credentials: Vec<Credential>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            owner: String::new(),
            project: String::new(),
            default_login: String::new(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            page_size: DEFAULT_PAGE_SIZE,
            credentials: Vec::new(),
        }
    }
}

impl BridgeConfig {
    /// Load from `path`, or return defaults if the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns a config error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read config file: {e}")))?;

        serde_json::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse config file: {e}")))
    }

    /// Write to `path`, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns a config error if the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| Error::Config(format!("Failed to create config directory: {e}")))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {e}")))?;

        fs::write(path, content)
            .map_err(|e| Error::Config(format!("Failed to write config file: {e}")))
    }

    /// Check the target is fully configured.
    ///
    /// # Errors
    ///
    /// Returns a config error naming the first missing field.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("base-url", &self.base_url),
            ("owner", &self.owner),
            ("project", &self.project),
        ] {
            if value.trim().is_empty() {
                return Err(Error::Config(format!("{name} is not set")));
            }
        }
        if self.page_size == 0 {
            return Err(Error::Config("page-size must be at least 1".to_string()));
        }
        Ok(())
    }

    #[must_use]
    pub fn target(&self) -> BridgeTarget {
        BridgeTarget::new(&self.base_url, &self.owner, &self.project)
    }

    #[must_use]
    pub fn sync_options(&self) -> SyncOptions {
        SyncOptions {
            timeout: Duration::from_secs(self.timeout_secs.max(1)),
            page_size: self.page_size,
            since: None,
        }
    }

    /// Add or replace the token for `login` on `base_url`.
    pub fn set_credential(&mut self, credential: Credential) {
        self.credentials.retain(|c| {
            !(c.login == credential.login && c.base_url == credential.base_url)
        });
        self.credentials.push(credential);
    }

    /// Every credential usable against the configured instance, including the
    /// `GITEA_TOKEN` one for the default login.
    #[must_use]
    pub fn resolved_credentials(&self) -> Vec<Credential> {
        self.credentials_with_env(std::env::var("GITEA_TOKEN").ok())
    }

    fn credentials_with_env(&self, env_token: Option<String>) -> Vec<Credential> {
        let mut creds: Vec<Credential> = self
            .credentials
            .iter()
            .filter(|c| c.applies_to(&self.base_url))
            .cloned()
            .collect();

        if let Some(token) = env_token.filter(|t| !t.trim().is_empty()) {
            if !self.default_login.is_empty() {
                creds.retain(|c| c.login != self.default_login);
                creds.insert(
                    0,
                    Credential {
                        login: self.default_login.clone(),
                        token,
                        base_url: None,
                    },
                );
            }
        }
        creds
    }

    /// The default login's credential, used by the importer.
    ///
    /// # Errors
    ///
    /// Returns `MissingCredential` if none is configured.
    pub fn default_credential(&self) -> Result<Credential> {
        if self.default_login.is_empty() {
            return Err(Error::Config("default login is not set".to_string()));
        }
        self.resolved_credentials()
            .into_iter()
            .find(|c| c.login == self.default_login)
            .ok_or_else(|| Error::MissingCredential {
                login: self.default_login.clone(),
            })
    }
}

/// Get the global bugbridge directory (`~/.bugbridge`).
#[must_use]
pub fn global_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|b| b.home_dir().join(".bugbridge"))
}

/// Resolve the config file path.
///
/// Priority: explicit flag (clap already folds in `BUGBRIDGE_CONFIG`), then
/// `~/.bugbridge/config.json`.
///
/// # Errors
///
/// Returns a config error if no home directory can be determined.
pub fn resolve_config_path(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }
    global_dir()
        .map(|dir| dir.join("config.json"))
        .ok_or_else(|| Error::Config("Could not determine home directory".into()))
}

/// Resolve the database path.
///
/// Priority:
/// 1. If `explicit_path` is provided, use it directly
/// 2. `BUGBRIDGE_DB` environment variable
/// 3. Global location: `~/.bugbridge/bugs.db`
#[must_use]
pub fn resolve_db_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return Some(path.to_path_buf());
    }

    if let Ok(db_path) = std::env::var("BUGBRIDGE_DB") {
        if !db_path.trim().is_empty() {
            return Some(PathBuf::from(db_path));
        }
    }

    global_dir().map(|dir| dir.join("bugs.db"))
}
