//! Command implementations.

pub mod bug;
pub mod completions;
pub mod config;
pub mod sync;

use std::path::{Path, PathBuf};

use crate::config::{BridgeConfig, resolve_config_path, resolve_db_path};
use crate::error::{Error, Result};
use crate::storage::SqliteStore;

/// Open the local store, creating it on first use.
pub(crate) fn open_store(db_path: Option<&PathBuf>) -> Result<SqliteStore> {
    let db_path = resolve_db_path(db_path.map(PathBuf::as_path))
        .ok_or_else(|| Error::Config("Could not determine database path".to_string()))?;
    SqliteStore::open(&db_path)
}

/// Load the configuration, returning the path it was read from.
pub(crate) fn load_config(config_path: Option<&PathBuf>) -> Result<(PathBuf, BridgeConfig)> {
    let path = resolve_config_path(config_path.map(PathBuf::as_path))?;
    let config = BridgeConfig::load(&path)?;
    Ok((path, config))
}

/// Display a path for humans.
pub(crate) fn display_path(path: &Path) -> String {
    path.display().to_string()
}
