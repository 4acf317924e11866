// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{DagError, Result};

/// File name looked up when no `--config` is given.
pub const DEFAULT_CONFIG_FILE: &str = "Dagrun.toml";

/// Read and deserialize a task file without semantic validation.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|e| {
        DagError::ConfigError(format!("cannot read config '{}': {e}", path.display()))
    })?;
    parse_str(&contents)
}

/// Deserialize a task file from a string.
pub fn parse_str(contents: &str) -> Result<RawConfigFile> {
    let config: RawConfigFile = toml::from_str(contents)?;
    Ok(config)
}

/// Load a task file and validate it.
///
/// Checks the run section, task kinds, capture regexes and durations. The
/// dependency structure is checked later, when the graph is built.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let path = path.as_ref();
    let raw = load_from_path(path)?;
    let config = ConfigFile::try_from(raw)?;
    debug!(path = %path.display(), tasks = config.task.len(), "config loaded");
    Ok(config)
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from(DEFAULT_CONFIG_FILE)
}

/// Directory that relative paths in a config file are resolved against.
///
/// A bare file name like `Dagrun.toml` resolves to the current directory.
pub fn config_root_dir(config_path: &Path) -> PathBuf {
    match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    }
}
