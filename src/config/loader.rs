// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::Result;

/// Load a configuration file from a given path and return the raw `RawConfigFile`.
///
/// This only performs TOML deserialization; it does **not** resolve the
/// workspace root or validate patterns. Use [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let config: RawConfigFile = toml::from_str(&contents)?;

    Ok(config)
}

/// Load a configuration file from path, resolve the workspace root against
/// the config file's directory and validate the result.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let path = path.as_ref();
    let mut raw_config = load_from_path(path)?;
    raw_config.workspace.root = resolve_root(path, &raw_config.workspace.root);
    debug!(config = ?path, root = ?raw_config.workspace.root, "config loaded");

    let config = ConfigFile::try_from(raw_config)?;
    Ok(config)
}

/// Directory the config file lives in.
///
/// - `"configs/treewatch.toml"` → `"configs"`
/// - a bare `"treewatch.toml"` (empty parent) → the current directory.
pub fn config_root_dir(config_path: &Path) -> PathBuf {
    match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    }
}

fn resolve_root(config_path: &Path, root: &Path) -> PathBuf {
    if root.is_absolute() {
        root.to_path_buf()
    } else {
        config_root_dir(config_path).join(root)
    }
}

/// Default config file name, looked up in the current directory.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("treewatch.toml")
}
