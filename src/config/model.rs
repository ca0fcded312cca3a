// src/config/model.rs

use std::path::PathBuf;

use serde::Deserialize;

use crate::types::LogLevel;

/// Configuration as read from a TOML file, before validation.
///
/// ```toml
/// [workspace]
/// root = "."
/// exclude = ["**/.git/**", "target/**"]
///
/// [watch]
/// report_modifications = true
///
/// [logging]
/// level = "debug"
/// ```
///
/// All sections are optional and have reasonable defaults.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawConfigFile {
    #[serde(default)]
    pub workspace: WorkspaceSection,

    #[serde(default)]
    pub watch: WatchSection,

    #[serde(default)]
    pub logging: LoggingSection,
}

/// Validated configuration. Obtain one through
/// [`load_and_validate`](super::load_and_validate) or `TryFrom<RawConfigFile>`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub workspace: WorkspaceSection,
    pub watch: WatchSection,
    pub logging: LoggingSection,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(raw: RawConfigFile) -> Self {
        Self {
            workspace: raw.workspace,
            watch: raw.watch,
            logging: raw.logging,
        }
    }
}

/// `[workspace]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkspaceSection {
    /// Directory to watch. Relative paths are resolved against the directory
    /// containing the config file.
    #[serde(default = "default_root")]
    pub root: PathBuf,

    /// Globs (relative to `root`) for paths that are neither scanned nor
    /// watched.
    #[serde(default)]
    pub exclude: Vec<String>,
}

fn default_root() -> PathBuf {
    PathBuf::from(".")
}

impl Default for WorkspaceSection {
    fn default() -> Self {
        Self {
            root: default_root(),
            exclude: Vec::new(),
        }
    }
}

/// `[watch]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct WatchSection {
    /// Report content changes, not only creations and deletions.
    #[serde(default = "default_report_modifications")]
    pub report_modifications: bool,
}

fn default_report_modifications() -> bool {
    true
}

impl Default for WatchSection {
    fn default() -> Self {
        Self {
            report_modifications: default_report_modifications(),
        }
    }
}

/// `[logging]` section.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct LoggingSection {
    /// Overrides `TREEWATCH_LOG` when set.
    #[serde(default)]
    pub level: Option<LogLevel>,
}
