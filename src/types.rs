// src/types.rs

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Deserialize;

/// A file known to the workspace: absolute path plus its text content.
///
/// Identity is the path. The workspace cache holds at most one `File` per
/// path; updates overwrite the content in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct File {
    pub path: PathBuf,
    pub content: String,
}

impl File {
    pub fn new(path: impl Into<PathBuf>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }
}

/// Parsed record kept by a register for one file.
///
/// `infos` is `None` when the parse function extracted nothing. The record
/// still exists in that case: the file is present, it just has no infos.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfos<T> {
    pub path: PathBuf,
    pub infos: Option<T>,
}

/// Normalized kind of a change observed under a watched root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WatchEventKind {
    /// The entry exists after the notification.
    Created,
    /// The entry's content changed and it still exists.
    Modified,
    /// The entry no longer exists.
    Deleted,
}

impl fmt::Display for WatchEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WatchEventKind::Created => "created",
            WatchEventKind::Modified => "modified",
            WatchEventKind::Deleted => "deleted",
        };
        f.write_str(s)
    }
}

/// A change for a file or a directory, with an absolute path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub kind: WatchEventKind,
    pub path: PathBuf,
}

impl WatchEvent {
    pub fn new(kind: WatchEventKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            path: path.into(),
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.kind == WatchEventKind::Deleted
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Log level accepted in the `[logging]` config section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            other => Err(format!(
                "invalid log level: {other} (expected error, warn, info, debug or trace)"
            )),
        }
    }
}
