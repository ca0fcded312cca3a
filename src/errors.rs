// src/errors.rs

//! Crate-wide error aliases and helpers.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TreewatchError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Watch error: {0}")]
    WatchError(#[from] notify::Error),

    #[error("Invalid glob pattern: {0}")]
    PatternError(#[from] globset::Error),

    #[error("Failed to read {path:?}: {message}")]
    ReadError { path: PathBuf, message: String },

    #[error("Workspace already initialised")]
    AlreadyInitialised,

    #[error("Workspace disposed")]
    Disposed,

    #[error("Background task failed: {0}")]
    JoinError(#[from] tokio::task::JoinError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl TreewatchError {
    /// Wrap a boundary read failure, keeping the whole context chain.
    pub fn read(path: impl Into<PathBuf>, err: &anyhow::Error) -> Self {
        TreewatchError::ReadError {
            path: path.into(),
            message: format!("{err:#}"),
        }
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, TreewatchError>;
