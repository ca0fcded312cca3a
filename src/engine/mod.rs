// src/engine/mod.rs

//! Workspace orchestration.
//!
//! This module ties together:
//! - the initial scan of the workspace (files plus contents)
//! - the recursive watcher and the optional update channel
//! - the in-memory file cache
//! - routing of files to registers
//!
//! The pure state machine lives in [`core`]; the async/IO shell is
//! implemented in [`manager`].

use std::path::PathBuf;

/// A change the core applies, after the shell did any IO it needed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkspaceEvent {
    /// A file was created, modified or pushed through the update channel;
    /// `content` is its current text.
    FileChanged { path: PathBuf, content: String },
    /// A file or directory is gone.
    PathDeleted { path: PathBuf },
}

pub mod core;
pub mod manager;
pub mod update;

pub use core::{CoreStep, ScanState, WorkspaceCore};
pub use manager::WorkspaceManager;
pub use update::{ContentUpdate, LocalUpdateChannel, UpdateChannel};
