// src/lib.rs

//! Keep typed, parsed views of the files under a directory tree up to date
//! while the tree changes.
//!
//! - [`watch`]: recursive directory watcher built from one non-recursive
//!   watch per directory.
//! - [`register`]: typed registers and the path predicates that select files
//!   for them.
//! - [`engine`]: the workspace manager that scans, watches and routes files
//!   to registers.

pub mod config;
pub mod engine;
pub mod errors;
pub mod fs;
pub mod logging;
pub mod register;
pub mod subscription;
pub mod types;
pub mod watch;

pub use engine::{ContentUpdate, LocalUpdateChannel, UpdateChannel, WorkspaceManager};
pub use errors::{Result, TreewatchError};
pub use register::{FileRegister, FilesRegistry, PathIdentifier};
pub use subscription::Subscription;
pub use types::{File, FileInfos, WatchEvent, WatchEventKind};
pub use watch::{TreeSubscription, WatchOptions, watch_folder_in_depth};
