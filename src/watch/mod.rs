// src/watch/mod.rs

//! Recursive directory watching.
//!
//! This module is responsible for:
//! - Watching one directory at a time through a pluggable backend (`notify`
//!   in production, a hand-driven double in tests).
//! - Keeping exactly one watch per directory of a tree while directories come
//!   and go, and tearing nested watches down when an ancestor is deleted.
//! - Turning raw per-entry notifications into `Created` / `Modified` /
//!   `Deleted` events.
//! - Listing a tree (optionally with file contents) for the initial scan.
//!
//! It does **not** know about registers or file contents routing; see
//! [`crate::engine`] for that.

pub mod backend;
pub mod mock;
pub mod path_utils;
pub mod patterns;
pub mod recursive;
pub mod scan;
pub mod table;

pub use backend::{DirectoryWatchBackend, NotificationSink, NotifyBackend, RawChange, WatchId};
pub use mock::ManualWatchBackend;
pub use patterns::PathFilter;
pub use recursive::{TreeSubscription, WatchOptions, watch_folder_in_depth};
pub use scan::{files_in_depth, files_in_depth_with_content, folders_in_depth};
pub use table::{AttachOutcome, SubscriptionTable};
