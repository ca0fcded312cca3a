// src/watch/path_utils.rs

//! Utility functions for path handling in the watcher.

use std::path::{Component, Path, PathBuf};

/// Normalize a path into the key used by the subscription table.
///
/// Drops `.` segments and trailing separators so that `/ws/a/` and `/ws/./a`
/// both map to `/ws/a`. `..` segments are kept as-is; callers pass absolute
/// paths coming from the platform or from a canonicalized root.
pub fn normalize_path(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}

/// True if `path` equals `ancestor` or lies somewhere beneath it.
///
/// Comparison is segment-wise: `/a/bc` is *not* under `/a/b`.
pub fn is_same_or_descendant(path: &Path, ancestor: &Path) -> bool {
    path.starts_with(ancestor)
}

/// Convert a path into a string relative to `root`, with forward slashes.
///
/// Returns `None` if the path does not live under `root`.
pub fn relative_str(root: &Path, path: &Path) -> Option<String> {
    path.strip_prefix(root)
        .ok()
        .map(|rel| rel.to_string_lossy().replace('\\', "/"))
}
