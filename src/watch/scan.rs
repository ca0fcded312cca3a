// src/watch/scan.rs

//! Recursive directory listings used by the initial scan and by the
//! recursive watcher's directory enumeration.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::errors::{self, TreewatchError};
use crate::fs::FileSystem;
use crate::types::File;
use crate::watch::patterns::PathFilter;

/// Collect every file under `root`, depth-first.
///
/// Symlinked directories are not followed; symlinked files are listed.
///
/// Any listing failure aborts the scan: the caller asked for the complete
/// set of files. Entries that vanish between listing and stat are skipped.
pub fn files_in_depth(fs: &dyn FileSystem, root: &Path, filter: &PathFilter) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut stack = vec![root.to_path_buf()];

    while let Some(dir) = stack.pop() {
        let entries = fs
            .read_dir(&dir)
            .with_context(|| format!("unable to scan directory {:?}", dir))?;
        for path in entries {
            if filter.is_excluded(&path) {
                continue;
            }
            if fs.is_dir(&path) {
                if fs.is_symlink(&path) {
                    debug!(?path, "not descending into symlinked directory");
                } else {
                    stack.push(path);
                }
            } else if fs.is_file(&path) {
                files.push(path);
            }
        }
    }

    files.sort();
    Ok(files)
}

/// Collect every directory nested under `root` (excluding `root` itself).
///
/// Best effort: a directory that cannot be listed (typically because it was
/// removed mid-walk) contributes no subdirectories.
pub fn folders_in_depth(fs: &dyn FileSystem, root: &Path, filter: &PathFilter) -> Vec<PathBuf> {
    let mut folders = Vec::new();
    let mut stack = vec![root.to_path_buf()];

    while let Some(dir) = stack.pop() {
        let entries = match fs.read_dir(&dir) {
            Ok(entries) => entries,
            Err(err) => {
                debug!(?dir, "skipping unlistable directory: {err:#}");
                continue;
            }
        };
        for path in entries {
            if !filter.is_excluded(&path) && fs.is_dir(&path) && !fs.is_symlink(&path) {
                folders.push(path.clone());
                stack.push(path);
            }
        }
    }

    folders.sort();
    folders
}

/// Collect every file under `root` together with its content.
///
/// Each file is read on its own blocking task, so one failing read does not
/// stop the others. When some reads fail, the first failure (in path order)
/// is returned once every read has finished.
pub async fn files_in_depth_with_content(
    fs: Arc<dyn FileSystem>,
    root: PathBuf,
    filter: PathFilter,
) -> errors::Result<Vec<File>> {
    let listing_fs = Arc::clone(&fs);
    let listing_root = root.clone();
    let paths = tokio::task::spawn_blocking(move || {
        files_in_depth(listing_fs.as_ref(), &listing_root, &filter)
    })
    .await??;

    let mut reads = JoinSet::new();
    for (index, path) in paths.into_iter().enumerate() {
        let fs = Arc::clone(&fs);
        reads.spawn_blocking(move || {
            let content = fs.read_to_string(&path);
            (index, path, content)
        });
    }

    let mut files = Vec::with_capacity(reads.len());
    let mut failures = Vec::new();
    while let Some(joined) = reads.join_next().await {
        let (index, path, content) = joined?;
        match content {
            Ok(content) => files.push((index, File { path, content })),
            Err(err) => {
                warn!(?path, "failed to read file during scan: {err:#}");
                failures.push((index, TreewatchError::read(path, &err)));
            }
        }
    }

    if let Some((_, err)) = failures.into_iter().min_by_key(|(index, _)| *index) {
        return Err(err);
    }

    files.sort_by_key(|(index, _)| *index);
    debug!(root = ?root, count = files.len(), "scanned files with content");
    Ok(files.into_iter().map(|(_, file)| file).collect())
}
