// src/watch/patterns.rs

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};

use crate::watch::path_utils::relative_str;

/// Exclusion rules shared by the initial scan, directory enumeration and the
/// live watcher.
///
/// Patterns are evaluated against paths relative to `root`, e.g.
/// `"**/.git/**"` or `"target/**"`. A filter with no patterns excludes
/// nothing.
#[derive(Clone, Default)]
pub struct PathFilter {
    root: PathBuf,
    exclude_set: Option<GlobSet>,
}

impl fmt::Debug for PathFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PathFilter")
            .field("root", &self.root)
            .field("has_excludes", &self.exclude_set.is_some())
            .finish()
    }
}

impl PathFilter {
    /// Filter that lets everything through.
    pub fn allow_all(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            exclude_set: None,
        }
    }

    /// Compile `exclude` patterns relative to `root`.
    pub fn new(root: impl Into<PathBuf>, exclude: &[String]) -> Result<Self> {
        let exclude_set = if exclude.is_empty() {
            None
        } else {
            Some(build_globset(exclude).context("building exclude globset")?)
        };
        Ok(Self {
            root: root.into(),
            exclude_set,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Re-anchor the filter on another root (e.g. after canonicalization).
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    /// Returns true if `path` (absolute) matches an exclude pattern.
    ///
    /// Paths outside the root are never excluded; the root itself neither.
    pub fn is_excluded(&self, path: &Path) -> bool {
        let Some(exclude) = &self.exclude_set else {
            return false;
        };
        match relative_str(&self.root, path) {
            Some(rel) if !rel.is_empty() => exclude.is_match(&rel),
            _ => false,
        }
    }
}

/// Build a GlobSet from simple string patterns.
pub fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pat in patterns {
        let glob = Glob::new(pat).with_context(|| format!("invalid glob pattern: {pat}"))?;
        builder.add(glob);
    }
    Ok(builder.build()?)
}
