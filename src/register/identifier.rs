// src/register/identifier.rs

//! Path predicates deciding which register a file belongs to.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use globset::GlobSet;

use crate::watch::path_utils::relative_str;
use crate::watch::patterns::build_globset;

/// Classifies absolute paths into registers.
pub type PathIdentifier = Arc<dyn Fn(&Path) -> bool + Send + Sync>;

/// Wrap a closure as a [`PathIdentifier`].
pub fn identifier<F>(f: F) -> PathIdentifier
where
    F: Fn(&Path) -> bool + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Matches every path.
pub fn any_path() -> PathIdentifier {
    identifier(|_| true)
}

/// Matches paths whose extension is `ext` (with or without the leading dot).
/// Comparison is case-sensitive.
pub fn extension(ext: &str) -> PathIdentifier {
    let ext = ext.trim_start_matches('.').to_string();
    identifier(move |path| path.extension().is_some_and(|e| e == ext.as_str()))
}

/// Matches whatever `inner` does not.
pub fn not(inner: PathIdentifier) -> PathIdentifier {
    identifier(move |path| !inner(path))
}

/// Include / exclude globs evaluated relative to a root directory.
///
/// A path matches if it is under `root`, matches at least one include pattern
/// and no exclude pattern.
#[derive(Clone)]
pub struct GlobIdentifier {
    root: PathBuf,
    include_set: GlobSet,
    exclude_set: Option<GlobSet>,
}

impl fmt::Debug for GlobIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GlobIdentifier")
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

impl GlobIdentifier {
    pub fn new(root: impl Into<PathBuf>, include: &[String], exclude: &[String]) -> Result<Self> {
        let include_set = build_globset(include).context("building include globset")?;
        let exclude_set = if exclude.is_empty() {
            None
        } else {
            Some(build_globset(exclude).context("building exclude globset")?)
        };
        Ok(Self {
            root: root.into(),
            include_set,
            exclude_set,
        })
    }

    pub fn matches(&self, path: &Path) -> bool {
        let Some(rel) = relative_str(&self.root, path) else {
            return false;
        };
        if !self.include_set.is_match(&rel) {
            return false;
        }
        if let Some(exclude) = &self.exclude_set {
            if exclude.is_match(&rel) {
                return false;
            }
        }
        true
    }

    pub fn into_identifier(self) -> PathIdentifier {
        identifier(move |path| self.matches(path))
    }
}

impl From<GlobIdentifier> for PathIdentifier {
    fn from(glob: GlobIdentifier) -> Self {
        glob.into_identifier()
    }
}
