#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use treewatch::config::{ConfigFile, RawConfigFile};
use treewatch::fs::FileSystem;
use treewatch::fs::mock::MockFileSystem;
use treewatch::types::LogLevel;

/// Builder for an in-memory file tree rooted at a workspace directory.
///
/// Paths given to `file` / `dir` are relative to the root.
pub struct MockTreeBuilder {
    root: PathBuf,
    fs: MockFileSystem,
}

impl MockTreeBuilder {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let fs = MockFileSystem::new();
        fs.add_dir(&root);
        Self { root, fs }
    }

    pub fn file(self, rel: &str, content: &str) -> Self {
        self.fs.add_file(self.root.join(rel), content);
        self
    }

    pub fn dir(self, rel: &str) -> Self {
        self.fs.add_dir(self.root.join(rel));
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The filesystem as a concrete mock, to keep mutating it in the test.
    pub fn build(self) -> MockFileSystem {
        self.fs
    }

    /// The filesystem plus a trait-object handle to hand to the crate.
    pub fn build_shared(self) -> (MockFileSystem, Arc<dyn FileSystem>) {
        let shared: Arc<dyn FileSystem> = Arc::new(self.fs.clone());
        (self.fs, shared)
    }
}

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let mut config = RawConfigFile::default();
        config.workspace.root = root.into();
        Self { config }
    }

    pub fn exclude(mut self, pattern: &str) -> Self {
        self.config.workspace.exclude.push(pattern.to_string());
        self
    }

    pub fn report_modifications(mut self, report: bool) -> Self {
        self.config.watch.report_modifications = report;
        self
    }

    pub fn log_level(mut self, level: LogLevel) -> Self {
        self.config.logging.level = Some(level);
        self
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}
