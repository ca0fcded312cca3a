// src/engine/core.rs

//! Pure workspace state machine.
//!
//! [`WorkspaceCore`] owns:
//! - the ordered identifier → register bindings
//! - the in-memory file cache
//! - the state of the initial scan, and the paths live events touched
//!   while it was running
//!
//! It has **no** channels, no Tokio types, and does not perform any IO: the
//! async shell ([`super::manager::WorkspaceManager`]) reads files and feeds
//! the results in as [`WorkspaceEvent`]s or as a finished scan. Registers are
//! in-memory and are updated directly.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, trace};

use crate::errors::{Result, TreewatchError};
use crate::register::{PathIdentifier, Register};
use crate::types::File;
use crate::watch::path_utils::is_same_or_descendant;

use super::WorkspaceEvent;

/// Progress of the initial scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    NotStarted,
    Pending,
    Done,
}

struct Binding {
    identifier: PathIdentifier,
    register: Arc<dyn Register>,
}

/// What a single [`WorkspaceCore::step`] did.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CoreStep {
    /// Index of the binding that received the update or removal, per path.
    pub routed: Vec<(PathBuf, Option<usize>)>,
}

pub struct WorkspaceCore {
    bindings: Vec<Binding>,
    cache: BTreeMap<PathBuf, String>,
    scan: ScanState,
    /// Paths written or deleted by live events while the scan is pending.
    touched: HashSet<PathBuf>,
    /// Bindings added while the scan is pending.
    bound_while_pending: Vec<usize>,
}

impl fmt::Debug for WorkspaceCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkspaceCore")
            .field("bindings", &self.bindings.len())
            .field("cached_files", &self.cache.len())
            .field("scan", &self.scan)
            .finish()
    }
}

impl Default for WorkspaceCore {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkspaceCore {
    pub fn new() -> Self {
        Self {
            bindings: Vec::new(),
            cache: BTreeMap::new(),
            scan: ScanState::NotStarted,
            touched: HashSet::new(),
            bound_while_pending: Vec::new(),
        }
    }

    pub fn scan_state(&self) -> ScanState {
        self.scan
    }

    pub fn binding_count(&self) -> usize {
        self.bindings.len()
    }

    /// Append a binding. Returns its index.
    ///
    /// - before the scan: the register gets the scanned files later;
    /// - during the scan: the register gets the scanned files plus whatever
    ///   live events cached in the meantime;
    /// - after the scan: the register is backfilled from the cache now.
    pub fn bind(&mut self, identifier: PathIdentifier, register: Arc<dyn Register>) -> usize {
        let index = self.bindings.len();
        self.bindings.push(Binding {
            identifier,
            register,
        });

        match self.scan {
            ScanState::NotStarted => {}
            ScanState::Pending => self.bound_while_pending.push(index),
            ScanState::Done => {
                let backfilled = self.backfill(index, |_| true);
                debug!(binding = index, backfilled, "register backfilled from cache");
            }
        }
        index
    }

    /// Move to `Pending`. Fails if a scan was already started.
    pub fn begin_scan(&mut self) -> Result<()> {
        if self.scan != ScanState::NotStarted {
            return Err(TreewatchError::AlreadyInitialised);
        }
        self.scan = ScanState::Pending;
        Ok(())
    }

    /// Apply the result of the initial scan.
    ///
    /// Every scanned file goes to every matching register. Files touched by
    /// live events during the scan keep their live state. Returns how many
    /// scanned files were applied.
    pub fn finish_scan(&mut self, files: Vec<File>) -> usize {
        let mut applied = 0;
        for file in files {
            if self.is_touched(&file.path) {
                trace!(path = ?file.path, "scan result superseded by live event");
                continue;
            }
            for binding in self.bindings.iter().filter(|b| (b.identifier)(&file.path)) {
                binding.register.register_file(&file);
            }
            self.cache.insert(file.path, file.content);
            applied += 1;
        }

        self.settle_pending_bindings();
        self.scan = ScanState::Done;
        applied
    }

    /// End a failed scan. Live state collected so far is kept.
    pub fn abort_scan(&mut self) {
        self.settle_pending_bindings();
        self.scan = ScanState::Done;
    }

    /// Apply one live change.
    pub fn step(&mut self, event: WorkspaceEvent) -> CoreStep {
        match event {
            WorkspaceEvent::FileChanged { path, content } => self.apply_change(path, content),
            WorkspaceEvent::PathDeleted { path } => self.apply_delete(path),
        }
    }

    fn apply_change(&mut self, path: PathBuf, content: String) -> CoreStep {
        if self.scan == ScanState::Pending {
            self.touched.insert(path.clone());
        }
        let file = File::new(path, content);
        let routed = self.register_for(&file.path);
        if let Some(index) = routed {
            self.bindings[index].register.register_file(&file);
        }
        let path = file.path.clone();
        self.cache.insert(file.path, file.content);
        CoreStep {
            routed: vec![(path, routed)],
        }
    }

    fn apply_delete(&mut self, path: PathBuf) -> CoreStep {
        if self.scan == ScanState::Pending {
            self.touched.insert(path.clone());
        }

        // A deleted directory takes every cached file under it along.
        let mut doomed: Vec<PathBuf> = self
            .cache
            .keys()
            .filter(|cached| is_same_or_descendant(cached, &path))
            .cloned()
            .collect();
        if !doomed.contains(&path) {
            doomed.insert(0, path);
        }

        let mut step = CoreStep::default();
        for doomed_path in doomed {
            self.cache.remove(&doomed_path);
            let routed = self.register_for(&doomed_path);
            if let Some(index) = routed {
                self.bindings[index].register.remove_file(&doomed_path);
            }
            step.routed.push((doomed_path, routed));
        }
        step
    }

    /// Index of the first binding whose identifier matches `path`.
    pub fn register_for(&self, path: &Path) -> Option<usize> {
        self.bindings.iter().position(|b| (b.identifier)(path))
    }

    /// Snapshot of the cache, sorted by path.
    pub fn files(&self) -> Vec<File> {
        self.cache
            .iter()
            .map(|(path, content)| File::new(path.clone(), content.clone()))
            .collect()
    }

    pub fn file(&self, path: &Path) -> Option<File> {
        self.cache
            .get(path)
            .map(|content| File::new(path.to_path_buf(), content.clone()))
    }

    fn is_touched(&self, path: &Path) -> bool {
        self.touched
            .iter()
            .any(|touched| is_same_or_descendant(path, touched))
    }

    /// Registers bound during the scan also get the files live events cached
    /// before the scan ended.
    fn settle_pending_bindings(&mut self) {
        let touched = std::mem::take(&mut self.touched);
        for index in std::mem::take(&mut self.bound_while_pending) {
            let count = self.backfill(index, |path| touched.contains(path));
            if count > 0 {
                debug!(binding = index, count, "late register received live files");
            }
        }
    }

    /// Register every cached file accepted by `select` and by the binding's
    /// identifier. Returns how many files were registered.
    fn backfill<F>(&self, index: usize, select: F) -> usize
    where
        F: Fn(&Path) -> bool,
    {
        let binding = &self.bindings[index];
        let mut count = 0;
        for (path, content) in &self.cache {
            if select(path) && (binding.identifier)(path) {
                binding.register.register_file(&File::new(path.clone(), content.clone()));
                count += 1;
            }
        }
        count
    }
}
