// src/watch/table.rs

//! Table of live per-directory watches.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::Result;
use tracing::debug;

use super::backend::WatchId;
use super::path_utils::is_same_or_descendant;
use crate::subscription::Subscription;

struct Entry {
    id: WatchId,
    subscription: Box<dyn Subscription>,
}

/// Result of [`SubscriptionTable::attach`].
#[derive(Debug, PartialEq, Eq)]
pub enum AttachOutcome {
    /// A new watch was created and recorded.
    Attached(WatchId),
    /// The directory already had a live watch; nothing was created.
    AlreadyWatched(WatchId),
    /// The table has been closed; nothing was created.
    Closed,
}

/// Mapping from normalized directory path to its single live watch.
///
/// Invariants:
/// - at most one entry per directory;
/// - once [`close_all`](Self::close_all) ran, no entry is ever added again.
///
/// Keys are expected to be normalized (see
/// [`normalize_path`](super::path_utils::normalize_path)).
#[derive(Default)]
pub struct SubscriptionTable {
    entries: HashMap<PathBuf, Entry>,
    next_id: u64,
    closed: bool,
}

impl fmt::Debug for SubscriptionTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionTable")
            .field("dirs", &self.dirs())
            .field("closed", &self.closed)
            .finish()
    }
}

impl SubscriptionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Watch `dir` unless it is already watched.
    ///
    /// `open` is only called when a new watch is needed and receives the id
    /// the watch will be registered under. Check and insert happen under the
    /// same `&mut self`, so two racing callers cannot both attach.
    pub fn attach<F>(&mut self, dir: &Path, open: F) -> Result<AttachOutcome>
    where
        F: FnOnce(WatchId) -> Result<Box<dyn Subscription>>,
    {
        if self.closed {
            return Ok(AttachOutcome::Closed);
        }
        if let Some(entry) = self.entries.get(dir) {
            return Ok(AttachOutcome::AlreadyWatched(entry.id));
        }

        self.next_id += 1;
        let id = WatchId(self.next_id);
        let subscription = open(id)?;
        self.entries.insert(
            dir.to_path_buf(),
            Entry {
                id,
                subscription,
            },
        );
        debug!(?dir, %id, "watch attached");
        Ok(AttachOutcome::Attached(id))
    }

    /// True if `id` is the watch currently registered for `dir`.
    pub fn is_live(&self, dir: &Path, id: WatchId) -> bool {
        self.entries.get(dir).is_some_and(|e| e.id == id)
    }

    pub fn contains(&self, dir: &Path) -> bool {
        self.entries.contains_key(dir)
    }

    /// Close and remove the watch for `root` and for every directory under it.
    ///
    /// Returns the removed directories, sorted.
    pub fn remove_tree(&mut self, root: &Path) -> Vec<PathBuf> {
        // Snapshot the keys first; never mutate while iterating the map.
        let mut doomed: Vec<PathBuf> = self
            .entries
            .keys()
            .filter(|dir| is_same_or_descendant(dir, root))
            .cloned()
            .collect();
        doomed.sort();

        for dir in &doomed {
            if let Some(entry) = self.entries.remove(dir) {
                entry.subscription.close();
                debug!(?dir, id = %entry.id, "watch closed");
            }
        }
        doomed
    }

    /// Close every watch and refuse further attaches. Idempotent.
    pub fn close_all(&mut self) -> usize {
        self.closed = true;
        let count = self.entries.len();
        for (_, entry) in self.entries.drain() {
            entry.subscription.close();
        }
        count
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Watched directories, sorted.
    pub fn dirs(&self) -> Vec<PathBuf> {
        let mut dirs: Vec<PathBuf> = self.entries.keys().cloned().collect();
        dirs.sort();
        dirs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSubscription {
        closes: Arc<AtomicUsize>,
    }

    impl Subscription for CountingSubscription {
        fn close(&self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn counting(closes: &Arc<AtomicUsize>) -> Box<dyn Subscription> {
        Box::new(CountingSubscription {
            closes: Arc::clone(closes),
        })
    }

    #[test]
    fn attach_is_once_per_dir() {
        let closes = Arc::new(AtomicUsize::new(0));
        let mut table = SubscriptionTable::new();

        let first = table.attach(Path::new("/ws"), |_| Ok(counting(&closes))).unwrap();
        let second = table
            .attach(Path::new("/ws"), |_| panic!("must not open a second watch"))
            .unwrap();

        let AttachOutcome::Attached(id) = first else {
            panic!("expected a new watch, got {first:?}");
        };
        assert_eq!(second, AttachOutcome::AlreadyWatched(id));
        assert_eq!(table.len(), 1);
        assert!(table.is_live(Path::new("/ws"), id));
    }

    #[test]
    fn failed_open_leaves_no_entry() {
        let mut table = SubscriptionTable::new();
        let result = table.attach(Path::new("/ws/gone"), |_| Err(anyhow::anyhow!("vanished")));

        assert!(result.is_err());
        assert!(table.is_empty());
    }

    #[test]
    fn remove_tree_is_segment_wise() {
        let closes = Arc::new(AtomicUsize::new(0));
        let mut table = SubscriptionTable::new();
        for dir in ["/ws", "/ws/a", "/ws/a/b", "/ws/ab"] {
            table.attach(Path::new(dir), |_| Ok(counting(&closes))).unwrap();
        }

        let removed = table.remove_tree(Path::new("/ws/a"));

        assert_eq!(removed, vec![PathBuf::from("/ws/a"), PathBuf::from("/ws/a/b")]);
        assert_eq!(table.dirs(), vec![PathBuf::from("/ws"), PathBuf::from("/ws/ab")]);
        assert_eq!(closes.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn removing_a_file_path_removes_nothing() {
        let closes = Arc::new(AtomicUsize::new(0));
        let mut table = SubscriptionTable::new();
        table.attach(Path::new("/ws"), |_| Ok(counting(&closes))).unwrap();

        assert!(table.remove_tree(Path::new("/ws/a.txt")).is_empty());
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn close_all_is_idempotent_and_final() {
        let closes = Arc::new(AtomicUsize::new(0));
        let mut table = SubscriptionTable::new();
        table.attach(Path::new("/ws"), |_| Ok(counting(&closes))).unwrap();
        table.attach(Path::new("/ws/a"), |_| Ok(counting(&closes))).unwrap();

        assert_eq!(table.close_all(), 2);
        assert_eq!(table.close_all(), 0);
        assert_eq!(closes.load(Ordering::SeqCst), 2);

        let outcome = table.attach(Path::new("/ws/b"), |_| Ok(counting(&closes))).unwrap();
        assert_eq!(outcome, AttachOutcome::Closed);
        assert!(table.is_empty());
    }

    #[test]
    fn ids_are_not_reused_after_removal() {
        let closes = Arc::new(AtomicUsize::new(0));
        let mut table = SubscriptionTable::new();

        let AttachOutcome::Attached(old) = table.attach(Path::new("/ws/a"), |_| Ok(counting(&closes))).unwrap() else {
            panic!("expected attach");
        };
        table.remove_tree(Path::new("/ws/a"));
        let AttachOutcome::Attached(new) = table.attach(Path::new("/ws/a"), |_| Ok(counting(&closes))).unwrap() else {
            panic!("expected attach");
        };

        assert_ne!(old, new);
        assert!(!table.is_live(Path::new("/ws/a"), old));
        assert!(table.is_live(Path::new("/ws/a"), new));
    }
}
