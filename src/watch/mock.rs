// src/watch/mock.rs

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::{Result, anyhow};

use super::backend::{DirectoryWatchBackend, NotificationSink, RawChange};
use crate::subscription::Subscription;

#[derive(Debug)]
struct ManualWatch {
    dir: PathBuf,
    sink: NotificationSink,
    open: Arc<AtomicBool>,
}

#[derive(Debug, Default)]
struct ManualState {
    watches: Vec<ManualWatch>,
    failing: HashSet<PathBuf>,
}

/// Watch backend driven by hand from tests.
///
/// Every `watch_dir` call is recorded. Tests then call [`fire`](Self::fire)
/// to simulate the platform reporting a change for an entry; the
/// notification is delivered to every watch ever attached to the entry's
/// parent directory, *including closed ones*, which models a platform that
/// keeps firing after teardown. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct ManualWatchBackend {
    state: Arc<Mutex<ManualState>>,
}

impl ManualWatchBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ManualState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Simulate a rename-style notification (create, delete, move) for `path`.
    pub fn fire(&self, path: impl AsRef<Path>) {
        self.fire_change(path, RawChange::Rename);
    }

    /// Simulate a notification of the given kind for `path`.
    ///
    /// Returns how many watches (open or closed) received it.
    pub fn fire_change(&self, path: impl AsRef<Path>, change: RawChange) -> usize {
        let path = path.as_ref();
        let Some(parent) = path.parent() else {
            return 0;
        };
        let state = self.lock();
        let mut delivered = 0;
        for watch in state.watches.iter().filter(|w| w.dir == parent) {
            watch.sink.entry_changed(path.to_path_buf(), change);
            delivered += 1;
        }
        delivered
    }

    /// Make future `watch_dir` calls for `dir` fail.
    pub fn fail_on(&self, dir: impl AsRef<Path>) {
        self.lock().failing.insert(dir.as_ref().to_path_buf());
    }

    /// Directories with at least one open watch, sorted.
    pub fn open_watches(&self) -> Vec<PathBuf> {
        let state = self.lock();
        let mut dirs: Vec<PathBuf> = state
            .watches
            .iter()
            .filter(|w| w.open.load(Ordering::SeqCst))
            .map(|w| w.dir.clone())
            .collect();
        dirs.sort();
        dirs
    }

    /// Number of `watch_dir` calls that succeeded for `dir`.
    pub fn attach_count(&self, dir: impl AsRef<Path>) -> usize {
        let dir = dir.as_ref();
        self.lock().watches.iter().filter(|w| w.dir == dir).count()
    }

    /// True if `dir` has been watched and every watch on it is now closed.
    pub fn is_closed(&self, dir: impl AsRef<Path>) -> bool {
        let dir = dir.as_ref();
        let state = self.lock();
        let mut watches = state.watches.iter().filter(|w| w.dir == dir).peekable();
        watches.peek().is_some() && watches.all(|w| !w.open.load(Ordering::SeqCst))
    }
}

impl DirectoryWatchBackend for ManualWatchBackend {
    fn watch_dir(&self, dir: &Path, sink: NotificationSink) -> Result<Box<dyn Subscription>> {
        let mut state = self.lock();
        if state.failing.contains(dir) {
            return Err(anyhow!("cannot watch {:?}: no such directory", dir));
        }
        let open = Arc::new(AtomicBool::new(true));
        state.watches.push(ManualWatch {
            dir: dir.to_path_buf(),
            sink,
            open: Arc::clone(&open),
        });
        Ok(Box::new(ManualSubscription { open }))
    }
}

struct ManualSubscription {
    open: Arc<AtomicBool>,
}

impl Subscription for ManualSubscription {
    fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::watch::backend::{WatchId, WatcherMessage};
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn fire_reaches_watches_on_parent_dir_even_when_closed() {
        let backend = ManualWatchBackend::new();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let sub = backend
            .watch_dir(Path::new("/ws"), NotificationSink::new(WatchId(1), "/ws", tx))
            .unwrap();
        assert_eq!(backend.open_watches(), vec![PathBuf::from("/ws")]);

        sub.close();
        sub.close();
        assert!(backend.is_closed("/ws"));

        assert_eq!(backend.fire_change("/ws/a.txt", RawChange::Rename), 1);
        assert!(matches!(rx.recv().await, Some(WatcherMessage::Notification(_))));
        assert_eq!(backend.fire_change("/other/a.txt", RawChange::Rename), 0);
    }

    #[test]
    fn failing_dirs_are_rejected() {
        let backend = ManualWatchBackend::new();
        backend.fail_on("/ws/gone");
        let (tx, _rx) = mpsc::unbounded_channel();

        let result = backend.watch_dir(
            Path::new("/ws/gone"),
            NotificationSink::new(WatchId(1), "/ws/gone", tx),
        );
        assert!(result.is_err());
        assert_eq!(backend.attach_count("/ws/gone"), 0);
    }
}
