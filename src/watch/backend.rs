// src/watch/backend.rs

//! Single-directory watch primitive.
//!
//! The recursive watcher never talks to the platform directly. It asks a
//! [`DirectoryWatchBackend`] to watch one directory at a time
//! (non-recursively) and receives one generic notification per changed entry
//! through a [`NotificationSink`].
//!
//! - [`NotifyBackend`] is the production implementation on top of `notify`.
//! - [`super::mock::ManualWatchBackend`] lets tests fire notifications by hand.

use std::fmt;
use std::path::{Path, PathBuf};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::{Context, Result};
use notify::event::ModifyKind;
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{trace, warn};

use crate::subscription::Subscription;

/// Identifier of one attached directory watch.
///
/// Ids are never reused within a recursive watcher, so a notification can be
/// matched against the watch that is *currently* registered for a directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WatchId(pub u64);

impl fmt::Display for WatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "watch#{}", self.0)
    }
}

/// What the platform told us about an entry, before disambiguation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawChange {
    /// The entry appeared, disappeared or was renamed. Which one is decided
    /// later by checking whether the path still exists.
    Rename,
    /// The entry's content changed.
    Change,
}

/// A notification produced by a single-directory watch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawNotification {
    pub watch_id: WatchId,
    pub dir: PathBuf,
    pub path: PathBuf,
    pub change: RawChange,
}

/// Messages consumed by the recursive watcher's event loop.
#[derive(Debug)]
pub enum WatcherMessage {
    Notification(RawNotification),
    Shutdown,
}

/// Where a single-directory watch delivers its notifications.
///
/// Cheap to clone; sending never blocks. Sending after the recursive watcher
/// has shut down is silently ignored.
#[derive(Debug, Clone)]
pub struct NotificationSink {
    watch_id: WatchId,
    dir: PathBuf,
    tx: mpsc::UnboundedSender<WatcherMessage>,
}

impl NotificationSink {
    pub fn new(watch_id: WatchId, dir: impl Into<PathBuf>, tx: mpsc::UnboundedSender<WatcherMessage>) -> Self {
        Self {
            watch_id,
            dir: dir.into(),
            tx,
        }
    }

    pub fn watch_id(&self) -> WatchId {
        self.watch_id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Report a change for `path`, an absolute path of an entry in `dir`.
    pub fn entry_changed(&self, path: PathBuf, change: RawChange) {
        let notification = RawNotification {
            watch_id: self.watch_id,
            dir: self.dir.clone(),
            path,
            change,
        };
        if self.tx.send(WatcherMessage::Notification(notification)).is_err() {
            trace!(watch = %self.watch_id, "watcher loop gone; dropping notification");
        }
    }
}

/// Watch one directory (not its subdirectories).
pub trait DirectoryWatchBackend: Send + Sync + fmt::Debug {
    /// Start watching `dir`. The returned subscription must stop delivering
    /// into `sink` once closed, and closing it must never fail.
    fn watch_dir(&self, dir: &Path, sink: NotificationSink) -> Result<Box<dyn Subscription>>;
}

/// Sinks registered for one watched directory, keyed by backend token.
type SinkMap = HashMap<PathBuf, Vec<(u64, NotificationSink)>>;

/// Production backend on top of `notify`.
///
/// A single `RecommendedWatcher` is shared by every directory watch (one
/// inotify instance on Linux); each directory is added with
/// `RecursiveMode::NonRecursive` and events are routed to the sinks of the
/// entry's parent directory. Clones share the watcher.
#[derive(Clone, Default)]
pub struct NotifyBackend {
    inner: Arc<NotifyInner>,
}

#[derive(Default)]
struct NotifyInner {
    watcher: Mutex<Option<RecommendedWatcher>>,
    sinks: Arc<Mutex<SinkMap>>,
    next_token: AtomicU64,
}

impl fmt::Debug for NotifyBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotifyBackend")
            .field("watched_dirs", &self.watched_dirs())
            .finish()
    }
}

fn lock_sinks(sinks: &Mutex<SinkMap>) -> MutexGuard<'_, SinkMap> {
    sinks.lock().unwrap_or_else(PoisonError::into_inner)
}

impl NotifyBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Directories with at least one open watch, sorted.
    pub fn watched_dirs(&self) -> Vec<PathBuf> {
        let mut dirs: Vec<PathBuf> = lock_sinks(&self.inner.sinks).keys().cloned().collect();
        dirs.sort();
        dirs
    }

    fn new_watcher(sinks: Arc<Mutex<SinkMap>>) -> notify::Result<RecommendedWatcher> {
        // Called synchronously on notify's thread. It must not touch the
        // watcher lock: `watch`/`unwatch` wait on that same thread.
        RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    let Some(change) = raw_change(&event.kind) else {
                        return;
                    };
                    let sinks = lock_sinks(&sinks);
                    for path in event.paths {
                        let Some(targets) = path.parent().and_then(|dir| sinks.get(dir)) else {
                            trace!(?path, "no watched parent for event");
                            continue;
                        };
                        for (_, sink) in targets {
                            sink.entry_changed(path.clone(), change);
                        }
                    }
                }
                Err(err) => {
                    warn!(paths = ?err.paths, "file watch error: {err}");
                }
            },
            Config::default(),
        )
    }

    /// Lock the shared watcher, creating it on first use.
    fn watcher(&self) -> Result<MutexGuard<'_, Option<RecommendedWatcher>>> {
        let mut guard = self.inner.watcher.lock().unwrap_or_else(PoisonError::into_inner);
        if guard.is_none() {
            let watcher = Self::new_watcher(Arc::clone(&self.inner.sinks))
                .context("creating file watcher")?;
            *guard = Some(watcher);
        }
        Ok(guard)
    }

    /// Drop the sink registered under `token`; stop the OS watch once no
    /// sink is left for `dir`.
    fn release(&self, dir: &Path, token: u64) {
        let Ok(mut guard) = self.watcher() else {
            lock_sinks(&self.inner.sinks).remove(dir);
            return;
        };
        let now_unused = {
            let mut sinks = lock_sinks(&self.inner.sinks);
            let Some(entries) = sinks.get_mut(dir) else {
                return;
            };
            entries.retain(|(t, _)| *t != token);
            let empty = entries.is_empty();
            if empty {
                sinks.remove(dir);
            }
            empty
        };
        if let (true, Some(watcher)) = (now_unused, guard.as_mut()) {
            // Fails when the directory is already gone and notify dropped
            // the watch on its own.
            if let Err(err) = watcher.unwatch(dir) {
                trace!(?dir, "unwatch ignored: {err}");
            }
        }
    }
}

impl DirectoryWatchBackend for NotifyBackend {
    fn watch_dir(&self, dir: &Path, sink: NotificationSink) -> Result<Box<dyn Subscription>> {
        let dir = dir.to_path_buf();
        let token = self.inner.next_token.fetch_add(1, Ordering::Relaxed);

        // Register the sink first so events that arrive right after the OS
        // watch is added are not dropped.
        lock_sinks(&self.inner.sinks)
            .entry(dir.clone())
            .or_default()
            .push((token, sink));

        let watched = self.watcher().and_then(|mut guard| {
            let Some(watcher) = guard.as_mut() else {
                return Ok(());
            };
            watcher
                .watch(&dir, RecursiveMode::NonRecursive)
                .with_context(|| format!("watching {:?}", dir))
        });
        if let Err(err) = watched {
            self.release(&dir, token);
            return Err(err);
        }

        Ok(Box::new(NotifySubscription {
            backend: self.clone(),
            dir,
            token,
            closed: AtomicBool::new(false),
        }))
    }
}

/// Map a notify event kind onto the generic per-entry signal.
///
/// Access and metadata-only events carry no information we act on.
pub(crate) fn raw_change(kind: &EventKind) -> Option<RawChange> {
    match kind {
        EventKind::Create(_) | EventKind::Remove(_) => Some(RawChange::Rename),
        EventKind::Modify(ModifyKind::Name(_)) => Some(RawChange::Rename),
        EventKind::Modify(ModifyKind::Data(_)) | EventKind::Modify(ModifyKind::Any) => {
            Some(RawChange::Change)
        }
        EventKind::Any => Some(RawChange::Rename),
        _ => None,
    }
}

/// One directory's registration in the shared watcher.
struct NotifySubscription {
    backend: NotifyBackend,
    dir: PathBuf,
    token: u64,
    closed: AtomicBool,
}

impl Subscription for NotifySubscription {
    fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.backend.release(&self.dir, self.token);
        }
    }
}
