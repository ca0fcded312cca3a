// src/watch/recursive.rs

//! Recursive directory watching built from per-directory watches.
//!
//! One watch is attached per directory (the root plus every descendant).
//! The set of watches follows the tree: new directories get a watch when
//! their creation is observed, and deleting a directory tears down the watch
//! of that directory and of everything beneath it before the deletion is
//! forwarded.
//!
//! All notifications from all directory watches go through one unbounded
//! channel and are handled by a single task, in arrival order.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::{Result, bail};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, trace, warn};

use crate::errors::{self, TreewatchError};
use crate::fs::FileSystem;
use crate::subscription::Subscription;
use crate::types::{WatchEvent, WatchEventKind};
use crate::watch::backend::{
    DirectoryWatchBackend, NotificationSink, RawChange, RawNotification, WatcherMessage,
};
use crate::watch::path_utils::normalize_path;
use crate::watch::patterns::PathFilter;
use crate::watch::scan::folders_in_depth;
use crate::watch::table::{AttachOutcome, SubscriptionTable};

/// Tuning knobs for [`watch_folder_in_depth`].
#[derive(Debug, Clone)]
pub struct WatchOptions {
    /// Report content changes as [`WatchEventKind::Modified`]. When off, only
    /// rename-style notifications (create/delete/move) produce events.
    pub report_modifications: bool,
    /// Paths matching the filter are neither watched nor reported.
    pub filter: PathFilter,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            report_modifications: true,
            filter: PathFilter::default(),
        }
    }
}

/// State shared by the subscription handle, the enumeration task and the
/// event loop.
struct Shared {
    root: PathBuf,
    fs: Arc<dyn FileSystem>,
    backend: Arc<dyn DirectoryWatchBackend>,
    table: Mutex<SubscriptionTable>,
    raw_tx: mpsc::UnboundedSender<WatcherMessage>,
    options: WatchOptions,
}

impl Shared {
    fn table(&self) -> MutexGuard<'_, SubscriptionTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Attach a watch to `dir` unless one exists. Fails if `dir` is not a
    /// directory any more.
    fn attach(&self, dir: &Path) -> Result<AttachOutcome> {
        let dir = normalize_path(dir);
        let mut table = self.table();
        table.attach(&dir, |id| {
            if !self.fs.is_dir(&dir) {
                bail!("{:?} is not a directory (anymore)", dir);
            }
            let sink = NotificationSink::new(id, dir.clone(), self.raw_tx.clone());
            self.backend.watch_dir(&dir, sink)
        })
    }

    /// Watch every directory that existed under the root when watching
    /// started. Races with live events are settled by the table: whoever
    /// comes second sees `AlreadyWatched`.
    fn attach_nested(&self) {
        let dirs = folders_in_depth(self.fs.as_ref(), &self.root, &self.options.filter);
        let mut attached = 0usize;
        for dir in dirs {
            match self.attach(&dir) {
                Ok(AttachOutcome::Attached(_)) => attached += 1,
                Ok(AttachOutcome::AlreadyWatched(_)) => {}
                Ok(AttachOutcome::Closed) => return,
                Err(err) if self.fs.is_dir(&dir) => {
                    warn!(?dir, "failed to watch directory during enumeration: {err:#}")
                }
                Err(err) => debug!(?dir, "directory vanished during enumeration: {err:#}"),
            }
        }
        debug!(root = ?self.root, attached, "initial directory enumeration finished");
    }

    /// Turn one raw notification into zero or more events, updating the
    /// table on the way.
    fn handle(&self, notification: RawNotification) -> Vec<WatchEvent> {
        let RawNotification {
            watch_id,
            dir,
            path,
            change,
        } = notification;

        if !self.table().is_live(&dir, watch_id) {
            trace!(%watch_id, ?dir, ?path, "dropping notification from closed watch");
            return Vec::new();
        }

        let path = normalize_path(&path);
        if self.options.filter.is_excluded(&path) {
            return Vec::new();
        }
        if change == RawChange::Change && !self.options.report_modifications {
            return Vec::new();
        }

        // The platform only says "something happened to this entry"; whether
        // it exists right now decides what happened. This is racy by nature:
        // an entry re-created before this check is reported as created.
        let exists = self.fs.exists(&path);
        let kind = match (change, exists) {
            (_, false) => WatchEventKind::Deleted,
            (RawChange::Rename, true) => WatchEventKind::Created,
            (RawChange::Change, true) => WatchEventKind::Modified,
        };

        match kind {
            WatchEventKind::Deleted => {
                // Tear down nested watches before anyone hears about the
                // deletion.
                let closed = self.table().remove_tree(&path);
                if !closed.is_empty() {
                    debug!(?path, closed = closed.len(), "cascading watch teardown");
                }
                vec![WatchEvent::new(kind, path)]
            }
            WatchEventKind::Created if self.fs.is_dir(&path) && !self.fs.is_symlink(&path) => {
                let mut events = vec![WatchEvent::new(kind, path.clone())];
                self.grow_into(&path, &mut events);
                events
            }
            WatchEventKind::Modified if self.fs.is_dir(&path) => Vec::new(),
            _ => vec![WatchEvent::new(kind, path)],
        }
    }

    /// Watch a newly created directory tree.
    ///
    /// Entries that were already inside a directory when its watch got
    /// attached would otherwise go unnoticed (e.g. `mkdir -p a/b` or a moved
    /// directory), so they are reported as created. This also holds when the
    /// initial enumeration attached the directory before its creation event
    /// was handled: the initial scan may have missed its content. Duplicate
    /// `Created` events are harmless downstream.
    fn grow_into(&self, dir: &Path, events: &mut Vec<WatchEvent>) {
        let mut stack = vec![dir.to_path_buf()];
        while let Some(dir) = stack.pop() {
            match self.attach(&dir) {
                Ok(AttachOutcome::Attached(id)) => debug!(?dir, %id, "watching new directory"),
                Ok(AttachOutcome::AlreadyWatched(id)) => {
                    trace!(?dir, %id, "new directory already watched; listing it anyway")
                }
                Ok(AttachOutcome::Closed) => return,
                Err(err) => {
                    warn!(?dir, "failed to watch new directory: {err:#}");
                    continue;
                }
            }

            let entries = match self.fs.read_dir(&dir) {
                Ok(entries) => entries,
                Err(err) => {
                    debug!(?dir, "new directory vanished before listing: {err:#}");
                    continue;
                }
            };
            for entry in entries {
                let entry = normalize_path(&entry);
                if self.options.filter.is_excluded(&entry) {
                    continue;
                }
                if self.fs.is_dir(&entry) && !self.fs.is_symlink(&entry) {
                    stack.push(entry.clone());
                }
                events.push(WatchEvent::new(WatchEventKind::Created, entry));
            }
        }
    }

    fn close(&self) {
        let closed = self.table().close_all();
        if closed > 0 {
            info!(root = ?self.root, closed, "recursive watch closed");
        }
        // The loop may already be gone; that is fine.
        let _ = self.raw_tx.send(WatcherMessage::Shutdown);
    }
}

/// Handle for a running recursive watch.
///
/// Closing (or dropping) it closes every directory watch. Closing twice is a
/// no-op.
pub struct TreeSubscription {
    shared: Arc<Shared>,
    ready: watch::Receiver<bool>,
}

impl std::fmt::Debug for TreeSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TreeSubscription")
            .field("root", &self.shared.root)
            .field("table", &*self.shared.table())
            .finish()
    }
}

impl TreeSubscription {
    pub fn root(&self) -> &Path {
        &self.shared.root
    }

    /// Directories currently watched, sorted.
    pub fn watched_dirs(&self) -> Vec<PathBuf> {
        self.shared.table().dirs()
    }

    pub fn is_watching(&self, dir: impl AsRef<Path>) -> bool {
        self.shared.table().contains(&normalize_path(dir.as_ref()))
    }

    /// Resolves once the initial enumeration of nested directories is done.
    pub async fn ready(&self) {
        let mut ready = self.ready.clone();
        // An error means the enumeration task is gone, which only happens
        // after it finished (or panicked); either way there is nothing to wait for.
        let _ = ready.wait_for(|done| *done).await;
    }

    pub fn close(&self) {
        self.shared.close();
    }

    pub fn is_closed(&self) -> bool {
        self.shared.table().is_closed()
    }
}

impl Subscription for TreeSubscription {
    fn close(&self) {
        self.shared.close();
    }
}

impl Drop for TreeSubscription {
    fn drop(&mut self) {
        self.shared.close();
    }
}

/// Watch `root` and all of its subdirectories.
///
/// The root watch is attached before this returns; nested directories are
/// enumerated and attached in the background (see
/// [`TreeSubscription::ready`]). Events for files and directories alike are
/// delivered on the returned receiver until the subscription is closed.
///
/// Must be called from within a Tokio runtime.
pub fn watch_folder_in_depth(
    root: impl Into<PathBuf>,
    fs: Arc<dyn FileSystem>,
    backend: Arc<dyn DirectoryWatchBackend>,
    options: WatchOptions,
) -> errors::Result<(TreeSubscription, mpsc::UnboundedReceiver<WatchEvent>)> {
    let root = normalize_path(&root.into());
    if !fs.is_dir(&root) {
        return Err(TreewatchError::ConfigError(format!(
            "watch root {:?} is not a directory",
            root
        )));
    }

    let (raw_tx, raw_rx) = mpsc::unbounded_channel::<WatcherMessage>();
    let (event_tx, event_rx) = mpsc::unbounded_channel::<WatchEvent>();
    let (ready_tx, ready_rx) = watch::channel(false);

    let shared = Arc::new(Shared {
        root: root.clone(),
        fs,
        backend,
        table: Mutex::new(SubscriptionTable::new()),
        raw_tx,
        options,
    });

    shared.attach(&root)?;
    info!(?root, "recursive watch started");

    let enumeration = Arc::clone(&shared);
    tokio::task::spawn_blocking(move || {
        enumeration.attach_nested();
        let _ = ready_tx.send(true);
    });

    tokio::spawn(run_event_loop(Arc::clone(&shared), raw_rx, event_tx));

    Ok((
        TreeSubscription {
            shared,
            ready: ready_rx,
        },
        event_rx,
    ))
}

async fn run_event_loop(
    shared: Arc<Shared>,
    mut raw_rx: mpsc::UnboundedReceiver<WatcherMessage>,
    event_tx: mpsc::UnboundedSender<WatchEvent>,
) {
    while let Some(message) = raw_rx.recv().await {
        let notification = match message {
            WatcherMessage::Notification(n) => n,
            WatcherMessage::Shutdown => break,
        };

        // Existence checks and listings hit the disk; keep them off the
        // async workers. Awaiting each one keeps notifications in order.
        let handler = Arc::clone(&shared);
        let events = match tokio::task::spawn_blocking(move || handler.handle(notification)).await {
            Ok(events) => events,
            Err(err) => {
                warn!("watch notification handler failed: {err}");
                continue;
            }
        };

        for event in events {
            debug!(kind = %event.kind, path = ?event.path, "watch event");
            if event_tx.send(event).is_err() {
                debug!("watch event receiver dropped; closing recursive watch");
                shared.close();
                return;
            }
        }
    }
    debug!(root = ?shared.root, "recursive watch event loop finished");
}
