// src/engine/update.rs

//! Out-of-band content updates.
//!
//! An [`UpdateChannel`] pushes `(path, content)` pairs that did not come from
//! the filesystem (e.g. an editor's unsaved buffer). The workspace applies
//! them exactly like a file modification.

use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::Result;
use tokio::sync::mpsc;
use tracing::trace;

use crate::subscription::Subscription;

/// New content for a path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentUpdate {
    pub path: PathBuf,
    pub content: String,
}

impl ContentUpdate {
    pub fn new(path: impl Into<PathBuf>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }
}

/// Source of content updates.
pub trait UpdateChannel: Send + Sync + fmt::Debug {
    /// Start delivering updates into `sink` until the returned subscription
    /// is closed.
    fn subscribe(&self, sink: mpsc::UnboundedSender<ContentUpdate>) -> Result<Box<dyn Subscription>>;
}

#[derive(Debug)]
struct Subscriber {
    sink: mpsc::UnboundedSender<ContentUpdate>,
    open: Arc<AtomicBool>,
}

/// In-process [`UpdateChannel`]: whoever holds a clone can
/// [`publish`](Self::publish).
#[derive(Debug, Clone, Default)]
pub struct LocalUpdateChannel {
    subscribers: Arc<Mutex<Vec<Subscriber>>>,
}

impl LocalUpdateChannel {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Subscriber>> {
        self.subscribers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Send an update to every open subscriber. Returns how many received it.
    pub fn publish(&self, path: impl Into<PathBuf>, content: impl Into<String>) -> usize {
        let update = ContentUpdate::new(path, content);
        let mut subscribers = self.lock();
        subscribers.retain(|s| s.open.load(Ordering::SeqCst) && !s.sink.is_closed());

        let mut delivered = 0;
        for subscriber in subscribers.iter() {
            if subscriber.sink.send(update.clone()).is_ok() {
                delivered += 1;
            }
        }
        trace!(path = ?update.path, delivered, "content update published");
        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock()
            .iter()
            .filter(|s| s.open.load(Ordering::SeqCst))
            .count()
    }
}

impl UpdateChannel for LocalUpdateChannel {
    fn subscribe(&self, sink: mpsc::UnboundedSender<ContentUpdate>) -> Result<Box<dyn Subscription>> {
        let open = Arc::new(AtomicBool::new(true));
        self.lock().push(Subscriber {
            sink,
            open: Arc::clone(&open),
        });
        Ok(Box::new(LocalSubscription { open }))
    }
}

struct LocalSubscription {
    open: Arc<AtomicBool>,
}

impl Subscription for LocalSubscription {
    fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
    }
}
