#![allow(dead_code, unused_imports)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex};

use anyhow::Result;
use tokio::sync::mpsc;
use treewatch::fs::FileSystem;
use treewatch::fs::mock::MockFileSystem;
use treewatch::types::WatchEvent;

pub use treewatch_test_utils::builders::{ConfigFileBuilder, MockTreeBuilder};
pub use treewatch_test_utils::{init_tracing, settle, wait_for, with_timeout};

/// Receive the next watch event, failing the test after 5 seconds.
pub async fn next_event(rx: &mut mpsc::UnboundedReceiver<WatchEvent>) -> WatchEvent {
    with_timeout(rx.recv())
        .await
        .expect("watch event channel closed")
}

/// Drain whatever events are already queued.
pub fn drain(rx: &mut mpsc::UnboundedReceiver<WatchEvent>) -> Vec<WatchEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Text register: infos are the file content.
pub fn text_register() -> Arc<treewatch::FileRegister<String>> {
    Arc::new(treewatch::FileRegister::new(|content: &str| Some(content.to_string())))
}

/// Holds blocking filesystem calls until opened.
#[derive(Debug, Default)]
pub struct Gate {
    state: Mutex<GateState>,
    cv: Condvar,
}

#[derive(Debug, Default)]
struct GateState {
    open: bool,
    waiting: bool,
}

impl Gate {
    fn wait(&self) {
        let mut state = self.state.lock().unwrap();
        state.waiting = true;
        while !state.open {
            state = self.cv.wait(state).unwrap();
        }
    }

    pub fn open(&self) {
        self.state.lock().unwrap().open = true;
        self.cv.notify_all();
    }

    /// True once some call blocked on the gate.
    pub fn is_waiting(&self) -> bool {
        self.state.lock().unwrap().waiting
    }
}

#[derive(Debug)]
enum Gated {
    Read(PathBuf),
    Listing(PathBuf),
}

/// Mock filesystem where reads or listings of one path wait on a [`Gate`].
#[derive(Debug)]
pub struct GatedFileSystem {
    inner: MockFileSystem,
    gated: Gated,
    gate: Arc<Gate>,
}

impl GatedFileSystem {
    /// Gate `read_to_string` of `path`, e.g. to hold the initial scan.
    pub fn reads(inner: MockFileSystem, path: impl Into<PathBuf>, gate: Arc<Gate>) -> Self {
        Self {
            inner,
            gated: Gated::Read(path.into()),
            gate,
        }
    }

    /// Gate `read_dir` of `path`, e.g. to hold the directory enumeration.
    pub fn listings(inner: MockFileSystem, path: impl Into<PathBuf>, gate: Arc<Gate>) -> Self {
        Self {
            inner,
            gated: Gated::Listing(path.into()),
            gate,
        }
    }
}

impl FileSystem for GatedFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String> {
        if matches!(&self.gated, Gated::Read(gated) if gated == path) {
            self.gate.wait();
        }
        self.inner.read_to_string(path)
    }

    fn exists(&self, path: &Path) -> bool {
        self.inner.exists(path)
    }

    fn is_file(&self, path: &Path) -> bool {
        self.inner.is_file(path)
    }

    fn is_dir(&self, path: &Path) -> bool {
        self.inner.is_dir(path)
    }

    fn is_symlink(&self, path: &Path) -> bool {
        self.inner.is_symlink(path)
    }

    fn canonicalize(&self, path: &Path) -> Result<PathBuf> {
        self.inner.canonicalize(path)
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>> {
        if matches!(&self.gated, Gated::Listing(gated) if gated == path) {
            self.gate.wait();
        }
        self.inner.read_dir(path)
    }
}
