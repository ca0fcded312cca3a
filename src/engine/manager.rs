// src/engine/manager.rs

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::model::ConfigFile;
use crate::errors::{Result, TreewatchError};
use crate::fs::{FileSystem, RealFileSystem};
use crate::register::{FileRegister, FilesRegistry, PathIdentifier};
use crate::subscription::Subscription;
use crate::types::{File, WatchEvent, WatchEventKind};
use crate::watch::backend::{DirectoryWatchBackend, NotifyBackend};
use crate::watch::patterns::PathFilter;
use crate::watch::recursive::{TreeSubscription, WatchOptions, watch_folder_in_depth};
use crate::watch::scan::files_in_depth_with_content;

use super::WorkspaceEvent;
use super::core::WorkspaceCore;
use super::update::{ContentUpdate, UpdateChannel};

/// Everything that has to be torn down on dispose.
struct Running {
    watch: TreeSubscription,
    updates: Option<Box<dyn Subscription>>,
    event_loop: JoinHandle<()>,
}

impl Running {
    fn shutdown(self) {
        self.watch.close();
        if let Some(updates) = &self.updates {
            updates.close();
        }
        self.event_loop.abort();
    }
}

/// Keeps typed registers in sync with the files under a root directory.
///
/// This is the async IO shell around [`WorkspaceCore`]: it scans the tree,
/// runs the recursive watcher, reads changed files and feeds everything into
/// the core, which decides what the cache and the registers see.
///
/// ```no_run
/// # async fn demo() -> treewatch::errors::Result<()> {
/// use std::sync::Arc;
/// use treewatch::engine::WorkspaceManager;
/// use treewatch::register::{FileRegister, any_path};
///
/// let workspace = WorkspaceManager::new("/path/to/project");
/// let texts = workspace.register_file_type(
///     any_path(),
///     Arc::new(FileRegister::new(|content: &str| Some(content.len()))),
/// );
/// workspace.init().await?;
/// println!("{} files", texts.len());
/// workspace.dispose();
/// # Ok(())
/// # }
/// ```
pub struct WorkspaceManager {
    root: PathBuf,
    fs: Arc<dyn FileSystem>,
    backend: Arc<dyn DirectoryWatchBackend>,
    update_channel: Option<Arc<dyn UpdateChannel>>,
    filter: PathFilter,
    report_modifications: bool,
    core: Arc<Mutex<WorkspaceCore>>,
    running: Mutex<Option<Running>>,
    disposed: AtomicBool,
}

impl fmt::Debug for WorkspaceManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkspaceManager")
            .field("root", &self.root)
            .field("core", &*self.core())
            .finish_non_exhaustive()
    }
}

impl WorkspaceManager {
    /// Workspace over the real filesystem, watched with `notify`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            filter: PathFilter::allow_all(root.clone()),
            root,
            fs: Arc::new(RealFileSystem),
            backend: Arc::new(NotifyBackend::new()),
            update_channel: None,
            report_modifications: true,
            core: Arc::new(Mutex::new(WorkspaceCore::new())),
            running: Mutex::new(None),
            disposed: AtomicBool::new(false),
        }
    }

    /// Workspace described by a validated config file.
    pub fn from_config(cfg: &ConfigFile) -> Result<Self> {
        Ok(Self::new(cfg.workspace.root.clone())
            .with_exclude(&cfg.workspace.exclude)?
            .with_report_modifications(cfg.watch.report_modifications))
    }

    pub fn with_file_system(mut self, fs: Arc<dyn FileSystem>) -> Self {
        self.fs = fs;
        self
    }

    pub fn with_watch_backend(mut self, backend: Arc<dyn DirectoryWatchBackend>) -> Self {
        self.backend = backend;
        self
    }

    /// Also apply content pushed through `channel`.
    pub fn with_update_channel(mut self, channel: Arc<dyn UpdateChannel>) -> Self {
        self.update_channel = Some(channel);
        self
    }

    /// Ignore paths matching any of `patterns` (globs relative to the root).
    pub fn with_exclude(mut self, patterns: &[String]) -> Result<Self> {
        self.filter = PathFilter::new(self.root.clone(), patterns)?;
        Ok(self)
    }

    pub fn with_report_modifications(mut self, report: bool) -> Self {
        self.report_modifications = report;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn core(&self) -> MutexGuard<'_, WorkspaceCore> {
        lock_core(&self.core)
    }

    /// Scan the workspace and start watching it.
    ///
    /// The watcher and update channel are started *before* the scan, so no
    /// change is missed; changes seen while the scan runs take precedence
    /// over its results. Resolves once every scanned file has been routed.
    ///
    /// Fails with [`TreewatchError::AlreadyInitialised`] when called twice,
    /// and with [`TreewatchError::ReadError`] when any file cannot be read
    /// during the scan (the watcher keeps running in that case).
    pub async fn init(&self) -> Result<()> {
        if self.disposed.load(Ordering::SeqCst) {
            return Err(TreewatchError::Disposed);
        }
        self.core().begin_scan()?;

        let root = match self.start() {
            Ok(root) => root,
            Err(err) => {
                self.core().abort_scan();
                return Err(err);
            }
        };

        info!(?root, "initial workspace scan started");
        let filter = self.filter.clone().with_root(root.clone());
        let scanned = files_in_depth_with_content(Arc::clone(&self.fs), root.clone(), filter).await;

        match scanned {
            Ok(files) => {
                let total = files.len();
                let applied = self.core().finish_scan(files);
                info!(?root, total, applied, "initial workspace scan finished");
                Ok(())
            }
            Err(err) => {
                self.core().abort_scan();
                warn!(?root, "initial workspace scan failed: {err}");
                Err(err)
            }
        }
    }

    /// Start the watcher, the update channel and the event loop. Returns the
    /// resolved root.
    fn start(&self) -> Result<PathBuf> {
        let root = self.fs.canonicalize(&self.root)?;
        let options = WatchOptions {
            report_modifications: self.report_modifications,
            filter: self.filter.clone().with_root(root.clone()),
        };
        let (watch, events) = watch_folder_in_depth(
            root.clone(),
            Arc::clone(&self.fs),
            Arc::clone(&self.backend),
            options,
        )?;

        let (updates, update_rx) = match &self.update_channel {
            Some(channel) => {
                let (tx, rx) = mpsc::unbounded_channel();
                let subscription = match channel.subscribe(tx) {
                    Ok(subscription) => subscription,
                    Err(err) => {
                        watch.close();
                        return Err(err.into());
                    }
                };
                (Some(subscription), Some(rx))
            }
            None => (None, None),
        };

        let event_loop = tokio::spawn(run_event_loop(
            Arc::clone(&self.core),
            Arc::clone(&self.fs),
            events,
            update_rx,
        ));

        let running = Running {
            watch,
            updates,
            event_loop,
        };

        let mut slot = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        if self.disposed.load(Ordering::SeqCst) {
            running.shutdown();
            return Err(TreewatchError::Disposed);
        }
        *slot = Some(running);
        Ok(root)
    }

    /// Bind `register` to the files matching `identifier` and return a
    /// read-only view of it.
    ///
    /// Binding order matters: a live change goes to the first register whose
    /// identifier matches, while the initial scan gives each file to every
    /// matching register. Registers bound after `init` are backfilled from
    /// the cache right away.
    pub fn register_file_type<T>(
        &self,
        identifier: PathIdentifier,
        register: Arc<FileRegister<T>>,
    ) -> FilesRegistry<T>
    where
        T: Send + Sync + 'static,
    {
        let index = self.core().bind(identifier, register.clone());
        debug!(binding = index, "file type registered");
        FilesRegistry::new(register)
    }

    /// Snapshot of every cached file, sorted by path.
    pub fn files(&self) -> Vec<File> {
        self.core().files()
    }

    pub fn file(&self, path: impl AsRef<Path>) -> Option<File> {
        self.core().file(path.as_ref())
    }

    /// Stop watching. Idempotent; registers keep their last state.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        let running = self
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(running) = running {
            running.shutdown();
            info!(root = ?self.root, "workspace disposed");
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Directories currently watched, sorted. Empty before `init` and after
    /// `dispose`.
    pub fn watched_dirs(&self) -> Vec<PathBuf> {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|r| r.watch.watched_dirs())
            .unwrap_or_default()
    }
}

impl Drop for WorkspaceManager {
    fn drop(&mut self) {
        self.dispose();
    }
}

fn lock_core(core: &Mutex<WorkspaceCore>) -> MutexGuard<'_, WorkspaceCore> {
    core.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Single consumer for both change sources, so their effects are applied in
/// one total order.
async fn run_event_loop(
    core: Arc<Mutex<WorkspaceCore>>,
    fs: Arc<dyn FileSystem>,
    mut events: mpsc::UnboundedReceiver<WatchEvent>,
    mut updates: Option<mpsc::UnboundedReceiver<ContentUpdate>>,
) {
    loop {
        let event = tokio::select! {
            Some(event) = events.recv() => match read_watch_event(&fs, event).await {
                Some(event) => event,
                None => continue,
            },
            Some(update) = recv_update(&mut updates) => WorkspaceEvent::FileChanged {
                path: update.path,
                content: update.content,
            },
            else => break,
        };

        let step = lock_core(&core).step(event);
        for (path, binding) in step.routed {
            debug!(?path, ?binding, "workspace change applied");
        }
    }
    debug!("workspace event loop finished");
}

async fn recv_update(updates: &mut Option<mpsc::UnboundedReceiver<ContentUpdate>>) -> Option<ContentUpdate> {
    match updates {
        Some(rx) => rx.recv().await,
        None => None,
    }
}

/// Resolve a watch event into a core event, reading the file if needed.
///
/// Directories are not read. Read failures are logged and the event is
/// skipped; a later event for the same path will bring the file in.
async fn read_watch_event(fs: &Arc<dyn FileSystem>, event: WatchEvent) -> Option<WorkspaceEvent> {
    let WatchEvent { kind, path } = event;
    if kind == WatchEventKind::Deleted {
        return Some(WorkspaceEvent::PathDeleted { path });
    }

    let reader = Arc::clone(fs);
    let target = path.clone();
    let read = tokio::task::spawn_blocking(move || {
        if reader.is_dir(&target) {
            return Ok(None);
        }
        reader.read_to_string(&target).map(Some)
    })
    .await;

    match read {
        Ok(Ok(Some(content))) => Some(WorkspaceEvent::FileChanged { path, content }),
        Ok(Ok(None)) => None,
        Ok(Err(err)) => {
            warn!(?path, %kind, "failed to read changed file: {err:#}");
            None
        }
        Err(err) => {
            warn!(?path, %kind, "file read task failed: {err}");
            None
        }
    }
}
