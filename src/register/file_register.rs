// src/register/file_register.rs

use std::fmt;
use std::path::Path;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::trace;

use crate::types::{File, FileInfos};

type ParseFn<T> = Box<dyn Fn(&str) -> Option<T> + Send + Sync>;

/// Latest parsed view of a set of files.
///
/// Each file appears at most once. Registering a path that is already known
/// replaces its infos in place, so the record keeps its position.
///
/// Registers are shared (`Arc<FileRegister<T>>`) between the workspace and
/// any number of [`FilesRegistry`](super::FilesRegistry) views.
pub struct FileRegister<T> {
    parse: ParseFn<T>,
    files: RwLock<Vec<FileInfos<T>>>,
}

impl<T> fmt::Debug for FileRegister<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileRegister")
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

impl<T> FileRegister<T> {
    /// Create a register whose records are produced by `parse`.
    ///
    /// `parse` returning `None` still records the file, with no infos.
    pub fn new<F>(parse: F) -> Self
    where
        F: Fn(&str) -> Option<T> + Send + Sync + 'static,
    {
        Self {
            parse: Box::new(parse),
            files: RwLock::new(Vec::new()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<FileInfos<T>>> {
        self.files.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<FileInfos<T>>> {
        self.files.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Parse `file` and insert or replace its record.
    pub fn register(&self, file: &File) {
        // Parse outside the lock; user code may be slow.
        let infos = (self.parse)(&file.content);

        let mut files = self.write();
        match files.iter_mut().find(|f| f.path == file.path) {
            Some(existing) => existing.infos = infos,
            None => files.push(FileInfos {
                path: file.path.clone(),
                infos,
            }),
        }
        trace!(path = ?file.path, "file registered");
    }

    /// Drop the record for `path`. Returns whether there was one.
    pub fn remove(&self, path: &Path) -> bool {
        let mut files = self.write();
        let before = files.len();
        files.retain(|f| f.path != path);
        before != files.len()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.read().iter().any(|f| f.path == path)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}

impl<T: Clone> FileRegister<T> {
    /// Snapshot of every record, in registration order.
    pub fn files(&self) -> Vec<FileInfos<T>> {
        self.read().clone()
    }

    pub fn get_file(&self, path: &Path) -> Option<FileInfos<T>> {
        self.read().iter().find(|f| f.path == path).cloned()
    }
}

/// Type-erased register, as stored by the workspace next to its identifier.
pub trait Register: Send + Sync {
    fn register_file(&self, file: &File);
    fn remove_file(&self, path: &Path);
}

impl<T: Send + Sync> Register for FileRegister<T> {
    fn register_file(&self, file: &File) {
        self.register(file);
    }

    fn remove_file(&self, path: &Path) {
        self.remove(path);
    }
}
