// src/register/registry.rs

use std::path::Path;
use std::sync::Arc;

use super::file_register::FileRegister;
use crate::types::FileInfos;

/// Read-only view over a [`FileRegister`].
///
/// The view holds the register itself, so [`files`](Self::files) always
/// reflects the current contents.
#[derive(Debug)]
pub struct FilesRegistry<T> {
    register: Arc<FileRegister<T>>,
}

impl<T> Clone for FilesRegistry<T> {
    fn clone(&self) -> Self {
        Self {
            register: Arc::clone(&self.register),
        }
    }
}

impl<T> FilesRegistry<T> {
    pub fn new(register: Arc<FileRegister<T>>) -> Self {
        Self { register }
    }

    pub fn len(&self) -> usize {
        self.register.len()
    }

    pub fn is_empty(&self) -> bool {
        self.register.is_empty()
    }
}

impl<T: Clone> FilesRegistry<T> {
    pub fn files(&self) -> Vec<FileInfos<T>> {
        self.register.files()
    }

    /// Linear lookup by path.
    pub fn get_file(&self, path: impl AsRef<Path>) -> Option<FileInfos<T>> {
        self.register.get_file(path.as_ref())
    }
}
