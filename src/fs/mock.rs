// src/fs/mock.rs

use super::FileSystem;
use anyhow::{Result, anyhow};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone)]
pub enum MockEntry {
    File(Vec<u8>),
    Dir(Vec<String>), // List of child names
}

#[derive(Debug, Default)]
struct MockState {
    entries: HashMap<PathBuf, MockEntry>,
    unreadable: HashSet<PathBuf>,
    links: HashMap<PathBuf, PathBuf>,
}

/// Same bound as Linux `MAXSYMLINKS`; deeper chains count as missing.
const MAX_LINK_HOPS: usize = 40;

impl MockState {
    /// Follow symlinks in any segment of `path`.
    fn resolve(&self, path: &Path) -> Option<PathBuf> {
        let mut current = path.to_path_buf();
        for _ in 0..MAX_LINK_HOPS {
            let hop = current.ancestors().find_map(|prefix| {
                let target = self.links.get(prefix)?;
                let rest = current.strip_prefix(prefix).ok()?;
                Some(if rest.as_os_str().is_empty() {
                    target.clone()
                } else {
                    target.join(rest)
                })
            });
            match hop {
                Some(next) => current = next,
                None => return Some(current),
            }
        }
        None
    }

    fn entry(&self, path: &Path) -> Option<&MockEntry> {
        self.entries.get(&self.resolve(path)?)
    }
}

/// In-memory filesystem for tests.
///
/// Paths are used verbatim (no canonicalization), so tests should stick to
/// absolute paths such as `/ws/a.txt`. Clones share the same tree.
#[derive(Debug, Clone, Default)]
pub struct MockFileSystem {
    state: Arc<Mutex<MockState>>,
}

impl MockFileSystem {
    pub fn new() -> Self {
        let mut state = MockState::default();
        // Ensure root exists
        state
            .entries
            .insert(PathBuf::from("/"), MockEntry::Dir(Vec::new()));

        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create or overwrite a file, creating missing parent directories.
    pub fn add_file(&self, path: impl AsRef<Path>, content: impl Into<Vec<u8>>) {
        let path = path.as_ref();
        let mut state = self.lock();
        state
            .entries
            .insert(path.to_path_buf(), MockEntry::File(content.into()));
        link_into_parent(&mut state.entries, path);
    }

    /// Create a directory (and its missing parents). Existing entries are kept.
    pub fn add_dir(&self, path: impl AsRef<Path>) {
        let path = path.as_ref();
        let mut state = self.lock();
        ensure_dir_entry(&mut state.entries, path);
    }

    /// Remove a file or a whole directory subtree. Missing paths are ignored.
    pub fn remove(&self, path: impl AsRef<Path>) {
        let path = path.as_ref();
        let mut state = self.lock();
        state.entries.retain(|p, _| !p.starts_with(path));
        state.links.retain(|p, _| !p.starts_with(path));

        if let (Some(parent), Some(name)) = (path.parent(), path.file_name()) {
            if let Some(MockEntry::Dir(children)) = state.entries.get_mut(parent) {
                let name = name.to_string_lossy();
                children.retain(|c| c.as_str() != name);
            }
        }
    }

    /// Create a symbolic link at `link` pointing to the absolute `target`.
    pub fn add_symlink(&self, link: impl AsRef<Path>, target: impl AsRef<Path>) {
        let link = link.as_ref();
        let mut state = self.lock();
        state
            .links
            .insert(link.to_path_buf(), target.as_ref().to_path_buf());
        link_into_parent(&mut state.entries, link);
    }

    /// Make every subsequent read of `path` fail (the entry stays listed).
    pub fn fail_reads(&self, path: impl AsRef<Path>) {
        self.lock().unreadable.insert(path.as_ref().to_path_buf());
    }
}

fn ensure_dir_entry(entries: &mut HashMap<PathBuf, MockEntry>, path: &Path) {
    if entries.contains_key(path) {
        return;
    }
    entries.insert(path.to_path_buf(), MockEntry::Dir(Vec::new()));
    link_into_parent(entries, path);
}

fn link_into_parent(entries: &mut HashMap<PathBuf, MockEntry>, path: &Path) {
    let (Some(parent), Some(name)) = (path.parent(), path.file_name()) else {
        return; // Avoid infinite loop at root
    };
    ensure_dir_entry(entries, parent);
    if let Some(MockEntry::Dir(children)) = entries.get_mut(parent) {
        let name = name.to_string_lossy().into_owned();
        if !children.contains(&name) {
            children.push(name);
        }
    }
}

impl FileSystem for MockFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String> {
        let state = self.lock();
        if state.unreadable.contains(path) {
            return Err(anyhow!("Permission denied: {:?}", path));
        }
        match state.entry(path) {
            Some(MockEntry::File(content)) => {
                String::from_utf8(content.clone()).map_err(|e| anyhow!("Invalid UTF-8: {}", e))
            }
            Some(MockEntry::Dir(_)) => Err(anyhow!("Is a directory: {:?}", path)),
            None => Err(anyhow!("File not found: {:?}", path)),
        }
    }

    fn exists(&self, path: &Path) -> bool {
        let state = self.lock();
        state.links.contains_key(path) || state.entry(path).is_some()
    }

    fn is_file(&self, path: &Path) -> bool {
        matches!(self.lock().entry(path), Some(MockEntry::File(_)))
    }

    fn is_dir(&self, path: &Path) -> bool {
        matches!(self.lock().entry(path), Some(MockEntry::Dir(_)))
    }

    fn is_symlink(&self, path: &Path) -> bool {
        self.lock().links.contains_key(path)
    }

    fn canonicalize(&self, path: &Path) -> Result<PathBuf> {
        // In mock, we just return the path as is, assuming absolute paths are used in tests
        if self.exists(path) {
            Ok(path.to_path_buf())
        } else {
            Err(anyhow!("No such file or directory: {:?}", path))
        }
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let state = self.lock();
        match state.entry(path) {
            Some(MockEntry::Dir(children)) => {
                Ok(children.iter().map(|name| path.join(name)).collect())
            }
            _ => Err(anyhow!("Not a directory or not found: {:?}", path)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_file_creates_parent_dirs() {
        let fs = MockFileSystem::new();
        fs.add_file("/ws/src/a.txt", "A");

        assert!(fs.is_dir(Path::new("/ws")));
        assert!(fs.is_dir(Path::new("/ws/src")));
        assert_eq!(fs.read_dir(Path::new("/ws")).unwrap(), vec![PathBuf::from("/ws/src")]);
        assert_eq!(fs.read_to_string(Path::new("/ws/src/a.txt")).unwrap(), "A");
    }

    #[test]
    fn remove_drops_subtree_and_parent_link() {
        let fs = MockFileSystem::new();
        fs.add_file("/ws/a/b/c.txt", "C");
        fs.add_file("/ws/ab.txt", "AB");

        fs.remove("/ws/a");

        assert!(!fs.exists(Path::new("/ws/a")));
        assert!(!fs.exists(Path::new("/ws/a/b/c.txt")));
        // `/ws/ab.txt` shares a string prefix with `/ws/a` but is not under it.
        assert!(fs.exists(Path::new("/ws/ab.txt")));
        assert_eq!(fs.read_dir(Path::new("/ws")).unwrap(), vec![PathBuf::from("/ws/ab.txt")]);
    }

    #[test]
    fn failing_reads_keep_entry_listed() {
        let fs = MockFileSystem::new();
        fs.add_file("/ws/locked.txt", "secret");
        fs.fail_reads("/ws/locked.txt");

        assert!(fs.is_file(Path::new("/ws/locked.txt")));
        assert!(fs.read_to_string(Path::new("/ws/locked.txt")).is_err());
    }

    #[test]
    fn symlinks_resolve_through_any_segment() {
        let fs = MockFileSystem::new();
        fs.add_file("/ws/real/a.txt", "A");
        fs.add_symlink("/ws/link", "/ws/real");
        fs.add_symlink("/ws/real/up", "/ws");

        assert!(fs.is_symlink(Path::new("/ws/link")));
        assert!(fs.is_dir(Path::new("/ws/link")));
        assert_eq!(fs.read_to_string(Path::new("/ws/link/a.txt")).unwrap(), "A");
        assert!(fs.is_file(Path::new("/ws/real/up/link/up/real/a.txt")));
        assert!(!fs.is_symlink(Path::new("/ws/real")));
    }
}
