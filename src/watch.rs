use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::ffi::WatchDescriptor;

/// How a watch leaves the table.
///
/// Call sites pick the variant explicitly; which one is correct depends on
/// what the kernel has already done on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    /// Drop the table entry and deregister the watch with the kernel. Used
    /// when a directory leaves the tree while its inode lives on, e.g. on a
    /// move out of the watched tree.
    Active,
    /// Drop the table entry only; the kernel has already dropped the watch
    /// itself, e.g. because the directory was deleted.
    LocalOnly,
    /// Drop the table entry but deliberately leave the kernel registration
    /// outstanding, so the final `IN_IGNORED` confirmation can still be
    /// awaited before the watch is considered fully gone.
    Deferred,
}

/// Bidirectional path ⇄ watch-descriptor table.
///
/// The single source of truth for which paths are currently watched. Both
/// directions are kept exact inverses of each other at all times.
#[derive(Debug, Default)]
pub struct WatchTable {
    by_path: HashMap<PathBuf, WatchDescriptor>,
    by_wd: HashMap<WatchDescriptor, PathBuf>,
}

impl WatchTable {
    pub(crate) fn insert(&mut self, path: PathBuf, wd: WatchDescriptor) {
        self.by_path.insert(path.clone(), wd);
        self.by_wd.insert(wd, path);
    }

    pub(crate) fn remove_path(&mut self, path: &Path) -> Option<WatchDescriptor> {
        let wd = self.by_path.remove(path)?;
        self.by_wd.remove(&wd);
        Some(wd)
    }

    #[must_use]
    pub fn contains_path(&self, path: &Path) -> bool {
        self.by_path.contains_key(path)
    }

    #[must_use]
    pub fn path_of(&self, wd: WatchDescriptor) -> Option<&Path> {
        self.by_wd.get(&wd).map(PathBuf::as_path)
    }

    #[must_use]
    pub fn wd_of(&self, path: &Path) -> Option<WatchDescriptor> {
        self.by_path.get(path).copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_path.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_path.is_empty()
    }

    /// Currently watched `(path, descriptor)` pairs, for diagnostics.
    pub fn iter(&self) -> impl Iterator<Item = (&Path, WatchDescriptor)> {
        self.by_path.iter().map(|(path, &wd)| (path.as_path(), wd))
    }
}
