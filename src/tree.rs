//! Recursive watch trees that curate their own watch set.
#![allow(clippy::module_name_repetitions)]

use std::collections::{HashMap, HashSet};
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::{Error, Result};
use crate::ffi::{self, WatchDescriptor, WatchMask};
use crate::flags::EventFlags;
use crate::stream::{Event, Quantum, StreamItem, StreamOptions, StreamState, Watcher};
use crate::watch::Removal;

/// Watch-mask bits the tree always requests on top of the caller's mask.
/// Without them the watch set could not be kept consistent while the tree
/// changes underneath us.
const TREE_MASK: WatchMask = ffi::IN_CREATE
    | ffi::IN_MOVED_TO
    | ffi::IN_DELETE
    | ffi::IN_MOVED_FROM
    | ffi::IN_DELETE_SELF
    | ffi::IN_MOVE_SELF;

/// Construction options for [`WatchTree`].
pub struct TreeOptions {
    /// Event types the caller wants re-emitted (the consumer mask).
    pub mask: WatchMask,
    /// Poll quantum handed to the underlying [`Watcher`].
    pub quantum: Quantum,
    /// Directories excluded from recursive watching, matched by their
    /// parent path and final name, descendants included.
    pub ignored_dirs: Vec<PathBuf>,
    /// Tolerate a directory that is already gone again by the time its
    /// creation event is processed, e.g. because events queued up across a
    /// rename. Without this the failed registration surfaces as an error.
    pub tolerate_missing_dirs: bool,
}

impl Default for TreeOptions {
    fn default() -> Self {
        Self {
            mask: ffi::IN_ALL_EVENTS,
            quantum: Quantum::default(),
            ignored_dirs: Vec::new(),
            tolerate_missing_dirs: false,
        }
    }
}

/// A recursive watch over one or more directory trees.
///
/// Watches are added for every directory discovered at construction and for
/// every directory later observed appearing under a watched parent; they
/// are dropped again when their directory is deleted or moved away. All of
/// that bookkeeping happens synchronously while the event stream is pulled.
pub struct WatchTree {
    pub(crate) watcher: Watcher,
    watch_mask: WatchMask,
    consumer_mask: WatchMask,
    ignored: HashMap<PathBuf, HashSet<OsString>>,
    top_level: HashMap<PathBuf, WatchDescriptor>,
    tolerate_missing_dirs: bool,
}

impl WatchTree {
    /// Recursively watch a single root.
    pub fn new(root: impl AsRef<Path>, options: TreeOptions) -> Result<Self> {
        let mut tree = Self::with_options(options)?;
        tree.bootstrap(root.as_ref())?;
        Ok(tree)
    }

    /// Recursively watch several roots on one handle.
    pub fn with_roots<P: AsRef<Path>>(
        roots: impl IntoIterator<Item = P>,
        options: TreeOptions,
    ) -> Result<Self> {
        let mut tree = Self::with_options(options)?;
        for root in roots {
            tree.bootstrap(root.as_ref())?;
        }
        Ok(tree)
    }

    fn with_options(options: TreeOptions) -> Result<Self> {
        let TreeOptions {
            mask,
            quantum,
            ignored_dirs,
            tolerate_missing_dirs,
        } = options;

        // One-shot and merge semantics make it impossible to curate the
        // watch set, so they are configuration errors rather than warnings.
        if mask & (ffi::IN_MASK_CREATE | ffi::IN_MASK_ADD | ffi::IN_ONESHOT) != 0 {
            return Err(Error::UnsupportedMask { mask });
        }
        if mask & ffi::IN_DONT_FOLLOW != 0 {
            info!("IN_DONT_FOLLOW is not implemented for recursive trees and has no effect");
        }
        if mask & ffi::IN_ONLYDIR != 0 {
            info!("IN_ONLYDIR is not implemented for recursive trees and has no effect");
        }

        let mut ignored: HashMap<PathBuf, HashSet<OsString>> = HashMap::new();
        for dir in ignored_dirs {
            let Some(name) = dir.file_name().map(OsString::from) else {
                warn!(
                    "ignored directory entry without a final component: [{}]",
                    dir.display()
                );
                continue;
            };
            let parent = match dir.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
                _ => PathBuf::from("."),
            };
            ignored.entry(parent).or_default().insert(name);
        }

        Ok(Self {
            watcher: Watcher::with_quantum(quantum)?,
            watch_mask: mask | TREE_MASK,
            consumer_mask: mask & !ffi::IN_ISDIR,
            ignored,
            top_level: HashMap::new(),
            tolerate_missing_dirs,
        })
    }

    fn bootstrap(&mut self, root: &Path) -> Result<()> {
        debug!("adding initial watches on tree: [{}]", root.display());
        if let Some((path, wd)) = self.discover(root)?.into_iter().next() {
            self.top_level.insert(path, wd);
        }
        Ok(())
    }

    /// Register `path` and every non-ignored directory below it.
    ///
    /// Returns the `(path, descriptor)` pairs created in discovery order;
    /// the first entry is the root's own registration. Entries the walk
    /// cannot read are skipped, a pruned ignored directory hides all of its
    /// descendants as well.
    pub fn discover(&mut self, path: impl AsRef<Path>) -> Result<Vec<(PathBuf, WatchDescriptor)>> {
        let root = path.as_ref();
        let mask = self.watch_mask | ffi::IN_ONLYDIR;
        let mut added = Vec::new();
        if let Some(wd) = self.watcher.add_watch(root, mask)? {
            added.push((root.to_path_buf(), wd));
        }

        let ignored = &self.ignored;
        let walker = WalkDir::new(root)
            .min_depth(1)
            .into_iter()
            .filter_entry(|entry| {
                !entry.file_type().is_dir()
                    || entry.path().parent().map_or(true, |parent| {
                        !is_ignored(ignored, parent, entry.file_name())
                    })
            });
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    debug!("skipping unreadable entry during discovery: {err}");
                    continue;
                }
            };
            if !entry.file_type().is_dir() {
                continue;
            }
            if let Some(wd) = self.watcher.add_watch(entry.path(), mask)? {
                added.push((entry.path().to_path_buf(), wd));
            }
        }
        Ok(added)
    }

    /// Stream events while curating the watch set as directories come and
    /// go. Only events intersecting the consumer mask are re-emitted; idle
    /// markers always pass through.
    pub fn events(&mut self, options: StreamOptions) -> TreeEventStream<'_> {
        self.watcher.last_filter_hit = None;
        TreeEventStream {
            state: StreamState::new(options),
            tree: self,
        }
    }

    /// The underlying poller, for watch-table inspection.
    #[must_use]
    pub fn watcher(&self) -> &Watcher {
        &self.watcher
    }

    /// Top-level registrations, one per bootstrapped root.
    pub fn roots(&self) -> impl Iterator<Item = (&Path, WatchDescriptor)> {
        self.top_level.iter().map(|(path, &wd)| (path.as_path(), wd))
    }

    /// React to a directory-structural event before it is re-emitted.
    fn curate(&mut self, event: &Event) -> Result<()> {
        let full_path = event.path.join(&event.name);
        let mask = event.header.mask;

        if mask & (ffi::IN_MOVED_TO | ffi::IN_CREATE) != 0 {
            if self.tolerate_missing_dirs && !full_path.exists() {
                debug!(
                    "new directory already gone again, skipping: [{}]",
                    full_path.display()
                );
                return Ok(());
            }
            if is_ignored(&self.ignored, &event.path, &event.name) {
                return Ok(());
            }
            debug!(
                "a directory appeared, watching it recursively: [{}]",
                full_path.display()
            );
            self.discover(&full_path)?;
        } else if mask & ffi::IN_DELETE != 0 {
            debug!(
                "a directory was removed, dropping its bookkeeping: [{}]",
                full_path.display()
            );
            // The kernel has already deregistered the watch on its own.
            self.watcher.remove_watch(&full_path, Removal::LocalOnly)?;
        } else if mask & ffi::IN_MOVED_FROM != 0 {
            debug!(
                "a directory moved out, deregistering it; a paired moved-to \
                 event re-adds it if it stays within the tree: [{}]",
                full_path.display()
            );
            if let Err(err) = self.watcher.remove_watch(&full_path, Removal::Active) {
                // The directory may have been deleted before this
                // bookkeeping ran; the registration is gone either way.
                debug!("watch already gone during move-out: {err}");
            }
        }
        Ok(())
    }
}

fn is_ignored(
    ignored: &HashMap<PathBuf, HashSet<OsString>>,
    parent: &Path,
    name: &OsStr,
) -> bool {
    ignored
        .get(parent)
        .map_or(false, |names| names.contains(name))
}

/// Lazy blocking event sequence over a [`WatchTree`].
///
/// Identical to the plain stream except that directory-structural events
/// mutate the live watch set before the caller sees them, and events
/// outside the consumer mask are swallowed after their bookkeeping ran.
pub struct TreeEventStream<'a> {
    tree: &'a mut WatchTree,
    state: StreamState,
}

impl Iterator for TreeEventStream<'_> {
    type Item = Result<StreamItem>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let event = match self.state.next_item(&mut self.tree.watcher)? {
                Ok(StreamItem::Idle) => return Some(Ok(StreamItem::Idle)),
                Ok(StreamItem::Event(event)) => event,
                Err(err) => return Some(Err(err)),
            };

            if event.flags.contains(EventFlags::ISDIR) {
                if let Err(err) = self.tree.curate(&event) {
                    self.state.finish();
                    return Some(Err(err));
                }
            }

            if event.header.mask & self.tree.consumer_mask != 0 {
                return Some(Ok(StreamItem::Event(event)));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn must_key_ignored_dirs_by_parent_and_name() {
        let options = TreeOptions {
            ignored_dirs: vec![
                PathBuf::from("/srv/data/cache/"),
                PathBuf::from("/srv/data/tmp"),
                PathBuf::from("local-scratch"),
            ],
            ..Default::default()
        };
        let tree = WatchTree::with_roots(Vec::<PathBuf>::new(), options)
            .expect("an empty tree to come up");

        assert!(is_ignored(
            &tree.ignored,
            Path::new("/srv/data"),
            OsStr::new("cache")
        ));
        assert!(is_ignored(
            &tree.ignored,
            Path::new("/srv/data"),
            OsStr::new("tmp")
        ));
        assert!(is_ignored(
            &tree.ignored,
            Path::new("."),
            OsStr::new("local-scratch")
        ));
        assert!(!is_ignored(
            &tree.ignored,
            Path::new("/srv"),
            OsStr::new("cache")
        ));
    }

    #[test]
    fn must_reject_uncurateable_masks() {
        for bad in [ffi::IN_ONESHOT, ffi::IN_MASK_ADD, ffi::IN_MASK_CREATE] {
            let options = TreeOptions {
                mask: ffi::IN_ALL_EVENTS | bad,
                ..Default::default()
            };
            match WatchTree::with_roots(Vec::<PathBuf>::new(), options) {
                Err(Error::UnsupportedMask { mask }) => assert_ne!(mask & bad, 0),
                Err(err) => panic!("expected UnsupportedMask, got {err}"),
                Ok(_) => panic!("expected UnsupportedMask, got a tree"),
            }
        }
    }
}
