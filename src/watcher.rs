//! File system watcher feeding the content store.
//!
//! Cross-platform watching via the notify crate. Raw notifications are
//! classified into manifest changes and applied to the store; paths under
//! hidden directories are dropped before classification.

use anyhow::Result;
use notify::event::{AccessKind, AccessMode, ModifyKind, RemoveKind, RenameMode};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::trace;

use crate::store::ContentStore;

/// What a filesystem notification means for the manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileChange {
    /// Path has complete new content and should be (re)hashed.
    Added(PathBuf),
    /// A single file left the tree.
    Removed(PathBuf),
    /// A directory (or something of unknown kind) left the tree; remove
    /// everything nested under it.
    RemovedTree(PathBuf),
}

/// Classify a notify event into manifest changes.
///
/// A raw creation is ambiguous: the writer may still be mid-write. A symlink,
/// or a path that already carries a second hard link, is assumed complete;
/// anything else is picked up by the close-after-write that follows.
pub fn classify(event: &Event) -> Vec<FileChange> {
    match event.kind {
        // Write finished, or content changed on platforms without
        // close-write notifications: re-hash.
        EventKind::Access(AccessKind::Close(AccessMode::Write))
        | EventKind::Modify(ModifyKind::Data(_))
        | EventKind::Modify(ModifyKind::Any) => {
            event.paths.iter().cloned().map(FileChange::Added).collect()
        }
        EventKind::Create(_) => event
            .paths
            .iter()
            .filter(|p| probably_complete(p))
            .cloned()
            .map(FileChange::Added)
            .collect(),
        // Moved into the watched tree.
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            event.paths.iter().cloned().map(FileChange::Added).collect()
        }
        // Moved out of the watched tree; the old name may have been a directory.
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => event
            .paths
            .iter()
            .cloned()
            .map(FileChange::RemovedTree)
            .collect(),
        // Rename observed with both names: paths[0] is old, paths[1] is new.
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            let mut changes = Vec::new();
            if let Some(from) = event.paths.first() {
                changes.push(FileChange::RemovedTree(from.clone()));
            }
            if let Some(to) = event.paths.get(1) {
                changes.push(FileChange::Added(to.clone()));
            }
            changes
        }
        EventKind::Remove(RemoveKind::File) => event
            .paths
            .iter()
            .cloned()
            .map(FileChange::Removed)
            .collect(),
        EventKind::Remove(_) => event
            .paths
            .iter()
            .cloned()
            .map(FileChange::RemovedTree)
            .collect(),
        _ => Vec::new(),
    }
}

/// Heuristic for whether a freshly created path is safe to hash: symlinks
/// and multiply-linked files appeared atomically, everything else may still
/// be mid-write.
fn probably_complete(path: &Path) -> bool {
    let Ok(metadata) = std::fs::symlink_metadata(path) else {
        return false;
    };
    if metadata.file_type().is_symlink() {
        return true;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        metadata.nlink() > 1
    }
    #[cfg(not(unix))]
    false
}

/// True when the path sits under a hidden component relative to the root.
/// Such paths are never tracked, mirroring the hidden-directory pruning of
/// the initial scan.
fn under_hidden(root: &Path, path: &Path) -> bool {
    let Ok(rel) = path.strip_prefix(root) else {
        return true;
    };
    rel.components().any(|c| {
        matches!(c, Component::Normal(name) if name.to_string_lossy().starts_with('.'))
    })
}

/// Apply one notify event to the store.
pub(crate) fn apply_event(store: &ContentStore, event: &Event) {
    for change in classify(event) {
        match change {
            FileChange::Added(path) => {
                if under_hidden(store.root(), &path) {
                    continue;
                }
                trace!(path = %path.display(), "watch add");
                store.add_file(&path);
            }
            FileChange::Removed(path) => {
                if under_hidden(store.root(), &path) {
                    continue;
                }
                trace!(path = %path.display(), "watch remove");
                store.del_file(&path);
            }
            FileChange::RemovedTree(path) => {
                if under_hidden(store.root(), &path) {
                    continue;
                }
                trace!(path = %path.display(), "watch remove tree");
                store.del_path(&path);
            }
        }
    }
}

/// File system watcher for real-time change detection.
///
/// Events are forwarded from notify's callback thread to an async channel;
/// [`FileWatcher::run`] drains the channel and mutates the store.
pub struct FileWatcher {
    _watcher: RecommendedWatcher,
    receiver: mpsc::UnboundedReceiver<Event>,
}

impl FileWatcher {
    /// Watch the given root recursively. New subdirectories are picked up
    /// automatically by the recursive mode.
    pub fn new(root: &Path) -> Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel();

        let mut watcher = RecommendedWatcher::new(
            move |res: Result<Event, notify::Error>| {
                if let Ok(event) = res {
                    let _ = tx.send(event);
                }
            },
            Config::default().with_poll_interval(Duration::from_secs(1)),
        )?;

        watcher.watch(root, RecursiveMode::Recursive)?;

        Ok(Self {
            _watcher: watcher,
            receiver: rx,
        })
    }

    /// Get the next event asynchronously.
    pub async fn next_event(&mut self) -> Option<Event> {
        self.receiver.recv().await
    }

    /// Consume events and apply them to the store until the notification
    /// stream closes.
    pub async fn run(mut self, store: Arc<ContentStore>) {
        while let Some(event) = self.next_event().await {
            apply_event(&store, &event);
        }
    }
}
