//! In-memory content-addressed manifest of the project tree.
//!
//! The store maps relative paths to content records and tracks when it last
//! changed versus when it was last pushed, which drives the debounce loop.
//! One instance is created at startup and shared by handle with the watcher,
//! the content server, and the sync loop.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::exclude::ExcludePatterns;
use crate::hash::hash_file;
use crate::protocol::SYNC_PORT;

/// Project configuration file that is always synced, ignore rules
/// notwithstanding.
pub const CONFIG_FILENAME: &str = "devcast.toml";

/// One tracked file: content digest and size at observation time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    /// Hex-encoded BLAKE3 digest of the full contents.
    pub hash: String,
    /// Byte length at hash time.
    pub size: u64,
}

/// One line of the manifest pushed to the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    /// Path relative to the project root, forward-slash separated.
    pub path: String,
    pub hash: String,
    pub size: u64,
    /// Where the device fetches the bytes from.
    pub fetch_url: String,
}

#[derive(Debug)]
struct StoreState {
    files: HashMap<String, FileRecord>,
    last_change: Instant,
    last_sync: Instant,
}

/// Content store shared between the watcher, server, and sync loop.
///
/// A single mutex covers the map and both timestamps. File hashing happens
/// before the lock is taken; the lock is never held across I/O.
#[derive(Debug)]
pub struct ContentStore {
    root: PathBuf,
    exclude: ExcludePatterns,
    state: Mutex<StoreState>,
}

impl ContentStore {
    /// Create an empty store rooted at the project directory, with the
    /// injected exclude predicate.
    pub fn new(root: impl AsRef<Path>, exclude: ExcludePatterns) -> Self {
        let now = Instant::now();
        Self {
            root: root.as_ref().to_path_buf(),
            exclude,
            state: Mutex::new(StoreState {
                files: HashMap::new(),
                last_change: now,
                last_sync: now,
            }),
        }
    }

    /// The watched project root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Root-relative, forward-slash form of a path inside the project.
    /// Returns `None` for the root itself or paths outside it.
    fn relative(&self, path: &Path) -> Option<String> {
        let rel = path.strip_prefix(&self.root).ok()?;
        let rel = rel.to_string_lossy().replace('\\', "/");
        if rel.is_empty() {
            None
        } else {
            Some(rel)
        }
    }

    /// Absolute path for a manifest-relative path.
    pub fn abs_path(&self, rel: &str) -> PathBuf {
        self.root.join(rel)
    }

    /// Hash a file and record it. Non-regular files, hidden files, and
    /// excluded paths are skipped; `devcast.toml` bypasses the exclude
    /// rules. Re-adding an unchanged file leaves the store untouched.
    pub fn add_file(&self, path: &Path) {
        let Some(rel) = self.relative(path) else {
            return;
        };

        let metadata = match std::fs::metadata(path) {
            Ok(m) => m,
            Err(e) => {
                debug!(path = %rel, "skipping unreadable path: {e}");
                return;
            }
        };
        if !metadata.is_file() {
            debug!(path = %rel, "skipping non-regular file");
            return;
        }

        let basename = rel.rsplit('/').next().unwrap_or(&rel);
        if basename.starts_with('.') {
            debug!(path = %rel, "skipping hidden file");
            return;
        }
        if basename != CONFIG_FILENAME && self.exclude.is_excluded(&rel) {
            debug!(path = %rel, "skipping excluded file");
            return;
        }

        // Hashing is slow and touches no shared state; keep it outside the lock.
        let digest = match hash_file(path) {
            Ok(d) => d,
            Err(e) => {
                warn!(path = %rel, "failed to hash: {e:#}");
                return;
            }
        };
        let record = FileRecord {
            hash: digest.hash,
            size: digest.size,
        };

        let mut state = self.state.lock();
        // Unchanged content is not a new change to debounce.
        let unchanged = state
            .files
            .get(&rel)
            .map_or(false, |existing| *existing == record);
        if !unchanged {
            debug!(path = %rel, hash = %record.hash, size = record.size, "tracking");
            state.files.insert(rel, record);
            state.last_change = Instant::now();
        }
    }

    /// Remove a single file's record, if present.
    pub fn del_file(&self, path: &Path) {
        let Some(rel) = self.relative(path) else {
            return;
        };
        let mut state = self.state.lock();
        if state.files.remove(&rel).is_some() {
            debug!(path = %rel, "untracked");
            state.last_change = Instant::now();
        }
    }

    /// Remove the record at `path` and every record nested under it.
    /// `sub` removes `sub/a.txt` but not `subx/a.txt`.
    pub fn del_path(&self, path: &Path) {
        let Some(rel) = self.relative(path) else {
            return;
        };
        let prefix = format!("{rel}/");
        let mut state = self.state.lock();
        let before = state.files.len();
        state.files.retain(|p, _| *p != rel && !p.starts_with(&prefix));
        let removed = before - state.files.len();
        if removed > 0 {
            debug!(path = %rel, removed, "untracked subtree");
            state.last_change = Instant::now();
        }
    }

    /// Snapshot the store as sorted manifest entries. The ordering is
    /// lexicographic by path so unchanged state serializes to identical
    /// bytes on every push.
    pub fn build_manifest(&self, self_addr: &str) -> Vec<ManifestEntry> {
        let state = self.state.lock();
        let mut entries: Vec<ManifestEntry> = state
            .files
            .iter()
            .map(|(path, record)| ManifestEntry {
                path: path.clone(),
                hash: record.hash.clone(),
                size: record.size,
                fetch_url: format!("http://{self_addr}:{SYNC_PORT}/{}", record.hash),
            })
            .collect();
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        entries
    }

    /// Find the path of the first record with this content hash. Linear
    /// scan; dev-mode manifests are small.
    pub fn lookup_by_hash(&self, hash: &str) -> Option<String> {
        let state = self.state.lock();
        state
            .files
            .iter()
            .find(|(_, record)| record.hash == hash)
            .map(|(path, _)| path.clone())
    }

    /// Number of tracked files.
    pub fn file_count(&self) -> usize {
        self.state.lock().files.len()
    }

    /// True when there is an unsynced change that has been quiet for at
    /// least `max_age`.
    pub fn needs_sync(&self, max_age: Duration) -> bool {
        let state = self.state.lock();
        state.last_change > state.last_sync && state.last_change.elapsed() > max_age
    }

    /// Stamp the start of a push. Called before the manifest snapshot so a
    /// change racing the push leaves `last_change` ahead of `last_sync` and
    /// triggers the next cycle.
    pub fn mark_sync_started(&self) {
        self.state.lock().last_sync = Instant::now();
    }
}
