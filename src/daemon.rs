//! Daemon orchestration: initial scan, concurrent workers, debounce loop,
//! shutdown.
//!
//! Three long-lived activities share the store: the watcher consumer, the
//! content server, and the debounce/push loop below. The loop is plain
//! polling; it awaits each push, so at most one is ever in flight.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use jwalk::WalkDir;
use tracing::{info, warn};

use crate::protocol::DeviceClient;
use crate::store::ContentStore;
use crate::watcher::FileWatcher;

/// Poll interval of the debounce loop.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Quiescence window: a change must be at least this old before it is
/// pushed, so rapid successive edits coalesce into one sync.
const DEBOUNCE_WINDOW: Duration = Duration::from_millis(250);

/// Walk the project tree and add every regular file to the store. Hidden
/// directories are pruned from the traversal; unreadable entries are logged
/// and skipped.
pub fn scan_project(store: &ContentStore) -> Result<()> {
    for entry in WalkDir::new(store.root()).skip_hidden(true) {
        match entry {
            Ok(entry) => {
                if entry.file_type().is_file() {
                    store.add_file(&entry.path());
                }
            }
            Err(e) => warn!("error walking project tree: {e}"),
        }
    }
    Ok(())
}

/// Run the daemon until interrupted.
pub async fn run(store: Arc<ContentStore>, device: DeviceClient, self_addr: String) -> Result<()> {
    scan_project(&store)?;
    info!(
        files = store.file_count(),
        root = %store.root().display(),
        "initial scan complete"
    );

    let watcher = FileWatcher::new(store.root()).context("failed to start file watcher")?;
    tokio::spawn(watcher.run(Arc::clone(&store)));

    let serve_store = Arc::clone(&store);
    tokio::spawn(async move {
        if let Err(e) = crate::server::serve(serve_store).await {
            warn!("content server stopped: {e:#}");
        }
    });

    let mut ticker = tokio::time::interval(POLL_INTERVAL);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if store.needs_sync(DEBOUNCE_WINDOW) {
                    if let Err(e) = device.push_manifest(&store, &self_addr).await {
                        warn!("sync failed, will retry: {e}");
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted, restoring device");
                device.restore().await;
                return Ok(());
            }
        }
    }
}
