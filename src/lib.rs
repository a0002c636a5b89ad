// Library module for devcast
// Re-exports modules for use in integration tests and external crates

pub mod daemon;
pub mod exclude;
pub mod hash;
pub mod protocol;
pub mod server;
pub mod store;
pub mod watcher;

// Re-export commonly used types for convenience
pub use exclude::ExcludePatterns;
pub use protocol::{DeviceClient, HelloReply, PushError, PROTOCOL_VERSION, SYNC_PORT};
pub use store::{ContentStore, FileRecord, ManifestEntry, CONFIG_FILENAME};
pub use watcher::{FileChange, FileWatcher};
