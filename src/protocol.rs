//! Sync protocol with the remote playback device.
//!
//! Three calls: the `hello` capability handshake at startup, the gzipped
//! manifest push on every quiescent change, and the best-effort `restore`
//! at shutdown. Push failures are a distinct recoverable error kind; the
//! debounce loop logs them and retries on the next cycle.

use std::io::Write;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::store::{ContentStore, ManifestEntry};

/// Protocol version spoken by this tool; the device must match exactly.
pub const PROTOCOL_VERSION: u64 = 1;

/// Port shared by the device API and the local content server.
pub const SYNC_PORT: u16 = 8899;

const SYNC_TIMEOUT: Duration = Duration::from_secs(5);
const RESTORE_TIMEOUT: Duration = Duration::from_secs(2);

/// Reply to `GET /api/hello`.
#[derive(Debug, Clone, Deserialize)]
pub struct HelloReply {
    pub ok: bool,
    pub version: u64,
    /// Our address as the device sees it, used to build fetch URLs.
    pub your_ip: String,
    pub device_url: String,
}

/// A recoverable manifest-push failure.
#[derive(Debug, Error)]
pub enum PushError {
    #[error("failed to encode manifest: {0}")]
    Encode(#[from] std::io::Error),
    #[error("sync request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("device answered {0} to sync request")]
    Status(reqwest::StatusCode),
    #[error("device did not acknowledge sync: {0}")]
    Rejected(String),
}

/// HTTP client for one remote playback device.
#[derive(Debug, Clone)]
pub struct DeviceClient {
    http: reqwest::Client,
    base_url: String,
}

impl DeviceClient {
    pub fn new(device_host: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(SYNC_TIMEOUT)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            http,
            base_url: format!("http://{device_host}:{SYNC_PORT}"),
        })
    }

    /// Initial capability handshake. Any failure here is fatal to startup:
    /// there is no point watching files for a device we cannot talk to.
    pub async fn hello(&self) -> Result<HelloReply> {
        let url = format!("{}/api/hello", self.base_url);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .with_context(|| format!("device unreachable at {url}"))?;
        if !response.status().is_success() {
            bail!("device answered {} to hello", response.status());
        }
        let reply: HelloReply = response.json().await.context("malformed hello reply")?;
        if !reply.ok {
            bail!("device refused hello");
        }
        if reply.version != PROTOCOL_VERSION {
            bail!(
                "device speaks protocol version {}, this tool requires {}",
                reply.version,
                PROTOCOL_VERSION
            );
        }
        Ok(reply)
    }

    /// Push the current manifest to the device.
    pub async fn push_manifest(
        &self,
        store: &ContentStore,
        self_addr: &str,
    ) -> Result<(), PushError> {
        // Stamp the sync before snapshotting: a change racing the push then
        // leaves last_change ahead of last_sync and retriggers.
        store.mark_sync_started();
        let manifest = store.build_manifest(self_addr);
        let payload = encode_manifest(&manifest)?;
        debug!(
            files = manifest.len(),
            bytes = payload.len(),
            "pushing manifest"
        );

        let part = reqwest::multipart::Part::bytes(payload).file_name("manifest.gz");
        let form = reqwest::multipart::Form::new().part("manifest", part);
        let response = self
            .http
            .post(format!("{}/api/sync-file", self.base_url))
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(PushError::Status(status));
        }
        let ack: serde_json::Value = response
            .json()
            .await
            .map_err(|e| PushError::Rejected(e.to_string()))?;
        if ack.get("ok").and_then(|v| v.as_bool()) != Some(true) {
            return Err(PushError::Rejected(ack.to_string()));
        }

        info!("device is syncing");
        Ok(())
    }

    /// Ask the device to leave dev mode. Best-effort; errors are swallowed.
    pub async fn restore(&self) {
        let url = format!("{}/api/restore", self.base_url);
        if let Err(e) = self.http.post(&url).timeout(RESTORE_TIMEOUT).send().await {
            debug!("restore request failed: {e}");
        }
    }
}

/// Serialize manifest entries as `sync <path> <hash> <size> <url>` lines and
/// gzip the result. Entries arrive sorted, so unchanged state always encodes
/// to identical bytes.
pub fn encode_manifest(entries: &[ManifestEntry]) -> std::io::Result<Vec<u8>> {
    let mut text = String::new();
    for entry in entries {
        text.push_str(&format!(
            "sync {} {} {} {}\n",
            entry.path, entry.hash, entry.size, entry.fetch_url
        ));
    }

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(text.as_bytes())?;
    encoder.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::io::Read;

    fn entry(path: &str, hash: &str, size: u64) -> ManifestEntry {
        ManifestEntry {
            path: path.to_string(),
            hash: hash.to_string(),
            size,
            fetch_url: format!("http://10.0.0.5:{SYNC_PORT}/{hash}"),
        }
    }

    fn decode(payload: &[u8]) -> String {
        let mut text = String::new();
        GzDecoder::new(payload).read_to_string(&mut text).unwrap();
        text
    }

    #[test]
    fn test_manifest_line_format() {
        let payload = encode_manifest(&[entry("src/main.lua", "abc123", 42)]).unwrap();

        assert_eq!(
            decode(&payload),
            format!("sync src/main.lua abc123 42 http://10.0.0.5:{SYNC_PORT}/abc123\n")
        );
    }

    #[test]
    fn test_encode_preserves_order() {
        let payload =
            encode_manifest(&[entry("a.txt", "h1", 1), entry("b/c.txt", "h2", 2)]).unwrap();
        let text = decode(&payload);

        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("sync a.txt "));
        assert!(lines[1].starts_with("sync b/c.txt "));
    }

    #[test]
    fn test_encode_is_deterministic() {
        let entries = [entry("a.txt", "h1", 1), entry("b.txt", "h2", 2)];

        assert_eq!(
            encode_manifest(&entries).unwrap(),
            encode_manifest(&entries).unwrap()
        );
    }

    #[test]
    fn test_empty_manifest_encodes_to_empty_text() {
        let payload = encode_manifest(&[]).unwrap();
        assert_eq!(decode(&payload), "");
    }

    #[test]
    fn test_hello_reply_parsing() {
        let reply: HelloReply = serde_json::from_str(
            r#"{"ok": true, "version": 1, "your_ip": "192.168.1.10", "device_url": "http://device.local"}"#,
        )
        .unwrap();

        assert!(reply.ok);
        assert_eq!(reply.version, PROTOCOL_VERSION);
        assert_eq!(reply.your_ip, "192.168.1.10");
        assert_eq!(reply.device_url, "http://device.local");
    }

    #[test]
    fn test_hello_reply_ignores_extra_fields() {
        let reply: HelloReply = serde_json::from_str(
            r#"{"ok": true, "version": 1, "your_ip": "10.0.0.2", "device_url": "u", "name": "den"}"#,
        )
        .unwrap();

        assert_eq!(reply.your_ip, "10.0.0.2");
    }
}
