use std::sync::Arc;

use anyhow::{ensure, Context, Result};
use clap::Parser;

use devcast::daemon;
use devcast::exclude::ExcludePatterns;
use devcast::protocol::DeviceClient;
use devcast::store::ContentStore;

/// Live-development sync: watch a project directory and feed changed files
/// to a playback device over HTTP, without a full redeploy.
#[derive(Debug, Parser)]
#[command(name = "devcast", version)]
struct Args {
    /// Host name or IP of the playback device.
    device: String,
    /// Project directory to watch and serve.
    project_dir: std::path::PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let root = args.project_dir.canonicalize().with_context(|| {
        format!(
            "project directory {} is not accessible",
            args.project_dir.display()
        )
    })?;
    ensure!(root.is_dir(), "{} is not a directory", root.display());

    let device = DeviceClient::new(&args.device)?;
    let hello = device
        .hello()
        .await
        .context("device handshake failed")?;
    tracing::info!(device = %hello.device_url, self_addr = %hello.your_ip, "connected to device");

    let exclude = ExcludePatterns::for_project(&root)?;
    let store = Arc::new(ContentStore::new(&root, exclude));

    daemon::run(store, device, hello.your_ip).await
}
