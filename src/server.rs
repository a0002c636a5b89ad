//! Content-addressed file server for device pulls.
//!
//! Read-only: the device resolves a manifest hash to raw file bytes with a
//! single GET. No write routes and no authentication; the trust boundary is
//! the local dev network.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use crate::protocol::SYNC_PORT;
use crate::store::ContentStore;

/// Assemble the content server router.
pub fn router(store: Arc<ContentStore>) -> Router {
    Router::new()
        .route("/:hash", get(fetch_by_hash))
        .layer(TraceLayer::new_for_http())
        .with_state(store)
}

/// Serve raw file bytes addressed by content hash.
///
/// 404 covers both an unknown hash and a tracked file that vanished between
/// lookup and open; the next manifest push drops the stale entry.
async fn fetch_by_hash(
    State(store): State<Arc<ContentStore>>,
    Path(hash): Path<String>,
) -> Response {
    let Some(rel) = store.lookup_by_hash(&hash) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    match tokio::fs::read(store.abs_path(&rel)).await {
        Ok(bytes) => {
            debug!(path = %rel, bytes = bytes.len(), "serving");
            Body::from(bytes).into_response()
        }
        Err(e) => {
            debug!(path = %rel, "tracked file unreadable: {e}");
            StatusCode::NOT_FOUND.into_response()
        }
    }
}

/// Bind the fixed sync port and serve until the process exits.
pub async fn serve(store: Arc<ContentStore>) -> anyhow::Result<()> {
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], SYNC_PORT));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("content server listening on {addr}");
    axum::serve(listener, router(store)).await?;
    Ok(())
}
