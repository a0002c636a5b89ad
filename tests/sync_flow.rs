//! End-to-end flow: scan a project, mutate it, rebuild the manifest, and
//! serve file bytes by hash, exercising the store, scanner, encoder, and
//! content server together.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use flate2::read::GzDecoder;
use http_body_util::BodyExt;
use std::io::Read;
use tower::ServiceExt;

use devcast::exclude::ExcludePatterns;
use devcast::protocol::encode_manifest;
use devcast::store::ContentStore;
use devcast::{daemon, server, CONFIG_FILENAME, SYNC_PORT};

async fn get_hash(app: axum::Router, hash: &str) -> axum::http::Response<Body> {
    app.oneshot(
        Request::builder()
            .uri(format!("/{hash}"))
            .body(Body::empty())
            .unwrap(),
    )
    .await
    .unwrap()
}

#[tokio::test]
async fn scan_modify_and_serve() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.txt"), "x").unwrap();
    std::fs::create_dir(dir.path().join(".hidden")).unwrap();
    std::fs::write(dir.path().join(".hidden/y.txt"), "y").unwrap();

    let store = Arc::new(ContentStore::new(dir.path(), ExcludePatterns::new()));
    daemon::scan_project(&store).unwrap();

    // Only a.txt: the hidden directory never enters the manifest.
    let manifest = store.build_manifest("127.0.0.1");
    assert_eq!(manifest.len(), 1);
    assert_eq!(manifest[0].path, "a.txt");
    assert_eq!(manifest[0].size, 1);
    let old_hash = manifest[0].hash.clone();

    // Modify and re-add, as the watcher does on close-after-write.
    std::fs::write(dir.path().join("a.txt"), "xy").unwrap();
    store.add_file(&dir.path().join("a.txt"));

    let manifest = store.build_manifest("127.0.0.1");
    assert_eq!(manifest.len(), 1);
    assert_eq!(manifest[0].size, 2);
    assert_ne!(manifest[0].hash, old_hash);

    let app = server::router(Arc::clone(&store));

    // The old content hash no longer resolves.
    let response = get_hash(app.clone(), &old_hash).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // The new hash serves the new bytes.
    let response = get_hash(app, &manifest[0].hash).await;
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&bytes[..], b"xy");
}

#[tokio::test]
async fn manifest_payload_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("b.txt"), "beta").unwrap();
    std::fs::write(dir.path().join("a.txt"), "alpha").unwrap();

    let store = Arc::new(ContentStore::new(dir.path(), ExcludePatterns::new()));
    daemon::scan_project(&store).unwrap();

    let manifest = store.build_manifest("192.168.1.10");
    let payload = encode_manifest(&manifest).unwrap();

    let mut text = String::new();
    GzDecoder::new(&payload[..]).read_to_string(&mut text).unwrap();

    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(
        lines[0],
        format!(
            "sync a.txt {} 5 http://192.168.1.10:{SYNC_PORT}/{}",
            manifest[0].hash, manifest[0].hash
        )
    );
    assert!(lines[1].starts_with("sync b.txt "));

    // An unchanged store always encodes to byte-identical payloads.
    let again = encode_manifest(&store.build_manifest("192.168.1.10")).unwrap();
    assert_eq!(payload, again);
}

#[tokio::test]
async fn ignored_paths_stay_out_except_config_file() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("keep.lua"), "k").unwrap();
    std::fs::write(dir.path().join("skip.toml"), "s").unwrap();
    std::fs::write(dir.path().join(CONFIG_FILENAME), "c").unwrap();

    let exclude = ExcludePatterns::from_patterns(&["*.toml"]).unwrap();
    let store = Arc::new(ContentStore::new(dir.path(), exclude));
    daemon::scan_project(&store).unwrap();

    let paths: Vec<String> = store
        .build_manifest("h")
        .into_iter()
        .map(|e| e.path)
        .collect();
    assert_eq!(paths, vec![CONFIG_FILENAME.to_string(), "keep.lua".to_string()]);
}
