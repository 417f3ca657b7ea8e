#![allow(dead_code)] // Each test binary uses a different slice of these fixtures

//! Shared test fixtures
//!
//! Builds an isolated app instance per test: a temp uploads root, a
//! temp SQLite catalog, and the full router from `make_app`. Requests
//! are driven in-process with `tower::ServiceExt::oneshot`.

use std::path::Path;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request};
use axum::Router;
use image::{DynamicImage, Rgb, RgbImage};
use tempfile::TempDir;

use melisma_retrieval_server::catalog_store::SqliteCatalogStore;
use melisma_retrieval_server::features::transcription::TranscriptionClient;
use melisma_retrieval_server::qbi::{ComponentInit, QbiEngine, QbiScoringMode};
use melisma_retrieval_server::retrieval::RetrievalOrchestrator;
use melisma_retrieval_server::server::{make_app, RequestsLoggingLevel, ServerConfig};
use melisma_retrieval_server::uploads::UploadStore;

pub const MULTIPART_BOUNDARY: &str = "test-multipart-boundary";

/// One isolated server instance over temp storage.
pub struct TestApp {
    pub app: Router,
    pub store: Arc<SqliteCatalogStore>,
    pub uploads: Arc<UploadStore>,
    pub orchestrator: Arc<RetrievalOrchestrator>,
    _temp_dir: TempDir,
}

/// Build a test app. `transcriber_url` points at a mock service for
/// humming tests; anything unreachable works for the rest.
pub fn spawn_app(transcriber_url: &str) -> TestApp {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let uploads_root = temp_dir.path().join("uploads");
    std::fs::create_dir_all(&uploads_root).expect("Failed to create uploads root");

    let store = Arc::new(
        SqliteCatalogStore::new(temp_dir.path().join("catalog.db"))
            .expect("Failed to open catalog store"),
    );
    let uploads = Arc::new(UploadStore::new(&uploads_root));
    let transcriber = Arc::new(TranscriptionClient::new(transcriber_url.to_string(), 5));
    let qbi = Arc::new(QbiEngine::new(100, ComponentInit::Deterministic));

    let orchestrator = Arc::new(RetrievalOrchestrator::new(
        store.clone(),
        uploads.clone(),
        transcriber,
        qbi,
        QbiScoringMode::Model,
        ComponentInit::Deterministic,
    ));

    let config = ServerConfig {
        port: 0,
        cors_origin: "http://localhost:4000".to_string(),
        requests_logging_level: RequestsLoggingLevel::None,
    };

    let app = make_app(config, store.clone(), uploads.clone(), orchestrator.clone())
        .expect("Failed to build app");

    TestApp {
        app,
        store,
        uploads,
        orchestrator,
        _temp_dir: temp_dir,
    }
}

/// Encode a single-file `multipart/form-data` body with field name
/// `file`.
pub fn multipart_body(filename: &str, data: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{}\r\n", MULTIPART_BOUNDARY).as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\n",
            filename
        )
        .as_bytes(),
    );
    body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{}--\r\n", MULTIPART_BOUNDARY).as_bytes());
    body
}

/// POST a file upload to `uri`.
pub fn multipart_request(uri: &str, filename: &str, data: &[u8]) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", MULTIPART_BOUNDARY),
        )
        .body(Body::from(multipart_body(filename, data)))
        .unwrap()
}

/// Encode a uniform-color image in the requested format.
pub fn image_bytes(width: u32, height: u32, value: u8, format: image::ImageFormat) -> Vec<u8> {
    let mut img = RgbImage::new(width, height);
    for pixel in img.pixels_mut() {
        *pixel = Rgb([value, value, value]);
    }
    let mut buffer = std::io::Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img)
        .write_to(&mut buffer, format)
        .expect("Failed to encode test image");
    buffer.into_inner()
}

/// Drop a placeholder image into the uploads root so missing-file GETs
/// have something to serve.
pub fn install_placeholder(uploads_root: &Path) {
    let placeholder_dir = uploads_root.join("placeholder");
    std::fs::create_dir_all(&placeholder_dir).expect("Failed to create placeholder dir");
    // Minimal GIF header is enough for content-type sniffing
    std::fs::write(placeholder_dir.join("noimage.gif"), b"GIF89a\x01\x00\x01\x00").unwrap();
}

/// Read a response body as JSON.
pub async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), 64 * 1024 * 1024)
        .await
        .expect("Failed to read body");
    serde_json::from_slice(&bytes).expect("Body is not JSON")
}
