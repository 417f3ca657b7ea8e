use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method},
    middleware,
    response::IntoResponse,
    routing::get,
    Router,
};
use tower_http::cors::CorsLayer;

use crate::catalog_store::SqliteCatalogStore;
use crate::retrieval::RetrievalOrchestrator;
use crate::uploads::UploadStore;

use super::albums_routes::albums_routes;
use super::log_requests;
use super::songs_routes::songs_routes;
use super::state::ServerState;
use super::uploads_routes::uploads_routes;
use super::ServerConfig;

/// Body limit for multipart uploads (covers ZIP bundles).
const MAX_UPLOAD_BYTES: usize = 512 * 1024 * 1024;

async fn home() -> impl IntoResponse {
    "Running..."
}

pub fn make_app(
    config: ServerConfig,
    store: Arc<SqliteCatalogStore>,
    uploads: Arc<UploadStore>,
    orchestrator: Arc<RetrievalOrchestrator>,
) -> Result<Router> {
    let state = ServerState {
        config: config.clone(),
        store,
        uploads,
        orchestrator,
    };

    let cors = CorsLayer::new()
        .allow_origin(config.cors_origin.parse::<HeaderValue>()?)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::ORIGIN, header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
        .max_age(Duration::from_secs(12 * 60 * 60));

    let api_routes: Router<ServerState> = Router::new()
        .merge(uploads_routes())
        .merge(albums_routes())
        .merge(songs_routes())
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES));

    let app: Router = Router::new()
        .route("/", get(home))
        .nest("/api", api_routes)
        .layer(cors)
        .layer(middleware::from_fn_with_state(state.clone(), log_requests))
        .with_state(state);

    Ok(app)
}

pub async fn run_server(
    config: ServerConfig,
    store: Arc<SqliteCatalogStore>,
    uploads: Arc<UploadStore>,
    orchestrator: Arc<RetrievalOrchestrator>,
) -> Result<()> {
    let port = config.port;
    let app = make_app(config, store, uploads, orchestrator)?;

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    Ok(axum::serve(listener, app).await?)
}
