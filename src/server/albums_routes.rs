//! Album catalog and query-by-image routes under `/api/albums`.

use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use super::state::{ServerState, SharedOrchestrator, SharedStore};
use super::{error_json, read_upload_field, retrieval_error_response};

#[derive(Debug, Deserialize)]
pub struct ListingQuery {
    #[serde(default)]
    pub page: Option<i64>,
    #[serde(default)]
    pub page_size: Option<i64>,
    #[serde(default)]
    pub search: Option<String>,
}

/// GET /albums - paginated listing with LIKE search on name.
async fn list_albums(
    State(store): State<SharedStore>,
    Query(query): Query<ListingQuery>,
) -> Response {
    let page = query.page.unwrap_or(1);
    let page_size = query.page_size.unwrap_or(10);
    let search = query.search.unwrap_or_default();

    match store.list_albums(page, page_size, &search) {
        Ok(listing) => Json(listing).into_response(),
        Err(_) => error_json(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to retrieve records",
        ),
    }
}

/// GET /albums/{id} - one album with its songs.
async fn get_album(State(store): State<SharedStore>, Path(id): Path<i64>) -> Response {
    match store.get_album_with_songs(id) {
        Ok(Some(album)) => Json(album).into_response(),
        Ok(None) => error_json(StatusCode::NOT_FOUND, "Record not found"),
        Err(_) => error_json(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to retrieve record",
        ),
    }
}

/// GET /albums/{id}/{song_id} - attach a song to an album.
async fn assign_song(
    State(store): State<SharedStore>,
    Path((id, song_id)): Path<(i64, i64)>,
) -> Response {
    match store.assign_song_to_album(id, song_id) {
        Ok(true) => Json(json!({ "message": "Song assigned to album successfully" })).into_response(),
        Ok(false) => error_json(StatusCode::NOT_FOUND, "Record not found"),
        Err(_) => error_json(StatusCode::INTERNAL_SERVER_ERROR, "Failed to update record"),
    }
}

/// DELETE /albums/{id} - remove the row and its artifact files.
async fn delete_album(
    State(orchestrator): State<SharedOrchestrator>,
    Path(id): Path<i64>,
) -> Response {
    match orchestrator.delete_album(id).await {
        Ok(true) => Json(json!({
            "message": "Record and associated files deleted successfully"
        }))
        .into_response(),
        Ok(false) => error_json(StatusCode::NOT_FOUND, "Record not found"),
        Err(err) => retrieval_error_response(err, StatusCode::INTERNAL_SERVER_ERROR),
    }
}

/// POST /albums/upload - ingest one cover or a ZIP of covers.
async fn upload_album(
    State(orchestrator): State<SharedOrchestrator>,
    mut multipart: Multipart,
) -> Response {
    let (filename, data) = match read_upload_field(&mut multipart).await {
        Ok(parts) => parts,
        Err(response) => return response,
    };

    match orchestrator.ingest_album(&filename, &data).await {
        Ok(_) => Json(json!({ "message": "Albums created successfully" })).into_response(),
        Err(err) => retrieval_error_response(err, StatusCode::INTERNAL_SERVER_ERROR),
    }
}

/// POST /albums/search-by-image - rank albums by cover similarity.
async fn search_by_image(
    State(orchestrator): State<SharedOrchestrator>,
    mut multipart: Multipart,
) -> Response {
    let (filename, data) = match read_upload_field(&mut multipart).await {
        Ok(parts) => parts,
        Err(response) => return response,
    };

    match orchestrator.search_by_image(&filename, &data).await {
        Ok(outcome) if outcome.matches.is_empty() => (
            StatusCode::NOT_FOUND,
            Json(json!({ "message": "No similar albums found" })),
        )
            .into_response(),
        Ok(outcome) => Json(json!({
            "data": outcome.matches,
            "time": outcome.elapsed_seconds,
        }))
        .into_response(),
        Err(err) => retrieval_error_response(err, StatusCode::INTERNAL_SERVER_ERROR),
    }
}

pub fn albums_routes() -> Router<ServerState> {
    Router::new()
        .route("/albums", get(list_albums))
        .route("/albums/{id}", get(get_album).delete(delete_album))
        .route("/albums/{id}/{song_id}", get(assign_song))
        .route("/albums/upload", post(upload_album))
        .route("/albums/search-by-image", post(search_by_image))
}
