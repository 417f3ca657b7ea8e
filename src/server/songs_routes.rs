//! Song catalog and query-by-humming routes under `/api/songs`.

use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde_json::json;

use super::albums_routes::ListingQuery;
use super::state::{ServerState, SharedOrchestrator, SharedStore};
use super::{error_json, read_upload_field, retrieval_error_response};

/// GET /songs - paginated listing with LIKE search on name.
async fn list_songs(
    State(store): State<SharedStore>,
    Query(query): Query<ListingQuery>,
) -> Response {
    let page = query.page.unwrap_or(1);
    let page_size = query.page_size.unwrap_or(10);
    let search = query.search.unwrap_or_default();

    match store.list_songs(page, page_size, &search) {
        Ok(listing) => Json(listing).into_response(),
        Err(_) => error_json(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to retrieve records",
        ),
    }
}

/// GET /songs/unassociated - songs that belong to no album.
async fn unassociated_songs(State(store): State<SharedStore>) -> Response {
    match store.unassociated_songs() {
        Ok(songs) => Json(songs).into_response(),
        Err(_) => error_json(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to retrieve records",
        ),
    }
}

/// DELETE /songs/{id} - remove the row and its artifact files.
async fn delete_song(
    State(orchestrator): State<SharedOrchestrator>,
    Path(id): Path<i64>,
) -> Response {
    match orchestrator.delete_song(id).await {
        Ok(true) => Json(json!({
            "message": "Record and associated files deleted successfully"
        }))
        .into_response(),
        Ok(false) => error_json(StatusCode::NOT_FOUND, "Record not found"),
        Err(err) => retrieval_error_response(err, StatusCode::INTERNAL_SERVER_ERROR),
    }
}

/// POST /songs/upload - ingest one audio file or a ZIP of them.
async fn upload_song(
    State(orchestrator): State<SharedOrchestrator>,
    mut multipart: Multipart,
) -> Response {
    let (filename, data) = match read_upload_field(&mut multipart).await {
        Ok(parts) => parts,
        Err(response) => return response,
    };

    match orchestrator.ingest_song(&filename, &data).await {
        Ok(ingest) if ingest.from_zip => {
            let extracted: Vec<&str> = ingest
                .songs
                .iter()
                .map(|song| song.audio_file_path.as_str())
                .collect();
            Json(json!({
                "message": "ZIP file uploaded and extracted successfully",
                "extractedFiles": extracted,
            }))
            .into_response()
        }
        Ok(ingest) => {
            let song = &ingest.songs[0];
            Json(json!({
                "message": "File uploaded and song created successfully",
                "path": song.audio_file_path_midi,
                "filename": song.name,
            }))
            .into_response()
        }
        Err(err) => retrieval_error_response(err, StatusCode::INTERNAL_SERVER_ERROR),
    }
}

/// POST /songs/search-by-audio - rank songs by melodic similarity to a
/// hummed clip.
async fn search_by_audio(
    State(orchestrator): State<SharedOrchestrator>,
    mut multipart: Multipart,
) -> Response {
    let (filename, data) = match read_upload_field(&mut multipart).await {
        Ok(parts) => parts,
        Err(response) => return response,
    };

    match orchestrator.search_by_humming(&filename, &data).await {
        Ok(outcome) if outcome.matches.is_empty() => (
            StatusCode::NOT_FOUND,
            Json(json!({ "message": "No similar songs found" })),
        )
            .into_response(),
        Ok(outcome) => Json(json!({
            "data": outcome.matches,
            "time": outcome.elapsed_seconds,
        }))
        .into_response(),
        // A failed upstream transcription surfaces as a client error here
        Err(err) => retrieval_error_response(err, StatusCode::BAD_REQUEST),
    }
}

pub fn songs_routes() -> Router<ServerState> {
    Router::new()
        .route("/songs", get(list_songs))
        .route("/songs/unassociated", get(unassociated_songs))
        .route("/songs/{id}", delete(delete_song))
        .route("/songs/upload", post(upload_song))
        .route("/songs/search-by-audio", post(search_by_audio))
}
