mod albums_routes;
pub mod config;
mod requests_logging;
#[allow(clippy::module_inception)]
pub mod server;
mod songs_routes;
pub mod state;
mod uploads_routes;

use axum::extract::Multipart;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::warn;

pub use config::ServerConfig;
pub use requests_logging::{log_requests, RequestsLoggingLevel};
pub use server::{make_app, run_server};

use crate::retrieval::RetrievalError;
use crate::uploads::UploadError;

/// A gin-shaped error body: `{"error": "..."}`.
pub(crate) fn error_json(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

/// Map an orchestrator error to its HTTP response.
///
/// `transcription_status` differs by caller: song upload reports the
/// upstream failure as 500, humming search as 400.
pub(crate) fn retrieval_error_response(
    err: RetrievalError,
    transcription_status: StatusCode,
) -> Response {
    warn!("Request failed: {}", err);
    match &err {
        RetrievalError::Validation(_) => error_json(StatusCode::BAD_REQUEST, err.to_string()),
        RetrievalError::Image(_) => error_json(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
        RetrievalError::Transcription(_) => error_json(transcription_status, err.to_string()),
        RetrievalError::Pitch(_) => error_json(transcription_status, err.to_string()),
        RetrievalError::Upload(upload_err) => match upload_err {
            UploadError::NotFound(_) => error_json(StatusCode::NOT_FOUND, err.to_string()),
            UploadError::InvalidPath(_) => error_json(StatusCode::BAD_REQUEST, err.to_string()),
            _ => error_json(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
        },
        RetrievalError::ModelNotReady => {
            error_json(StatusCode::SERVICE_UNAVAILABLE, err.to_string())
        }
        RetrievalError::Storage(_) => {
            error_json(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
    }
}

/// Pull the `file` field out of a multipart upload.
pub(crate) async fn read_upload_field(
    multipart: &mut Multipart,
) -> Result<(String, Vec<u8>), Response> {
    let mut filename: Option<String> = None;
    let mut data: Option<Vec<u8>> = None;

    while let Ok(Some(field)) = multipart.next_field().await {
        if field.name() == Some("file") {
            filename = field.file_name().map(|s| s.to_string());
            match field.bytes().await {
                Ok(bytes) => data = Some(bytes.to_vec()),
                Err(err) => {
                    warn!("Failed to read multipart file field: {}", err);
                    return Err(error_json(StatusCode::BAD_REQUEST, "Failed to read file"));
                }
            }
        }
    }

    match (filename, data) {
        (Some(filename), Some(data)) if !filename.is_empty() && !data.is_empty() => {
            Ok((filename, data))
        }
        _ => Err(error_json(
            StatusCode::BAD_REQUEST,
            "File upload is required",
        )),
    }
}
