//! File upload/serve/delete routes under `/api/uploads`.

use std::path::Path as FsPath;

use axum::{
    body::Body,
    extract::{Multipart, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;
use tracing::warn;

use super::state::{ServerState, SharedUploads};
use super::{error_json, read_upload_field};
use crate::uploads::UploadError;

/// Serve a stored file, substituting the placeholder image when the
/// requested path does not exist.
async fn get_file(
    State(uploads): State<SharedUploads>,
    Path(filepath): Path<String>,
) -> Response {
    let resolved = match uploads.resolve(&filepath) {
        Ok(path) => path,
        Err(_) => return error_json(StatusCode::BAD_REQUEST, "File path is required"),
    };

    let path = if resolved.exists() {
        resolved
    } else {
        uploads.placeholder_path()
    };

    serve_file(&path).await
}

async fn serve_file(path: &FsPath) -> Response {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(_) => return error_json(StatusCode::NOT_FOUND, "File not found"),
    };

    let mime_type = infer::get(&bytes)
        .map(|kind| kind.mime_type().to_string())
        .unwrap_or_else(|| "application/octet-stream".to_string());

    // Control characters are invalid header bytes; a file named with
    // them (created outside the upload path) must not break the response
    let filename: String = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
        .chars()
        .map(|c| if c.is_control() { '_' } else { c })
        .collect();

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, mime_type)
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename={}", filename),
        )
        .body(Body::from(bytes))
        .unwrap()
}

/// Save an upload under the given relative directory; ZIP archives are
/// extracted in place.
async fn upload_file(
    State(uploads): State<SharedUploads>,
    Path(filepath): Path<String>,
    mut multipart: Multipart,
) -> Response {
    if uploads.resolve(&filepath).is_err() {
        return error_json(StatusCode::BAD_REQUEST, "Target path is required");
    }

    let (filename, data) = match read_upload_field(&mut multipart).await {
        Ok(parts) => parts,
        Err(response) => return response,
    };

    match uploads.save_upload(&filepath, &filename, &data).await {
        Ok(paths) if filename.to_lowercase().ends_with(".zip") => {
            let extracted: Vec<String> = paths
                .iter()
                .map(|p| p.to_string_lossy().to_string())
                .collect();
            Json(json!({
                "message": "ZIP file uploaded and extracted successfully",
                "extractedFiles": extracted,
            }))
            .into_response()
        }
        Ok(paths) => {
            let stored = &paths[0];
            Json(json!({
                "message": "File uploaded successfully",
                "path": stored.to_string_lossy(),
                "filename": stored.file_name().map(|n| n.to_string_lossy().to_string()),
            }))
            .into_response()
        }
        Err(err) => {
            warn!("Upload failed: {}", err);
            error_json(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
    }
}

/// Delete a stored file.
async fn delete_file(
    State(uploads): State<SharedUploads>,
    Path(filepath): Path<String>,
) -> Response {
    match uploads.delete(&filepath).await {
        Ok(_) => Json(json!({
            "message": "File deleted successfully",
            "path": filepath,
        }))
        .into_response(),
        Err(UploadError::NotFound(_)) => error_json(StatusCode::NOT_FOUND, "File not found"),
        Err(UploadError::InvalidPath(_)) => {
            error_json(StatusCode::BAD_REQUEST, "File path is required")
        }
        Err(err) => error_json(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
    }
}

pub fn uploads_routes() -> Router<ServerState> {
    Router::new().route(
        "/uploads/{*filepath}",
        get(get_file).post(upload_file).delete(delete_file),
    )
}
