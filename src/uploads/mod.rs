//! Upload storage
//!
//! All uploaded and derived files live under a single uploads root
//! (default `public/uploads`). Uploads are stored under a per-kind
//! subdirectory with collision-free names; ZIP archives are extracted
//! in place of being stored.

mod zip_archive;

use std::path::{Component, Path, PathBuf};

use thiserror::Error;
use tokio::fs;
use uuid::Uuid;

pub use zip_archive::extract_zip;

/// Subdirectory for album-cover uploads.
pub const ALBUMS_DIR: &str = "albums";
/// Subdirectory for song audio uploads.
pub const SONGS_DIR: &str = "songs";
/// Subdirectory for query-by-humming uploads.
pub const HUMMINGS_DIR: &str = "hummings";
/// Subdirectory for query-by-image uploads.
pub const IMAGES_DIR: &str = "images";
/// Subdirectory for flattened cover feature artifacts.
pub const FLATTENED_DIR: &str = "flattened_albums";
/// Served in place of a missing file.
pub const PLACEHOLDER_FILE: &str = "placeholder/noimage.gif";

/// Errors from storing, resolving, or deleting uploads.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("file not found: {0}")]
    NotFound(String),

    #[error("zip extraction error: {0}")]
    Zip(String),
}

/// File store rooted at the uploads directory.
#[derive(Clone)]
pub struct UploadStore {
    root: PathBuf,
}

impl UploadStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        UploadStore { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path served when a requested file does not exist.
    pub fn placeholder_path(&self) -> PathBuf {
        self.root.join(PLACEHOLDER_FILE)
    }

    /// Resolve a client-supplied relative path against the root,
    /// rejecting traversal outside it.
    pub fn resolve(&self, relative: &str) -> Result<PathBuf, UploadError> {
        let trimmed = relative.trim_start_matches('/');
        if trimmed.is_empty() {
            return Err(UploadError::InvalidPath(relative.to_string()));
        }
        let path = Path::new(trimmed);
        for component in path.components() {
            match component {
                Component::Normal(_) => {}
                _ => return Err(UploadError::InvalidPath(relative.to_string())),
            }
        }
        Ok(self.root.join(path))
    }

    /// Store an upload under `subdir`, or extract it there when it is a
    /// ZIP archive. Returns the stored file paths.
    pub async fn save_upload(
        &self,
        subdir: &str,
        filename: &str,
        data: &[u8],
    ) -> Result<Vec<PathBuf>, UploadError> {
        let dir = self.root.join(subdir);
        fs::create_dir_all(&dir).await?;

        let safe_name = sanitize_filename(filename)?;
        let (stem, extension) = split_filename(&safe_name);

        if extension.eq_ignore_ascii_case(".zip") {
            let temp_zip = std::env::temp_dir().join(format!("{}.zip", Uuid::new_v4()));
            fs::write(&temp_zip, data).await?;
            let extracted = extract_zip(&temp_zip, &dir).await;
            fs::remove_file(&temp_zip).await?;
            return extracted;
        }

        let unique_name = format!("{}-{}{}", stem, Uuid::new_v4(), extension);
        let dest = dir.join(unique_name);
        fs::write(&dest, data).await?;
        Ok(vec![dest])
    }

    /// Delete the file at a client-supplied relative path.
    pub async fn delete(&self, relative: &str) -> Result<PathBuf, UploadError> {
        let path = self.resolve(relative)?;
        if !path.exists() {
            return Err(UploadError::NotFound(relative.to_string()));
        }
        fs::remove_file(&path).await?;
        Ok(path)
    }
}

/// Remove a file if it exists. Missing files are fine; any other IO
/// failure is reported.
pub fn remove_if_exists(path: &Path) -> std::io::Result<bool> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err),
    }
}

/// Strip any directory components and replace characters that are not
/// filesystem-safe. Control characters (including CR/LF, which would
/// end up inside response headers when the file is served) are
/// rejected outright.
pub(crate) fn sanitize_filename(filename: &str) -> Result<String, UploadError> {
    let name = Path::new(filename)
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| UploadError::InvalidPath(filename.to_string()))?;

    if name.starts_with('.') || name.chars().any(|c| c.is_control()) {
        return Err(UploadError::InvalidPath(filename.to_string()));
    }

    let sanitized: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            _ => c,
        })
        .collect();

    if sanitized.is_empty() {
        return Err(UploadError::InvalidPath(filename.to_string()));
    }

    Ok(sanitized)
}

/// Split a filename into stem and extension (with leading dot).
pub(crate) fn split_filename(filename: &str) -> (String, String) {
    let path = Path::new(filename);
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e))
        .unwrap_or_default();
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(filename)
        .to_string();
    (stem, extension)
}
