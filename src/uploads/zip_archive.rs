//! ZIP extraction for bulk uploads.

use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::debug;
use uuid::Uuid;

use super::{sanitize_filename, split_filename, UploadError};

/// Extract every file in the archive directly into `dest_dir`, flattening
/// any internal directory structure. Entries whose target name already
/// exists get a fresh unique name. Returns the written paths.
pub async fn extract_zip(zip_path: &Path, dest_dir: &Path) -> Result<Vec<PathBuf>, UploadError> {
    let zip_data = fs::read(zip_path).await?;
    let cursor = std::io::Cursor::new(zip_data);

    let mut archive =
        zip::ZipArchive::new(cursor).map_err(|e| UploadError::Zip(e.to_string()))?;

    let mut file_paths = Vec::new();

    for i in 0..archive.len() {
        // Read the entry fully before any await point; ZipFile is not Send
        let (is_dir, name, content) = {
            let mut file = archive
                .by_index(i)
                .map_err(|e| UploadError::Zip(e.to_string()))?;

            let is_dir = file.is_dir();
            let name = file.name().to_string();

            let mut content = Vec::new();
            if !is_dir {
                std::io::Read::read_to_end(&mut file, &mut content)
                    .map_err(|e| UploadError::Zip(e.to_string()))?;
            }
            (is_dir, name, content)
        };

        if is_dir {
            continue;
        }

        // Hidden files and unusable names (e.g. macOS resource forks)
        // are skipped rather than failing the whole archive
        let safe_name = match sanitize_filename(&name) {
            Ok(safe_name) => safe_name,
            Err(_) => {
                debug!("Skipping archive entry with unusable name: {}", name);
                continue;
            }
        };
        let (stem, extension) = split_filename(&safe_name);

        let mut dest_path = dest_dir.join(&safe_name);
        while dest_path.exists() {
            let unique_name = format!("{}-{}{}", stem, Uuid::new_v4(), extension);
            dest_path = dest_dir.join(unique_name);
        }

        fs::write(&dest_path, &content).await?;
        file_paths.push(dest_path);
    }

    Ok(file_paths)
}
