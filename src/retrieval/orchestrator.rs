//! Retrieval orchestrator
//!
//! Drives ingestion and the two search modes. Ingestion persists the
//! upload, derives the feature artifacts, and creates catalog rows.
//! Search fans out one scoring task per catalog entry, joins the
//! results, and returns a ranked, threshold-filtered top slice together
//! with the elapsed scoring time. A failing candidate is logged and
//! skipped, never the whole search.

use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::catalog_store::{Album, Song, SqliteCatalogStore};
use crate::features::audio::extract_pitch_sequence;
use crate::features::image::{self, ImageError};
use crate::features::pitch::{self, PitchError};
use crate::features::transcription::{TranscriptionClient, TranscriptionError};
use crate::qbh::melody_similarity;
use crate::qbi::{pairwise_similarity, projected_similarity, ComponentInit, QbiEngine, QbiScoringMode};
use crate::uploads::{
    remove_if_exists, UploadError, UploadStore, ALBUMS_DIR, FLATTENED_DIR, HUMMINGS_DIR,
    IMAGES_DIR, SONGS_DIR,
};

/// Canonical feature raster width.
pub const FEATURE_WIDTH: usize = 120;
/// Canonical feature raster height.
pub const FEATURE_HEIGHT: usize = 120;

/// Ranked results are truncated to this many entries.
const TOP_RESULTS: usize = 9;

/// Minimum similarity for an album cover to be retained.
const IMAGE_SIMILARITY_THRESHOLD: f64 = 0.8;

/// Minimum similarity for a song to be retained. Strictly positive
/// scores pass; ranking does the rest.
const HUMMING_SIMILARITY_THRESHOLD: f64 = 0.0;

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Image(#[from] ImageError),

    #[error(transparent)]
    Transcription(#[from] TranscriptionError),

    #[error("invalid query pitch artifact: {0}")]
    Pitch(#[from] PitchError),

    #[error(transparent)]
    Upload(#[from] UploadError),

    #[error("image model is not ready")]
    ModelNotReady,

    #[error("storage error: {0}")]
    Storage(anyhow::Error),
}

impl From<anyhow::Error> for RetrievalError {
    fn from(err: anyhow::Error) -> Self {
        RetrievalError::Storage(err)
    }
}

/// One query-by-image result entry.
#[derive(Clone, Debug, Serialize)]
pub struct AlbumMatch {
    #[serde(rename = "ID")]
    pub id: i64,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "PicFilePath")]
    pub pic_file_path: String,
    #[serde(rename = "Songs")]
    pub songs: Vec<Song>,
    pub similarity: f64,
}

/// One query-by-humming result entry.
#[derive(Clone, Debug, Serialize)]
pub struct SongMatch {
    #[serde(flatten)]
    pub song: Song,
    pub similarity: f64,
}

/// Ranked matches plus the scoring wall time in seconds.
#[derive(Clone, Debug)]
pub struct SearchOutcome<T> {
    pub matches: Vec<T>,
    pub elapsed_seconds: f64,
}

/// Result of an album-cover ingestion.
#[derive(Clone, Debug)]
pub struct AlbumIngest {
    pub albums: Vec<Album>,
}

/// Result of a song ingestion.
#[derive(Clone, Debug)]
pub struct SongIngest {
    pub songs: Vec<Song>,
    pub from_zip: bool,
}

/// Coordinates stores, extractors, and engines for the four retrieval
/// operations.
pub struct RetrievalOrchestrator {
    store: Arc<SqliteCatalogStore>,
    uploads: Arc<UploadStore>,
    transcriber: Arc<TranscriptionClient>,
    qbi: Arc<QbiEngine>,
    scoring_mode: QbiScoringMode,
    component_init: ComponentInit,
}

impl RetrievalOrchestrator {
    pub fn new(
        store: Arc<SqliteCatalogStore>,
        uploads: Arc<UploadStore>,
        transcriber: Arc<TranscriptionClient>,
        qbi: Arc<QbiEngine>,
        scoring_mode: QbiScoringMode,
        component_init: ComponentInit,
    ) -> Self {
        RetrievalOrchestrator {
            store,
            uploads,
            transcriber,
            qbi,
            scoring_mode,
            component_init,
        }
    }

    pub fn uploads(&self) -> &UploadStore {
        &self.uploads
    }

    pub fn store(&self) -> &SqliteCatalogStore {
        &self.store
    }

    // =========================================================================
    // Ingestion
    // =========================================================================

    /// Persist an album-cover upload (extracting ZIPs), canonicalize
    /// each cover to PNG, derive and persist its flattened intensity
    /// vector, and create one album row per cover.
    pub async fn ingest_album(&self, filename: &str, data: &[u8]) -> Result<AlbumIngest, RetrievalError> {
        let extracted_paths = self.uploads.save_upload(ALBUMS_DIR, filename, data).await?;
        if extracted_paths.is_empty() {
            return Err(RetrievalError::Validation(
                "archive contained no files".to_string(),
            ));
        }

        let mut albums = Vec::new();
        for file_path in extracted_paths {
            let png_path = self.canonicalize_cover(&file_path).await?;

            let vector = image::preprocess_image(&png_path, FEATURE_WIDTH, FEATURE_HEIGHT)?;

            let cover_name = file_basename(&png_path);
            let flattened_path = self
                .uploads
                .root()
                .join(FLATTENED_DIR)
                .join(format!("{}.json", cover_name));
            image::write_feature_vector(&flattened_path, &vector)?;

            let album = self.store.insert_album(
                &cover_name,
                &png_path.to_string_lossy(),
                &flattened_path.to_string_lossy(),
            )?;
            info!("Created album {} from {}", album.id, cover_name);
            albums.push(album);
        }

        self.rebuild_model().await?;

        Ok(AlbumIngest { albums })
    }

    /// Persist a song upload (extracting ZIPs), run each file through
    /// the pitch extractor, and create one song row per file.
    pub async fn ingest_song(&self, filename: &str, data: &[u8]) -> Result<SongIngest, RetrievalError> {
        let from_zip = filename.to_lowercase().ends_with(".zip");
        let extracted_paths = self.uploads.save_upload(SONGS_DIR, filename, data).await?;
        if extracted_paths.is_empty() {
            return Err(RetrievalError::Validation(
                "archive contained no files".to_string(),
            ));
        }

        let mut songs = Vec::new();
        for file_path in extracted_paths {
            let audio_path = file_path.to_string_lossy().to_string();
            let extraction = extract_pitch_sequence(&self.transcriber, &audio_path).await?;

            let song_name = file_basename(Path::new(&extraction.midi_path));
            let song = self.store.insert_song(
                &song_name,
                &audio_path,
                &extraction.midi_path,
                extraction.pitch_json_path.as_deref().unwrap_or(""),
            )?;
            info!("Created song {} from {}", song.id, song_name);
            songs.push(song);
        }

        Ok(SongIngest { songs, from_zip })
    }

    /// Convert a stored cover to PNG when needed, removing the original.
    async fn canonicalize_cover(&self, file_path: &Path) -> Result<PathBuf, RetrievalError> {
        let is_png = file_path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("png"))
            .unwrap_or(false);
        if is_png {
            return Ok(file_path.to_path_buf());
        }
        let png_path = image::convert_to_png(file_path)?;
        tokio::fs::remove_file(file_path)
            .await
            .map_err(ImageError::Io)?;
        Ok(png_path)
    }

    // =========================================================================
    // Search
    // =========================================================================

    /// Query-by-image: score the uploaded cover against every album and
    /// return the ranked matches. The uploaded file (and any converted
    /// rendition) is deleted before returning.
    pub async fn search_by_image(
        &self,
        filename: &str,
        data: &[u8],
    ) -> Result<SearchOutcome<AlbumMatch>, RetrievalError> {
        let saved = self.uploads.save_upload(IMAGES_DIR, filename, data).await?;
        let query_path = saved
            .into_iter()
            .next()
            .ok_or_else(|| RetrievalError::Validation("file upload is required".to_string()))?;

        let mut temp_files = vec![query_path.clone()];
        let result = self.search_by_image_inner(&query_path, &mut temp_files).await;
        cleanup_temp_files(&temp_files).await;
        result
    }

    async fn search_by_image_inner(
        &self,
        query_path: &Path,
        temp_files: &mut Vec<PathBuf>,
    ) -> Result<SearchOutcome<AlbumMatch>, RetrievalError> {
        let png_path = self.canonicalize_query_image(query_path, temp_files)?;
        let query_vector = image::preprocess_image(&png_path, FEATURE_WIDTH, FEATURE_HEIGHT)?;

        let albums = self.store.all_albums()?;
        let start = Instant::now();
        if albums.is_empty() {
            return Ok(SearchOutcome {
                matches: Vec::new(),
                elapsed_seconds: start.elapsed().as_secs_f64(),
            });
        }

        let mut tasks: JoinSet<Option<(Album, f64)>> = JoinSet::new();
        match self.scoring_mode {
            QbiScoringMode::Model => {
                let model = self
                    .qbi
                    .snapshot()
                    .map_err(|_| RetrievalError::ModelNotReady)?;
                let query_projected = Arc::new(model.project_centered(&query_vector));
                let expected_len = query_vector.len();

                for album in albums {
                    let model = model.clone();
                    let query_projected = query_projected.clone();
                    tasks.spawn(async move {
                        let vector = load_album_vector(&album, expected_len).await?;
                        let candidate_projected = model.project_centered(&vector);
                        let similarity =
                            projected_similarity(&query_projected, &candidate_projected);
                        Some((album, similarity))
                    });
                }
            }
            QbiScoringMode::Pairwise => {
                let query_vector = Arc::new(query_vector);
                let init = self.component_init;
                for album in albums {
                    let query_vector = query_vector.clone();
                    tasks.spawn(async move {
                        let vector = load_album_vector(&album, query_vector.len()).await?;
                        let similarity = pairwise_similarity(&query_vector, &vector, init);
                        Some((album, similarity))
                    });
                }
            }
        }

        let mut scored = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Some((album, similarity))) if similarity > IMAGE_SIMILARITY_THRESHOLD => {
                    scored.push((album, similarity));
                }
                Ok(_) => {}
                Err(err) => warn!("Album scoring task failed: {}", err),
            }
        }

        rank(&mut scored, |album: &Album| album.id);
        scored.truncate(TOP_RESULTS);

        let mut matches = Vec::with_capacity(scored.len());
        for (album, similarity) in scored {
            let songs = self.store.songs_for_album(album.id)?;
            matches.push(AlbumMatch {
                id: album.id,
                name: album.name,
                pic_file_path: album.pic_file_path,
                songs,
                similarity,
            });
        }

        Ok(SearchOutcome {
            matches,
            elapsed_seconds: start.elapsed().as_secs_f64(),
        })
    }

    fn canonicalize_query_image(
        &self,
        query_path: &Path,
        temp_files: &mut Vec<PathBuf>,
    ) -> Result<PathBuf, RetrievalError> {
        let is_png = query_path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("png"))
            .unwrap_or(false);
        if is_png {
            return Ok(query_path.to_path_buf());
        }
        let png_path = image::convert_to_png(query_path)?;
        temp_files.push(png_path.clone());
        Ok(png_path)
    }

    /// Query-by-humming: transcribe the uploaded clip, score its pitch
    /// sequence against every song, and return the ranked matches. The
    /// uploaded file is deleted before returning.
    pub async fn search_by_humming(
        &self,
        filename: &str,
        data: &[u8],
    ) -> Result<SearchOutcome<SongMatch>, RetrievalError> {
        let saved = self.uploads.save_upload(HUMMINGS_DIR, filename, data).await?;
        let query_path = saved
            .into_iter()
            .next()
            .ok_or_else(|| RetrievalError::Validation("file upload is required".to_string()))?;

        let result = self.search_by_humming_inner(&query_path).await;
        cleanup_temp_files(&[query_path]).await;
        result
    }

    async fn search_by_humming_inner(
        &self,
        query_path: &Path,
    ) -> Result<SearchOutcome<SongMatch>, RetrievalError> {
        let extraction =
            extract_pitch_sequence(&self.transcriber, &query_path.to_string_lossy()).await?;

        let query_pitches = match &extraction.pitch_json_path {
            Some(artifact_path) => {
                let bytes = tokio::fs::read(artifact_path)
                    .await
                    .map_err(PitchError::Io)?;
                pitch::parse_pitch_sequence(&bytes)?
            }
            // MIDI passthrough produces no artifact; nothing to score
            None => Vec::new(),
        };

        let songs = self.store.all_songs()?;
        let start = Instant::now();

        let query_pitches = Arc::new(query_pitches);
        let mut tasks: JoinSet<Option<(Song, f64)>> = JoinSet::new();
        for song in songs {
            let query_pitches = query_pitches.clone();
            tasks.spawn(async move {
                if song.midi_json.is_empty() {
                    debug!("Skipping song {}: no pitch-sequence artifact", song.id);
                    return None;
                }
                let bytes = match tokio::fs::read(&song.midi_json).await {
                    Ok(bytes) => bytes,
                    Err(err) => {
                        warn!("Skipping song {}: cannot read pitch artifact: {}", song.id, err);
                        return None;
                    }
                };
                let pitches = match pitch::parse_pitch_sequence(&bytes) {
                    Ok(pitches) => pitches,
                    Err(err) => {
                        warn!("Skipping song {}: invalid pitch artifact: {}", song.id, err);
                        return None;
                    }
                };
                let similarity = melody_similarity(&query_pitches, &pitches);
                Some((song, similarity))
            });
        }

        let mut scored = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Some((song, similarity))) if similarity > HUMMING_SIMILARITY_THRESHOLD => {
                    scored.push((song, similarity));
                }
                Ok(_) => {}
                Err(err) => warn!("Song scoring task failed: {}", err),
            }
        }

        rank(&mut scored, |song: &Song| song.id);
        scored.truncate(TOP_RESULTS);

        let matches = scored
            .into_iter()
            .map(|(song, similarity)| SongMatch { song, similarity })
            .collect();

        Ok(SearchOutcome {
            matches,
            elapsed_seconds: start.elapsed().as_secs_f64(),
        })
    }

    // =========================================================================
    // Deletion & model lifecycle
    // =========================================================================

    /// Delete an album row and every artifact file it names. Missing
    /// files are tolerated; other IO failures abort before the row is
    /// touched. Returns false when the row does not exist.
    pub async fn delete_album(&self, id: i64) -> Result<bool, RetrievalError> {
        let album = match self.store.get_album(id)? {
            Some(album) => album,
            None => return Ok(false),
        };

        remove_row_artifacts(&[&album.pic_file_path, &album.flattened])?;
        self.store.delete_album(id)?;
        info!("Deleted album {} and its artifacts", id);

        self.rebuild_model().await?;
        Ok(true)
    }

    /// Delete a song row and every artifact file it names.
    pub async fn delete_song(&self, id: i64) -> Result<bool, RetrievalError> {
        let song = match self.store.get_song(id)? {
            Some(song) => song,
            None => return Ok(false),
        };

        remove_row_artifacts(&[
            &song.audio_file_path,
            &song.audio_file_path_midi,
            &song.midi_json,
        ])?;
        self.store.delete_song(id)?;
        info!("Deleted song {} and its artifacts", id);
        Ok(true)
    }

    /// Rebuild the query-by-image model from the current catalog. A
    /// no-op in pairwise mode.
    pub async fn rebuild_model(&self) -> Result<(), RetrievalError> {
        if self.scoring_mode == QbiScoringMode::Pairwise {
            return Ok(());
        }

        let store = self.store.clone();
        let qbi = self.qbi.clone();
        tokio::task::spawn_blocking(move || rebuild_model_blocking(&store, &qbi))
            .await
            .map_err(|err| RetrievalError::Storage(anyhow::anyhow!("model rebuild panicked: {}", err)))?
    }
}

/// Synchronous model rebuild, run on a blocking worker.
fn rebuild_model_blocking(
    store: &SqliteCatalogStore,
    qbi: &QbiEngine,
) -> Result<(), RetrievalError> {
    let expected_len = FEATURE_WIDTH * FEATURE_HEIGHT;
    let mut vectors = Vec::new();

    for album in store.all_albums()? {
        if album.flattened.is_empty() {
            continue;
        }
        let bytes = match std::fs::read(&album.flattened) {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!("Album {} excluded from model: {}", album.id, err);
                continue;
            }
        };
        match image::parse_feature_vector(&bytes) {
            Ok(vector) if vector.len() == expected_len => vectors.push(vector),
            Ok(vector) => warn!(
                "Album {} excluded from model: artifact length {} != {}",
                album.id,
                vector.len(),
                expected_len
            ),
            Err(err) => warn!("Album {} excluded from model: {}", album.id, err),
        }
    }

    qbi.rebuild(vectors)
        .map_err(|err| RetrievalError::Storage(anyhow::anyhow!("model build failed: {}", err)))
}

/// Read and validate one album's feature vector; None skips the
/// candidate.
async fn load_album_vector(album: &Album, expected_len: usize) -> Option<Vec<f64>> {
    if album.flattened.is_empty() {
        debug!("Skipping album {}: no feature artifact", album.id);
        return None;
    }
    let bytes = match tokio::fs::read(&album.flattened).await {
        Ok(bytes) => bytes,
        Err(err) => {
            warn!("Skipping album {}: cannot read feature artifact: {}", album.id, err);
            return None;
        }
    };
    match image::parse_feature_vector(&bytes) {
        Ok(vector) if vector.len() == expected_len => Some(vector),
        Ok(vector) => {
            warn!(
                "Skipping album {}: artifact length {} != {}",
                album.id,
                vector.len(),
                expected_len
            );
            None
        }
        Err(err) => {
            warn!("Skipping album {}: invalid feature artifact: {}", album.id, err);
            None
        }
    }
}

/// Sort by similarity descending, ties broken by ascending id so the
/// ranking is stable across runs.
fn rank<T>(scored: &mut [(T, f64)], id_of: impl Fn(&T) -> i64) {
    scored.sort_by(|(a, score_a), (b, score_b)| {
        score_b
            .partial_cmp(score_a)
            .unwrap_or(Ordering::Equal)
            .then_with(|| id_of(a).cmp(&id_of(b)))
    });
}

fn remove_row_artifacts(paths: &[&str]) -> Result<(), RetrievalError> {
    for path in paths {
        if path.is_empty() {
            continue;
        }
        remove_if_exists(Path::new(path))
            .map_err(|err| RetrievalError::Storage(anyhow::anyhow!("failed to delete {}: {}", path, err)))?;
    }
    Ok(())
}

async fn cleanup_temp_files(paths: &[PathBuf]) {
    for path in paths {
        if let Err(err) = tokio::fs::remove_file(path).await {
            if err.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to delete temporary upload {:?}: {}", path, err);
            }
        }
    }
}

fn file_basename(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string_lossy().to_string())
}
