//! Catalog row models.
//!
//! Wire field names keep the legacy PascalCase shape the frontend
//! consumes.

use serde::Serialize;

/// An album-cover catalog row.
#[derive(Clone, Debug, Serialize)]
pub struct Album {
    #[serde(rename = "ID")]
    pub id: i64,
    #[serde(rename = "Name")]
    pub name: String,
    /// Canonical PNG rendering of the cover.
    #[serde(rename = "PicFilePath")]
    pub pic_file_path: String,
    /// Flattened 120x120 intensity-vector artifact; empty when the
    /// feature has not been derived.
    #[serde(rename = "Flattened")]
    pub flattened: String,
}

/// A song catalog row.
#[derive(Clone, Debug, Serialize)]
pub struct Song {
    #[serde(rename = "ID")]
    pub id: i64,
    #[serde(rename = "Name")]
    pub name: String,
    /// Original uploaded audio file.
    #[serde(rename = "AudioFilePath")]
    pub audio_file_path: String,
    /// Canonical transcription output.
    #[serde(rename = "AudioFilePathMidi")]
    pub audio_file_path_midi: String,
    /// Pitch-sequence artifact; empty for songs with no extractable
    /// melody (MIDI passthrough uploads).
    #[serde(rename = "MidiJSON")]
    pub midi_json: String,
    /// Weak reference: deleting the album leaves the song in place.
    #[serde(rename = "AlbumID")]
    pub album_id: Option<i64>,
}

/// An album with its songs resolved.
#[derive(Clone, Debug, Serialize)]
pub struct AlbumWithSongs {
    #[serde(flatten)]
    pub album: Album,
    #[serde(rename = "Songs")]
    pub songs: Vec<Song>,
}

/// One page of catalog rows.
#[derive(Clone, Debug, Serialize)]
pub struct Page<T> {
    #[serde(rename = "totalItems")]
    pub total_items: i64,
    pub page: i64,
    #[serde(rename = "pageSize")]
    pub page_size: i64,
    pub data: Vec<T>,
}
