//! Audio feature extraction
//!
//! Delegates uploaded audio to the transcription service to obtain the
//! pitch-sequence artifact. Files that are already MIDI pass through
//! untouched: the artifact is its own MIDI form and no pitch JSON
//! exists, leaving the song unscoreable until re-ingested.

use std::path::Path;

use super::transcription::{TranscriptionClient, TranscriptionError};

/// Result of extracting melodic features from an uploaded audio file.
#[derive(Clone, Debug)]
pub struct PitchExtraction {
    /// Path of the MIDI-family artifact.
    pub midi_path: String,
    /// Path of the pitch-sequence JSON artifact, when one was produced.
    pub pitch_json_path: Option<String>,
}

/// Extract the pitch-sequence artifact for an uploaded audio file.
///
/// `.mid` uploads are returned as-is with no pitch JSON. Everything else
/// goes through the transcription service, whose output path serves as
/// both the MIDI artifact and the pitch-sequence artifact.
pub async fn extract_pitch_sequence(
    client: &TranscriptionClient,
    audio_path: &str,
) -> Result<PitchExtraction, TranscriptionError> {
    let extension = Path::new(audio_path)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase());

    if extension.as_deref() == Some("mid") {
        tracing::info!("File is already MIDI, skipping transcription: {}", audio_path);
        return Ok(PitchExtraction {
            midi_path: audio_path.to_string(),
            pitch_json_path: None,
        });
    }

    let full_path = client.convert_to_midi(audio_path).await?;
    Ok(PitchExtraction {
        midi_path: full_path.clone(),
        pitch_json_path: Some(full_path),
    })
}
