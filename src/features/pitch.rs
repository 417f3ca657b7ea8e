//! Pitch-sequence feature artifacts
//!
//! A song's melodic feature is a JSON document `{"data": "60 62 64"}`
//! holding space-separated MIDI note numbers. An empty data string is a
//! valid artifact for a song with no extractable melody; such songs are
//! unscoreable.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PitchError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid pitch artifact: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid pitch value: {0}")]
    Parse(String),

    #[error("pitch {0} outside MIDI range [0, 127]")]
    OutOfRange(i64),
}

#[derive(Serialize, Deserialize)]
struct PitchDocument {
    data: String,
}

/// Parse a pitch-sequence artifact from its raw bytes.
pub fn parse_pitch_sequence(bytes: &[u8]) -> Result<Vec<u8>, PitchError> {
    let document: PitchDocument = serde_json::from_slice(bytes)?;
    let mut pitches = Vec::new();
    for token in document.data.split_whitespace() {
        let value: i64 = token
            .parse()
            .map_err(|_| PitchError::Parse(token.to_string()))?;
        if !(0..=127).contains(&value) {
            return Err(PitchError::OutOfRange(value));
        }
        pitches.push(value as u8);
    }
    Ok(pitches)
}

/// Load a pitch sequence from an artifact file.
pub fn load_pitch_sequence(path: &Path) -> Result<Vec<u8>, PitchError> {
    let bytes = std::fs::read(path)?;
    parse_pitch_sequence(&bytes)
}

/// Write a pitch sequence as an artifact file.
pub fn save_pitch_sequence(path: &Path, pitches: &[u8]) -> Result<(), PitchError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let data = pitches
        .iter()
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join(" ");
    let document = PitchDocument { data };
    std::fs::write(path, serde_json::to_vec(&document)?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sequence() {
        let pitches = parse_pitch_sequence(br#"{"data": "60 62 64 65"}"#).unwrap();
        assert_eq!(pitches, vec![60, 62, 64, 65]);
    }

    #[test]
    fn test_parse_empty_sequence() {
        let pitches = parse_pitch_sequence(br#"{"data": ""}"#).unwrap();
        assert!(pitches.is_empty());
    }

    #[test]
    fn test_parse_rejects_out_of_range() {
        assert!(matches!(
            parse_pitch_sequence(br#"{"data": "60 200"}"#),
            Err(PitchError::OutOfRange(200))
        ));
        assert!(matches!(
            parse_pitch_sequence(br#"{"data": "-1"}"#),
            Err(PitchError::OutOfRange(-1))
        ));
    }

    #[test]
    fn test_parse_rejects_garbage_token() {
        assert!(matches!(
            parse_pitch_sequence(br#"{"data": "60 sixty"}"#),
            Err(PitchError::Parse(_))
        ));
    }

    #[test]
    fn test_parse_rejects_malformed_json() {
        assert!(matches!(
            parse_pitch_sequence(b"[60, 62]"),
            Err(PitchError::Json(_))
        ));
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("song_data.json");
        save_pitch_sequence(&path, &[0, 64, 127]).unwrap();
        assert_eq!(load_pitch_sequence(&path).unwrap(), vec![0, 64, 127]);
    }
}
