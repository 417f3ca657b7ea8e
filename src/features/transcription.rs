//! HTTP client for the external audio-to-MIDI transcription service.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Errors from the transcription round trip.
#[derive(Debug, Error)]
pub enum TranscriptionError {
    #[error("failed to reach transcription service: {0}")]
    Request(reqwest::Error),

    #[error("transcription service returned status {0}")]
    Status(u16),

    #[error("failed to parse transcription response: {0}")]
    Parse(reqwest::Error),
}

#[derive(Serialize)]
struct ConvertRequest<'a> {
    file_path: &'a str,
}

#[derive(Deserialize)]
struct ConvertResponse {
    full_path: String,
}

/// Client for the `convert-to-midi` endpoint.
pub struct TranscriptionClient {
    client: reqwest::Client,
    base_url: String,
}

impl TranscriptionClient {
    /// Create a new transcription client.
    ///
    /// # Arguments
    /// * `base_url` - Base URL of the service (e.g., "http://127.0.0.1:8000")
    /// * `timeout_sec` - Request timeout in seconds
    pub fn new(base_url: String, timeout_sec: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_sec))
            .build()
            .expect("Failed to create HTTP client");

        let base_url = base_url.trim_end_matches('/').to_string();

        Self { client, base_url }
    }

    /// Transcribe the audio file at `file_path`, returning the path of
    /// the produced pitch-sequence artifact.
    pub async fn convert_to_midi(&self, file_path: &str) -> Result<String, TranscriptionError> {
        let url = format!("{}/convert-to-midi/", self.base_url);
        debug!("Requesting transcription of {}", file_path);

        let response = self
            .client
            .post(&url)
            .json(&ConvertRequest { file_path })
            .send()
            .await
            .map_err(TranscriptionError::Request)?;

        if !response.status().is_success() {
            return Err(TranscriptionError::Status(response.status().as_u16()));
        }

        let parsed: ConvertResponse = response
            .json()
            .await
            .map_err(TranscriptionError::Parse)?;

        debug!("Transcription produced {}", parsed.full_path);
        Ok(parsed.full_path)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = TranscriptionClient::new("http://127.0.0.1:8000".to_string(), 30);
        assert_eq!(client.base_url(), "http://127.0.0.1:8000");
    }

    #[test]
    fn test_trailing_slash_removal() {
        let client = TranscriptionClient::new("http://127.0.0.1:8000/".to_string(), 30);
        assert_eq!(client.base_url(), "http://127.0.0.1:8000");
    }
}
