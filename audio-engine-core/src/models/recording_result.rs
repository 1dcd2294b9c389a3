use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::audio_models::AudioFormat;

/// Result returned when a recording is saved to a named file.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingResult {
    pub file_path: PathBuf,
    pub duration_secs: f64,
    pub metadata: RecordingMetadata,
    pub checksum: String,
}

/// Metadata written as a JSON sidecar next to a saved recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingMetadata {
    pub id: String,
    pub name: String,
    pub duration_secs: f64,
    pub file_path: String,
    pub checksum: String,
    pub created_at: String,
    pub sample_rate: u32,
    pub channels: u16,
}

impl RecordingMetadata {
    pub fn new(
        name: &str,
        duration_secs: f64,
        file_path: &str,
        checksum: &str,
        format: AudioFormat,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            duration_secs,
            file_path: file_path.to_string(),
            checksum: checksum.to_string(),
            created_at: chrono::Utc::now().to_rfc3339(),
            sample_rate: format.sample_rate,
            channels: format.channels,
        }
    }
}
