use std::fs::{self, File};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::models::audio_models::{AudioBuffer, AudioFormat};
use crate::models::error::EngineError;
use crate::processing::wav_format;

/// The temporary WAV file receiving audio while recording.
///
/// Shared between the tap callback (appends) and the auto-save task
/// (header sync before each snapshot); protect with a `Mutex`.
///
/// ## File Format
///
/// ```text
/// [44-byte WAV header, 32-bit float]
/// [interleaved f32 LE samples...]
/// ```
///
/// The header's size fields hold zero until the first [`sync_header`] and
/// are final after [`finalize`], after which the file is immutable.
///
/// [`sync_header`]: CaptureFile::sync_header
/// [`finalize`]: CaptureFile::finalize
pub struct CaptureFile {
    file_path: PathBuf,
    format: AudioFormat,
    file: Option<File>,
    total_bytes_written: u64,
}

impl CaptureFile {
    /// Create (or truncate) the file and write the initial header.
    pub fn create(file_path: PathBuf, format: AudioFormat) -> Result<Self, EngineError> {
        if format.channels == 0 || format.sample_rate == 0 {
            return Err(EngineError::FileCreateFailed(format!(
                "unusable capture format: {} Hz, {} channels",
                format.sample_rate, format.channels
            )));
        }

        if let Some(parent) = file_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| EngineError::FileCreateFailed(format!("failed to create directory: {}", e)))?;
        }

        let file = File::create(&file_path)
            .map_err(|e| EngineError::FileCreateFailed(format!("{}: {}", file_path.display(), e)))?;

        let mut capture = Self {
            file_path,
            format,
            file: Some(file),
            total_bytes_written: 0,
        };
        let header = wav_format::capture_header(format, 0);
        capture
            .write_raw(&header)
            .map_err(|e| EngineError::FileCreateFailed(e.to_string()))?;
        Ok(capture)
    }

    /// Append one tapped buffer.
    pub fn append(&mut self, buffer: &AudioBuffer) -> Result<(), EngineError> {
        if buffer.format.channels != self.format.channels {
            return Err(EngineError::Storage(format!(
                "buffer has {} channels, capture file has {}",
                buffer.format.channels, self.format.channels
            )));
        }
        let data = wav_format::encode_f32(&buffer.samples);
        self.write_raw(&data)
    }

    /// Patch the header size fields to cover everything written so far,
    /// leaving the write position at the end of the file.
    pub fn sync_header(&mut self) -> Result<(), EngineError> {
        let data_size = self.data_bytes();
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| EngineError::Storage("capture file is closed".into()))?;

        let riff_size = (self.total_bytes_written.saturating_sub(8)).min(u32::MAX as u64) as u32;
        let data_size = data_size.min(u32::MAX as u64) as u32;

        file.seek(SeekFrom::Start(4))
            .map_err(|e| EngineError::Storage(e.to_string()))?;
        file.write_all(&riff_size.to_le_bytes())
            .map_err(|e| EngineError::Storage(e.to_string()))?;
        file.seek(SeekFrom::Start(40))
            .map_err(|e| EngineError::Storage(e.to_string()))?;
        file.write_all(&data_size.to_le_bytes())
            .map_err(|e| EngineError::Storage(e.to_string()))?;
        file.seek(SeekFrom::End(0))
            .map_err(|e| EngineError::Storage(e.to_string()))?;
        file.flush().map_err(|e| EngineError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Write the final header and close the file.
    pub fn finalize(&mut self) -> Result<(), EngineError> {
        if self.file.is_none() {
            return Ok(());
        }
        let result = self.sync_header();
        self.file = None;
        result
    }

    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    /// Total bytes written so far (including the WAV header).
    pub fn bytes_written(&self) -> u64 {
        self.total_bytes_written
    }

    pub fn frames_written(&self) -> u64 {
        let frame_bytes = self.format.channels as u64 * (wav_format::CAPTURE_BIT_DEPTH as u64 / 8);
        self.data_bytes() / frame_bytes
    }

    pub fn duration_secs(&self) -> f64 {
        self.frames_written() as f64 / self.format.sample_rate as f64
    }

    fn data_bytes(&self) -> u64 {
        self.total_bytes_written
            .saturating_sub(wav_format::WAV_HEADER_SIZE as u64)
    }

    fn write_raw(&mut self, data: &[u8]) -> Result<(), EngineError> {
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| EngineError::Storage("capture file is closed".into()))?;
        file.write_all(data)
            .map_err(|e| EngineError::Storage(format!("write failed: {}", e)))?;
        self.total_bytes_written += data.len() as u64;
        Ok(())
    }
}

impl Drop for CaptureFile {
    fn drop(&mut self) {
        if let Err(e) = self.finalize() {
            log::warn!("Failed to finalize capture file {}: {}", self.file_path.display(), e);
        }
    }
}
