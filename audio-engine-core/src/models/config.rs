use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::error::EngineError;

/// Hardware session negotiation preferences.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionOptions {
    /// Prefer the built-in microphone over external inputs when present.
    pub prefer_builtin_mic: bool,

    /// Specific input device name, or None for the preferred/default input.
    pub input_device: Option<String>,

    /// Specific output device name, or None for the system default.
    pub output_device: Option<String>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            prefer_builtin_mic: true,
            input_device: None,
            output_device: None,
        }
    }
}

/// Auto-save request attached to a recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoSaveOptions {
    pub enabled: bool,
    pub interval_secs: u32,
}

impl AutoSaveOptions {
    pub fn every(interval_secs: u32) -> Self {
        Self {
            enabled: true,
            interval_secs,
        }
    }

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            interval_secs: DEFAULT_AUTO_SAVE_INTERVAL_SECS,
        }
    }
}

impl Default for AutoSaveOptions {
    fn default() -> Self {
        Self::disabled()
    }
}

/// Default auto-save interval in seconds.
pub const DEFAULT_AUTO_SAVE_INTERVAL_SECS: u32 = 10;

/// Engine configuration.
///
/// Directories default to the platform cache and documents locations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Directory holding the temporary capture file and auto-save snapshot.
    pub cache_directory: PathBuf,

    /// Directory holding caller-named saved recordings.
    pub documents_directory: PathBuf,

    /// File name of the in-progress capture file (default: "temp.wav").
    pub temp_file_name: String,

    /// File name of the auto-save snapshot (default: "autosave.wav").
    pub auto_save_file_name: String,

    /// Extension appended to saved recording names (default: "wav").
    pub file_extension: String,

    /// Frames per tap buffer (default: 4096).
    pub tap_block_size: usize,

    /// Volume change applied by volume up/down (default: 0.1).
    pub volume_step: f32,

    /// Auto-save interval used by `start_recording` when none is given.
    pub auto_save_interval_secs: u32,

    pub session: SessionOptions,
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.tap_block_size == 0 {
            return Err("tap block size must be positive".into());
        }
        if !self.volume_step.is_finite() || self.volume_step <= 0.0 || self.volume_step > 1.0 {
            return Err(format!("volume step out of range: {}", self.volume_step));
        }
        if self.auto_save_interval_secs == 0 {
            return Err("auto-save interval must be at least one second".into());
        }
        if self.temp_file_name.is_empty() || self.auto_save_file_name.is_empty() {
            return Err("capture file names must not be empty".into());
        }
        if self.temp_file_name == self.auto_save_file_name {
            return Err("temp and auto-save files must differ".into());
        }
        if self.file_extension.is_empty() {
            return Err("file extension must not be empty".into());
        }
        Ok(())
    }

    /// Load a configuration from a JSON file. Missing fields take defaults.
    pub fn load(path: &Path) -> Result<Self, EngineError> {
        let json = fs::read_to_string(path).map_err(|e| {
            EngineError::InvalidConfiguration(format!("failed to read {}: {}", path.display(), e))
        })?;
        let config: EngineConfig = serde_json::from_str(&json)
            .map_err(|e| EngineError::InvalidConfiguration(format!("failed to parse config: {}", e)))?;
        config.validate().map_err(EngineError::InvalidConfiguration)?;
        Ok(config)
    }

    /// Configuration rooted in a single directory, used by tests and
    /// sandboxed hosts.
    pub fn in_directory(root: &Path) -> Self {
        Self {
            cache_directory: root.join("cache"),
            documents_directory: root.join("documents"),
            ..Self::default()
        }
    }

    pub fn temp_file_path(&self) -> PathBuf {
        self.cache_directory.join(&self.temp_file_name)
    }

    pub fn auto_save_path(&self) -> PathBuf {
        self.cache_directory.join(&self.auto_save_file_name)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        let cache = dirs::cache_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("audio-engine");
        let documents = dirs::document_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."));
        Self {
            cache_directory: cache,
            documents_directory: documents,
            temp_file_name: "temp.wav".into(),
            auto_save_file_name: "autosave.wav".into(),
            file_extension: "wav".into(),
            tap_block_size: 4096,
            volume_step: 0.1,
            auto_save_interval_secs: DEFAULT_AUTO_SAVE_INTERVAL_SECS,
            session: SessionOptions::default(),
        }
    }
}
