use thiserror::Error;

/// Errors surfaced by the audio engine.
///
/// Payloads are plain strings so errors can be cloned into delegate events
/// and compared in tests.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("audio hardware unavailable: {0}")]
    HardwareUnavailable(String),

    #[error("audio engine failed to start: {0}")]
    EngineStartFailed(String),

    #[error("no recording in progress or completed")]
    TempFileMissing,

    #[error("source file missing: {0}")]
    SourceMissing(String),

    #[error("failed to open audio file: {0}")]
    FileOpenFailed(String),

    #[error("failed to create audio file: {0}")]
    FileCreateFailed(String),

    #[error("copy failed: {0}")]
    CopyFailed(String),

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl EngineError {
    /// Whether the failure came from device or session negotiation rather
    /// than file I/O.
    pub fn is_hardware(&self) -> bool {
        matches!(self, Self::HardwareUnavailable(_) | Self::EngineStartFailed(_))
    }
}
