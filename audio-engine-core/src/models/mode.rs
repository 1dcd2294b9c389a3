use std::fmt;
use std::path::PathBuf;

use super::config::AutoSaveOptions;

/// Operating mode of the pipeline. Exactly one is active at any instant.
///
/// ```text
///            ┌──────────► Streaming ──┐
///   Idle ────┼──────────► Recording ──┼──► Idle
///            └──────────► Playing ────┘
/// ```
///
/// Entering any non-idle mode runs the stop sequence of the other two first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PipelineMode {
    #[default]
    Idle,
    Streaming,
    Recording,
    Playing,
}

impl PipelineMode {
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    /// Whether this mode holds the input tap.
    pub fn uses_input_tap(&self) -> bool {
        matches!(self, Self::Streaming | Self::Recording)
    }
}

impl fmt::Display for PipelineMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Streaming => write!(f, "streaming"),
            Self::Recording => write!(f, "recording"),
            Self::Playing => write!(f, "playing"),
        }
    }
}

/// Argument of [`AudioEngine::enter`](crate::AudioEngine::enter).
#[derive(Debug, Clone, PartialEq)]
pub enum ModeRequest {
    Streaming,
    Recording { auto_save: AutoSaveOptions },
    Playing { path: PathBuf },
}

impl ModeRequest {
    /// The mode this request transitions into.
    pub fn mode(&self) -> PipelineMode {
        match self {
            Self::Streaming => PipelineMode::Streaming,
            Self::Recording { .. } => PipelineMode::Recording,
            Self::Playing { .. } => PipelineMode::Playing,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_mode_is_idle() {
        assert!(PipelineMode::default().is_idle());
    }

    #[test]
    fn only_capture_modes_use_the_tap() {
        assert!(PipelineMode::Streaming.uses_input_tap());
        assert!(PipelineMode::Recording.uses_input_tap());
        assert!(!PipelineMode::Playing.uses_input_tap());
        assert!(!PipelineMode::Idle.uses_input_tap());
    }

    #[test]
    fn request_maps_to_mode() {
        let rec = ModeRequest::Recording {
            auto_save: AutoSaveOptions::disabled(),
        };
        assert_eq!(rec.mode(), PipelineMode::Recording);
        assert_eq!(ModeRequest::Streaming.mode(), PipelineMode::Streaming);
        let play = ModeRequest::Playing {
            path: PathBuf::from("a.wav"),
        };
        assert_eq!(play.mode(), PipelineMode::Playing);
    }
}
