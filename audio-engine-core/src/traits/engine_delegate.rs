use crate::models::audio_models::{AudioBuffer, AudioTime};
use crate::models::error::EngineError;
use crate::models::mode::PipelineMode;

/// Observer for engine events.
///
/// `on_mode_changed` and `on_error` are called from the thread that issued
/// the transition, after the engine has released its internal lock.
/// `on_buffer_delivered` is called on the realtime audio thread while
/// streaming and must not block.
pub trait EngineDelegate: Send + Sync {
    /// Called when the active mode changes.
    fn on_mode_changed(&self, mode: PipelineMode);

    /// Called when a transition or background task fails.
    fn on_error(&self, error: &EngineError);

    /// Called once per captured buffer while streaming.
    fn on_buffer_delivered(&self, buffer: &AudioBuffer, time: AudioTime);
}
