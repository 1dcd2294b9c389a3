use std::sync::Arc;

use crate::models::audio_models::{AudioBuffer, AudioFormat};
use crate::models::config::SessionOptions;
use crate::models::error::EngineError;
use crate::processing::effects::GraphNode;

/// Callback invoked once per tapped input buffer.
///
/// Runs on the realtime audio thread; implementations must not block.
pub type TapCallback = Arc<dyn Fn(&AudioBuffer) + Send + Sync + 'static>;

/// The single shared hardware audio engine.
///
/// Models an input node that can carry one tap, a player node feeding a
/// graph of effect nodes into the main mixer, and the engine's own
/// prepare/start/stop/reset lifecycle. Implemented by:
/// - `MockHardware` (this crate, for tests and CI)
/// - `CpalHardware` (audio-engine-cpal)
///
/// Start/stop calls are synchronous: they complete or fail immediately.
pub trait AudioHardware: Send {
    /// Negotiate a play-and-record session, selecting input/output devices.
    fn configure_session(&mut self, options: &SessionOptions) -> Result<(), EngineError>;

    /// Native format of the input node.
    fn input_format(&self) -> Result<AudioFormat, EngineError>;

    /// Install the single input tap. Buffers are delivered in blocks of
    /// `block_size` frames.
    fn install_tap(
        &mut self,
        block_size: usize,
        format: AudioFormat,
        callback: TapCallback,
    ) -> Result<(), EngineError>;

    /// Remove the input tap. No-op when none is installed.
    fn remove_tap(&mut self);

    fn attach(&mut self, node: GraphNode);

    fn detach(&mut self, node: GraphNode);

    fn connect(&mut self, from: GraphNode, to: GraphNode);

    /// Write the scalar parameter of an effect node.
    fn set_parameter(&mut self, node: GraphNode, value: f32);

    /// Queue `buffer` on the player node starting at `at_frame`.
    fn schedule_buffer(&mut self, buffer: Arc<AudioBuffer>, at_frame: u64) -> Result<(), EngineError>;

    fn play(&mut self);

    fn pause(&mut self);

    fn stop_player(&mut self);

    /// Preallocate resources ahead of `start`.
    fn prepare(&mut self);

    fn start(&mut self) -> Result<(), EngineError>;

    fn stop(&mut self);

    /// Drop any scheduled or buffered audio.
    fn reset(&mut self);

    fn is_running(&self) -> bool;
}
