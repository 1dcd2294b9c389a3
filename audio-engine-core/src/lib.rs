//! # audio-engine-core
//!
//! Platform-agnostic exclusive-mode audio engine.
//!
//! One hardware engine is shared by three mutually exclusive activities:
//! live microphone streaming, recording to a file with periodic auto-save,
//! and playback through a volume/pitch/speed/distortion effects chain.
//! Platform backends (cpal on desktop) implement the `AudioHardware` trait
//! and plug into the generic `AudioEngine`.
//!
//! ## Architecture
//!
//! ```text
//! audio-engine-core (this crate)
//! ├── traits/       ← AudioHardware, EngineDelegate
//! ├── models/       ← EngineError, PipelineMode, ModeRequest, EngineConfig, AudioBuffer, etc.
//! ├── processing/   ← EffectsChain, PlaybackRenderer, BlockAssembler, WAV I/O
//! ├── session/      ← AudioEngine (mode controller), GraphManager, CaptureTap, AutoSaveTask
//! ├── storage/      ← CaptureFile, FileStore, metadata sidecars
//! └── hardware/     ← MockHardware for tests and CI
//! ```

pub mod hardware;
pub mod models;
pub mod processing;
pub mod session;
pub mod storage;
pub mod traits;

// Re-export key types at crate root for convenience.
pub use hardware::mock::{MockHandle, MockHardware, MockSnapshot};
pub use models::audio_models::{AudioBuffer, AudioFormat, AudioTime, EngineDiagnostics};
pub use models::config::{AutoSaveOptions, EngineConfig, SessionOptions};
pub use models::error::EngineError;
pub use models::mode::{ModeRequest, PipelineMode};
pub use models::recording_result::{RecordingMetadata, RecordingResult};
pub use processing::block_assembler::BlockAssembler;
pub use processing::effects::{EffectsChain, GraphNode};
pub use processing::renderer::{PlaybackRenderer, RenderParams};
pub use session::auto_save::AutoSaveTask;
pub use session::capture_tap::{CaptureTap, TapRole};
pub use session::engine::AudioEngine;
pub use session::graph::GraphManager;
pub use storage::capture_file::CaptureFile;
pub use storage::file_store::FileStore;
pub use traits::audio_hardware::{AudioHardware, TapCallback};
pub use traits::engine_delegate::EngineDelegate;
