//! # audio-engine-cpal
//!
//! Desktop hardware backend for audio-engine-core, built on cpal.
//!
//! Provides:
//! - `CpalHardware` — `AudioHardware` implementation: input stream tap plus
//!   an output stream rendering the player node through the effects chain
//! - `DeviceEnumerator` — input/output device listing and selection,
//!   preferring a built-in microphone
//!
//! ## Usage
//! ```no_run
//! use audio_engine_core::{AudioEngine, EngineConfig};
//! use audio_engine_cpal::CpalHardware;
//!
//! let engine = AudioEngine::new(CpalHardware::new(), EngineConfig::default()).unwrap();
//! engine.start_recording(true);
//! ```

pub mod cpal_hardware;
pub mod device_enumerator;

pub use cpal_hardware::{CpalHardware, EffectParams};
pub use device_enumerator::{DeviceEnumerator, DeviceInfo};
