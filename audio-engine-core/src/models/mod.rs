pub mod audio_models;
pub mod config;
pub mod error;
pub mod mode;
pub mod recording_result;
