pub mod audio_hardware;
pub mod engine_delegate;
