pub mod block_assembler;
pub mod effects;
pub mod renderer;
pub mod wav_format;
