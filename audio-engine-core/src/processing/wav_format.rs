//! WAV container utilities.
//!
//! Writes the canonical 44-byte RIFF header used for capture files
//! (32-bit IEEE float, which stores captured samples losslessly) and reads
//! back 16/24-bit PCM or 32-bit float files for playback and recovery.

use std::fs::{self, File};
use std::io::Read;
use std::path::Path;

use crate::models::audio_models::{AudioBuffer, AudioFormat, AudioTime};
use crate::models::error::EngineError;

/// Size of the canonical WAV RIFF header in bytes.
pub const WAV_HEADER_SIZE: usize = 44;

/// Format code for integer PCM.
pub const FORMAT_PCM: u16 = 1;

/// Format code for IEEE float samples.
pub const FORMAT_IEEE_FLOAT: u16 = 3;

/// Bit depth of samples written by capture files.
pub const CAPTURE_BIT_DEPTH: u16 = 32;

/// Bytes read from the front of a file when only the header is needed.
const HEADER_READ_LIMIT: u64 = 64 * 1024;

/// Generate a 44-byte WAV RIFF header.
///
/// Layout:
/// ```text
/// [0-3]    "RIFF"
/// [4-7]    file size - 8 (36 + data_size)
/// [8-11]   "WAVE"
/// [12-15]  "fmt "
/// [16-19]  16 (format chunk size)
/// [20-21]  format code (1 = PCM, 3 = IEEE float)
/// [22-23]  channels
/// [24-27]  sample_rate
/// [28-31]  byte_rate = sample_rate * channels * bit_depth / 8
/// [32-33]  block_align = channels * bit_depth / 8
/// [34-35]  bit_depth
/// [36-39]  "data"
/// [40-43]  data_size
/// ```
pub fn generate_wav_header(
    format_code: u16,
    sample_rate: u32,
    bit_depth: u16,
    channels: u16,
    data_size: u32,
) -> [u8; WAV_HEADER_SIZE] {
    let byte_rate = sample_rate * channels as u32 * bit_depth as u32 / 8;
    let block_align = channels * bit_depth / 8;
    let chunk_size = 36u32.saturating_add(data_size);

    let mut header = [0u8; WAV_HEADER_SIZE];

    header[0..4].copy_from_slice(b"RIFF");
    header[4..8].copy_from_slice(&chunk_size.to_le_bytes());
    header[8..12].copy_from_slice(b"WAVE");

    header[12..16].copy_from_slice(b"fmt ");
    header[16..20].copy_from_slice(&16u32.to_le_bytes());
    header[20..22].copy_from_slice(&format_code.to_le_bytes());
    header[22..24].copy_from_slice(&channels.to_le_bytes());
    header[24..28].copy_from_slice(&sample_rate.to_le_bytes());
    header[28..32].copy_from_slice(&byte_rate.to_le_bytes());
    header[32..34].copy_from_slice(&block_align.to_le_bytes());
    header[34..36].copy_from_slice(&bit_depth.to_le_bytes());

    header[36..40].copy_from_slice(b"data");
    header[40..44].copy_from_slice(&data_size.to_le_bytes());

    header
}

/// Header for a capture file in `format`.
pub fn capture_header(format: AudioFormat, data_size: u32) -> [u8; WAV_HEADER_SIZE] {
    generate_wav_header(
        FORMAT_IEEE_FLOAT,
        format.sample_rate,
        CAPTURE_BIT_DEPTH,
        format.channels,
        data_size,
    )
}

/// Encode `f32` samples as little-endian IEEE float bytes.
pub fn encode_f32(samples: &[f32]) -> Vec<u8> {
    let mut data = Vec::with_capacity(samples.len() * 4);
    for &sample in samples {
        data.extend_from_slice(&sample.to_le_bytes());
    }
    data
}

/// Parsed layout of a WAV file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavSpec {
    pub format_code: u16,
    pub sample_rate: u32,
    pub channels: u16,
    pub bit_depth: u16,
    pub data_offset: usize,
    pub data_len: usize,
}

impl WavSpec {
    pub fn format(&self) -> AudioFormat {
        AudioFormat::new(self.sample_rate, self.channels)
    }

    pub fn frame_count(&self) -> usize {
        let block_align = self.channels as usize * self.bit_depth as usize / 8;
        if block_align == 0 {
            return 0;
        }
        self.data_len / block_align
    }

    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frame_count() as f64 / self.sample_rate as f64
    }
}

/// Walk the RIFF chunks of `bytes` and locate the format and data chunks.
///
/// A data size of zero or one running past the end of the file is treated
/// as "until end of file", which is what an unfinalized capture looks like.
pub fn parse_wav(bytes: &[u8]) -> Result<WavSpec, String> {
    parse_wav_prefix(bytes, bytes.len())
}

/// Parse a WAV header from the first bytes of a file of `file_len` bytes.
fn parse_wav_prefix(bytes: &[u8], file_len: usize) -> Result<WavSpec, String> {
    if bytes.len() < 12 || &bytes[0..4] != b"RIFF" || &bytes[8..12] != b"WAVE" {
        return Err("not a RIFF/WAVE file".into());
    }

    let mut fmt: Option<(u16, u16, u32, u16)> = None;
    let mut offset = 12;
    while offset + 8 <= bytes.len() {
        let id = &bytes[offset..offset + 4];
        let size = read_u32(bytes, offset + 4) as usize;
        let body = offset + 8;

        if id == b"fmt " {
            if size < 16 || body + 16 > bytes.len() {
                return Err("truncated fmt chunk".into());
            }
            let format_code = read_u16(bytes, body);
            let channels = read_u16(bytes, body + 2);
            let sample_rate = read_u32(bytes, body + 4);
            let bit_depth = read_u16(bytes, body + 14);
            if sample_rate == 0 {
                return Err("zero sample rate".into());
            }
            fmt = Some((format_code, channels, sample_rate, bit_depth));
        } else if id == b"data" {
            let (format_code, channels, sample_rate, bit_depth) =
                fmt.ok_or_else(|| "data chunk before fmt chunk".to_string())?;
            let available = file_len.saturating_sub(body);
            let data_len = if size == 0 || size > available { available } else { size };
            return Ok(WavSpec {
                format_code,
                sample_rate,
                channels,
                bit_depth,
                data_offset: body,
                data_len,
            });
        }

        // Chunks are padded to even sizes.
        offset = body.saturating_add(size + (size & 1));
    }

    Err("missing data chunk".into())
}

/// Decode the data chunk described by `spec` into interleaved `f32`.
pub fn decode_samples(spec: &WavSpec, bytes: &[u8]) -> Result<Vec<f32>, String> {
    if spec.channels == 0 {
        return Err("zero channels".into());
    }
    let data = &bytes[spec.data_offset..spec.data_offset + spec.data_len];
    match (spec.format_code, spec.bit_depth) {
        (FORMAT_IEEE_FLOAT, 32) => Ok(data
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect()),
        (FORMAT_PCM, 16) => Ok(data
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]) as f32 / 32768.0)
            .collect()),
        (FORMAT_PCM, 24) => Ok(data
            .chunks_exact(3)
            .map(|b| {
                let value = i32::from_le_bytes([0, b[0], b[1], b[2]]) >> 8;
                value as f32 / 8_388_608.0
            })
            .collect()),
        (code, depth) => Err(format!("unsupported sample format: code {} at {} bits", code, depth)),
    }
}

/// Read and decode a WAV file.
pub fn read_wav_file(path: &Path) -> Result<AudioBuffer, EngineError> {
    let bytes = fs::read(path)
        .map_err(|e| EngineError::FileOpenFailed(format!("{}: {}", path.display(), e)))?;
    let spec = parse_wav(&bytes)
        .map_err(|e| EngineError::FileOpenFailed(format!("{}: {}", path.display(), e)))?;
    let samples = decode_samples(&spec, &bytes)
        .map_err(|e| EngineError::FileOpenFailed(format!("{}: {}", path.display(), e)))?;
    Ok(AudioBuffer::new(
        samples,
        spec.format(),
        AudioTime::new(0, spec.sample_rate),
    ))
}

/// Read only the header of a WAV file.
///
/// The format and data chunks must start within the first 64 KiB.
pub fn read_wav_spec(path: &Path) -> Result<WavSpec, EngineError> {
    let open_failed = |e: String| EngineError::FileOpenFailed(format!("{}: {}", path.display(), e));

    let file = File::open(path).map_err(|e| open_failed(e.to_string()))?;
    let file_len = file.metadata().map_err(|e| open_failed(e.to_string()))?.len() as usize;
    let mut head = Vec::new();
    file.take(HEADER_READ_LIMIT)
        .read_to_end(&mut head)
        .map_err(|e| open_failed(e.to_string()))?;

    parse_wav_prefix(&head, file_len).map_err(open_failed)
}

fn read_u16(bytes: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([bytes[at], bytes[at + 1]])
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}
