use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Sample rate and channel layout of a block of interleaved `f32` samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioFormat {
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
        }
    }

    /// Number of interleaved samples in `frames` frames.
    pub fn samples_for_frames(&self, frames: usize) -> usize {
        frames * self.channels as usize
    }
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            channels: 1,
        }
    }
}

/// Presentation timestamp of a buffer, counted in frames since the tap started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AudioTime {
    pub sample_time: u64,
    pub sample_rate: u32,
}

impl AudioTime {
    pub fn new(sample_time: u64, sample_rate: u32) -> Self {
        Self {
            sample_time,
            sample_rate,
        }
    }

    pub fn as_duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.sample_time as f64 / self.sample_rate as f64)
    }
}

/// A block of interleaved PCM samples with its format and timestamp.
///
/// Delivered by the input tap and owned only for the duration of the
/// consumer call; also the decoded form of a WAV file.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    pub samples: Vec<f32>,
    pub format: AudioFormat,
    pub time: AudioTime,
}

impl AudioBuffer {
    pub fn new(samples: Vec<f32>, format: AudioFormat, time: AudioTime) -> Self {
        Self {
            samples,
            format,
            time,
        }
    }

    pub fn silence(format: AudioFormat, frames: usize) -> Self {
        Self {
            samples: vec![0.0; format.samples_for_frames(frames)],
            format,
            time: AudioTime::new(0, format.sample_rate),
        }
    }

    pub fn frame_count(&self) -> usize {
        match self.format.channels {
            0 => 0,
            ch => self.samples.len() / ch as usize,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration(&self) -> Duration {
        if self.format.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frame_count() as f64 / self.format.sample_rate as f64)
    }
}

/// Counters for debugging capture and auto-save behavior.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineDiagnostics {
    pub buffers_delivered: u64,
    pub buffers_dropped: u64,
    pub frames_captured: u64,
    pub auto_save_snapshots: u64,
    pub auto_save_failures: u64,
}
