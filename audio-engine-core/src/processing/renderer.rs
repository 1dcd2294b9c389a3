use std::sync::Arc;

use crate::models::audio_models::{AudioBuffer, AudioFormat};
use crate::processing::effects;

/// Per-block parameter snapshot read from the effect nodes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderParams {
    pub volume: f32,
    pub rate_factor: f64,
    pub distortion_mix: f32,
}

impl Default for RenderParams {
    fn default() -> Self {
        Self {
            volume: 1.0,
            rate_factor: 1.0,
            distortion_mix: 0.0,
        }
    }
}

/// Pure-math playback renderer for the player node and effects chain.
///
/// Reads a scheduled [`AudioBuffer`] with linear interpolation at a variable
/// rate (source rate / output rate, scaled by the pitch and speed stages),
/// then applies volume and distortion. Channel counts are mapped by
/// wrapping source channels across the output channels.
#[derive(Debug)]
pub struct PlaybackRenderer {
    output: AudioFormat,
    source: Option<Arc<AudioBuffer>>,
    position: f64,
    playing: bool,
}

impl PlaybackRenderer {
    pub fn new(output: AudioFormat) -> Self {
        Self {
            output,
            source: None,
            position: 0.0,
            playing: false,
        }
    }

    pub fn output_format(&self) -> AudioFormat {
        self.output
    }

    /// Queue `source` starting at `start_frame`. Does not start playback.
    pub fn schedule(&mut self, source: Arc<AudioBuffer>, start_frame: u64) {
        self.position = start_frame as f64;
        self.source = Some(source);
    }

    pub fn play(&mut self) {
        self.playing = true;
    }

    pub fn pause(&mut self) {
        self.playing = false;
    }

    /// Stop and forget the scheduled source.
    pub fn stop(&mut self) {
        self.playing = false;
        self.source = None;
        self.position = 0.0;
    }

    pub fn is_playing(&self) -> bool {
        self.playing && !self.is_finished()
    }

    /// Whether the scheduled source has been fully consumed.
    pub fn is_finished(&self) -> bool {
        match &self.source {
            Some(source) => self.position >= source.frame_count() as f64,
            None => true,
        }
    }

    /// Source frame position of the read head.
    pub fn position(&self) -> f64 {
        self.position
    }

    /// Render interleaved output into `out`. Returns the number of frames
    /// taken from the source; the rest of `out` is silence.
    pub fn render(&mut self, out: &mut [f32], params: RenderParams) -> usize {
        out.fill(0.0);

        let out_channels = self.output.channels.max(1) as usize;
        let Some(source) = self.source.as_ref().filter(|_| self.playing) else {
            return 0;
        };

        let src_channels = source.format.channels as usize;
        let src_frames = source.frame_count();
        if src_channels == 0 || src_frames == 0 || self.output.sample_rate == 0 {
            return 0;
        }

        let step = source.format.sample_rate as f64 / self.output.sample_rate as f64
            * params.rate_factor.max(f64::EPSILON);
        let out_frames = out.len() / out_channels;
        let samples = &source.samples;

        let mut rendered = 0;
        for frame in 0..out_frames {
            if self.position >= src_frames as f64 {
                break;
            }
            let index = self.position as usize;
            let fraction = (self.position - index as f64) as f32;

            for ch in 0..out_channels {
                let src_ch = ch % src_channels;
                let current = samples[index * src_channels + src_ch];
                let value = if index + 1 < src_frames {
                    let next = samples[(index + 1) * src_channels + src_ch];
                    current * (1.0 - fraction) + next * fraction
                } else {
                    current
                };
                out[frame * out_channels + ch] = value;
            }

            self.position += step;
            rendered += 1;
        }

        effects::apply_gain_and_distortion(
            &mut out[..rendered * out_channels],
            params.volume,
            params.distortion_mix,
        );
        rendered
    }
}
