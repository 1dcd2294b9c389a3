//! cpal-backed hardware engine.
//!
//! The input node is a cpal input stream re-blocked into tap-sized
//! buffers. The player node and effects chain run inside a cpal output
//! stream: a [`PlaybackRenderer`] reads the scheduled buffer and the
//! effect parameters are read lock-free from `AtomicF32`s on every block.

use std::collections::BTreeSet;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use atomic_float::AtomicF32;
use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{FromSample, Sample, SizedSample};
use parking_lot::Mutex;

use audio_engine_core::models::audio_models::{AudioBuffer, AudioFormat};
use audio_engine_core::models::config::SessionOptions;
use audio_engine_core::models::error::EngineError;
use audio_engine_core::processing::block_assembler::BlockAssembler;
use audio_engine_core::processing::effects::{self, EffectsChain, GraphNode, CONNECTIONS};
use audio_engine_core::processing::renderer::{PlaybackRenderer, RenderParams};
use audio_engine_core::traits::audio_hardware::{AudioHardware, TapCallback};

use crate::device_enumerator::DeviceEnumerator;

/// Wrapper to hold a `cpal::Stream` in a `Send` context.
struct StreamHandle(#[allow(dead_code)] cpal::Stream);

// SAFETY: streams are only touched through `&mut CpalHardware`, which the
// engine keeps behind its transition lock, so they are never accessed
// concurrently. They are dropped on `stop`.
unsafe impl Send for StreamHandle {}

/// Effect parameters shared with the output callback.
#[derive(Debug)]
pub struct EffectParams {
    volume: AtomicF32,
    pitch_cents: AtomicF32,
    speed: AtomicF32,
    distortion_mix: AtomicF32,
}

impl Default for EffectParams {
    fn default() -> Self {
        let chain = EffectsChain::default();
        Self {
            volume: AtomicF32::new(chain.volume()),
            pitch_cents: AtomicF32::new(chain.pitch_cents()),
            speed: AtomicF32::new(chain.speed()),
            distortion_mix: AtomicF32::new(chain.distortion_mix()),
        }
    }
}

impl EffectParams {
    /// Store `value` for `node`. Returns false for nodes without a parameter.
    pub fn set(&self, node: GraphNode, value: f32) -> bool {
        let slot = match node {
            GraphNode::Volume => &self.volume,
            GraphNode::Pitch => &self.pitch_cents,
            GraphNode::Speed => &self.speed,
            GraphNode::Distortion => &self.distortion_mix,
            GraphNode::Player | GraphNode::MainMixer => return false,
        };
        slot.store(value, Ordering::Relaxed);
        true
    }

    /// Snapshot for one render block.
    pub fn render_params(&self) -> RenderParams {
        let pitch = self.pitch_cents.load(Ordering::Relaxed);
        let speed = self.speed.load(Ordering::Relaxed);
        RenderParams {
            volume: self.volume.load(Ordering::Relaxed),
            rate_factor: effects::pitch_ratio(pitch) * speed as f64,
            distortion_mix: self.distortion_mix.load(Ordering::Relaxed),
        }
    }
}

struct InstalledTap {
    block_size: usize,
    format: AudioFormat,
    callback: TapCallback,
}

/// Desktop hardware engine on top of cpal.
///
/// [`configure_session`](AudioHardware::configure_session) resolves the
/// input and output devices; streams are built on `start` for whichever
/// of the tap and the player node is present, and dropped on `stop`.
pub struct CpalHardware {
    input_device: Option<cpal::Device>,
    input_config: Option<cpal::SupportedStreamConfig>,
    output_device: Option<cpal::Device>,
    output_config: Option<cpal::SupportedStreamConfig>,
    tap: Option<InstalledTap>,
    attached: BTreeSet<GraphNode>,
    params: Arc<EffectParams>,
    renderer: Arc<Mutex<PlaybackRenderer>>,
    input_stream: Option<StreamHandle>,
    output_stream: Option<StreamHandle>,
    running: bool,
}

impl CpalHardware {
    pub fn new() -> Self {
        Self {
            input_device: None,
            input_config: None,
            output_device: None,
            output_config: None,
            tap: None,
            attached: BTreeSet::new(),
            params: Arc::new(EffectParams::default()),
            renderer: Arc::new(Mutex::new(PlaybackRenderer::new(AudioFormat::new(48000, 2)))),
            input_stream: None,
            output_stream: None,
            running: false,
        }
    }

    /// Format of the output device, once a session is configured.
    pub fn output_format(&self) -> Option<AudioFormat> {
        self.output_config
            .as_ref()
            .map(|c| AudioFormat::new(c.sample_rate().0, c.channels()))
    }

    pub fn attached_nodes(&self) -> &BTreeSet<GraphNode> {
        &self.attached
    }

    /// Current render parameters of the effect nodes.
    pub fn render_params(&self) -> RenderParams {
        self.params.render_params()
    }

    fn start_input(&mut self) -> Result<(), EngineError> {
        let Some(tap) = &self.tap else {
            return Ok(());
        };
        let device = self
            .input_device
            .as_ref()
            .ok_or_else(|| EngineError::EngineStartFailed("no input device configured".into()))?;
        let supported = self
            .input_config
            .as_ref()
            .ok_or_else(|| EngineError::EngineStartFailed("no input config".into()))?;

        let assembler = BlockAssembler::new(tap.format, tap.block_size);
        let config: cpal::StreamConfig = supported.config();
        let callback = Arc::clone(&tap.callback);

        let stream = match supported.sample_format() {
            cpal::SampleFormat::F32 => build_input_stream::<f32>(device, &config, assembler, callback)?,
            cpal::SampleFormat::I16 => build_input_stream::<i16>(device, &config, assembler, callback)?,
            cpal::SampleFormat::U16 => build_input_stream::<u16>(device, &config, assembler, callback)?,
            format => {
                return Err(EngineError::EngineStartFailed(format!(
                    "unsupported input sample format: {:?}",
                    format
                )));
            }
        };
        stream
            .play()
            .map_err(|e| EngineError::EngineStartFailed(format!("failed to start input stream: {}", e)))?;

        self.input_stream = Some(StreamHandle(stream));
        Ok(())
    }

    fn start_output(&mut self) -> Result<(), EngineError> {
        if !self.attached.contains(&GraphNode::Player) {
            return Ok(());
        }
        let device = self
            .output_device
            .as_ref()
            .ok_or_else(|| EngineError::EngineStartFailed("no output device configured".into()))?;
        let supported = self
            .output_config
            .as_ref()
            .ok_or_else(|| EngineError::EngineStartFailed("no output config".into()))?;

        let config: cpal::StreamConfig = supported.config();
        let renderer = Arc::clone(&self.renderer);
        let params = Arc::clone(&self.params);

        let stream = match supported.sample_format() {
            cpal::SampleFormat::F32 => build_output_stream::<f32>(device, &config, renderer, params)?,
            cpal::SampleFormat::I16 => build_output_stream::<i16>(device, &config, renderer, params)?,
            cpal::SampleFormat::U16 => build_output_stream::<u16>(device, &config, renderer, params)?,
            format => {
                return Err(EngineError::EngineStartFailed(format!(
                    "unsupported output sample format: {:?}",
                    format
                )));
            }
        };
        stream
            .play()
            .map_err(|e| EngineError::EngineStartFailed(format!("failed to start output stream: {}", e)))?;

        self.output_stream = Some(StreamHandle(stream));
        Ok(())
    }
}

impl Default for CpalHardware {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioHardware for CpalHardware {
    fn configure_session(&mut self, options: &SessionOptions) -> Result<(), EngineError> {
        let enumerator = DeviceEnumerator::new();

        let input = enumerator.select_input(options).and_then(|device| {
            let config = device
                .default_input_config()
                .map_err(|e| EngineError::HardwareUnavailable(format!("input config: {}", e)))?;
            Ok((device, config))
        });
        let output = enumerator.select_output(options).and_then(|device| {
            let config = device
                .default_output_config()
                .map_err(|e| EngineError::HardwareUnavailable(format!("output config: {}", e)))?;
            Ok((device, config))
        });

        match (input, output) {
            (Err(input_err), Err(output_err)) => {
                log::error!("No usable audio devices: {} / {}", input_err, output_err);
                Err(EngineError::HardwareUnavailable(format!("{}; {}", input_err, output_err)))
            }
            (input, output) => {
                match input {
                    Ok((device, config)) => {
                        self.input_device = Some(device);
                        self.input_config = Some(config);
                    }
                    Err(e) => {
                        log::warn!("Session has no input: {}", e);
                        self.input_device = None;
                        self.input_config = None;
                    }
                }
                match output {
                    Ok((device, config)) => {
                        let format = AudioFormat::new(config.sample_rate().0, config.channels());
                        *self.renderer.lock() = PlaybackRenderer::new(format);
                        self.output_device = Some(device);
                        self.output_config = Some(config);
                    }
                    Err(e) => {
                        log::warn!("Session has no output: {}", e);
                        self.output_device = None;
                        self.output_config = None;
                    }
                }
                Ok(())
            }
        }
    }

    fn input_format(&self) -> Result<AudioFormat, EngineError> {
        self.input_config
            .as_ref()
            .map(|c| AudioFormat::new(c.sample_rate().0, c.channels()))
            .ok_or_else(|| EngineError::HardwareUnavailable("no input device configured".into()))
    }

    fn install_tap(
        &mut self,
        block_size: usize,
        format: AudioFormat,
        callback: TapCallback,
    ) -> Result<(), EngineError> {
        if self.tap.is_some() {
            return Err(EngineError::EngineStartFailed("input tap already installed".into()));
        }
        self.tap = Some(InstalledTap {
            block_size,
            format,
            callback,
        });
        Ok(())
    }

    fn remove_tap(&mut self) {
        self.tap = None;
        self.input_stream = None;
    }

    fn attach(&mut self, node: GraphNode) {
        if !self.attached.insert(node) {
            log::warn!("Node {} attached twice", node);
        }
    }

    fn detach(&mut self, node: GraphNode) {
        if !self.attached.remove(&node) {
            log::warn!("Detaching node {} that is not attached", node);
        }
    }

    fn connect(&mut self, from: GraphNode, to: GraphNode) {
        let known = |node: GraphNode| node == GraphNode::MainMixer || self.attached.contains(&node);
        if !known(from) || !known(to) {
            log::warn!("Cannot connect {} -> {}: node not attached", from, to);
            return;
        }
        if !CONNECTIONS.contains(&(from, to)) {
            log::warn!("Ignoring connection outside the effects chain: {} -> {}", from, to);
        }
    }

    fn set_parameter(&mut self, node: GraphNode, value: f32) {
        if !self.params.set(node, value) {
            log::warn!("Node {} has no parameter", node);
        }
    }

    fn schedule_buffer(&mut self, buffer: Arc<AudioBuffer>, at_frame: u64) -> Result<(), EngineError> {
        if !self.attached.contains(&GraphNode::Player) {
            return Err(EngineError::EngineStartFailed("player node not attached".into()));
        }
        self.renderer.lock().schedule(buffer, at_frame);
        Ok(())
    }

    fn play(&mut self) {
        self.renderer.lock().play();
    }

    fn pause(&mut self) {
        self.renderer.lock().pause();
    }

    fn stop_player(&mut self) {
        self.renderer.lock().stop();
    }

    fn prepare(&mut self) {
        log::debug!(
            "Preparing engine (tap: {}, player: {})",
            self.tap.is_some(),
            self.attached.contains(&GraphNode::Player)
        );
    }

    fn start(&mut self) -> Result<(), EngineError> {
        if self.running {
            return Ok(());
        }
        if let Err(e) = self.start_input().and_then(|()| self.start_output()) {
            self.input_stream = None;
            self.output_stream = None;
            return Err(e);
        }
        self.running = true;
        log::info!(
            "Hardware engine started (input: {}, output: {})",
            self.input_stream.is_some(),
            self.output_stream.is_some()
        );
        Ok(())
    }

    fn stop(&mut self) {
        self.input_stream = None;
        self.output_stream = None;
        if self.running {
            log::info!("Hardware engine stopped");
        }
        self.running = false;
    }

    fn reset(&mut self) {
        self.renderer.lock().stop();
    }

    fn is_running(&self) -> bool {
        self.running
    }
}

fn build_input_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut assembler: BlockAssembler,
    callback: TapCallback,
) -> Result<cpal::Stream, EngineError>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    let mut converted: Vec<f32> = Vec::new();
    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                converted.clear();
                converted.extend(data.iter().map(|s| f32::from_sample(*s)));
                assembler.push(&converted, |buffer| callback(&buffer));
            },
            |err| log::error!("Audio input stream error: {}", err),
            None,
        )
        .map_err(|e| EngineError::EngineStartFailed(format!("failed to build input stream: {}", e)))
}

fn build_output_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    renderer: Arc<Mutex<PlaybackRenderer>>,
    params: Arc<EffectParams>,
) -> Result<cpal::Stream, EngineError>
where
    T: SizedSample + FromSample<f32>,
{
    let mut scratch: Vec<f32> = Vec::new();
    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                scratch.resize(data.len(), 0.0);
                match renderer.try_lock() {
                    Some(mut renderer) => {
                        renderer.render(&mut scratch, params.render_params());
                    }
                    None => scratch.fill(0.0),
                }
                for (out, sample) in data.iter_mut().zip(scratch.iter()) {
                    *out = T::from_sample(*sample);
                }
            },
            |err| log::error!("Audio output stream error: {}", err),
            None,
        )
        .map_err(|e| EngineError::EngineStartFailed(format!("failed to build output stream: {}", e)))
}
