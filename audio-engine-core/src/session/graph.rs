use std::path::Path;
use std::sync::Arc;

use crate::models::audio_models::AudioBuffer;
use crate::models::error::EngineError;
use crate::processing::effects::{EffectsChain, GraphNode, ATTACHED_NODES, CONNECTIONS};
use crate::processing::wav_format;
use crate::traits::audio_hardware::AudioHardware;

/// Owns the Playing-mode processing graph.
///
/// The effect parameters outlive each playback session; nodes are attached
/// on `setup` and detached on `teardown`.
#[derive(Debug, Default)]
pub struct GraphManager {
    effects: EffectsChain,
    attached: bool,
    paused: bool,
    current: Option<Arc<AudioBuffer>>,
}

impl GraphManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn effects(&self) -> &EffectsChain {
        &self.effects
    }

    pub fn is_attached(&self) -> bool {
        self.attached
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// The buffer currently scheduled on the player.
    pub fn current(&self) -> Option<&Arc<AudioBuffer>> {
        self.current.as_ref()
    }

    /// Attach and wire the graph, then start the engine.
    ///
    /// Tears down first when already attached.
    pub fn setup<H: AudioHardware>(&mut self, hardware: &mut H) -> Result<(), EngineError> {
        if self.attached {
            log::debug!("Graph already attached, tearing down before setup");
            self.teardown(hardware);
        }

        for node in ATTACHED_NODES {
            hardware.attach(node);
        }
        self.attached = true;
        for (from, to) in CONNECTIONS {
            hardware.connect(from, to);
        }
        for (node, value) in self.effects.parameters() {
            hardware.set_parameter(node, value);
        }

        hardware.prepare();
        if let Err(e) = hardware.start() {
            log::error!("Playback engine failed to start: {}", e);
            self.teardown(hardware);
            return Err(match e {
                EngineError::EngineStartFailed(_) => e,
                other => EngineError::EngineStartFailed(other.to_string()),
            });
        }

        log::info!("Playback graph attached ({} nodes)", ATTACHED_NODES.len());
        Ok(())
    }

    /// Stop everything and detach all nodes. Idempotent.
    pub fn teardown<H: AudioHardware>(&mut self, hardware: &mut H) {
        self.current = None;
        self.paused = false;
        if !self.attached {
            return;
        }

        hardware.stop_player();
        hardware.stop();
        hardware.reset();
        for node in ATTACHED_NODES.iter().rev() {
            hardware.detach(*node);
        }
        self.attached = false;
        log::info!("Playback graph detached");
    }

    /// Decode `path` and start it on the player at frame zero.
    pub fn schedule_file<H: AudioHardware>(&mut self, hardware: &mut H, path: &Path) -> Result<(), EngineError> {
        let buffer = Arc::new(wav_format::read_wav_file(path)?);
        if !self.attached {
            return Err(EngineError::EngineStartFailed("playback graph is not attached".into()));
        }

        hardware.schedule_buffer(Arc::clone(&buffer), 0)?;
        hardware.play();
        self.paused = false;

        log::info!(
            "Scheduled {} ({} frames at {} Hz)",
            path.display(),
            buffer.frame_count(),
            buffer.format.sample_rate
        );
        self.current = Some(buffer);
        Ok(())
    }

    pub fn set_volume<H: AudioHardware>(&mut self, hardware: &mut H, volume: f32) -> f32 {
        let value = self.effects.set_volume(volume);
        self.push(hardware, GraphNode::Volume, value);
        value
    }

    pub fn adjust_volume<H: AudioHardware>(&mut self, hardware: &mut H, delta: f32) -> f32 {
        let value = self.effects.adjust_volume(delta);
        self.push(hardware, GraphNode::Volume, value);
        value
    }

    pub fn set_pitch<H: AudioHardware>(&mut self, hardware: &mut H, cents: f32) -> f32 {
        let value = self.effects.set_pitch_cents(cents);
        self.push(hardware, GraphNode::Pitch, value);
        value
    }

    pub fn set_speed<H: AudioHardware>(&mut self, hardware: &mut H, rate: f32) -> f32 {
        let value = self.effects.set_speed(rate);
        self.push(hardware, GraphNode::Speed, value);
        value
    }

    pub fn set_distortion<H: AudioHardware>(&mut self, hardware: &mut H, mix: f32) -> f32 {
        let value = self.effects.set_distortion_mix(mix);
        self.push(hardware, GraphNode::Distortion, value);
        value
    }

    /// Hold the player position. Returns whether anything changed.
    pub fn pause<H: AudioHardware>(&mut self, hardware: &mut H) -> bool {
        if !self.attached || self.paused || self.current.is_none() {
            return false;
        }
        hardware.pause();
        self.paused = true;
        log::debug!("Playback paused");
        true
    }

    pub fn resume<H: AudioHardware>(&mut self, hardware: &mut H) -> bool {
        if !self.attached || !self.paused {
            return false;
        }
        hardware.play();
        self.paused = false;
        log::debug!("Playback resumed");
        true
    }

    fn push<H: AudioHardware>(&self, hardware: &mut H, node: GraphNode, value: f32) {
        if self.attached {
            hardware.set_parameter(node, value);
        }
    }
}
