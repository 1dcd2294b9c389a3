//! Playback effects chain.
//!
//! The chain topology is fixed; only the scalar parameter of each stage
//! changes over the engine's lifetime:
//!
//! ```text
//! Player → Volume → Pitch → Speed → MainMixer
//!                     ↑
//!                Distortion
//! ```

use std::fmt;

/// A node of the playback graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum GraphNode {
    Player,
    Volume,
    Pitch,
    Speed,
    Distortion,
    /// Owned by the hardware engine; never attached or detached.
    MainMixer,
}

impl fmt::Display for GraphNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Player => "player",
            Self::Volume => "volume",
            Self::Pitch => "pitch",
            Self::Speed => "speed",
            Self::Distortion => "distortion",
            Self::MainMixer => "main-mixer",
        };
        f.write_str(name)
    }
}

/// Nodes attached for a playback session, in attach order.
pub const ATTACHED_NODES: [GraphNode; 5] = [
    GraphNode::Player,
    GraphNode::Volume,
    GraphNode::Pitch,
    GraphNode::Speed,
    GraphNode::Distortion,
];

/// Connections of the playback graph, in connect order.
pub const CONNECTIONS: [(GraphNode, GraphNode); 5] = [
    (GraphNode::Player, GraphNode::Volume),
    (GraphNode::Volume, GraphNode::Pitch),
    (GraphNode::Pitch, GraphNode::Speed),
    (GraphNode::Speed, GraphNode::MainMixer),
    (GraphNode::Distortion, GraphNode::Pitch),
];

pub const MIN_VOLUME: f32 = 0.0;
pub const MAX_VOLUME: f32 = 1.0;
pub const MIN_PITCH_CENTS: f32 = -2400.0;
pub const MAX_PITCH_CENTS: f32 = 2400.0;
pub const MIN_SPEED: f32 = 0.25;
pub const MAX_SPEED: f32 = 4.0;
pub const MIN_DISTORTION_MIX: f32 = 0.0;
pub const MAX_DISTORTION_MIX: f32 = 1.0;

/// Parameter values of the four effect stages.
///
/// Writes clamp to each stage's range; non-finite writes are ignored and
/// leave the previous value in place.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EffectsChain {
    volume: f32,
    pitch_cents: f32,
    speed: f32,
    distortion_mix: f32,
}

impl Default for EffectsChain {
    fn default() -> Self {
        Self {
            volume: MAX_VOLUME,
            pitch_cents: 0.0,
            speed: 1.0,
            distortion_mix: 0.0,
        }
    }
}

impl EffectsChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn pitch_cents(&self) -> f32 {
        self.pitch_cents
    }

    pub fn speed(&self) -> f32 {
        self.speed
    }

    pub fn distortion_mix(&self) -> f32 {
        self.distortion_mix
    }

    pub fn set_volume(&mut self, volume: f32) -> f32 {
        self.volume = clamp_finite(volume, self.volume, MIN_VOLUME, MAX_VOLUME);
        self.volume
    }

    /// Add `delta` to the volume, saturating at the range bounds.
    pub fn adjust_volume(&mut self, delta: f32) -> f32 {
        self.set_volume(self.volume + delta)
    }

    pub fn set_pitch_cents(&mut self, cents: f32) -> f32 {
        self.pitch_cents = clamp_finite(cents, self.pitch_cents, MIN_PITCH_CENTS, MAX_PITCH_CENTS);
        self.pitch_cents
    }

    pub fn set_speed(&mut self, speed: f32) -> f32 {
        self.speed = clamp_finite(speed, self.speed, MIN_SPEED, MAX_SPEED);
        self.speed
    }

    pub fn set_distortion_mix(&mut self, mix: f32) -> f32 {
        self.distortion_mix = clamp_finite(mix, self.distortion_mix, MIN_DISTORTION_MIX, MAX_DISTORTION_MIX);
        self.distortion_mix
    }

    /// Current value of `node`'s parameter; None for nodes without one.
    pub fn parameter(&self, node: GraphNode) -> Option<f32> {
        match node {
            GraphNode::Volume => Some(self.volume),
            GraphNode::Pitch => Some(self.pitch_cents),
            GraphNode::Speed => Some(self.speed),
            GraphNode::Distortion => Some(self.distortion_mix),
            GraphNode::Player | GraphNode::MainMixer => None,
        }
    }

    /// All stage parameters, for pushing into a freshly attached graph.
    pub fn parameters(&self) -> [(GraphNode, f32); 4] {
        [
            (GraphNode::Volume, self.volume),
            (GraphNode::Pitch, self.pitch_cents),
            (GraphNode::Speed, self.speed),
            (GraphNode::Distortion, self.distortion_mix),
        ]
    }

    /// Combined playback-rate factor of the pitch and speed stages.
    pub fn rate_factor(&self) -> f64 {
        pitch_ratio(self.pitch_cents) * self.speed as f64
    }
}

/// Frequency ratio for a pitch offset in cents.
pub fn pitch_ratio(cents: f32) -> f64 {
    2f64.powf(cents as f64 / 1200.0)
}

/// Soft-clipping distortion blended with the dry signal.
///
/// `mix = 0.0` is fully dry, `1.0` fully distorted.
pub fn distort(sample: f32, mix: f32) -> f32 {
    if mix <= 0.0 {
        return sample;
    }
    const DRIVE: f32 = 4.0;
    let wet = (sample * DRIVE).tanh();
    sample + (wet - sample) * mix
}

/// Apply the volume and distortion stages to a block in place.
pub fn apply_gain_and_distortion(samples: &mut [f32], volume: f32, distortion_mix: f32) {
    for sample in samples.iter_mut() {
        *sample = distort(*sample * volume, distortion_mix);
    }
}

fn clamp_finite(value: f32, current: f32, min: f32, max: f32) -> f32 {
    if !value.is_finite() {
        log::warn!("Ignoring non-finite effect parameter {}", value);
        return current;
    }
    value.clamp(min, max)
}
