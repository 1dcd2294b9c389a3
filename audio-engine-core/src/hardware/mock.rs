//! Mock hardware engine for testing without audio devices.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::models::audio_models::{AudioBuffer, AudioFormat, AudioTime};
use crate::models::config::SessionOptions;
use crate::models::error::EngineError;
use crate::processing::effects::GraphNode;
use crate::traits::audio_hardware::{AudioHardware, TapCallback};

/// Observable state of a [`MockHardware`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MockSnapshot {
    pub session_configured: bool,
    pub tap_block_size: Option<usize>,
    pub attached: BTreeSet<GraphNode>,
    pub connections: Vec<(GraphNode, GraphNode)>,
    pub parameters: BTreeMap<GraphNode, f32>,
    pub scheduled_frames: Option<usize>,
    pub player_playing: bool,
    pub prepared: bool,
    pub running: bool,
    pub start_count: u32,
    pub stop_count: u32,
    pub reset_count: u32,
    /// Attaches of an already-attached node.
    pub duplicate_attaches: u32,
    /// Connections or detaches involving a node that is not attached.
    pub invalid_operations: u32,
}

#[derive(Default)]
struct MockState {
    snapshot: MockSnapshot,
    input_format: AudioFormat,
    tap: Option<TapCallback>,
    scheduled: Option<Arc<AudioBuffer>>,
    fail_session: bool,
    fail_start: bool,
    delivered_frames: u64,
}

/// In-memory stand-in for the device engine.
///
/// Buffers reach the tap only when a test calls [`MockHandle::deliver`],
/// which runs the callback synchronously on the caller's thread.
///
/// # Example
///
/// ```
/// use audio_engine_core::{AudioEngine, AudioFormat, EngineConfig, MockHardware};
///
/// let hardware = MockHardware::new(AudioFormat::new(16000, 1));
/// let handle = hardware.handle();
/// let dir = std::env::temp_dir().join("audio-engine-doc");
/// let engine = AudioEngine::new(hardware, EngineConfig::in_directory(&dir)).unwrap();
///
/// engine.start_streaming();
/// assert!(handle.snapshot().running);
/// ```
pub struct MockHardware {
    state: Arc<Mutex<MockState>>,
}

/// Test-side handle to inspect and drive a [`MockHardware`].
#[derive(Clone)]
pub struct MockHandle {
    state: Arc<Mutex<MockState>>,
}

impl MockHardware {
    pub fn new(input_format: AudioFormat) -> Self {
        let state = MockState {
            input_format,
            ..Default::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    pub fn handle(&self) -> MockHandle {
        MockHandle {
            state: Arc::clone(&self.state),
        }
    }
}

impl MockHandle {
    pub fn snapshot(&self) -> MockSnapshot {
        self.state.lock().snapshot.clone()
    }

    /// Make session negotiation fail until cleared.
    pub fn set_fail_session(&self, fail: bool) {
        self.state.lock().fail_session = fail;
    }

    /// Make `start` fail until cleared.
    pub fn set_fail_start(&self, fail: bool) {
        self.state.lock().fail_start = fail;
    }

    /// The buffer currently scheduled on the player node.
    pub fn scheduled_buffer(&self) -> Option<Arc<AudioBuffer>> {
        self.state.lock().scheduled.clone()
    }

    /// Push samples through the installed tap as one buffer.
    ///
    /// Returns false when no tap is installed or the engine is stopped.
    pub fn deliver(&self, samples: &[f32]) -> bool {
        let (callback, buffer) = {
            let mut state = self.state.lock();
            let Some(callback) = state.tap.clone() else {
                return false;
            };
            if !state.snapshot.running {
                return false;
            }
            let format = state.input_format;
            let time = AudioTime::new(state.delivered_frames, format.sample_rate);
            let buffer = AudioBuffer::new(samples.to_vec(), format, time);
            state.delivered_frames += buffer.frame_count() as u64;
            (callback, buffer)
        };
        callback(&buffer);
        true
    }
}

impl AudioHardware for MockHardware {
    fn configure_session(&mut self, _options: &SessionOptions) -> Result<(), EngineError> {
        let mut state = self.state.lock();
        if state.fail_session {
            return Err(EngineError::HardwareUnavailable("mock session rejected".into()));
        }
        state.snapshot.session_configured = true;
        Ok(())
    }

    fn input_format(&self) -> Result<AudioFormat, EngineError> {
        Ok(self.state.lock().input_format)
    }

    fn install_tap(
        &mut self,
        block_size: usize,
        _format: AudioFormat,
        callback: TapCallback,
    ) -> Result<(), EngineError> {
        let mut state = self.state.lock();
        if state.tap.is_some() {
            return Err(EngineError::EngineStartFailed("tap already installed".into()));
        }
        state.tap = Some(callback);
        state.snapshot.tap_block_size = Some(block_size);
        state.delivered_frames = 0;
        Ok(())
    }

    fn remove_tap(&mut self) {
        let mut state = self.state.lock();
        state.tap = None;
        state.snapshot.tap_block_size = None;
    }

    fn attach(&mut self, node: GraphNode) {
        let mut state = self.state.lock();
        if !state.snapshot.attached.insert(node) {
            state.snapshot.duplicate_attaches += 1;
        }
    }

    fn detach(&mut self, node: GraphNode) {
        let mut state = self.state.lock();
        if !state.snapshot.attached.remove(&node) {
            state.snapshot.invalid_operations += 1;
        }
        state
            .snapshot
            .connections
            .retain(|(from, to)| *from != node && *to != node);
        state.snapshot.parameters.remove(&node);
    }

    fn connect(&mut self, from: GraphNode, to: GraphNode) {
        let mut state = self.state.lock();
        let is_attached =
            |node: GraphNode| node == GraphNode::MainMixer || state.snapshot.attached.contains(&node);
        if !is_attached(from) || !is_attached(to) {
            state.snapshot.invalid_operations += 1;
            return;
        }
        state.snapshot.connections.push((from, to));
    }

    fn set_parameter(&mut self, node: GraphNode, value: f32) {
        let mut state = self.state.lock();
        if !state.snapshot.attached.contains(&node) {
            state.snapshot.invalid_operations += 1;
            return;
        }
        state.snapshot.parameters.insert(node, value);
    }

    fn schedule_buffer(&mut self, buffer: Arc<AudioBuffer>, _at_frame: u64) -> Result<(), EngineError> {
        let mut state = self.state.lock();
        if !state.snapshot.attached.contains(&GraphNode::Player) {
            return Err(EngineError::EngineStartFailed("player node not attached".into()));
        }
        state.snapshot.scheduled_frames = Some(buffer.frame_count());
        state.scheduled = Some(buffer);
        Ok(())
    }

    fn play(&mut self) {
        let mut state = self.state.lock();
        state.snapshot.player_playing = state.scheduled.is_some() && state.snapshot.running;
    }

    fn pause(&mut self) {
        self.state.lock().snapshot.player_playing = false;
    }

    fn stop_player(&mut self) {
        let mut state = self.state.lock();
        state.snapshot.player_playing = false;
        state.scheduled = None;
        state.snapshot.scheduled_frames = None;
    }

    fn prepare(&mut self) {
        self.state.lock().snapshot.prepared = true;
    }

    fn start(&mut self) -> Result<(), EngineError> {
        let mut state = self.state.lock();
        if state.fail_start {
            return Err(EngineError::EngineStartFailed("mock device busy".into()));
        }
        state.snapshot.running = true;
        state.snapshot.start_count += 1;
        Ok(())
    }

    fn stop(&mut self) {
        let mut state = self.state.lock();
        if state.snapshot.running {
            state.snapshot.stop_count += 1;
        }
        state.snapshot.running = false;
        state.snapshot.player_playing = false;
        state.snapshot.prepared = false;
    }

    fn reset(&mut self) {
        let mut state = self.state.lock();
        state.scheduled = None;
        state.snapshot.scheduled_frames = None;
        state.snapshot.reset_count += 1;
    }

    fn is_running(&self) -> bool {
        self.state.lock().snapshot.running
    }
}
