use std::fs;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::models::audio_models::{AudioBuffer, EngineDiagnostics};
use crate::models::config::{AutoSaveOptions, EngineConfig};
use crate::models::error::EngineError;
use crate::models::mode::{ModeRequest, PipelineMode};
use crate::models::recording_result::{RecordingMetadata, RecordingResult};
use crate::processing::effects::EffectsChain;
use crate::processing::wav_format;
use crate::session::auto_save::AutoSaveTask;
use crate::session::capture_tap::{CaptureSlot, CaptureTap, DelegateSlot, TapRole, TapSink};
use crate::session::graph::GraphManager;
use crate::storage::capture_file::CaptureFile;
use crate::storage::file_store::{self, FileStore};
use crate::storage::metadata;
use crate::traits::audio_hardware::AudioHardware;
use crate::traits::engine_delegate::EngineDelegate;

struct EngineInner<H> {
    hardware: H,
    mode: PipelineMode,
    tap: CaptureTap,
    graph: GraphManager,
}

/// The exclusive-mode audio pipeline.
///
/// Streaming, recording and playback share one hardware engine; at most
/// one of them is active at a time. Every transition goes through
/// [`enter`](Self::enter) and [`stop`](Self::stop), which are serialized
/// by a single lock, so an `AudioEngine` can be shared behind an `Arc`.
///
/// Delegate events for a transition are emitted after the lock is
/// released, so a delegate may call back into the engine.
pub struct AudioEngine<H: AudioHardware> {
    inner: Mutex<EngineInner<H>>,
    delegate: DelegateSlot,
    capture: CaptureSlot,
    auto_save: AutoSaveTask,
    store: FileStore,
    config: EngineConfig,
}

impl<H: AudioHardware> AudioEngine<H> {
    /// Build an engine over `hardware`.
    ///
    /// A capture file left in the temp location by a previous run is
    /// moved into the auto-save slot, where
    /// [`recover_last_auto_save`](Self::recover_last_auto_save) finds it.
    pub fn new(hardware: H, config: EngineConfig) -> Result<Self, EngineError> {
        config.validate().map_err(EngineError::InvalidConfiguration)?;

        let store = FileStore::new(&config);
        if store.recover_stale_temp() {
            log::info!("Recovered unsaved recording into {}", store.auto_save_path().display());
        }

        log::info!(
            "Audio engine ready (cache: {}, documents: {})",
            config.cache_directory.display(),
            config.documents_directory.display()
        );

        Ok(Self {
            inner: Mutex::new(EngineInner {
                hardware,
                mode: PipelineMode::Idle,
                tap: CaptureTap::new(config.tap_block_size),
                graph: GraphManager::new(),
            }),
            delegate: Arc::new(RwLock::new(None)),
            capture: Arc::new(Mutex::new(None)),
            auto_save: AutoSaveTask::new(),
            store,
            config,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn file_store(&self) -> &FileStore {
        &self.store
    }

    pub fn mode(&self) -> PipelineMode {
        self.inner.lock().mode
    }

    pub fn set_delegate(&self, delegate: Arc<dyn EngineDelegate>) {
        *self.delegate.write() = Some(delegate);
    }

    pub fn clear_delegate(&self) {
        *self.delegate.write() = None;
    }

    // --- Mode transitions ---

    /// Transition into the requested mode.
    ///
    /// A no-op when that mode is already active. Otherwise the active mode
    /// is stopped, the hardware session negotiated, and the new mode
    /// started. On failure the engine is left Idle with no tap, graph or
    /// capture file active, and the error is also reported to the delegate.
    pub fn enter(&self, request: ModeRequest) -> Result<(), EngineError> {
        let (result, changed) = {
            let mut guard = self.inner.lock();
            let inner = &mut *guard;
            let before = inner.mode;
            if before == request.mode() {
                log::debug!("Already {}, ignoring request", before);
                return Ok(());
            }
            let result = self.enter_locked(inner, request);
            (result, (inner.mode != before).then_some(inner.mode))
        };

        if let Some(mode) = changed {
            self.notify_mode(mode);
        }
        if let Err(e) = &result {
            self.notify_error(e);
        }
        result
    }

    /// Stop `mode` if it is the active one; otherwise a no-op.
    pub fn stop(&self, mode: PipelineMode) {
        let stopped = {
            let mut guard = self.inner.lock();
            let inner = &mut *guard;
            if mode.is_idle() || inner.mode != mode {
                false
            } else {
                self.stop_locked(inner);
                true
            }
        };
        if stopped {
            self.notify_mode(PipelineMode::Idle);
        }
    }

    fn enter_locked(&self, inner: &mut EngineInner<H>, request: ModeRequest) -> Result<(), EngineError> {
        let target = request.mode();
        self.stop_locked(inner);

        inner
            .hardware
            .configure_session(&self.config.session)
            .map_err(|e| {
                log::error!("Hardware session negotiation failed: {}", e);
                match e {
                    EngineError::HardwareUnavailable(_) => e,
                    other => EngineError::HardwareUnavailable(other.to_string()),
                }
            })?;

        match request {
            ModeRequest::Streaming => {
                inner.tap.start(
                    &mut inner.hardware,
                    TapRole::Streaming,
                    TapSink::Delegate(Arc::clone(&self.delegate)),
                )?;
            }
            ModeRequest::Recording { auto_save } => {
                self.start_recording_locked(inner, auto_save)?;
            }
            ModeRequest::Playing { path } => {
                inner.graph.setup(&mut inner.hardware)?;
                if let Err(e) = inner.graph.schedule_file(&mut inner.hardware, &path) {
                    log::error!("Cannot play {}: {}", path.display(), e);
                    inner.graph.teardown(&mut inner.hardware);
                    return Err(e);
                }
            }
        }

        inner.mode = target;
        log::info!("Entered {}", inner.mode);
        Ok(())
    }

    fn start_recording_locked(&self, inner: &mut EngineInner<H>, auto_save: AutoSaveOptions) -> Result<(), EngineError> {
        let format = inner.hardware.input_format()?;
        let file = CaptureFile::create(self.store.temp_path().to_path_buf(), format)?;
        *self.capture.lock() = Some(file);

        if let Err(e) = inner.tap.start(
            &mut inner.hardware,
            TapRole::Recording,
            TapSink::File(Arc::clone(&self.capture)),
        ) {
            self.discard_capture_file();
            return Err(e);
        }

        self.auto_save
            .arm(auto_save, Arc::clone(&self.capture), self.store.clone());
        Ok(())
    }

    /// Run the stop sequence of the active mode and return to Idle.
    fn stop_locked(&self, inner: &mut EngineInner<H>) {
        match inner.mode {
            PipelineMode::Idle => return,
            PipelineMode::Streaming => inner.tap.stop(&mut inner.hardware),
            PipelineMode::Recording => {
                self.auto_save.disarm();
                inner.tap.stop(&mut inner.hardware);
                self.close_capture_file();
            }
            PipelineMode::Playing => inner.graph.teardown(&mut inner.hardware),
        }
        log::info!("Stopped {}", inner.mode);
        inner.mode = PipelineMode::Idle;
    }

    fn close_capture_file(&self) {
        let Some(mut file) = self.capture.lock().take() else {
            return;
        };
        match file.finalize() {
            Ok(()) => log::info!(
                "Recording closed: {:.2}s in {}",
                file.duration_secs(),
                file.path().display()
            ),
            Err(e) => log::error!("Failed to finalize recording: {}", e),
        }
    }

    fn discard_capture_file(&self) {
        drop(self.capture.lock().take());
        let temp = self.store.temp_path();
        if temp.exists() {
            if let Err(e) = fs::remove_file(temp) {
                log::warn!("Failed to discard {}: {}", temp.display(), e);
            }
        }
    }

    // --- Convenience entry points ---

    /// Start forwarding microphone buffers to the delegate.
    ///
    /// Failures are logged and reported through the delegate.
    pub fn start_streaming(&self) {
        if let Err(e) = self.enter(ModeRequest::Streaming) {
            log::error!("Failed to start streaming: {}", e);
        }
    }

    pub fn stop_streaming(&self) {
        self.stop(PipelineMode::Streaming);
    }

    /// Start recording to the temp file, auto-saving at the configured
    /// interval when `auto_save` is set.
    pub fn start_recording(&self, auto_save: bool) {
        let options = if auto_save {
            AutoSaveOptions::every(self.config.auto_save_interval_secs)
        } else {
            AutoSaveOptions::disabled()
        };
        self.start_recording_with(options);
    }

    pub fn start_recording_with(&self, auto_save: AutoSaveOptions) {
        if let Err(e) = self.enter(ModeRequest::Recording { auto_save }) {
            log::error!("Failed to start recording: {}", e);
        }
    }

    pub fn stop_recording(&self) {
        self.stop(PipelineMode::Recording);
    }

    /// Play the saved recording called `name`.
    pub fn start_playback(&self, name: &str) {
        if let Err(e) = validate_name(name) {
            log::error!("Failed to start playback: {}", e);
            self.notify_error(&e);
            return;
        }
        self.play_file(self.store.saved_recording_path(name));
    }

    /// Play an arbitrary WAV file.
    pub fn play_file(&self, path: PathBuf) {
        if let Err(e) = self.enter(ModeRequest::Playing { path }) {
            log::error!("Failed to start playback: {}", e);
        }
    }

    pub fn stop_playback(&self) {
        self.stop(PipelineMode::Playing);
    }

    // --- Files ---

    /// Move the temp capture file to the saved recording called `name`.
    ///
    /// An active recording is stopped first. Fails with `TempFileMissing`
    /// when there is nothing to save; no destination is created then.
    pub fn save_recording(&self, name: &str) -> Result<RecordingResult, EngineError> {
        validate_name(name)?;

        let (result, stopped) = {
            let mut guard = self.inner.lock();
            let inner = &mut *guard;
            let stopped = inner.mode == PipelineMode::Recording;
            if stopped {
                self.stop_locked(inner);
            }
            (self.save_locked(name), stopped)
        };

        if stopped {
            self.notify_mode(PipelineMode::Idle);
        }
        result
    }

    fn save_locked(&self, name: &str) -> Result<RecordingResult, EngineError> {
        let temp = self.store.temp_path();
        if !temp.is_file() {
            log::warn!("Save requested with no recording at {}", temp.display());
            return Err(EngineError::TempFileMissing);
        }

        let spec = wav_format::read_wav_spec(temp)?;
        let destination = self.store.saved_recording_path(name);
        self.store.save(temp, &destination)?;

        let checksum = file_store::sha256_file(&destination)?;
        let duration_secs = spec.duration_secs();
        let metadata = RecordingMetadata::new(
            name,
            duration_secs,
            &destination.to_string_lossy(),
            &checksum,
            spec.format(),
        );
        if let Err(e) = metadata::write_metadata(&metadata, &destination) {
            log::warn!("Saved recording without metadata: {}", e);
        }

        log::info!(
            "Saved recording '{}' ({:.2}s) to {}",
            name,
            duration_secs,
            destination.display()
        );
        Ok(RecordingResult {
            file_path: destination,
            duration_secs,
            metadata,
            checksum,
        })
    }

    /// Decode the last auto-save snapshot, if any.
    pub fn recover_last_auto_save(&self) -> Result<Option<AudioBuffer>, EngineError> {
        let path = self.store.auto_save_path();
        if !path.is_file() {
            return Ok(None);
        }
        let buffer = wav_format::read_wav_file(path)?;
        log::info!("Recovered {} frames from {}", buffer.frame_count(), path.display());
        Ok(Some(buffer))
    }

    pub fn saved_recording_path(&self, name: &str) -> PathBuf {
        self.store.saved_recording_path(name)
    }

    pub fn list_saved_recordings(&self) -> Result<Vec<String>, EngineError> {
        self.store.list_saved_recordings()
    }

    pub fn delete_saved_recording(&self, name: &str) -> Result<(), EngineError> {
        validate_name(name)?;
        self.store.delete_saved_recording(name)
    }

    // --- Playback controls ---

    /// Hold the playback position. No-op outside Playing.
    pub fn pause_playback(&self) {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        if inner.mode == PipelineMode::Playing {
            inner.graph.pause(&mut inner.hardware);
        }
    }

    pub fn resume_playback(&self) {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        if inner.mode == PipelineMode::Playing {
            inner.graph.resume(&mut inner.hardware);
        }
    }

    pub fn is_paused(&self) -> bool {
        self.inner.lock().graph.is_paused()
    }

    /// Raise the volume by one step, saturating at full scale.
    pub fn volume_up(&self) -> f32 {
        let step = self.config.volume_step;
        self.with_graph(|graph, hardware| graph.adjust_volume(hardware, step))
    }

    /// Lower the volume by one step, saturating at silence.
    pub fn volume_down(&self) -> f32 {
        let step = self.config.volume_step;
        self.with_graph(|graph, hardware| graph.adjust_volume(hardware, -step))
    }

    pub fn set_volume(&self, volume: f32) -> f32 {
        self.with_graph(|graph, hardware| graph.set_volume(hardware, volume))
    }

    /// Pitch shift in cents.
    pub fn set_pitch(&self, cents: f32) -> f32 {
        self.with_graph(|graph, hardware| graph.set_pitch(hardware, cents))
    }

    pub fn set_speed(&self, rate: f32) -> f32 {
        self.with_graph(|graph, hardware| graph.set_speed(hardware, rate))
    }

    pub fn set_distortion(&self, mix: f32) -> f32 {
        self.with_graph(|graph, hardware| graph.set_distortion(hardware, mix))
    }

    pub fn effects(&self) -> EffectsChain {
        *self.inner.lock().graph.effects()
    }

    fn with_graph<R>(&self, f: impl FnOnce(&mut GraphManager, &mut H) -> R) -> R {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        f(&mut inner.graph, &mut inner.hardware)
    }

    // --- Diagnostics ---

    pub fn diagnostics(&self) -> EngineDiagnostics {
        let inner = self.inner.lock();
        let stats = inner.tap.stats();
        EngineDiagnostics {
            buffers_delivered: stats.delivered.load(Ordering::Relaxed),
            buffers_dropped: stats.dropped.load(Ordering::Relaxed),
            frames_captured: stats.frames.load(Ordering::Relaxed),
            auto_save_snapshots: self.auto_save.snapshots(),
            auto_save_failures: self.auto_save.failures(),
        }
    }

    // --- Internal helpers ---

    fn delegate(&self) -> Option<Arc<dyn EngineDelegate>> {
        self.delegate.read().clone()
    }

    fn notify_mode(&self, mode: PipelineMode) {
        if let Some(delegate) = self.delegate() {
            delegate.on_mode_changed(mode);
        }
    }

    fn notify_error(&self, error: &EngineError) {
        if let Some(delegate) = self.delegate() {
            delegate.on_error(error);
        }
    }
}

impl<H: AudioHardware> Drop for AudioEngine<H> {
    fn drop(&mut self) {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        if !inner.mode.is_idle() {
            self.stop_locked(inner);
        }
    }
}

/// Saved recording names are single path components.
fn validate_name(name: &str) -> Result<(), EngineError> {
    let valid = !name.is_empty() && name != "." && name != ".." && !name.contains(['/', '\\']);
    if valid {
        Ok(())
    } else {
        Err(EngineError::InvalidConfiguration(format!("invalid recording name: {:?}", name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::mock::{MockHandle, MockHardware, MockSnapshot};
    use crate::models::audio_models::{AudioFormat, AudioTime};
    use crate::processing::effects::GraphNode;
    use std::thread;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingDelegate {
        modes: Mutex<Vec<PipelineMode>>,
        errors: Mutex<Vec<EngineError>>,
        buffers: Mutex<Vec<u64>>,
    }

    impl EngineDelegate for RecordingDelegate {
        fn on_mode_changed(&self, mode: PipelineMode) {
            self.modes.lock().push(mode);
        }

        fn on_error(&self, error: &EngineError) {
            self.errors.lock().push(error.clone());
        }

        fn on_buffer_delivered(&self, _buffer: &AudioBuffer, time: AudioTime) {
            self.buffers.lock().push(time.sample_time);
        }
    }

    fn engine_in(dir: &std::path::Path) -> (AudioEngine<MockHardware>, MockHandle) {
        let hardware = MockHardware::new(AudioFormat::new(16000, 1));
        let handle = hardware.handle();
        let config = EngineConfig {
            tap_block_size: 160,
            ..EngineConfig::in_directory(dir)
        };
        (AudioEngine::new(hardware, config).unwrap(), handle)
    }

    /// Count of the tap/graph resources held in `snapshot`.
    fn active_resources(snapshot: &MockSnapshot) -> usize {
        snapshot.tap_block_size.is_some() as usize + !snapshot.attached.is_empty() as usize
    }

    fn record_take(engine: &AudioEngine<MockHardware>, handle: &MockHandle, name: &str) -> RecordingResult {
        engine.start_recording(false);
        assert!(handle.deliver(&[0.25; 160]));
        assert!(handle.deliver(&[-0.25; 160]));
        engine.save_recording(name).unwrap()
    }

    #[test]
    fn starts_idle() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, handle) = engine_in(dir.path());
        assert_eq!(engine.mode(), PipelineMode::Idle);
        assert_eq!(active_resources(&handle.snapshot()), 0);
    }

    #[test]
    fn streaming_delivers_buffers_to_delegate() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, handle) = engine_in(dir.path());
        let delegate = Arc::new(RecordingDelegate::default());
        engine.set_delegate(delegate.clone());

        engine.start_streaming();
        assert_eq!(engine.mode(), PipelineMode::Streaming);
        assert!(handle.snapshot().session_configured);

        handle.deliver(&[0.0; 160]);
        handle.deliver(&[0.0; 160]);
        assert_eq!(*delegate.buffers.lock(), vec![0, 160]);
        assert_eq!(engine.diagnostics().buffers_delivered, 2);

        engine.clear_delegate();
        handle.deliver(&[0.0; 160]);
        assert_eq!(delegate.buffers.lock().len(), 2);
    }

    #[test]
    fn entering_active_mode_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, handle) = engine_in(dir.path());
        let delegate = Arc::new(RecordingDelegate::default());
        engine.set_delegate(delegate.clone());

        engine.enter(ModeRequest::Streaming).unwrap();
        engine.enter(ModeRequest::Streaming).unwrap();

        assert_eq!(handle.snapshot().start_count, 1);
        assert_eq!(*delegate.modes.lock(), vec![PipelineMode::Streaming]);
    }

    #[test]
    fn recording_while_streaming_replaces_it() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, handle) = engine_in(dir.path());
        let delegate = Arc::new(RecordingDelegate::default());
        engine.set_delegate(delegate.clone());

        engine.start_streaming();
        engine.start_recording(false);

        assert_eq!(engine.mode(), PipelineMode::Recording);
        let snapshot = handle.snapshot();
        assert_eq!(active_resources(&snapshot), 1);
        assert!(snapshot.running);

        handle.deliver(&[0.5; 160]);
        assert!(delegate.buffers.lock().is_empty());
        assert_eq!(
            *delegate.modes.lock(),
            vec![PipelineMode::Streaming, PipelineMode::Recording]
        );
    }

    #[test]
    fn at_most_one_mode_after_any_sequence() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, handle) = engine_in(dir.path());
        record_take(&engine, &handle, "take");

        let requests = [
            ModeRequest::Playing { path: engine.saved_recording_path("take") },
            ModeRequest::Streaming,
            ModeRequest::Recording { auto_save: AutoSaveOptions::disabled() },
            ModeRequest::Playing { path: engine.saved_recording_path("take") },
            ModeRequest::Recording { auto_save: AutoSaveOptions::disabled() },
            ModeRequest::Streaming,
            ModeRequest::Playing { path: engine.saved_recording_path("take") },
        ];
        for request in requests {
            let expected = request.mode();
            engine.enter(request).unwrap();
            assert_eq!(engine.mode(), expected);
            assert_eq!(active_resources(&handle.snapshot()), 1);
        }
        engine.stop(PipelineMode::Playing);
        assert_eq!(active_resources(&handle.snapshot()), 0);
        assert_eq!(handle.snapshot().invalid_operations, 0);
    }

    #[test]
    fn concurrent_transitions_keep_one_mode_active() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, handle) = engine_in(dir.path());
        record_take(&engine, &handle, "take");
        let engine = Arc::new(engine);
        let path = engine.saved_recording_path("take");

        let workers: Vec<_> = (0..4)
            .map(|i| {
                let engine = Arc::clone(&engine);
                let path = path.clone();
                thread::spawn(move || {
                    for step in 0..25 {
                        let request = match (i + step) % 3 {
                            0 => ModeRequest::Streaming,
                            1 => ModeRequest::Recording { auto_save: AutoSaveOptions::disabled() },
                            _ => ModeRequest::Playing { path: path.clone() },
                        };
                        engine.enter(request).unwrap();
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        let snapshot = handle.snapshot();
        assert_eq!(active_resources(&snapshot), 1);
        assert_eq!(snapshot.duplicate_attaches, 0);
        assert_eq!(snapshot.invalid_operations, 0);
        assert!(!engine.mode().is_idle());
    }

    #[test]
    fn save_without_recording_fails_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, _handle) = engine_in(dir.path());

        let err = engine.save_recording("take").unwrap_err();
        assert_eq!(err, EngineError::TempFileMissing);
        assert!(!engine.saved_recording_path("take").exists());
    }

    #[test]
    fn save_moves_temp_file_byte_for_byte() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, handle) = engine_in(dir.path());

        engine.start_recording(false);
        handle.deliver(&[0.125; 160]);
        engine.stop_recording();
        let temp_bytes = fs::read(engine.file_store().temp_path()).unwrap();

        let result = engine.save_recording("take").unwrap();
        assert_eq!(fs::read(&result.file_path).unwrap(), temp_bytes);
        assert!(!engine.file_store().temp_path().exists());
        assert_eq!(result.checksum, file_store::sha256_file(&result.file_path).unwrap());
        assert!((result.duration_secs - 0.01).abs() < 1e-9);

        let sidecar = metadata::read_metadata(&result.file_path).unwrap();
        assert_eq!(sidecar.id, result.metadata.id);
        assert_eq!(sidecar.sample_rate, 16000);
    }

    #[test]
    fn save_while_recording_stops_first() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, handle) = engine_in(dir.path());
        let delegate = Arc::new(RecordingDelegate::default());
        engine.set_delegate(delegate.clone());

        let result = record_take(&engine, &handle, "take");

        assert_eq!(engine.mode(), PipelineMode::Idle);
        assert_eq!(delegate.modes.lock().last(), Some(&PipelineMode::Idle));
        let decoded = wav_format::read_wav_file(&result.file_path).unwrap();
        assert_eq!(decoded.frame_count(), 320);
        assert_eq!(engine.list_saved_recordings().unwrap(), vec!["take"]);
    }

    #[test]
    fn invalid_names_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, _handle) = engine_in(dir.path());
        for name in ["", "..", "a/b", "a\\b"] {
            assert!(matches!(
                engine.save_recording(name),
                Err(EngineError::InvalidConfiguration(_))
            ));
        }
    }

    #[test]
    fn playback_name_cannot_leave_documents_directory() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, handle) = engine_in(dir.path());
        let result = record_take(&engine, &handle, "take");
        let outside = engine.saved_recording_path("../take");
        fs::copy(&result.file_path, &outside).unwrap();
        let delegate = Arc::new(RecordingDelegate::default());
        engine.set_delegate(delegate.clone());

        engine.start_playback("../take");

        assert_eq!(engine.mode(), PipelineMode::Idle);
        assert!(handle.snapshot().attached.is_empty());
        assert!(delegate.modes.lock().is_empty());
        assert!(matches!(
            delegate.errors.lock().as_slice(),
            [EngineError::InvalidConfiguration(_)]
        ));
    }

    #[test]
    fn stop_playing_twice_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, handle) = engine_in(dir.path());
        let delegate = Arc::new(RecordingDelegate::default());
        record_take(&engine, &handle, "take");
        engine.set_delegate(delegate.clone());

        engine.start_playback("take");
        assert_eq!(engine.mode(), PipelineMode::Playing);
        assert!(handle.snapshot().player_playing);

        engine.stop_playback();
        engine.stop_playback();

        assert_eq!(engine.mode(), PipelineMode::Idle);
        assert_eq!(
            *delegate.modes.lock(),
            vec![PipelineMode::Playing, PipelineMode::Idle]
        );
        assert!(delegate.errors.lock().is_empty());
        assert_eq!(handle.snapshot().invalid_operations, 0);
    }

    #[test]
    fn stopping_inactive_mode_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, handle) = engine_in(dir.path());
        engine.start_streaming();

        engine.stop(PipelineMode::Recording);
        engine.stop(PipelineMode::Playing);
        engine.stop(PipelineMode::Idle);

        assert_eq!(engine.mode(), PipelineMode::Streaming);
        assert!(handle.snapshot().running);
    }

    #[test]
    fn repeated_playback_does_not_leak_nodes() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, handle) = engine_in(dir.path());
        record_take(&engine, &handle, "take");

        for _ in 0..5 {
            engine.start_playback("take");
            engine.stop_playback();
        }
        engine.start_playback("take");

        let snapshot = handle.snapshot();
        assert_eq!(snapshot.duplicate_attaches, 0);
        assert_eq!(snapshot.attached.len(), 5);
        assert_eq!(snapshot.scheduled_frames, Some(320));

        engine.stop_playback();
        assert!(handle.scheduled_buffer().is_none());
    }

    #[test]
    fn missing_playback_file_reverts_to_idle() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, handle) = engine_in(dir.path());
        let delegate = Arc::new(RecordingDelegate::default());
        engine.set_delegate(delegate.clone());

        let err = engine
            .enter(ModeRequest::Playing { path: dir.path().join("nope.wav") })
            .unwrap_err();

        assert!(matches!(err, EngineError::FileOpenFailed(_)));
        assert_eq!(engine.mode(), PipelineMode::Idle);
        assert!(handle.snapshot().attached.is_empty());
        assert_eq!(*delegate.errors.lock(), vec![err]);
    }

    #[test]
    fn start_failure_leaves_nothing_active() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, handle) = engine_in(dir.path());
        let delegate = Arc::new(RecordingDelegate::default());
        engine.set_delegate(delegate.clone());
        engine.start_streaming();
        handle.set_fail_start(true);

        let err = engine
            .enter(ModeRequest::Recording { auto_save: AutoSaveOptions::every(1) })
            .unwrap_err();

        assert!(matches!(err, EngineError::EngineStartFailed(_)));
        assert_eq!(engine.mode(), PipelineMode::Idle);
        assert_eq!(active_resources(&handle.snapshot()), 0);
        assert!(!engine.file_store().temp_path().exists());
        assert_eq!(
            *delegate.modes.lock(),
            vec![PipelineMode::Streaming, PipelineMode::Idle]
        );
        assert_eq!(delegate.errors.lock().len(), 1);
    }

    #[test]
    fn session_failure_is_hardware_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, handle) = engine_in(dir.path());
        handle.set_fail_session(true);

        let err = engine.enter(ModeRequest::Streaming).unwrap_err();
        assert!(err.is_hardware());
        assert!(matches!(err, EngineError::HardwareUnavailable(_)));
        assert_eq!(engine.mode(), PipelineMode::Idle);
        assert_eq!(handle.snapshot().start_count, 0);
    }

    #[test]
    fn volume_steps_saturate() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, handle) = engine_in(dir.path());
        record_take(&engine, &handle, "take");
        engine.start_playback("take");

        for _ in 0..30 {
            let volume = engine.volume_up();
            assert!(volume.is_finite() && volume <= 1.0);
        }
        assert_eq!(engine.effects().volume(), 1.0);

        for _ in 0..30 {
            let volume = engine.volume_down();
            assert!(volume.is_finite() && volume >= 0.0);
        }
        assert_eq!(engine.effects().volume(), 0.0);
        assert_eq!(handle.snapshot().parameters.get(&GraphNode::Volume), Some(&0.0));
    }

    #[test]
    fn effect_settings_survive_playback_sessions() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, handle) = engine_in(dir.path());
        record_take(&engine, &handle, "take");

        engine.set_pitch(1200.0);
        engine.set_speed(10.0);
        engine.start_playback("take");

        let snapshot = handle.snapshot();
        assert_eq!(snapshot.parameters.get(&GraphNode::Pitch), Some(&1200.0));
        assert_eq!(snapshot.parameters.get(&GraphNode::Speed), Some(&4.0));
    }

    #[test]
    fn pause_and_resume_only_apply_while_playing() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, handle) = engine_in(dir.path());
        record_take(&engine, &handle, "take");

        engine.pause_playback();
        assert!(!engine.is_paused());

        engine.start_playback("take");
        engine.pause_playback();
        assert!(engine.is_paused());
        assert!(!handle.snapshot().player_playing);
        assert_eq!(engine.mode(), PipelineMode::Playing);

        engine.resume_playback();
        assert!(!engine.is_paused());
        assert!(handle.snapshot().player_playing);
    }

    #[test]
    fn auto_save_snapshots_while_recording() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, handle) = engine_in(dir.path());

        engine.start_recording_with(AutoSaveOptions::every(1));
        handle.deliver(&[0.75; 160]);
        thread::sleep(Duration::from_millis(3500));
        engine.stop_recording();

        let snapshots = engine.diagnostics().auto_save_snapshots;
        assert!((3..=4).contains(&snapshots), "got {} snapshots", snapshots);

        thread::sleep(Duration::from_millis(1500));
        assert_eq!(engine.diagnostics().auto_save_snapshots, snapshots);

        let recovered = engine.recover_last_auto_save().unwrap().unwrap();
        assert_eq!(recovered.samples, vec![0.75; 160]);
    }

    #[test]
    fn failed_auto_save_does_not_interrupt_recording() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, handle) = engine_in(dir.path());
        fs::create_dir_all(engine.file_store().auto_save_path().join("blocked")).unwrap();

        engine.start_recording_with(AutoSaveOptions::every(1));
        assert!(handle.deliver(&[0.5; 160]));
        thread::sleep(Duration::from_millis(1300));

        assert_eq!(engine.mode(), PipelineMode::Recording);
        assert!(engine.diagnostics().auto_save_failures >= 1);
        assert_eq!(engine.diagnostics().auto_save_snapshots, 0);

        assert!(handle.deliver(&[-0.5; 160]));
        let diagnostics = engine.diagnostics();
        assert_eq!(diagnostics.buffers_delivered, 2);
        assert_eq!(diagnostics.buffers_dropped, 0);

        let result = engine.save_recording("take").unwrap();
        let saved = wav_format::read_wav_file(&result.file_path).unwrap();
        assert_eq!(saved.frame_count(), 320);
    }

    #[test]
    fn recover_without_snapshot_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, _handle) = engine_in(dir.path());
        assert!(engine.recover_last_auto_save().unwrap().is_none());
    }

    #[test]
    fn stale_temp_is_recoverable_after_restart() {
        let dir = tempfile::tempdir().unwrap();
        {
            let (engine, handle) = engine_in(dir.path());
            engine.start_recording(false);
            handle.deliver(&[0.5; 160]);
            engine.stop_recording();
        }

        let (engine, _handle) = engine_in(dir.path());
        assert!(!engine.file_store().temp_path().exists());
        let recovered = engine.recover_last_auto_save().unwrap().unwrap();
        assert_eq!(recovered.frame_count(), 160);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig {
            tap_block_size: 0,
            ..EngineConfig::in_directory(dir.path())
        };
        let result = AudioEngine::new(MockHardware::new(AudioFormat::default()), config);
        assert!(matches!(result, Err(EngineError::InvalidConfiguration(_))));
    }

    #[test]
    fn delete_saved_recording_removes_it() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, handle) = engine_in(dir.path());
        record_take(&engine, &handle, "take");

        engine.delete_saved_recording("take").unwrap();
        assert!(engine.list_saved_recordings().unwrap().is_empty());
        assert!(matches!(
            engine.delete_saved_recording("take"),
            Err(EngineError::SourceMissing(_))
        ));
    }
}
