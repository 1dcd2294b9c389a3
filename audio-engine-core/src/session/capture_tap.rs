use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};

use crate::models::audio_models::AudioBuffer;
use crate::models::error::EngineError;
use crate::storage::capture_file::CaptureFile;
use crate::traits::audio_hardware::{AudioHardware, TapCallback};
use crate::traits::engine_delegate::EngineDelegate;

/// Longest the audio thread waits for the capture file lock before
/// dropping a buffer.
pub const WRITE_LOCK_TIMEOUT: Duration = Duration::from_millis(2);

/// Shared slot holding the delegate; read on the audio thread.
pub type DelegateSlot = Arc<RwLock<Option<Arc<dyn EngineDelegate>>>>;

/// Shared slot holding the open capture file while recording.
pub type CaptureSlot = Arc<Mutex<Option<CaptureFile>>>;

/// Which configuration the input tap was installed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TapRole {
    Streaming,
    Recording,
}

/// Where tapped buffers go.
pub enum TapSink {
    /// Forward to the delegate's buffer event.
    Delegate(DelegateSlot),
    /// Append to the capture file.
    File(CaptureSlot),
}

/// Counters updated from the audio thread.
#[derive(Debug, Default)]
pub struct TapStats {
    pub delivered: AtomicU64,
    pub dropped: AtomicU64,
    pub frames: AtomicU64,
}

/// The single interception point on the hardware input.
pub struct CaptureTap {
    role: Option<TapRole>,
    block_size: usize,
    stats: Arc<TapStats>,
}

impl CaptureTap {
    pub fn new(block_size: usize) -> Self {
        Self {
            role: None,
            block_size,
            stats: Arc::new(TapStats::default()),
        }
    }

    pub fn role(&self) -> Option<TapRole> {
        self.role
    }

    pub fn stats(&self) -> &Arc<TapStats> {
        &self.stats
    }

    /// Install the tap in `role` and start the hardware engine.
    ///
    /// A no-op when the tap already runs in the same role. On failure the
    /// tap is removed again and nothing stays installed.
    pub fn start<H: AudioHardware>(
        &mut self,
        hardware: &mut H,
        role: TapRole,
        sink: TapSink,
    ) -> Result<(), EngineError> {
        if self.role == Some(role) && hardware.is_running() {
            log::debug!("Input tap already running as {:?}", role);
            return Ok(());
        }
        if self.role.is_some() {
            self.stop(hardware);
        }

        let format = hardware.input_format()?;
        let callback = self.make_callback(sink);
        hardware.install_tap(self.block_size, format, callback)?;
        hardware.prepare();

        if let Err(e) = hardware.start() {
            log::error!("Input engine failed to start: {}", e);
            hardware.remove_tap();
            return Err(match e {
                EngineError::EngineStartFailed(_) => e,
                other => EngineError::EngineStartFailed(other.to_string()),
            });
        }

        log::info!(
            "Input tap started as {:?} ({} Hz, {} ch, {} frames/buffer)",
            role,
            format.sample_rate,
            format.channels,
            self.block_size
        );
        self.role = Some(role);
        Ok(())
    }

    /// Remove the tap and stop the hardware engine. No-op when not installed.
    ///
    /// The controller guarantees no other mode holds the engine while the
    /// tap is installed, so stopping it here is always safe.
    pub fn stop<H: AudioHardware>(&mut self, hardware: &mut H) {
        let Some(role) = self.role.take() else {
            return;
        };
        hardware.remove_tap();
        hardware.stop();
        log::info!("Input tap stopped ({:?})", role);
    }

    fn make_callback(&self, sink: TapSink) -> TapCallback {
        let stats = Arc::clone(&self.stats);
        match sink {
            TapSink::Delegate(delegate) => Arc::new(move |buffer: &AudioBuffer| {
                stats.delivered.fetch_add(1, Ordering::Relaxed);
                stats.frames.fetch_add(buffer.frame_count() as u64, Ordering::Relaxed);
                if let Some(delegate) = delegate.read().as_ref() {
                    delegate.on_buffer_delivered(buffer, buffer.time);
                }
            }),
            TapSink::File(capture) => Arc::new(move |buffer: &AudioBuffer| {
                let Some(mut guard) = capture.try_lock_for(WRITE_LOCK_TIMEOUT) else {
                    log::warn!("Capture file busy, dropping buffer at frame {}", buffer.time.sample_time);
                    stats.dropped.fetch_add(1, Ordering::Relaxed);
                    return;
                };
                let Some(file) = guard.as_mut() else {
                    stats.dropped.fetch_add(1, Ordering::Relaxed);
                    return;
                };
                match file.append(buffer) {
                    Ok(()) => {
                        stats.delivered.fetch_add(1, Ordering::Relaxed);
                        stats.frames.fetch_add(buffer.frame_count() as u64, Ordering::Relaxed);
                    }
                    Err(e) => {
                        log::error!("Failed to write audio data: {}", e);
                        stats.dropped.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::mock::MockHardware;
    use crate::models::audio_models::{AudioFormat, AudioTime};
    use crate::models::error::EngineError;
    use crate::models::mode::PipelineMode;
    use crate::processing::wav_format;

    #[derive(Default)]
    struct CountingDelegate {
        buffers: AtomicU64,
    }

    impl EngineDelegate for CountingDelegate {
        fn on_mode_changed(&self, _mode: PipelineMode) {}
        fn on_error(&self, _error: &EngineError) {}
        fn on_buffer_delivered(&self, _buffer: &AudioBuffer, _time: AudioTime) {
            self.buffers.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn streaming_forwards_to_delegate() {
        let mut hardware = MockHardware::new(AudioFormat::new(16000, 1));
        let handle = hardware.handle();
        let delegate = Arc::new(CountingDelegate::default());
        let slot: DelegateSlot = Arc::new(RwLock::new(Some(delegate.clone() as Arc<dyn EngineDelegate>)));

        let mut tap = CaptureTap::new(256);
        tap.start(&mut hardware, TapRole::Streaming, TapSink::Delegate(slot)).unwrap();
        assert_eq!(handle.snapshot().tap_block_size, Some(256));

        handle.deliver(&[0.1; 256]);
        handle.deliver(&[0.1; 256]);
        assert_eq!(delegate.buffers.load(Ordering::SeqCst), 2);
        assert_eq!(tap.stats().frames.load(Ordering::SeqCst), 512);
    }

    #[test]
    fn same_role_start_is_noop() {
        let mut hardware = MockHardware::new(AudioFormat::default());
        let handle = hardware.handle();
        let slot: DelegateSlot = Arc::new(RwLock::new(None));

        let mut tap = CaptureTap::new(64);
        tap.start(&mut hardware, TapRole::Streaming, TapSink::Delegate(slot.clone())).unwrap();
        tap.start(&mut hardware, TapRole::Streaming, TapSink::Delegate(slot)).unwrap();
        assert_eq!(handle.snapshot().start_count, 1);
    }

    #[test]
    fn recording_appends_to_capture_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("temp.wav");
        let format = AudioFormat::new(16000, 1);
        let mut hardware = MockHardware::new(format);
        let handle = hardware.handle();
        let capture: CaptureSlot = Arc::new(Mutex::new(Some(CaptureFile::create(path.clone(), format).unwrap())));

        let mut tap = CaptureTap::new(4);
        tap.start(&mut hardware, TapRole::Recording, TapSink::File(capture.clone())).unwrap();
        handle.deliver(&[0.5, 0.25, 0.0, -0.25]);
        tap.stop(&mut hardware);

        capture.lock().as_mut().unwrap().finalize().unwrap();
        let decoded = wav_format::read_wav_file(&path).unwrap();
        assert_eq!(decoded.samples, vec![0.5, 0.25, 0.0, -0.25]);
    }

    #[test]
    fn busy_capture_file_drops_buffer() {
        let dir = tempfile::tempdir().unwrap();
        let format = AudioFormat::new(16000, 1);
        let mut hardware = MockHardware::new(format);
        let handle = hardware.handle();
        let capture: CaptureSlot = Arc::new(Mutex::new(Some(
            CaptureFile::create(dir.path().join("temp.wav"), format).unwrap(),
        )));

        let mut tap = CaptureTap::new(4);
        tap.start(&mut hardware, TapRole::Recording, TapSink::File(capture.clone())).unwrap();

        let guard = capture.lock();
        handle.deliver(&[0.0; 4]);
        drop(guard);

        assert_eq!(tap.stats().dropped.load(Ordering::SeqCst), 1);
        assert_eq!(tap.stats().delivered.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn write_failure_drops_buffer_and_keeps_tapping() {
        let dir = tempfile::tempdir().unwrap();
        let format = AudioFormat::new(16000, 1);
        let mut hardware = MockHardware::new(format);
        let handle = hardware.handle();
        let stereo = CaptureFile::create(dir.path().join("stereo.wav"), AudioFormat::new(16000, 2)).unwrap();
        let capture: CaptureSlot = Arc::new(Mutex::new(Some(stereo)));

        let mut tap = CaptureTap::new(4);
        tap.start(&mut hardware, TapRole::Recording, TapSink::File(capture.clone())).unwrap();
        handle.deliver(&[0.1; 4]);
        handle.deliver(&[0.2; 4]);
        assert_eq!(tap.stats().dropped.load(Ordering::SeqCst), 2);
        assert_eq!(tap.stats().delivered.load(Ordering::SeqCst), 0);

        let path = dir.path().join("mono.wav");
        *capture.lock() = Some(CaptureFile::create(path.clone(), format).unwrap());
        handle.deliver(&[0.3; 4]);
        tap.stop(&mut hardware);

        assert_eq!(tap.stats().dropped.load(Ordering::SeqCst), 2);
        assert_eq!(tap.stats().delivered.load(Ordering::SeqCst), 1);
        capture.lock().as_mut().unwrap().finalize().unwrap();
        assert_eq!(wav_format::read_wav_file(&path).unwrap().samples, vec![0.3; 4]);
    }

    #[test]
    fn start_failure_removes_tap() {
        let mut hardware = MockHardware::new(AudioFormat::default());
        let handle = hardware.handle();
        handle.set_fail_start(true);

        let mut tap = CaptureTap::new(64);
        let result = tap.start(&mut hardware, TapRole::Streaming, TapSink::Delegate(Arc::new(RwLock::new(None))));

        assert!(matches!(result, Err(EngineError::EngineStartFailed(_))));
        assert_eq!(tap.role(), None);
        assert_eq!(handle.snapshot().tap_block_size, None);
    }

    #[test]
    fn stop_is_idempotent() {
        let mut hardware = MockHardware::new(AudioFormat::default());
        let handle = hardware.handle();
        let mut tap = CaptureTap::new(64);
        tap.start(&mut hardware, TapRole::Streaming, TapSink::Delegate(Arc::new(RwLock::new(None)))).unwrap();

        tap.stop(&mut hardware);
        tap.stop(&mut hardware);
        assert_eq!(handle.snapshot().stop_count, 1);
        assert!(!handle.snapshot().running);
    }
}
