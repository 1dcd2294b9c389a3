use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use crate::models::config::AutoSaveOptions;
use crate::models::error::EngineError;
use crate::session::capture_tap::CaptureSlot;
use crate::storage::file_store::FileStore;

/// Shared enable flag of the auto-save task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AutoSaveState {
    pub enabled: bool,
    pub interval_secs: u32,
    generation: u64,
}

#[derive(Debug, Default)]
struct AutoSaveStats {
    snapshots: AtomicU64,
    failures: AtomicU64,
}

/// Periodic snapshot of the in-progress capture file.
///
/// Each arming spawns one "auto-save" thread that sleeps for the interval,
/// then re-checks the flag under the state lock and snapshots while still
/// holding it. A thread exits once the flag is cleared, a newer arming
/// supersedes it, or the capture file is closed. Disarming therefore takes
/// effect after at most one interval, and no snapshot starts after
/// [`AutoSaveTask::disarm`] returns.
pub struct AutoSaveTask {
    state: Arc<Mutex<AutoSaveState>>,
    stats: Arc<AutoSaveStats>,
}

impl AutoSaveTask {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(AutoSaveState::default())),
            stats: Arc::new(AutoSaveStats::default()),
        }
    }

    pub fn state(&self) -> AutoSaveState {
        *self.state.lock()
    }

    pub fn is_enabled(&self) -> bool {
        self.state.lock().enabled
    }

    pub fn snapshots(&self) -> u64 {
        self.stats.snapshots.load(Ordering::Relaxed)
    }

    pub fn failures(&self) -> u64 {
        self.stats.failures.load(Ordering::Relaxed)
    }

    /// Start snapshotting `capture` according to `options`.
    ///
    /// Disabled options only disarm. A zero interval is treated as one second.
    pub fn arm(&self, options: AutoSaveOptions, capture: CaptureSlot, store: FileStore) {
        if !options.enabled {
            self.disarm();
            return;
        }

        let interval_secs = options.interval_secs.max(1);
        let generation = {
            let mut state = self.state.lock();
            state.enabled = true;
            state.interval_secs = interval_secs;
            state.generation = state.generation.wrapping_add(1);
            state.generation
        };

        let state = Arc::clone(&self.state);
        let stats = Arc::clone(&self.stats);
        let interval = Duration::from_secs(interval_secs as u64);

        let spawned = thread::Builder::new()
            .name("auto-save".into())
            .spawn(move || {
                log::debug!("Auto-save armed every {}s (generation {})", interval_secs, generation);
                loop {
                    thread::sleep(interval);

                    let guard = state.lock();
                    if !guard.enabled || guard.generation != generation {
                        log::debug!("Auto-save generation {} stopped", generation);
                        break;
                    }
                    match snapshot_once(&capture, &store) {
                        Ok(true) => {
                            let count = stats.snapshots.fetch_add(1, Ordering::Relaxed) + 1;
                            log::info!("Auto-saved recording ({} snapshots)", count);
                        }
                        Ok(false) => {
                            log::debug!("Recording ended, auto-save generation {} exiting", generation);
                            break;
                        }
                        Err(e) => {
                            log::error!("Auto-save failed: {}", e);
                            stats.failures.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                    drop(guard);
                }
            });

        if let Err(e) = spawned {
            log::error!("Failed to spawn auto-save thread: {}", e);
            self.stats.failures.fetch_add(1, Ordering::Relaxed);
            self.state.lock().enabled = false;
        }
    }

    /// Clear the flag. Blocks while a snapshot is being written.
    pub fn disarm(&self) {
        let mut state = self.state.lock();
        if state.enabled {
            log::debug!("Auto-save disarmed");
        }
        state.enabled = false;
    }
}

impl Default for AutoSaveTask {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for AutoSaveTask {
    fn drop(&mut self) {
        self.disarm();
    }
}

/// Sync the capture header and copy the file to the auto-save slot.
///
/// Returns `Ok(false)` when no capture file is open.
fn snapshot_once(capture: &CaptureSlot, store: &FileStore) -> Result<bool, EngineError> {
    {
        let mut guard = capture.lock();
        match guard.as_mut() {
            Some(file) if file.is_open() => file.sync_header()?,
            _ => return Ok(false),
        }
    }
    store.snapshot(store.temp_path(), store.auto_save_path())?;
    Ok(true)
}
