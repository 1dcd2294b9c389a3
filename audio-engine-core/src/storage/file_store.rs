use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::models::config::EngineConfig;
use crate::models::error::EngineError;

/// File operations between the temporary capture file, the auto-save
/// snapshot, and caller-named recordings in the documents directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    temp_path: PathBuf,
    auto_save_path: PathBuf,
    documents_directory: PathBuf,
    extension: String,
}

impl FileStore {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            temp_path: config.temp_file_path(),
            auto_save_path: config.auto_save_path(),
            documents_directory: config.documents_directory.clone(),
            extension: config.file_extension.clone(),
        }
    }

    pub fn temp_path(&self) -> &Path {
        &self.temp_path
    }

    pub fn auto_save_path(&self) -> &Path {
        &self.auto_save_path
    }

    /// Location of the saved recording called `name`.
    pub fn saved_recording_path(&self, name: &str) -> PathBuf {
        self.documents_directory
            .join(format!("{}.{}", name, self.extension))
    }

    pub fn saved_recording_exists(&self, name: &str) -> bool {
        self.saved_recording_path(name).is_file()
    }

    /// Names of saved recordings, sorted.
    pub fn list_saved_recordings(&self) -> Result<Vec<String>, EngineError> {
        let entries = match fs::read_dir(&self.documents_directory) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(EngineError::Storage(format!("failed to list recordings: {}", e))),
        };

        let mut names: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file())
            .filter(|path| path.extension().and_then(|e| e.to_str()) == Some(self.extension.as_str()))
            .filter_map(|path| path.file_stem().and_then(|s| s.to_str()).map(String::from))
            .collect();
        names.sort();
        Ok(names)
    }

    /// Delete a saved recording and its metadata sidecar.
    pub fn delete_saved_recording(&self, name: &str) -> Result<(), EngineError> {
        let path = self.saved_recording_path(name);
        if !path.exists() {
            return Err(EngineError::SourceMissing(path.display().to_string()));
        }
        fs::remove_file(&path)
            .map_err(|e| EngineError::Storage(format!("failed to delete {}: {}", path.display(), e)))?;

        let sidecar = super::metadata::metadata_path(&path);
        if sidecar.exists() {
            if let Err(e) = fs::remove_file(&sidecar) {
                log::warn!("Failed to delete metadata {}: {}", sidecar.display(), e);
            }
        }
        Ok(())
    }

    /// Move `src` to `dst` by copy-then-delete.
    ///
    /// An existing `dst` is replaced. Failing to delete `src` afterwards is
    /// logged and tolerated; the stale file is cleaned up at the next engine
    /// construction.
    pub fn save(&self, src: &Path, dst: &Path) -> Result<(), EngineError> {
        self.copy_replacing(src, dst)?;

        match fs::remove_file(src) {
            Ok(()) => log::debug!("Removed {}", src.display()),
            Err(e) => log::warn!(
                "Cannot delete {} after copy, removing at next launch: {}",
                src.display(),
                e
            ),
        }
        Ok(())
    }

    /// Copy `src` over `dst`, keeping `src`.
    pub fn snapshot(&self, src: &Path, dst: &Path) -> Result<(), EngineError> {
        self.copy_replacing(src, dst)
    }

    fn copy_replacing(&self, src: &Path, dst: &Path) -> Result<(), EngineError> {
        if !src.is_file() {
            return Err(EngineError::SourceMissing(src.display().to_string()));
        }

        if dst.exists() {
            if let Err(e) = fs::remove_file(dst) {
                log::warn!("Cannot remove existing {}: {}", dst.display(), e);
            }
        }

        if let Some(parent) = dst.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| EngineError::CopyFailed(format!("failed to create {}: {}", parent.display(), e)))?;
        }

        fs::copy(src, dst).map_err(|e| {
            EngineError::CopyFailed(format!("{} -> {}: {}", src.display(), dst.display(), e))
        })?;
        Ok(())
    }

    /// Promote a temp file left by a previous run into the auto-save slot,
    /// so it stays recoverable and the temp location starts clean.
    ///
    /// If the copy fails the temp file is left in place and promotion is
    /// retried at the next construction. Returns whether a stale file was
    /// found.
    pub fn recover_stale_temp(&self) -> bool {
        if !self.temp_path.is_file() {
            return false;
        }
        log::info!("Found stale capture file {}", self.temp_path.display());
        if let Err(e) = self.save(&self.temp_path, &self.auto_save_path) {
            log::warn!(
                "Failed to promote stale capture file, keeping {}: {}",
                self.temp_path.display(),
                e
            );
        }
        true
    }
}

/// Compute SHA-256 hex digest of a file, streaming its contents.
pub fn sha256_file(path: &Path) -> Result<String, EngineError> {
    let file = File::open(path)
        .map_err(|e| EngineError::Storage(format!("failed to open file for checksum: {}", e)))?;
    let mut hasher = Sha256::new();
    io::copy(&mut BufReader::new(file), &mut hasher)
        .map_err(|e| EngineError::Storage(format!("failed to read file for checksum: {}", e)))?;
    Ok(hex_encode(&hasher.finalize()))
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
