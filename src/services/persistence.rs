//! Persistence gateway: store snapshots in durable key-value storage.
//!
//! DESIGN
//! ======
//! One record under one fixed application key holds
//! `{ "projects": [...], "signals": [...] }`. The gateway owns the JSON
//! shape; a `StorageBackend` owns the medium. `FileStorage` writes
//! `<dir>/<key>.json` through a temp file and rename so a crash mid-write
//! leaves the previous record intact. `MemoryStorage` backs tests and
//! embedders that do not want disk I/O.
//!
//! ERROR HANDLING
//! ==============
//! A missing record is not an error: `load` returns an empty snapshot.
//! I/O failures are retryable; a record that exists but does not parse is
//! not, and is surfaced rather than silently replaced.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, info};

use crate::state::StoreSnapshot;

// =============================================================================
// ERRORS
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("storage io failed for {key}: {source}")]
    Io {
        key: String,
        #[source]
        source: io::Error,
    },

    #[error("stored record {key} is corrupt: {source}")]
    Corrupt {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("could not encode snapshot: {0}")]
    Encode(#[from] serde_json::Error),
}

impl crate::ErrorCode for PersistenceError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Io { .. } => "E_STORAGE_IO",
            Self::Corrupt { .. } => "E_STORAGE_CORRUPT",
            Self::Encode(_) => "E_STORAGE_ENCODE",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::Io { .. })
    }
}

// =============================================================================
// BACKENDS
// =============================================================================

/// Durable key-value storage for string records.
pub trait StorageBackend {
    /// Read the record under `key`. `Ok(None)` when absent.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the medium could not be read.
    fn load(&self, key: &str) -> io::Result<Option<String>>;

    /// Replace the record under `key`.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the medium could not be written.
    fn save(&self, key: &str, value: &str) -> io::Result<()>;

    /// Remove the record under `key`. Removing an absent record succeeds.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the medium could not be modified.
    fn remove(&self, key: &str) -> io::Result<()>;
}

/// One JSON file per key inside a data directory.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    #[must_use]
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl StorageBackend for FileStorage {
    fn load(&self, key: &str) -> io::Result<Option<String>> {
        match std::fs::read_to_string(self.path_for(key)) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn save(&self, key: &str, value: &str) -> io::Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.path_for(key);
        let tmp = self.dir.join(format!("{key}.json.tmp"));
        std::fs::write(&tmp, value)?;
        std::fs::rename(&tmp, &path)
    }

    fn remove(&self, key: &str) -> io::Result<()> {
        match std::fs::remove_file(self.path_for(key)) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }
}

/// Process-local storage. Clones share the same records.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    records: Arc<Mutex<HashMap<String, String>>>,
    fail_writes: Arc<AtomicBool>,
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent `save`/`remove` calls fail until reset.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::Relaxed);
    }

    /// Raw record under `key`, if any.
    #[must_use]
    pub fn raw(&self, key: &str) -> Option<String> {
        self.records().get(key).cloned()
    }

    fn records(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_writable(&self) -> io::Result<()> {
        if self.fail_writes.load(Ordering::Relaxed) {
            return Err(io::Error::other("memory storage is read-only"));
        }
        Ok(())
    }
}

impl StorageBackend for MemoryStorage {
    fn load(&self, key: &str) -> io::Result<Option<String>> {
        Ok(self.raw(key))
    }

    fn save(&self, key: &str, value: &str) -> io::Result<()> {
        self.check_writable()?;
        self.records().insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove(&self, key: &str) -> io::Result<()> {
        self.check_writable()?;
        self.records().remove(key);
        Ok(())
    }
}

// =============================================================================
// GATEWAY
// =============================================================================

pub struct PersistenceGateway<S> {
    backend: S,
    key: String,
}

impl<S: StorageBackend> PersistenceGateway<S> {
    #[must_use]
    pub fn new(backend: S, key: impl Into<String>) -> Self {
        Self { backend, key: key.into() }
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Read the stored snapshot; an absent record is an empty snapshot.
    ///
    /// # Errors
    ///
    /// Returns `Io` when the backend fails and `Corrupt` when the record does
    /// not parse.
    pub fn load(&self) -> Result<StoreSnapshot, PersistenceError> {
        let raw = self.backend.load(&self.key).map_err(|source| self.io_error(source))?;
        let Some(raw) = raw else {
            debug!(key = %self.key, "persistence: no stored record");
            return Ok(StoreSnapshot::default());
        };
        serde_json::from_str(&raw).map_err(|source| PersistenceError::Corrupt { key: self.key.clone(), source })
    }

    /// # Errors
    ///
    /// Returns `Encode` or `Io` when the snapshot could not be written.
    pub fn save(&self, snapshot: &StoreSnapshot) -> Result<(), PersistenceError> {
        let raw = serde_json::to_string(snapshot)?;
        self.backend.save(&self.key, &raw).map_err(|source| self.io_error(source))?;
        debug!(
            key = %self.key,
            projects = snapshot.projects.len(),
            signals = snapshot.signals.len(),
            bytes = raw.len(),
            "persistence: saved"
        );
        Ok(())
    }

    /// Remove the stored record entirely.
    ///
    /// # Errors
    ///
    /// Returns `Io` when the backend fails.
    pub fn clear(&self) -> Result<(), PersistenceError> {
        self.backend.remove(&self.key).map_err(|source| self.io_error(source))?;
        info!(key = %self.key, "persistence: record removed");
        Ok(())
    }

    fn io_error(&self, source: io::Error) -> PersistenceError {
        PersistenceError::Io { key: self.key.clone(), source }
    }
}

#[cfg(test)]
#[path = "persistence_test.rs"]
mod tests;
