//! # Persisted Conversion Counter
//!
//! A single non-negative integer, stored as plain decimal text, counting
//! successful conversions across restarts.
//!
//! ## Guarantees
//!
//! - Reads never fail: a missing, empty, or unparseable file reads as `0`.
//! - Every read and every read-modify-write runs under one
//!   `parking_lot::Mutex`, so concurrent increments cannot lose updates.
//! - Writes go to a temp file in the same directory which is then renamed
//!   over the counter file. The file is always either the old value or the
//!   new one, never a partial write.

use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use thiserror::Error;

/// Error raised when the incremented value cannot be made durable.
#[derive(Error, Debug)]
pub enum CounterError {
    /// Writing or renaming the counter file failed.
    #[error("failed to persist conversion count: {0}")]
    Persist(#[from] std::io::Error),
}

/// Durable success counter with serialized access.
#[derive(Debug)]
pub struct PersistentCounter {
    path: PathBuf,
    lock: Mutex<()>,
}

impl PersistentCounter {
    /// Create a counter backed by the file at `path`. The file need not exist.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Return the last durably stored value, or `0` if there is none.
    pub fn read(&self) -> u64 {
        let _guard = self.lock.lock();
        self.read_unlocked()
    }

    /// Add one to the stored value, persist it, and return the new value.
    pub fn increment(&self) -> Result<u64, CounterError> {
        let _guard = self.lock.lock();
        let next = self.read_unlocked().saturating_add(1);
        self.write_unlocked(next)?;
        tracing::debug!(count = next, "conversion counter incremented");
        Ok(next)
    }

    fn read_unlocked(&self) -> u64 {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw.trim().parse().unwrap_or(0),
            Err(_) => 0,
        }
    }

    fn write_unlocked(&self, value: u64) -> Result<(), CounterError> {
        let parent = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
        tmp.write_all(value.to_string().as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }
}
