//! Single-instance process lock.
//!
//! An exclusive file lock bound to a deterministic path derived from the
//! configured lock name. Held for the process lifetime; the OS releases it
//! when the process exits, so there is no explicit unlock step.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::errors::{EtlError, Result};

/// Exclusive per-host lock for one logical pipeline name.
#[derive(Debug)]
pub struct ProcessLock {
    // Keeps the descriptor (and with it the lock) alive until drop.
    _file: File,
    path: PathBuf,
}

impl ProcessLock {
    /// Acquire the lock for `name`, failing immediately if another process
    /// (or another handle in this process) already holds it.
    ///
    /// # Errors
    ///
    /// Returns [`EtlError::AlreadyRunning`] on contention, or
    /// [`EtlError::Fatal`] if the lock file can't be created.
    pub fn acquire(name: &str) -> Result<Self> {
        let path = Self::lock_path(name);
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| {
                EtlError::Fatal(anyhow::anyhow!(
                    "cannot create lock file {}: {e}",
                    path.display()
                ))
            })?;

        file.try_lock_exclusive()
            .map_err(|_| EtlError::AlreadyRunning)?;

        Ok(Self { _file: file, path })
    }

    /// Path of the lock file backing this lock.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("{name}.lock"))
    }
}
