//! Per-root mutual exclusion for render and extract.
//!
//! Both operations take an exclusive advisory lock on
//! `<root>/.stuart/sync.lock` for their whole duration, so a render never
//! interleaves with an extract of the same tree (from this process or
//! another one).

use crate::config::STATE_DIR;
use crate::error::{Error, Result};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::debug;

/// Held sync lock; released on drop.
#[derive(Debug)]
pub struct SyncLock {
    file: File,
    path: PathBuf,
}

impl SyncLock {
    /// Block until the lock for `root` is free, then take it.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock file cannot be created or locked.
    pub fn acquire(root: &Path) -> Result<Self> {
        let path = lock_path_for_root(root);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .map_err(|err| Error::Other(format!("open sync lock {}: {err}", path.display())))?;

        let start = Instant::now();
        file.lock_exclusive()
            .map_err(|err| Error::Other(format!("acquire sync lock {}: {err}", path.display())))?;
        debug!(
            path = %path.display(),
            wait_ms = start.elapsed().as_millis(),
            "Acquired sync lock"
        );

        Ok(Self { file, path })
    }

    /// Lock file location.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for SyncLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

fn lock_path_for_root(root: &Path) -> PathBuf {
    root.join(STATE_DIR).join("sync.lock")
}
