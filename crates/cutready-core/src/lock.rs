//! Per-project write lock.
//!
//! Every mutating engine operation holds `.cutready/versions/LOCK` for its
//! duration. The file is created with `create_new`, so exactly one process
//! wins; it carries the holder's pid and acquisition time. A lock older than
//! [`LOCK_STALE_SECS`] is treated as left behind by a crashed process and
//! removed.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration as StdDuration;
use std::time::Instant;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::{LOCK_STALE_SECS, LOCK_WAIT_MS};
use crate::errors::VersionError;

const POLL_INTERVAL: StdDuration = StdDuration::from_millis(20);

/// Contents of the lock file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockMeta {
    pub pid: u32,
    pub acquired_at: DateTime<Utc>,
}

/// Held write lock; released on drop.
#[derive(Debug)]
pub struct ProjectLock {
    path: PathBuf,
    released: bool,
}

impl ProjectLock {
    /// Acquire the lock at `path`, waiting up to [`LOCK_WAIT_MS`].
    ///
    /// # Errors
    ///
    /// Returns [`VersionError::ProjectBusy`] if another holder keeps the lock
    /// for the whole wait.
    pub fn acquire(path: &Path) -> Result<Self, VersionError> {
        Self::acquire_with(
            path,
            StdDuration::from_millis(LOCK_WAIT_MS),
            Duration::seconds(LOCK_STALE_SECS),
        )
    }

    /// Acquire with an explicit wait and staleness threshold.
    pub fn acquire_with(
        path: &Path,
        wait: StdDuration,
        stale_after: Duration,
    ) -> Result<Self, VersionError> {
        let deadline = Instant::now() + wait;
        loop {
            match open_new_lock_file(path) {
                Ok(mut file) => {
                    let meta = LockMeta {
                        pid: std::process::id(),
                        acquired_at: Utc::now(),
                    };
                    let written = serde_json::to_vec(&meta)
                        .map_err(io::Error::from)
                        .and_then(|bytes| file.write_all(&bytes))
                        .and_then(|_| file.sync_all());
                    if let Err(e) = written {
                        let _ = fs::remove_file(path);
                        return Err(VersionError::io(path, e));
                    }
                    tracing::trace!("Acquired project lock {}", path.display());
                    return Ok(Self {
                        path: path.to_path_buf(),
                        released: false,
                    });
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
                Err(e) => return Err(VersionError::io(path, e)),
            }

            let holder = read_lock_meta(path);
            if is_stale(path, holder.as_ref(), stale_after) {
                tracing::warn!(
                    "Removing stale project lock {} (pid {})",
                    path.display(),
                    holder
                        .as_ref()
                        .map(|m| m.pid.to_string())
                        .unwrap_or_else(|| "unknown".to_string())
                );
                match fs::remove_file(path) {
                    Ok(()) => continue,
                    Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                    Err(e) => return Err(VersionError::io(path, e)),
                }
            }

            if Instant::now() >= deadline {
                return Err(VersionError::ProjectBusy {
                    path: path.to_path_buf(),
                    holder: holder.map(|m| m.pid),
                });
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Release the lock, reporting removal failures.
    pub fn release(mut self) -> Result<(), VersionError> {
        self.released = true;
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(VersionError::io(&self.path, e)),
        }
    }
}

impl Drop for ProjectLock {
    fn drop(&mut self) {
        if !self.released {
            let _ = fs::remove_file(&self.path);
        }
    }
}

fn open_new_lock_file(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    OpenOptions::new().write(true).create_new(true).open(path)
}

/// Holder metadata, or `None` if the file is gone or half-written.
pub fn read_lock_meta(path: &Path) -> Option<LockMeta> {
    let bytes = fs::read(path).ok()?;
    serde_json::from_slice(&bytes).ok()
}

fn is_stale(path: &Path, holder: Option<&LockMeta>, stale_after: Duration) -> bool {
    let acquired_at = match holder {
        Some(meta) => meta.acquired_at,
        // A holder may be between create and write; fall back to the file mtime.
        None => match fs::metadata(path).and_then(|m| m.modified()) {
            Ok(modified) => DateTime::<Utc>::from(modified),
            Err(_) => return false,
        },
    };
    Utc::now().signed_duration_since(acquired_at) > stale_after
}
