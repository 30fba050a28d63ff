//! Small filesystem helpers shared by the store modules.
//!
//! Every metadata write goes through [`atomic_write`]: write a sibling temp
//! file, fsync it, then rename it over the destination.

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

use crate::constants::TEMP_FILE_PREFIX;
use crate::errors::VersionError;

/// Atomically replace `path` with `bytes`.
pub fn atomic_write(path: &Path, bytes: &[u8]) -> Result<(), VersionError> {
    let parent = path
        .parent()
        .ok_or_else(|| VersionError::InvalidPath(path.display().to_string()))?;
    fs::create_dir_all(parent).map_err(|e| VersionError::io(parent, e))?;

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("file");
    let tmp = parent.join(format!("{}{}-{}", TEMP_FILE_PREFIX, Uuid::new_v4(), file_name));

    let result = (|| -> std::io::Result<()> {
        let mut file = File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        fs::rename(&tmp, path)
    })();

    if let Err(e) = result {
        let _ = fs::remove_file(&tmp);
        return Err(VersionError::io(path, e));
    }

    sync_dir(parent);
    Ok(())
}

/// Serialize `value` as pretty JSON and write it atomically.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), VersionError> {
    let json = serde_json::to_vec_pretty(value)?;
    atomic_write(path, &json)
}

/// Read and parse a JSON file.
///
/// Parse failures are reported as [`VersionError::Corruption`].
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, VersionError> {
    let bytes = fs::read(path).map_err(|e| VersionError::io(path, e))?;
    serde_json::from_slice(&bytes).map_err(|e| VersionError::corrupt(path, e))
}

/// Write a file and fsync it (no rename).
pub fn write_synced(path: &Path, bytes: &[u8]) -> Result<(), VersionError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| VersionError::io(parent, e))?;
    }
    let mut file = File::create(path).map_err(|e| VersionError::io(path, e))?;
    file.write_all(bytes)
        .and_then(|_| file.sync_all())
        .map_err(|e| VersionError::io(path, e))
}

/// Remove a file, treating "not found" as success.
pub fn remove_file_if_exists(path: &Path) -> Result<(), VersionError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(VersionError::io(path, e)),
    }
}

/// Remove empty directories from `start` upward, stopping at `stop`.
pub fn prune_empty_dirs(start: &Path, stop: &Path) {
    let mut current = start.to_path_buf();
    while current != stop && current.starts_with(stop) {
        if fs::remove_dir(&current).is_err() {
            break;
        }
        match current.parent() {
            Some(parent) => current = parent.to_path_buf(),
            None => break,
        }
    }
}

/// Best-effort fsync of a directory so renames inside it are durable.
pub fn sync_dir(dir: &Path) {
    #[cfg(unix)]
    {
        if let Ok(handle) = File::open(dir) {
            let _ = handle.sync_all();
        }
    }
    #[cfg(not(unix))]
    {
        let _ = dir;
    }
}
