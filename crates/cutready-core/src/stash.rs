//! Single-slot stash of uncommitted work.
//!
//! The slot lives in `.cutready/versions/stash/` as `stash.json` plus a
//! `files/` copy of the working tree. Pushing assembles the slot under
//! `staging/` and renames it into place; pushing over an occupied slot is
//! rejected.

use std::fs;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::commit_store::{join_relative, CommitId};
use crate::constants::{FILES_DIR, STASH_META_FILENAME};
use crate::errors::VersionError;
use crate::fsutil;
use crate::project::Project;
use crate::tree::{Manifest, Tree};

/// Metadata of the stash slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StashInfo {
    /// Commit the working tree was compared against when stashed.
    pub from_commit_id: Option<CommitId>,
    /// Timeline that was active when stashed.
    pub timeline_name: String,
    pub created_at: DateTime<Utc>,
    pub manifest: Manifest,
}

impl StashInfo {
    pub fn file_count(&self) -> usize {
        self.manifest.len()
    }
}

/// A stash loaded from disk.
#[derive(Debug, Clone)]
pub struct Stash {
    pub info: StashInfo,
    pub tree: Tree,
}

/// Manages the stash slot.
#[derive(Debug)]
pub struct StashManager {
    stash_dir: PathBuf,
    staging_dir: PathBuf,
}

impl StashManager {
    pub fn new(project: &Project) -> Self {
        Self {
            stash_dir: project.stash_dir(),
            staging_dir: project.staging_dir(),
        }
    }

    fn meta_path(&self) -> PathBuf {
        self.stash_dir.join(STASH_META_FILENAME)
    }

    /// Whether a stash is held.
    pub fn exists(&self) -> bool {
        self.meta_path().is_file()
    }

    /// Metadata of the held stash, if any.
    pub fn peek(&self) -> Result<Option<StashInfo>, VersionError> {
        if !self.exists() {
            return Ok(None);
        }
        fsutil::read_json(&self.meta_path()).map(Some)
    }

    /// Store `tree` in the slot.
    ///
    /// # Errors
    ///
    /// Returns [`VersionError::StashAlreadyExists`] if the slot is occupied.
    pub fn push(
        &self,
        tree: &Tree,
        from_commit_id: Option<&CommitId>,
        timeline_name: &str,
    ) -> Result<StashInfo, VersionError> {
        if let Some(existing) = self.peek()? {
            return Err(VersionError::StashAlreadyExists {
                from_commit: existing
                    .from_commit_id
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "an empty project".to_string()),
            });
        }

        let info = StashInfo {
            from_commit_id: from_commit_id.cloned(),
            timeline_name: timeline_name.to_string(),
            created_at: Utc::now(),
            manifest: tree.manifest(),
        };

        let staging = self.staging_dir.join(Uuid::new_v4().to_string());
        let result = (|| -> Result<(), VersionError> {
            let files_dir = staging.join(FILES_DIR);
            fs::create_dir_all(&files_dir).map_err(|e| VersionError::io(&files_dir, e))?;
            for (rel, content) in tree.iter() {
                fsutil::write_synced(&join_relative(&files_dir, rel)?, content)?;
            }
            fsutil::write_synced(
                &staging.join(STASH_META_FILENAME),
                &serde_json::to_vec_pretty(&info)?,
            )?;

            // A directory without metadata is a leftover from a failed drop.
            if self.stash_dir.exists() {
                fs::remove_dir_all(&self.stash_dir)
                    .map_err(|e| VersionError::io(&self.stash_dir, e))?;
            }
            fs::rename(&staging, &self.stash_dir).map_err(|e| VersionError::io(&self.stash_dir, e))
        })();

        if let Err(e) = result {
            let _ = fs::remove_dir_all(&staging);
            return Err(e);
        }

        tracing::debug!("Stashed {} files", info.file_count());
        Ok(info)
    }

    /// Read the held stash without removing it.
    ///
    /// # Errors
    ///
    /// Returns [`VersionError::NoStashToPop`] if the slot is empty.
    pub fn load(&self) -> Result<Stash, VersionError> {
        let info = self.peek()?.ok_or(VersionError::NoStashToPop)?;
        let files_dir = self.stash_dir.join(FILES_DIR);
        let mut tree = Tree::new();
        for rel in info.manifest.keys() {
            let path = join_relative(&files_dir, rel)?;
            let content = fs::read(&path).map_err(|e| VersionError::corrupt(&path, e))?;
            tree.insert(rel.clone(), content);
        }
        Ok(Stash { info, tree })
    }

    /// Empty the slot.
    pub fn clear(&self) -> Result<(), VersionError> {
        if !self.stash_dir.exists() {
            return Ok(());
        }
        // Drop the metadata first so a crash mid-removal reads as empty.
        fsutil::remove_file_if_exists(&self.meta_path())?;
        fs::remove_dir_all(&self.stash_dir).map_err(|e| VersionError::io(&self.stash_dir, e))
    }

    /// Take the stash out of the slot.
    pub fn pop(&self) -> Result<Stash, VersionError> {
        let stash = self.load()?;
        self.clear()?;
        Ok(stash)
    }
}
