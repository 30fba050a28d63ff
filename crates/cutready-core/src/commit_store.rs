//! Immutable commit storage.
//!
//! Each commit lives in its own directory under `.cutready/versions/commits/`:
//!
//! ```text
//! commits/00000003/
//!   commit.json        metadata + manifest
//!   files/...          full copy of the tracked files
//!   editor_state.bin   optional annex
//! ```
//!
//! New commits are assembled under `staging/<uuid>/`, fsynced, and renamed into
//! place in one step, so a commit directory is either complete or absent.

use std::fs;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::{COMMIT_ID_WIDTH, COMMIT_META_FILENAME, EDITOR_STATE_FILENAME, FILES_DIR};
use crate::errors::VersionError;
use crate::fsutil;
use crate::project::Project;
use crate::tree::{Manifest, Tree};

/// How many successive ids `put` tries before giving up.
pub const MAX_ID_ATTEMPTS: usize = 32;

// ============================================================================
// CommitId
// ============================================================================

/// Identifier of a commit.
///
/// Ids are a monotonic sequence rendered as zero-padded decimal strings, so
/// lexicographic order equals creation order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommitId(String);

impl CommitId {
    /// Build the id for a sequence number.
    pub fn from_seq(seq: u64) -> Self {
        Self(format!("{:0width$}", seq, width = COMMIT_ID_WIDTH))
    }

    /// Parse user input such as `3` or `00000003`.
    ///
    /// # Errors
    ///
    /// Returns [`VersionError::CommitNotFound`] if the input is not a sequence number.
    pub fn parse(input: &str) -> Result<Self, VersionError> {
        let trimmed = input.trim();
        if trimmed.is_empty() || !trimmed.chars().all(|c| c.is_ascii_digit()) {
            return Err(VersionError::CommitNotFound(input.to_string()));
        }
        trimmed
            .parse::<u64>()
            .map(Self::from_seq)
            .map_err(|_| VersionError::CommitNotFound(input.to_string()))
    }

    /// The sequence number encoded in this id.
    pub fn seq(&self) -> Option<u64> {
        self.0.parse().ok()
    }

    /// Get the commit id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form without leading zeros, used in messages.
    pub fn short(&self) -> String {
        self.seq()
            .map(|s| s.to_string())
            .unwrap_or_else(|| self.0.clone())
    }
}

impl std::fmt::Display for CommitId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for CommitId {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for CommitId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// ============================================================================
// Commit
// ============================================================================

/// Metadata of a stored commit (`commit.json`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Commit {
    pub id: CommitId,
    pub parent_id: Option<CommitId>,
    /// Timeline the commit was created on.
    pub timeline_name: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    /// Size and hash of every file in the snapshot.
    pub manifest: Manifest,
}

// ============================================================================
// CommitStore
// ============================================================================

/// Append-only store of commits.
#[derive(Debug)]
pub struct CommitStore {
    commits_dir: PathBuf,
    staging_dir: PathBuf,
    next_seq: u64,
    last_timestamp: Option<DateTime<Utc>>,
}

impl CommitStore {
    /// Open the store for a project, creating its directories if needed.
    ///
    /// Leftover staging directories from an interrupted write are removed.
    pub fn open(project: &Project) -> Result<Self, VersionError> {
        let commits_dir = project.commits_dir();
        let staging_dir = project.staging_dir();
        fs::create_dir_all(&commits_dir).map_err(|e| VersionError::io(&commits_dir, e))?;
        fs::create_dir_all(&staging_dir).map_err(|e| VersionError::io(&staging_dir, e))?;

        let mut store = Self {
            commits_dir,
            staging_dir,
            next_seq: 1,
            last_timestamp: None,
        };

        let swept = store.sweep_staging()?;
        if swept > 0 {
            tracing::warn!("Removed {} incomplete staging director(ies)", swept);
        }

        if let Some(last) = store.ids()?.pop() {
            store.next_seq = last.seq().unwrap_or(0) + 1;
            store.last_timestamp = Some(store.get(&last)?.timestamp);
        }

        tracing::debug!("Opened commit store, next id {}", store.next_seq);
        Ok(store)
    }

    /// Remove every entry under `staging/`. Returns how many were removed.
    pub fn sweep_staging(&self) -> Result<usize, VersionError> {
        let mut removed = 0;
        let entries = match fs::read_dir(&self.staging_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(VersionError::io(&self.staging_dir, e)),
        };
        for entry in entries {
            let path = entry.map_err(|e| VersionError::io(&self.staging_dir, e))?.path();
            let result = if path.is_dir() {
                fs::remove_dir_all(&path)
            } else {
                fs::remove_file(&path)
            };
            result.map_err(|e| VersionError::io(&path, e))?;
            removed += 1;
        }
        Ok(removed)
    }

    /// Directory of a commit.
    fn commit_dir(&self, id: &CommitId) -> PathBuf {
        self.commits_dir.join(id.as_str())
    }

    /// Whether a commit exists.
    pub fn exists(&self, id: &CommitId) -> bool {
        self.commit_dir(id).join(COMMIT_META_FILENAME).is_file()
    }

    /// Persist a new commit.
    ///
    /// The id is one past the highest id on disk, so commits written by
    /// another engine instance are never overwritten. If the chosen
    /// directory appears before the rename lands, the next id is tried.
    ///
    /// Nothing becomes visible unless every file and the metadata were written
    /// and synced. On failure the staging directory is removed.
    ///
    /// # Errors
    ///
    /// Returns [`VersionError::ConcurrentModification`] if no free id was found
    /// within [`MAX_ID_ATTEMPTS`] tries.
    pub fn put(
        &mut self,
        parent_id: Option<&CommitId>,
        timeline_name: &str,
        message: &str,
        tree: &Tree,
        editor_state: Option<&[u8]>,
    ) -> Result<Commit, VersionError> {
        if let Some(parent) = parent_id {
            if !self.exists(parent) {
                return Err(VersionError::CommitNotFound(parent.to_string()));
            }
        }

        self.refresh_from_disk()?;

        let mut commit = Commit {
            id: CommitId::from_seq(self.next_seq),
            parent_id: parent_id.cloned(),
            timeline_name: timeline_name.to_string(),
            message: message.to_string(),
            timestamp: self.next_timestamp(),
            manifest: tree.manifest(),
        };

        let staging = self.staging_dir.join(Uuid::new_v4().to_string());
        if let Err(e) = self.write_staged(&staging, &commit, tree, editor_state) {
            let _ = fs::remove_dir_all(&staging);
            return Err(e);
        }

        let mut attempts = 0;
        loop {
            let target = self.commit_dir(&commit.id);
            match self.publish(&staging, &target) {
                Ok(true) => break,
                Ok(false) => {}
                Err(e) => {
                    let _ = fs::remove_dir_all(&staging);
                    return Err(e);
                }
            }

            attempts += 1;
            if attempts >= MAX_ID_ATTEMPTS {
                let _ = fs::remove_dir_all(&staging);
                return Err(VersionError::ConcurrentModification {
                    path: target.display().to_string(),
                });
            }
            tracing::debug!("Commit id {} taken, trying the next one", commit.id);
            self.next_seq = self.next_seq.max(commit.id.seq().unwrap_or(0)) + 1;
            commit.id = CommitId::from_seq(self.next_seq);
            let meta = serde_json::to_vec_pretty(&commit)?;
            if let Err(e) = fsutil::write_synced(&staging.join(COMMIT_META_FILENAME), &meta) {
                let _ = fs::remove_dir_all(&staging);
                return Err(e);
            }
        }
        fsutil::sync_dir(&self.commits_dir);

        self.next_seq = commit.id.seq().unwrap_or(self.next_seq) + 1;
        self.last_timestamp = Some(commit.timestamp);

        tracing::debug!(
            "Stored commit {} ({} files) on {}",
            commit.id,
            tree.len(),
            timeline_name
        );
        Ok(commit)
    }

    /// Pick up commits written since this store was opened.
    fn refresh_from_disk(&mut self) -> Result<(), VersionError> {
        let Some(last) = self.ids()?.pop() else {
            return Ok(());
        };
        let on_disk = last.seq().unwrap_or(0) + 1;
        if on_disk > self.next_seq {
            tracing::debug!("Commit store advanced on disk to {}", last);
            self.next_seq = on_disk;
            let timestamp = self.get(&last)?.timestamp;
            if self.last_timestamp.map_or(true, |t| timestamp > t) {
                self.last_timestamp = Some(timestamp);
            }
        }
        Ok(())
    }

    /// Rename `staging` to `target`. `Ok(false)` means the id is taken.
    fn publish(&self, staging: &Path, target: &Path) -> Result<bool, VersionError> {
        if target.exists() {
            return Ok(false);
        }
        match fs::rename(staging, target) {
            Ok(()) => Ok(true),
            Err(e)
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::AlreadyExists | std::io::ErrorKind::DirectoryNotEmpty
                ) =>
            {
                Ok(false)
            }
            Err(e) => Err(VersionError::io(target, e)),
        }
    }

    fn write_staged(
        &self,
        staging: &Path,
        commit: &Commit,
        tree: &Tree,
        editor_state: Option<&[u8]>,
    ) -> Result<(), VersionError> {
        let files_dir = staging.join(FILES_DIR);
        fs::create_dir_all(&files_dir).map_err(|e| VersionError::io(&files_dir, e))?;

        for (rel, content) in tree.iter() {
            let dest = join_relative(&files_dir, rel)?;
            fsutil::write_synced(&dest, content)?;
        }

        let meta = serde_json::to_vec_pretty(commit)?;
        fsutil::write_synced(&staging.join(COMMIT_META_FILENAME), &meta)?;

        if let Some(blob) = editor_state {
            fsutil::write_synced(&staging.join(EDITOR_STATE_FILENAME), blob)?;
        }

        fsutil::sync_dir(staging);
        Ok(())
    }

    /// Timestamps are kept strictly increasing even if the clock is coarse.
    fn next_timestamp(&self) -> DateTime<Utc> {
        let now = Utc::now();
        match self.last_timestamp {
            Some(last) if now <= last => last + Duration::microseconds(1),
            _ => now,
        }
    }

    /// Load a commit's metadata.
    pub fn get(&self, id: &CommitId) -> Result<Commit, VersionError> {
        let path = self.commit_dir(id).join(COMMIT_META_FILENAME);
        if !path.is_file() {
            return Err(VersionError::CommitNotFound(id.to_string()));
        }
        let commit: Commit = fsutil::read_json(&path)?;
        if &commit.id != id {
            return Err(VersionError::corrupt(
                &path,
                format!("metadata id {} does not match directory", commit.id),
            ));
        }
        Ok(commit)
    }

    /// Load the full snapshot of a commit.
    pub fn load_tree(&self, id: &CommitId) -> Result<Tree, VersionError> {
        let commit = self.get(id)?;
        let files_dir = self.commit_dir(id).join(FILES_DIR);
        let mut tree = Tree::new();
        for rel in commit.manifest.keys() {
            let path = join_relative(&files_dir, rel)?;
            let content = fs::read(&path).map_err(|e| VersionError::corrupt(&path, e))?;
            tree.insert(rel.clone(), content);
        }
        Ok(tree)
    }

    /// Read one file as it was stored in a commit.
    pub fn read_file(&self, id: &CommitId, rel_path: &str) -> Result<Vec<u8>, VersionError> {
        let commit = self.get(id)?;
        if !commit.manifest.contains_key(rel_path) {
            return Err(VersionError::FileNotInCommit {
                commit: id.to_string(),
                path: rel_path.to_string(),
            });
        }
        let path = join_relative(&self.commit_dir(id).join(FILES_DIR), rel_path)?;
        fs::read(&path).map_err(|e| VersionError::corrupt(&path, e))
    }

    /// Commits reachable from `head`, newest first.
    pub fn history(&self, head: Option<&CommitId>) -> Result<Vec<Commit>, VersionError> {
        let mut out = Vec::new();
        let mut cursor = head.cloned();
        while let Some(id) = cursor {
            let commit = self.get(&id)?;
            if let Some(parent) = &commit.parent_id {
                if parent >= &commit.id {
                    return Err(VersionError::corrupt(
                        self.commit_dir(&id).join(COMMIT_META_FILENAME),
                        "parent id is not older than commit",
                    ));
                }
            }
            cursor = commit.parent_id.clone();
            out.push(commit);
        }
        Ok(out)
    }

    /// Every stored commit id, ascending.
    pub fn ids(&self) -> Result<Vec<CommitId>, VersionError> {
        let entries =
            fs::read_dir(&self.commits_dir).map_err(|e| VersionError::io(&self.commits_dir, e))?;
        let mut ids = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| VersionError::io(&self.commits_dir, e))?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if name.len() == COMMIT_ID_WIDTH && name.chars().all(|c| c.is_ascii_digit()) {
                ids.push(CommitId(name.to_string()));
            }
        }
        ids.sort();
        Ok(ids)
    }

    /// Every stored commit, ordered by id.
    pub fn all(&self) -> Result<Vec<Commit>, VersionError> {
        self.ids()?.iter().map(|id| self.get(id)).collect()
    }

    /// Read the editor-state annex of a commit, if any.
    pub fn read_editor_state(&self, id: &CommitId) -> Result<Option<Vec<u8>>, VersionError> {
        if !self.exists(id) {
            return Err(VersionError::CommitNotFound(id.to_string()));
        }
        let path = self.commit_dir(id).join(EDITOR_STATE_FILENAME);
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(VersionError::io(&path, e)),
        }
    }

    /// Replace the editor-state annex of a commit.
    pub fn write_editor_state(&self, id: &CommitId, blob: &[u8]) -> Result<(), VersionError> {
        if !self.exists(id) {
            return Err(VersionError::CommitNotFound(id.to_string()));
        }
        fsutil::atomic_write(&self.commit_dir(id).join(EDITOR_STATE_FILENAME), blob)
    }
}

/// Join a forward-slash relative path under `base`, rejecting escapes.
pub(crate) fn join_relative(base: &Path, rel: &str) -> Result<PathBuf, VersionError> {
    let rel_path = Path::new(rel);
    if rel.is_empty()
        || rel_path
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
    {
        return Err(VersionError::InvalidPath(rel.to_string()));
    }
    Ok(base.join(rel_path))
}

// ============================================================================
// Tests
// ============================================================================
