//! Small persisted markers: the rewind marker and the pending-operation journal.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::commit_store::CommitId;
use crate::errors::VersionError;
use crate::fsutil;

// ============================================================================
// RewindMarker
// ============================================================================

/// The working tree shows a historical commit instead of the active tip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewindMarker {
    pub viewing_commit_id: CommitId,
    /// Head of the active timeline when the rewind began.
    pub origin_tip_commit_id: Option<CommitId>,
}

impl RewindMarker {
    pub fn load(path: &Path) -> Result<Option<Self>, VersionError> {
        if !path.exists() {
            return Ok(None);
        }
        fsutil::read_json(path).map(Some)
    }

    pub fn store(&self, path: &Path) -> Result<(), VersionError> {
        fsutil::write_json_atomic(path, self)
    }

    pub fn clear(path: &Path) -> Result<(), VersionError> {
        fsutil::remove_file_if_exists(path)
    }
}

// ============================================================================
// PendingOperation
// ============================================================================

/// Operations that rewrite the working tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingOp {
    Navigate,
    StashThenNavigate,
    DiscardThenNavigate,
    StashChanges,
    DiscardChanges,
    PopStash,
    SwitchTimeline,
    RestoreVersion,
}

impl std::fmt::Display for PendingOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Navigate => "navigate",
            Self::StashThenNavigate => "stash_then_navigate",
            Self::DiscardThenNavigate => "discard_then_navigate",
            Self::StashChanges => "stash_changes",
            Self::DiscardChanges => "discard_changes",
            Self::PopStash => "pop_stash",
            Self::SwitchTimeline => "switch_timeline",
            Self::RestoreVersion => "restore_version",
        };
        write!(f, "{}", s)
    }
}

/// Journal written before the working tree is rewritten, removed afterwards.
///
/// Finding one at open means the previous process stopped mid-write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingOperation {
    pub op: PendingOp,
    /// Commit being materialized; `None` for a stash pop or an empty baseline.
    pub target: Option<CommitId>,
    /// Timeline being switched to, for timeline operations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeline: Option<String>,
    pub started_at: DateTime<Utc>,
}

impl PendingOperation {
    pub fn new(op: PendingOp, target: Option<&CommitId>) -> Self {
        Self {
            op,
            target: target.cloned(),
            timeline: None,
            started_at: Utc::now(),
        }
    }

    pub fn with_timeline(mut self, name: impl Into<String>) -> Self {
        self.timeline = Some(name.into());
        self
    }

    /// Human-readable target for error messages.
    pub fn describe_target(&self) -> String {
        match (&self.target, self.op) {
            (_, PendingOp::PopStash) => "stash".to_string(),
            (Some(id), _) => id.to_string(),
            (None, _) => "empty tree".to_string(),
        }
    }

    pub fn load(path: &Path) -> Result<Option<Self>, VersionError> {
        if !path.exists() {
            return Ok(None);
        }
        fsutil::read_json(path).map(Some)
    }

    pub fn store(&self, path: &Path) -> Result<(), VersionError> {
        fsutil::write_json_atomic(path, self)
    }

    pub fn clear(path: &Path) -> Result<(), VersionError> {
        fsutil::remove_file_if_exists(path)
    }
}
