//! Activity log of versioning operations.
//!
//! Every mutating engine operation appends one JSON line to
//! `.cutready/versions/oplog.jsonl`. The log is informational: commits and
//! timelines are the source of truth, and a failed append never fails the
//! operation that produced it.
//!
//! ## Usage
//!
//! ```ignore
//! use cutready_core::oplog::{OpKind, OpLogQuery};
//!
//! let query = OpLogQuery::new().with_kind(OpKind::Save).with_limit(10);
//! for entry in engine.op_log(&query)? {
//!     println!("{} {}", entry.timestamp, entry.kind);
//! }
//! ```

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::commit_store::CommitId;
use crate::errors::VersionError;

// ============================================================================
// OpKind
// ============================================================================

/// The kind of a logged operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpKind {
    Init,
    Save,
    /// A save from a rewound point that created a new timeline.
    Fork,
    Navigate,
    StashThenNavigate,
    DiscardThenNavigate,
    Stash,
    Discard,
    PopStash,
    CreateTimeline,
    SwitchTimeline,
    DeleteTimeline,
    RestoreVersion,
    SaveEditorState,
    Recover,
}

impl std::fmt::Display for OpKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Init => "init",
            Self::Save => "save",
            Self::Fork => "fork",
            Self::Navigate => "navigate",
            Self::StashThenNavigate => "stash_then_navigate",
            Self::DiscardThenNavigate => "discard_then_navigate",
            Self::Stash => "stash",
            Self::Discard => "discard",
            Self::PopStash => "pop_stash",
            Self::CreateTimeline => "create_timeline",
            Self::SwitchTimeline => "switch_timeline",
            Self::DeleteTimeline => "delete_timeline",
            Self::RestoreVersion => "restore_version",
            Self::SaveEditorState => "save_editor_state",
            Self::Recover => "recover",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for OpKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_lowercase().replace('-', "_").as_str() {
            "init" => Self::Init,
            "save" => Self::Save,
            "fork" => Self::Fork,
            "navigate" | "goto" => Self::Navigate,
            "stash_then_navigate" => Self::StashThenNavigate,
            "discard_then_navigate" => Self::DiscardThenNavigate,
            "stash" => Self::Stash,
            "discard" => Self::Discard,
            "pop_stash" | "pop" => Self::PopStash,
            "create_timeline" => Self::CreateTimeline,
            "switch_timeline" => Self::SwitchTimeline,
            "delete_timeline" => Self::DeleteTimeline,
            "restore_version" | "restore" => Self::RestoreVersion,
            "save_editor_state" => Self::SaveEditorState,
            "recover" => Self::Recover,
            other => return Err(format!("Unknown operation kind: {}", other)),
        })
    }
}

// ============================================================================
// OpLogEntry
// ============================================================================

/// One line of the activity log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpLogEntry {
    pub timestamp: DateTime<Utc>,
    pub kind: OpKind,
    /// Active timeline after the operation.
    pub timeline: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit_id: Option<CommitId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Extra metadata as JSON.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Value>,
}

impl OpLogEntry {
    pub fn new(kind: OpKind, timeline: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            kind,
            timeline: timeline.into(),
            commit_id: None,
            message: None,
            meta: None,
        }
    }

    pub fn with_commit(mut self, id: &CommitId) -> Self {
        self.commit_id = Some(id.clone());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_meta(mut self, meta: serde_json::Value) -> Self {
        self.meta = Some(meta);
        self
    }
}

// ============================================================================
// OpLogQuery
// ============================================================================

/// Filters for reading the activity log.
#[derive(Debug, Clone, Default)]
pub struct OpLogQuery {
    /// Only these kinds (None = all).
    pub kinds: Option<Vec<OpKind>>,
    /// Only entries recorded on this timeline.
    pub timeline: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    /// Maximum number of entries to return.
    pub limit: Option<usize>,
}

impl OpLogQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_kind(mut self, kind: OpKind) -> Self {
        self.kinds.get_or_insert_with(Vec::new).push(kind);
        self
    }

    pub fn with_timeline(mut self, timeline: impl Into<String>) -> Self {
        self.timeline = Some(timeline.into());
        self
    }

    pub fn with_since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    pub fn with_until(mut self, until: DateTime<Utc>) -> Self {
        self.until = Some(until);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    fn matches(&self, entry: &OpLogEntry) -> bool {
        if let Some(kinds) = &self.kinds {
            if !kinds.contains(&entry.kind) {
                return false;
            }
        }
        if let Some(timeline) = &self.timeline {
            if entry.timeline != *timeline {
                return false;
            }
        }
        if let Some(since) = self.since {
            if entry.timestamp < since {
                return false;
            }
        }
        if let Some(until) = self.until {
            if entry.timestamp > until {
                return false;
            }
        }
        true
    }
}

// ============================================================================
// Read / append
// ============================================================================

/// Append one entry to the log.
pub fn append_entry(path: &Path, entry: &OpLogEntry) -> Result<(), VersionError> {
    let line = serde_json::to_string(entry)?;
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| VersionError::io(path, e))?;
    writeln!(file, "{}", line).map_err(|e| VersionError::io(path, e))
}

/// Read matching entries, newest first.
///
/// Unparseable lines (for example one torn by a crash during append) are
/// skipped with a warning.
pub fn read_entries(path: &Path, query: &OpLogQuery) -> Result<Vec<OpLogEntry>, VersionError> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let file = File::open(path).map_err(|e| VersionError::io(path, e))?;
    let reader = BufReader::new(file);
    let mut entries = Vec::new();

    for (line_num, line_result) in reader.lines().enumerate() {
        let line = line_result.map_err(|e| VersionError::io(path, e))?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<OpLogEntry>(&line) {
            Ok(entry) if query.matches(&entry) => entries.push(entry),
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(
                    "Skipping unreadable line {} of {}: {}",
                    line_num + 1,
                    path.display(),
                    e
                );
            }
        }
    }

    // Lines are appended in order, so reversing yields newest first.
    entries.reverse();
    if let Some(limit) = query.limit {
        entries.truncate(limit);
    }
    Ok(entries)
}
