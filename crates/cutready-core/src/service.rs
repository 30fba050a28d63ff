//! Framework-independent versioning interface consumed by the editor.
//!
//! The editor talks to versioning only through [`VersioningService`]; nothing
//! here knows about windows, IPC or async runtimes. [`SnapshotEngine`] is the
//! only production implementation.

use crate::commit_store::CommitId;
use crate::engine::{SaveOutcome, SnapshotEngine, VersionEntry};
use crate::errors::VersionError;
use crate::graph::TimelineGraph;
use crate::stash::StashInfo;
use crate::timeline::TimelineInfo;

/// Operations exposed to UI and editor collaborators.
pub trait VersioningService {
    /// Record the working tree. `fork_label` names the timeline created when
    /// saving from a rewound, non-head commit.
    fn save(&mut self, label: &str, fork_label: Option<&str>) -> Result<SaveOutcome, VersionError>;

    fn stash_changes(&mut self) -> Result<StashInfo, VersionError>;

    fn discard_changes(&mut self) -> Result<(), VersionError>;

    fn pop_stash(&mut self) -> Result<StashInfo, VersionError>;

    fn has_stash(&self) -> bool;

    fn navigate_to_snapshot(&mut self, id: &CommitId) -> Result<(), VersionError>;

    fn create_timeline(&mut self, from: &CommitId, name: &str) -> Result<TimelineInfo, VersionError>;

    fn switch_timeline(&mut self, name: &str) -> Result<(), VersionError>;

    fn delete_timeline(&mut self, name: &str) -> Result<(), VersionError>;

    fn list_timelines(&self) -> Result<Vec<TimelineInfo>, VersionError>;

    /// Versions of the active timeline, newest first.
    fn list_versions(&self) -> Result<Vec<VersionEntry>, VersionError>;

    fn get_timeline_graph(&self) -> Result<TimelineGraph, VersionError>;

    /// Takes `&mut self` because the digest cache is refreshed.
    fn is_dirty(&mut self) -> Result<bool, VersionError>;

    fn is_rewound(&self) -> bool;

    /// Store opaque editor bytes beside a commit. They are never interpreted.
    fn save_editor_state(&mut self, id: &CommitId, blob: &[u8]) -> Result<(), VersionError>;

    fn load_editor_state(&self, id: &CommitId) -> Result<Option<Vec<u8>>, VersionError>;
}

impl VersioningService for SnapshotEngine {
    fn save(&mut self, label: &str, fork_label: Option<&str>) -> Result<SaveOutcome, VersionError> {
        SnapshotEngine::save(self, label, fork_label)
    }

    fn stash_changes(&mut self) -> Result<StashInfo, VersionError> {
        SnapshotEngine::stash_changes(self)
    }

    fn discard_changes(&mut self) -> Result<(), VersionError> {
        SnapshotEngine::discard_changes(self)
    }

    fn pop_stash(&mut self) -> Result<StashInfo, VersionError> {
        SnapshotEngine::pop_stash(self)
    }

    fn has_stash(&self) -> bool {
        SnapshotEngine::has_stash(self)
    }

    fn navigate_to_snapshot(&mut self, id: &CommitId) -> Result<(), VersionError> {
        self.navigate_to(id)
    }

    fn create_timeline(&mut self, from: &CommitId, name: &str) -> Result<TimelineInfo, VersionError> {
        SnapshotEngine::create_timeline(self, from, name, None)
    }

    fn switch_timeline(&mut self, name: &str) -> Result<(), VersionError> {
        SnapshotEngine::switch_timeline(self, name)
    }

    fn delete_timeline(&mut self, name: &str) -> Result<(), VersionError> {
        SnapshotEngine::delete_timeline(self, name)
    }

    fn list_timelines(&self) -> Result<Vec<TimelineInfo>, VersionError> {
        SnapshotEngine::list_timelines(self)
    }

    fn list_versions(&self) -> Result<Vec<VersionEntry>, VersionError> {
        SnapshotEngine::list_versions(self)
    }

    fn get_timeline_graph(&self) -> Result<TimelineGraph, VersionError> {
        self.timeline_graph()
    }

    fn is_dirty(&mut self) -> Result<bool, VersionError> {
        SnapshotEngine::is_dirty(self)
    }

    fn is_rewound(&self) -> bool {
        SnapshotEngine::is_rewound(self)
    }

    fn save_editor_state(&mut self, id: &CommitId, blob: &[u8]) -> Result<(), VersionError> {
        SnapshotEngine::save_editor_state(self, id, blob)
    }

    fn load_editor_state(&self, id: &CommitId) -> Result<Option<Vec<u8>>, VersionError> {
        SnapshotEngine::load_editor_state(self, id)
    }
}
