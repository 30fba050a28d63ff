//! Shared, serialized access to one project's engine.
//!
//! Saving, navigating and stashing all rewrite the same working tree, so a
//! project admits exactly one operation at a time. [`ProjectHandle`] holds the
//! engine behind a mutex; the async methods move the work onto tokio's
//! blocking pool so a UI thread never waits on a large copy.
//!
//! Each open project gets its own handle. There is no process-wide "current
//! project".

use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::commit_store::CommitId;
use crate::config::VersioningConfig;
use crate::engine::{EngineState, RecoveryAction, SaveOutcome, SnapshotEngine, VersionEntry};
use crate::errors::VersionError;
use crate::graph::TimelineGraph;
use crate::stash::StashInfo;
use crate::timeline::TimelineInfo;

/// Cloneable handle to an open project.
#[derive(Debug, Clone)]
pub struct ProjectHandle {
    engine: Arc<Mutex<SnapshotEngine>>,
}

impl ProjectHandle {
    pub fn new(engine: SnapshotEngine) -> Self {
        Self {
            engine: Arc::new(Mutex::new(engine)),
        }
    }

    /// Open an initialized project.
    pub fn open(root: &Path, config: VersioningConfig) -> Result<Self, VersionError> {
        SnapshotEngine::open(root, config).map(Self::new)
    }

    /// Run `f` with exclusive access on the calling thread.
    pub fn with<T>(&self, f: impl FnOnce(&mut SnapshotEngine) -> T) -> T {
        let mut engine = self.engine.lock();
        f(&mut engine)
    }

    /// Run `f` with exclusive access on the blocking pool.
    ///
    /// The lock is taken inside the blocking task, so waiting for a previous
    /// operation never blocks the async executor.
    pub async fn run<T, F>(&self, f: F) -> Result<T, VersionError>
    where
        T: Send + 'static,
        F: FnOnce(&mut SnapshotEngine) -> Result<T, VersionError> + Send + 'static,
    {
        let engine = Arc::clone(&self.engine);
        tokio::task::spawn_blocking(move || {
            let mut guard = engine.lock();
            f(&mut guard)
        })
        .await
        .map_err(|e| VersionError::TaskFailed(e.to_string()))?
    }

    // -------------------------------------------------------------------------
    // Async operations
    // -------------------------------------------------------------------------

    pub async fn save(
        &self,
        label: impl Into<String>,
        fork_label: Option<String>,
    ) -> Result<SaveOutcome, VersionError> {
        let label = label.into();
        self.run(move |e| e.save(&label, fork_label.as_deref())).await
    }

    pub async fn navigate_to(&self, id: CommitId) -> Result<(), VersionError> {
        self.run(move |e| e.navigate_to(&id)).await
    }

    pub async fn stash_then_navigate(&self, id: CommitId) -> Result<(), VersionError> {
        self.run(move |e| e.stash_then_navigate(&id)).await
    }

    pub async fn discard_then_navigate(&self, id: CommitId) -> Result<(), VersionError> {
        self.run(move |e| e.discard_then_navigate(&id)).await
    }

    pub async fn stash_changes(&self) -> Result<StashInfo, VersionError> {
        self.run(|e| e.stash_changes()).await
    }

    pub async fn discard_changes(&self) -> Result<(), VersionError> {
        self.run(|e| e.discard_changes()).await
    }

    pub async fn pop_stash(&self) -> Result<StashInfo, VersionError> {
        self.run(|e| e.pop_stash()).await
    }

    pub async fn create_timeline(
        &self,
        from: CommitId,
        name: String,
    ) -> Result<TimelineInfo, VersionError> {
        self.run(move |e| e.create_timeline(&from, &name, None)).await
    }

    pub async fn switch_timeline(&self, name: String) -> Result<(), VersionError> {
        self.run(move |e| e.switch_timeline(&name)).await
    }

    pub async fn delete_timeline(&self, name: String) -> Result<(), VersionError> {
        self.run(move |e| e.delete_timeline(&name)).await
    }

    pub async fn restore_version(&self, id: CommitId) -> Result<SaveOutcome, VersionError> {
        self.run(move |e| e.restore_version(&id)).await
    }

    pub async fn recover(&self, action: RecoveryAction) -> Result<(), VersionError> {
        self.run(move |e| e.recover(action)).await
    }

    pub async fn save_editor_state(&self, id: CommitId, blob: Vec<u8>) -> Result<(), VersionError> {
        self.run(move |e| e.save_editor_state(&id, &blob)).await
    }

    pub async fn state(&self) -> Result<EngineState, VersionError> {
        self.run(|e| e.state()).await
    }

    pub async fn is_dirty(&self) -> Result<bool, VersionError> {
        self.run(|e| e.is_dirty()).await
    }

    // -------------------------------------------------------------------------
    // Quick reads
    // -------------------------------------------------------------------------

    pub fn has_stash(&self) -> bool {
        self.with(|e| e.has_stash())
    }

    pub fn is_rewound(&self) -> bool {
        self.with(|e| e.is_rewound())
    }

    pub fn list_timelines(&self) -> Result<Vec<TimelineInfo>, VersionError> {
        self.with(|e| e.list_timelines())
    }

    pub fn list_versions(&self) -> Result<Vec<VersionEntry>, VersionError> {
        self.with(|e| e.list_versions())
    }

    pub fn timeline_graph(&self) -> Result<TimelineGraph, VersionError> {
        self.with(|e| e.timeline_graph())
    }

    pub fn load_editor_state(&self, id: &CommitId) -> Result<Option<Vec<u8>>, VersionError> {
        self.with(|e| e.load_editor_state(id))
    }
}
