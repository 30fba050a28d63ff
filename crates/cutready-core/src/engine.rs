//! The snapshot engine: orchestration and the navigation/fork state machine.
//!
//! [`SnapshotEngine`] owns every store of one open project and is the only
//! component that mutates the working tree. All operations run synchronously
//! on the caller's thread; see [`crate::handle`] for the locked, async wrapper.
//!
//! Mutating operations also hold the on-disk project lock (see
//! [`crate::lock`]) and reload the timeline registry, rewind marker and
//! pending journal first, so several engine instances on one project never
//! act on each other's stale state.
//!
//! # States
//!
//! | State | Meaning |
//! |---|---|
//! | `Clean { tip }` | working tree equals the active timeline's head |
//! | `Dirty { tip }` | unsaved edits on top of the active head |
//! | `Rewound { viewing, .. }` | working tree shows a historical commit |
//! | `Interrupted { .. }` | a previous operation stopped mid-write |
//!
//! Saving while rewound never consults a cached head: the target is decided
//! from the timeline heads as they are at save time (see
//! [`resolve_save_target`]).

use std::path::Path;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::commit_store::{Commit, CommitId, CommitStore};
use crate::config::{GlobalConfig, ProjectConfig, VersioningConfig};
use crate::constants::LOCK_STALE_SECS;
use crate::errors::VersionError;
use crate::graph::{self, GhostBranch, TimelineGraph};
use crate::lock::ProjectLock;
use crate::markers::{PendingOp, PendingOperation, RewindMarker};
use crate::oplog::{self, OpKind, OpLogEntry, OpLogQuery};
use crate::project::Project;
use crate::stash::{Stash, StashInfo, StashManager};
use crate::timeline::{
    resolve_save_target, SaveTarget, TimelineInfo, TimelineName, TimelineRegistry,
};
use crate::tree::{diff_manifests, summarize_changes, FileChange, Manifest, Tree};
use crate::working_tree::WorkingTree;

// ============================================================================
// Types
// ============================================================================

/// Message used when a save is given an empty label.
pub const DEFAULT_SAVE_LABEL: &str = "Untitled version";

/// Where the engine stands relative to history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum EngineState {
    Clean {
        tip: Option<CommitId>,
    },
    Dirty {
        tip: Option<CommitId>,
    },
    Rewound {
        viewing: CommitId,
        origin_tip: Option<CommitId>,
        dirty: bool,
    },
    Interrupted {
        op: PendingOp,
        target: String,
    },
}

impl EngineState {
    pub fn is_dirty(&self) -> bool {
        match self {
            Self::Dirty { .. } => true,
            Self::Rewound { dirty, .. } => *dirty,
            _ => false,
        }
    }
}

/// A commit as shown in the version list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionEntry {
    pub id: CommitId,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    /// File-level change count against the parent, e.g. `2 files changed`.
    pub summary: String,
    pub timeline_name: String,
}

/// Result of a successful save.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveOutcome {
    pub commit: Commit,
    /// Timeline the commit was recorded on (now active).
    pub timeline: String,
    /// A new timeline was created for this save.
    pub forked: bool,
}

/// How to leave the `Interrupted` state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryAction {
    /// Redo the interrupted write from its journal.
    Resume,
    /// Keep the working tree as it is and drop the journal.
    Acknowledge,
}

/// Everything `status` shows.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub active_timeline: String,
    pub state: EngineState,
    pub changes: Vec<FileChange>,
    pub stash: Option<StashInfo>,
    pub ghost_branch: Option<GhostBranch>,
}

// ============================================================================
// SnapshotEngine
// ============================================================================

/// Versioning engine for one project.
///
/// # Example
///
/// ```ignore
/// use cutready_core::SnapshotEngine;
///
/// let mut engine = SnapshotEngine::open_with_defaults(Path::new("."))?;
/// engine.save("Rough cut", None)?;
/// ```
#[derive(Debug)]
pub struct SnapshotEngine {
    project: Project,
    config: VersioningConfig,
    store: CommitStore,
    registry: TimelineRegistry,
    working: WorkingTree,
    stash: StashManager,
    rewind: Option<RewindMarker>,
    pending: Option<PendingOperation>,
}

impl SnapshotEngine {
    // -------------------------------------------------------------------------
    // Construction
    // -------------------------------------------------------------------------

    /// Initialize versioning for a project folder and open it.
    ///
    /// Existing tracked files are left untouched; they become the content of
    /// the first save.
    ///
    /// # Errors
    ///
    /// Returns [`VersionError::AlreadyInitialized`] if the project already has
    /// a versioning store.
    pub fn init(root: &Path, config: VersioningConfig) -> Result<Self, VersionError> {
        let project = Project::from_root(root)?;
        let registry = TimelineRegistry::init(&project, &config.default_timeline)?;
        let engine = Self::assemble(project, config, registry)?;
        engine.record(OpLogEntry::new(OpKind::Init, engine.active_name()));
        tracing::info!("Initialized versioning at {}", engine.project.root().display());
        Ok(engine)
    }

    /// Open an initialized project.
    ///
    /// A leftover pending-operation journal puts the engine in the
    /// `Interrupted` state until [`SnapshotEngine::recover`] is called.
    pub fn open(root: &Path, config: VersioningConfig) -> Result<Self, VersionError> {
        let project = Project::from_root(root)?;
        let registry = TimelineRegistry::open(&project)?;
        Self::assemble(project, config, registry)
    }

    /// Open a project with the global and project configuration files applied.
    pub fn open_with_defaults(root: &Path) -> anyhow::Result<Self> {
        let config = Self::load_config(root, None)?;
        Ok(Self::open(root, config)?)
    }

    /// Resolve the configuration for a project.
    ///
    /// `global_path` overrides the default `~/.cutready/config.yaml`.
    pub fn load_config(root: &Path, global_path: Option<&Path>) -> anyhow::Result<VersioningConfig> {
        let global = match global_path {
            Some(path) => GlobalConfig::from_path(path)?,
            None => GlobalConfig::load_default()?,
        };
        let project = ProjectConfig::load_from_project(root)?;
        let resolved = global.resolve(&project);

        let source = ProjectConfig::config_path_for_project(root);
        for warning in resolved.validate(&source)? {
            tracing::warn!("{}", warning);
        }
        Ok(resolved)
    }

    fn assemble(
        project: Project,
        config: VersioningConfig,
        registry: TimelineRegistry,
    ) -> Result<Self, VersionError> {
        let store = CommitStore::open(&project)?;
        let stash = StashManager::new(&project);
        let working = WorkingTree::new(project.clone(), config.clone());

        let pending = PendingOperation::load(&project.pending_path())?;
        if let Some(p) = &pending {
            tracing::warn!(
                "Found interrupted `{}` operation (target {}) started at {}",
                p.op,
                p.describe_target(),
                p.started_at
            );
        }

        let rewind = load_rewind(&project, &store)?;

        Ok(Self {
            project,
            config,
            store,
            registry,
            working,
            stash,
            rewind,
            pending,
        })
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    pub fn project(&self) -> &Project {
        &self.project
    }

    pub fn config(&self) -> &VersioningConfig {
        &self.config
    }

    /// Name of the active timeline.
    pub fn active_name(&self) -> &str {
        self.registry.active().name.as_str()
    }

    /// Head of the active timeline.
    pub fn active_head(&self) -> Option<&CommitId> {
        self.registry.active_head()
    }

    pub fn rewind_marker(&self) -> Option<&RewindMarker> {
        self.rewind.as_ref()
    }

    pub fn pending_operation(&self) -> Option<&PendingOperation> {
        self.pending.as_ref()
    }

    /// Commit the working tree is compared against.
    fn baseline_id(&self) -> Option<CommitId> {
        match &self.rewind {
            Some(marker) => Some(marker.viewing_commit_id.clone()),
            None => self.registry.active_head().cloned(),
        }
    }

    fn baseline_manifest(&self) -> Result<Option<Manifest>, VersionError> {
        self.baseline_id()
            .map(|id| self.store.get(&id).map(|c| c.manifest))
            .transpose()
    }

    fn load_tree_or_empty(&self, id: Option<&CommitId>) -> Result<Tree, VersionError> {
        match id {
            Some(id) => self.store.load_tree(id),
            None => Ok(Tree::new()),
        }
    }

    /// Take the project lock and reload state other instances may have changed.
    fn lock_for_write(&mut self) -> Result<ProjectLock, VersionError> {
        let lock = ProjectLock::acquire_with(
            &self.project.lock_path(),
            StdDuration::from_millis(self.config.lock_wait_ms),
            chrono::Duration::seconds(LOCK_STALE_SECS),
        )?;
        self.registry = TimelineRegistry::open(&self.project)?;
        self.rewind = load_rewind(&self.project, &self.store)?;
        self.pending = PendingOperation::load(&self.project.pending_path())?;
        Ok(lock)
    }

    fn ensure_not_interrupted(&self) -> Result<(), VersionError> {
        match &self.pending {
            Some(p) => Err(VersionError::InterruptedOperation {
                op: p.op.to_string(),
                target: p.describe_target(),
            }),
            None => Ok(()),
        }
    }

    /// Append to the activity log. Failures are logged, not returned.
    fn record(&self, entry: OpLogEntry) {
        if let Err(e) = oplog::append_entry(&self.project.oplog_path(), &entry) {
            tracing::warn!("Failed to append to activity log: {}", e);
        }
    }

    // -------------------------------------------------------------------------
    // Inspection
    // -------------------------------------------------------------------------

    /// Whether the working tree differs from its baseline.
    pub fn is_dirty(&mut self) -> Result<bool, VersionError> {
        let baseline = self.baseline_manifest()?;
        self.working.compute_dirty(baseline.as_ref())
    }

    /// Whether the working tree shows a historical commit.
    pub fn is_rewound(&self) -> bool {
        self.rewind.is_some()
    }

    pub fn has_stash(&self) -> bool {
        self.stash.exists()
    }

    /// Current state of the engine.
    pub fn state(&mut self) -> Result<EngineState, VersionError> {
        if let Some(p) = &self.pending {
            return Ok(EngineState::Interrupted {
                op: p.op,
                target: p.describe_target(),
            });
        }

        let dirty = self.is_dirty()?;
        Ok(match &self.rewind {
            Some(marker) => EngineState::Rewound {
                viewing: marker.viewing_commit_id.clone(),
                origin_tip: marker.origin_tip_commit_id.clone(),
                dirty,
            },
            None => {
                let tip = self.registry.active_head().cloned();
                if dirty {
                    EngineState::Dirty { tip }
                } else {
                    EngineState::Clean { tip }
                }
            }
        })
    }

    /// State, pending changes, stash and fork preview in one report.
    pub fn status(&mut self) -> Result<StatusReport, VersionError> {
        let state = self.state()?;
        let baseline = self.baseline_manifest()?;
        let changes = self.working.changes(baseline.as_ref())?;
        let graph = self.timeline_graph()?;
        let ghost_branch = graph::ghost_branch(
            &graph,
            self.registry.timelines(),
            self.active_name(),
            self.rewind.as_ref(),
        );

        Ok(StatusReport {
            active_timeline: self.active_name().to_string(),
            state,
            changes,
            stash: self.stash.peek()?,
            ghost_branch,
        })
    }

    /// Versions on the active timeline, newest first.
    pub fn list_versions(&self) -> Result<Vec<VersionEntry>, VersionError> {
        let history = self.store.history(self.registry.active_head())?;
        let empty = Manifest::new();

        Ok(history
            .iter()
            .enumerate()
            .map(|(i, commit)| {
                // The parent is the next entry in a newest-first walk.
                let parent_manifest = history.get(i + 1).map(|p| &p.manifest).unwrap_or(&empty);
                let changes = diff_manifests(parent_manifest, &commit.manifest);
                VersionEntry {
                    id: commit.id.clone(),
                    message: commit.message.clone(),
                    timestamp: commit.timestamp,
                    summary: summarize_changes(&changes),
                    timeline_name: commit.timeline_name.clone(),
                }
            })
            .collect())
    }

    /// Commits reachable from a timeline's head, newest first.
    pub fn history(&self, timeline: &str) -> Result<Vec<Commit>, VersionError> {
        let t = self
            .registry
            .get(timeline)
            .ok_or_else(|| VersionError::TimelineNotFound(timeline.to_string()))?;
        self.store.history(t.head_commit_id.as_ref())
    }

    /// Metadata of one commit.
    pub fn commit(&self, id: &CommitId) -> Result<Commit, VersionError> {
        self.store.get(id)
    }

    pub fn list_timelines(&self) -> Result<Vec<TimelineInfo>, VersionError> {
        self.registry.list(&self.store)
    }

    pub fn timeline_graph(&self) -> Result<TimelineGraph, VersionError> {
        let commits = self.store.all()?;
        Ok(graph::build(
            &commits,
            self.registry.timelines(),
            self.active_name(),
        ))
    }

    /// Preview of the timeline the next save would fork, if any.
    pub fn ghost_branch(&self) -> Result<Option<GhostBranch>, VersionError> {
        let graph = self.timeline_graph()?;
        Ok(graph::ghost_branch(
            &graph,
            self.registry.timelines(),
            self.active_name(),
            self.rewind.as_ref(),
        ))
    }

    /// Content of one file as stored in a version.
    pub fn file_at_version(&self, id: &CommitId, rel_path: &str) -> Result<Vec<u8>, VersionError> {
        self.project.safe_resolve(rel_path)?;
        self.store.read_file(id, rel_path)
    }

    pub fn load_editor_state(&self, id: &CommitId) -> Result<Option<Vec<u8>>, VersionError> {
        self.store.read_editor_state(id)
    }

    /// Read the activity log.
    pub fn op_log(&self, query: &OpLogQuery) -> Result<Vec<OpLogEntry>, VersionError> {
        oplog::read_entries(&self.project.oplog_path(), query)
    }

    // -------------------------------------------------------------------------
    // Saving
    // -------------------------------------------------------------------------

    /// Record the working tree as a new version.
    ///
    /// - From `Dirty`, the commit extends the active timeline.
    /// - From `Rewound`, the target is decided from the current heads: the
    ///   active timeline if the viewed commit is its head, the timeline whose
    ///   head it is otherwise, or a new timeline forked at the viewed commit.
    ///   `fork_label` names that new timeline.
    /// - From `Clean`, returns [`VersionError::NothingToSave`].
    ///
    /// The commit is durable before any head moves; on failure the working
    /// tree and every head are left as they were.
    pub fn save(&mut self, label: &str, fork_label: Option<&str>) -> Result<SaveOutcome, VersionError> {
        let _lock = self.lock_for_write()?;
        self.ensure_not_interrupted()?;
        let message = match label.trim() {
            "" => DEFAULT_SAVE_LABEL,
            trimmed => trimmed,
        };

        let outcome = match self.rewind.clone() {
            None => self.save_on_active(message, fork_label)?,
            Some(marker) => self.save_from_rewind(message, fork_label, &marker)?,
        };

        let kind = if outcome.forked { OpKind::Fork } else { OpKind::Save };
        self.record(
            OpLogEntry::new(kind, &outcome.timeline)
                .with_commit(&outcome.commit.id)
                .with_message(message),
        );
        tracing::info!(
            "Saved version {} on `{}`{}",
            outcome.commit.id,
            outcome.timeline,
            if outcome.forked { " (new timeline)" } else { "" }
        );
        Ok(outcome)
    }

    fn save_on_active(
        &mut self,
        message: &str,
        fork_label: Option<&str>,
    ) -> Result<SaveOutcome, VersionError> {
        if !self.is_dirty()? {
            return Err(VersionError::NothingToSave);
        }
        if fork_label.is_some() {
            tracing::debug!("Ignoring fork label: not viewing history");
        }

        let tip = self.registry.active_head().cloned();
        let timeline = self.active_name().to_string();
        let tree = self.working.capture()?;
        let commit = self.store.put(tip.as_ref(), &timeline, message, &tree, None)?;
        self.registry.advance_head(&timeline, &commit)?;

        Ok(SaveOutcome {
            commit,
            timeline,
            forked: false,
        })
    }

    fn save_from_rewind(
        &mut self,
        message: &str,
        fork_label: Option<&str>,
        marker: &RewindMarker,
    ) -> Result<SaveOutcome, VersionError> {
        let viewing = &marker.viewing_commit_id;
        let target = resolve_save_target(self.registry.timelines(), self.active_name(), viewing);
        tracing::debug!("Save from rewound {} resolves to {:?}", viewing, target);

        let outcome = match target {
            SaveTarget::Active => {
                let timeline = self.active_name().to_string();
                let tree = self.working.capture()?;
                let commit = self.store.put(Some(viewing), &timeline, message, &tree, None)?;
                self.registry.advance_head(&timeline, &commit)?;
                SaveOutcome {
                    commit,
                    timeline,
                    forked: false,
                }
            }
            SaveTarget::Timeline(name) => {
                let tree = self.working.capture()?;
                let commit = self
                    .store
                    .put(Some(viewing), name.as_str(), message, &tree, None)?;
                self.registry.advance_head(name.as_str(), &commit)?;
                self.registry.switch_active(name.as_str())?;
                SaveOutcome {
                    commit,
                    timeline: name.to_string(),
                    forked: false,
                }
            }
            SaveTarget::Fork => {
                let (name, label) = self.fork_name(fork_label)?;
                let tree = self.working.capture()?;
                let commit = self
                    .store
                    .put(Some(viewing), name.as_str(), message, &tree, None)?;
                self.registry.create(Some(viewing), name.as_str(), label)?;
                self.registry.advance_head(name.as_str(), &commit)?;
                self.registry.switch_active(name.as_str())?;
                SaveOutcome {
                    commit,
                    timeline: name.to_string(),
                    forked: true,
                }
            }
        };

        self.clear_rewind()?;
        Ok(outcome)
    }

    /// Name and label for a deferred fork.
    ///
    /// The name is the slug of the label, which must be unused. A label with
    /// nothing to slug (only punctuation or non-ASCII text) keeps a generated
    /// name and is still shown as the label.
    fn fork_name<'a>(
        &self,
        fork_label: Option<&'a str>,
    ) -> Result<(TimelineName, Option<&'a str>), VersionError> {
        let Some(label) = fork_label.map(str::trim).filter(|l| !l.is_empty()) else {
            return Ok((self.registry.next_fork_name(&self.config.fork_prefix)?, None));
        };
        match TimelineName::slugify(label) {
            Some(name) => {
                if self.registry.get(name.as_str()).is_some() {
                    return Err(VersionError::DuplicateTimeline(name.to_string()));
                }
                Ok((name, Some(label)))
            }
            None => Ok((self.registry.next_fork_name(&self.config.fork_prefix)?, Some(label))),
        }
    }

    /// Materialize an old version and record it as a new version on the
    /// active timeline.
    ///
    /// Requires a clean working tree that is not viewing history.
    pub fn restore_version(&mut self, id: &CommitId) -> Result<SaveOutcome, VersionError> {
        let _lock = self.lock_for_write()?;
        self.ensure_not_interrupted()?;
        if self.rewind.is_some() || self.is_dirty()? {
            return Err(VersionError::NotClean("restore_version"));
        }
        let tree = self.store.load_tree(id)?;

        let pending = PendingOperation::new(PendingOp::RestoreVersion, Some(id));
        self.journaled(pending, |engine| engine.working.materialize(&tree).map(|_| ()))?;

        let timeline = self.active_name().to_string();
        let tip = self.registry.active_head().cloned();
        let message = format!("Restored from version {}", id.short());
        let commit = self.store.put(tip.as_ref(), &timeline, &message, &tree, None)?;
        self.registry.advance_head(&timeline, &commit)?;

        self.record(
            OpLogEntry::new(OpKind::RestoreVersion, &timeline)
                .with_commit(&commit.id)
                .with_message(&message)
                .with_meta(serde_json::json!({ "restoredFrom": id })),
        );
        tracing::info!("Restored version {} as {}", id, commit.id);
        Ok(SaveOutcome {
            commit,
            timeline,
            forked: false,
        })
    }

    // -------------------------------------------------------------------------
    // Navigation
    // -------------------------------------------------------------------------

    /// Show a version in the working tree.
    ///
    /// Navigating to the active head clears any rewind; navigating anywhere
    /// else enters (or moves) the rewind. Navigating to what is already shown
    /// is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`VersionError::DirtyWorkingTree`] if there are unsaved edits.
    pub fn navigate_to(&mut self, id: &CommitId) -> Result<(), VersionError> {
        let _lock = self.lock_for_write()?;
        self.navigate_locked(id)
    }

    fn navigate_locked(&mut self, id: &CommitId) -> Result<(), VersionError> {
        self.ensure_not_interrupted()?;
        self.store.get(id)?;
        if self.is_dirty()? {
            return Err(VersionError::DirtyWorkingTree);
        }
        if self.baseline_id().as_ref() == Some(id) && self.rewind.is_none() {
            tracing::debug!("Already at {}, nothing to do", id);
            return Ok(());
        }
        if self.rewind.as_ref().is_some_and(|m| &m.viewing_commit_id == id) {
            tracing::debug!("Already viewing {}, nothing to do", id);
            return Ok(());
        }

        self.goto(id, PendingOp::Navigate)?;
        self.record(OpLogEntry::new(OpKind::Navigate, self.active_name()).with_commit(id));
        Ok(())
    }

    /// Stash unsaved edits, then navigate.
    pub fn stash_then_navigate(&mut self, id: &CommitId) -> Result<(), VersionError> {
        let _lock = self.lock_for_write()?;
        self.ensure_not_interrupted()?;
        self.store.get(id)?;
        if !self.is_dirty()? {
            return self.navigate_locked(id);
        }

        let stashed = self.push_stash()?;
        self.goto(id, PendingOp::StashThenNavigate)?;
        self.record(
            OpLogEntry::new(OpKind::StashThenNavigate, self.active_name())
                .with_commit(id)
                .with_meta(serde_json::json!({ "stashedFiles": stashed.file_count() })),
        );
        Ok(())
    }

    /// Drop unsaved edits, then navigate.
    pub fn discard_then_navigate(&mut self, id: &CommitId) -> Result<(), VersionError> {
        let _lock = self.lock_for_write()?;
        self.ensure_not_interrupted()?;
        self.store.get(id)?;
        if !self.is_dirty()? {
            return self.navigate_locked(id);
        }

        self.goto(id, PendingOp::DiscardThenNavigate)?;
        self.record(OpLogEntry::new(OpKind::DiscardThenNavigate, self.active_name()).with_commit(id));
        Ok(())
    }

    /// Materialize `id` and update the rewind marker.
    fn goto(&mut self, id: &CommitId, op: PendingOp) -> Result<(), VersionError> {
        let tree = self.store.load_tree(id)?;
        let pending = PendingOperation::new(op, Some(id));
        self.journaled(pending, |engine| {
            engine.working.materialize(&tree)?;
            engine.settle_rewind(id)
        })?;
        tracing::info!("Now viewing {}", id);
        Ok(())
    }

    /// Set or clear the rewind marker after the working tree shows `id`.
    fn settle_rewind(&mut self, id: &CommitId) -> Result<(), VersionError> {
        let tip = self.registry.active_head().cloned();
        if tip.as_ref() == Some(id) {
            return self.clear_rewind();
        }
        let origin_tip = match &self.rewind {
            Some(existing) => existing.origin_tip_commit_id.clone(),
            None => tip,
        };
        let marker = RewindMarker {
            viewing_commit_id: id.clone(),
            origin_tip_commit_id: origin_tip,
        };
        marker.store(&self.project.rewind_path())?;
        self.rewind = Some(marker);
        Ok(())
    }

    fn clear_rewind(&mut self) -> Result<(), VersionError> {
        RewindMarker::clear(&self.project.rewind_path())?;
        self.rewind = None;
        Ok(())
    }

    /// Run a working-tree rewrite under the pending-operation journal.
    ///
    /// If `f` fails the journal stays in place and the engine enters the
    /// `Interrupted` state.
    fn journaled<T>(
        &mut self,
        pending: PendingOperation,
        f: impl FnOnce(&mut Self) -> Result<T, VersionError>,
    ) -> Result<T, VersionError> {
        let path = self.project.pending_path();
        pending.store(&path)?;

        match f(self) {
            Ok(value) => {
                PendingOperation::clear(&path)?;
                Ok(value)
            }
            Err(e) => {
                tracing::warn!(
                    "`{}` failed mid-write ({}); recovery required",
                    pending.op,
                    e
                );
                self.pending = Some(pending);
                Err(e)
            }
        }
    }

    // -------------------------------------------------------------------------
    // Stash
    // -------------------------------------------------------------------------

    fn push_stash(&mut self) -> Result<StashInfo, VersionError> {
        let tree = self.working.capture()?;
        let baseline = self.baseline_id();
        self.stash.push(&tree, baseline.as_ref(), self.active_name())
    }

    /// Move unsaved edits into the stash and revert to the baseline.
    pub fn stash_changes(&mut self) -> Result<StashInfo, VersionError> {
        let _lock = self.lock_for_write()?;
        self.ensure_not_interrupted()?;
        if !self.is_dirty()? {
            return Err(VersionError::NothingToStash);
        }

        let info = self.push_stash()?;
        let baseline = self.baseline_id();
        let tree = self.load_tree_or_empty(baseline.as_ref())?;
        let pending = PendingOperation::new(PendingOp::StashChanges, baseline.as_ref());
        self.journaled(pending, |engine| engine.working.materialize(&tree).map(|_| ()))?;

        self.record(
            OpLogEntry::new(OpKind::Stash, self.active_name())
                .with_meta(serde_json::json!({ "files": info.file_count() })),
        );
        tracing::info!("Stashed {} files", info.file_count());
        Ok(info)
    }

    /// Drop unsaved edits and revert to the baseline.
    pub fn discard_changes(&mut self) -> Result<(), VersionError> {
        let _lock = self.lock_for_write()?;
        self.ensure_not_interrupted()?;
        if !self.is_dirty()? {
            tracing::debug!("Nothing to discard");
            return Ok(());
        }

        let baseline = self.baseline_id();
        let tree = self.load_tree_or_empty(baseline.as_ref())?;
        let pending = PendingOperation::new(PendingOp::DiscardChanges, baseline.as_ref());
        self.journaled(pending, |engine| engine.working.materialize(&tree).map(|_| ()))?;

        self.record(OpLogEntry::new(OpKind::Discard, self.active_name()));
        tracing::info!("Discarded unsaved changes");
        Ok(())
    }

    /// Lay the stashed files over the working tree and empty the slot.
    ///
    /// Stashed files replace what is on disk and files deleted before the
    /// stash was taken are deleted again. Unsaved edits to other files stay,
    /// so the engine ends up dirty. Whether history moved since the stash was
    /// taken is not checked; a mismatch is only logged.
    ///
    /// # Errors
    ///
    /// Returns [`VersionError::NoStashToPop`] if the slot is empty.
    pub fn pop_stash(&mut self) -> Result<StashInfo, VersionError> {
        let _lock = self.lock_for_write()?;
        self.ensure_not_interrupted()?;
        let stash = self.stash.load()?;
        let deleted = self.stash_deletions(&stash)?;

        let baseline = self.baseline_id();
        if stash.info.from_commit_id != baseline {
            tracing::warn!(
                "Stash was taken from {} but the working tree is at {}; restoring it anyway",
                stash
                    .info
                    .from_commit_id
                    .as_ref()
                    .map(|c| c.as_str())
                    .unwrap_or("an empty project"),
                baseline.as_ref().map(|c| c.as_str()).unwrap_or("an empty project")
            );
        }

        let pending = PendingOperation::new(PendingOp::PopStash, None);
        self.journaled(pending, |engine| {
            engine.working.overlay(&stash.tree, &deleted)?;
            engine.stash.clear()
        })?;

        self.record(
            OpLogEntry::new(OpKind::PopStash, self.active_name())
                .with_meta(serde_json::json!({ "files": stash.info.file_count() })),
        );
        tracing::info!("Restored {} stashed files", stash.info.file_count());
        Ok(stash.info)
    }

    /// Files of the stash's base commit that the stashed tree no longer has.
    fn stash_deletions(&self, stash: &Stash) -> Result<Vec<String>, VersionError> {
        let Some(from) = &stash.info.from_commit_id else {
            return Ok(Vec::new());
        };
        if !self.store.exists(from) {
            return Ok(Vec::new());
        }
        Ok(self
            .store
            .get(from)?
            .manifest
            .into_keys()
            .filter(|path| !stash.tree.contains(path))
            .collect())
    }

    // -------------------------------------------------------------------------
    // Timelines
    // -------------------------------------------------------------------------

    /// Create a timeline at `from`, make it active and show its head.
    ///
    /// Requires a working tree without unsaved edits.
    pub fn create_timeline(
        &mut self,
        from: &CommitId,
        name: &str,
        label: Option<&str>,
    ) -> Result<TimelineInfo, VersionError> {
        let _lock = self.lock_for_write()?;
        self.ensure_not_interrupted()?;
        self.store.get(from)?;
        if self.is_dirty()? {
            return Err(VersionError::NotClean("create_timeline"));
        }

        let timeline = self.registry.create(Some(from), name, label)?;
        let name = timeline.name.to_string();
        self.show_timeline(&name, Some(from))?;

        self.record(OpLogEntry::new(OpKind::CreateTimeline, &name).with_commit(from));
        tracing::info!("Created timeline `{}` at {}", name, from);
        self.timeline_info(&name)
    }

    /// Make another timeline active and show its head.
    ///
    /// # Errors
    ///
    /// - [`VersionError::TimelineNotFound`] for an unknown name.
    /// - [`VersionError::DirtyWorkingTree`] if there are unsaved edits.
    pub fn switch_timeline(&mut self, name: &str) -> Result<(), VersionError> {
        let _lock = self.lock_for_write()?;
        self.ensure_not_interrupted()?;
        let head = self
            .registry
            .get(name)
            .ok_or_else(|| VersionError::TimelineNotFound(name.to_string()))?
            .head_commit_id
            .clone();
        if self.is_dirty()? {
            return Err(VersionError::DirtyWorkingTree);
        }
        if self.active_name() == name && self.rewind.is_none() {
            tracing::debug!("Already on `{}`", name);
            return Ok(());
        }

        self.show_timeline(name, head.as_ref())?;
        self.record(OpLogEntry::new(OpKind::SwitchTimeline, name));
        tracing::info!("Switched to timeline `{}`", name);
        Ok(())
    }

    /// Materialize `head`, then activate `name` and clear any rewind.
    fn show_timeline(&mut self, name: &str, head: Option<&CommitId>) -> Result<(), VersionError> {
        let tree = self.load_tree_or_empty(head)?;
        let pending = PendingOperation::new(PendingOp::SwitchTimeline, head).with_timeline(name);
        self.journaled(pending, |engine| {
            engine.working.materialize(&tree)?;
            engine.registry.switch_active(name)?;
            engine.clear_rewind()
        })
    }

    /// Remove a timeline record. Its commits stay in the store.
    pub fn delete_timeline(&mut self, name: &str) -> Result<(), VersionError> {
        let _lock = self.lock_for_write()?;
        self.ensure_not_interrupted()?;
        let removed = self.registry.delete(name)?;
        self.record(
            OpLogEntry::new(OpKind::DeleteTimeline, self.active_name())
                .with_meta(serde_json::json!({ "deleted": removed.name })),
        );
        tracing::info!("Deleted timeline `{}`", name);
        Ok(())
    }

    fn timeline_info(&self, name: &str) -> Result<TimelineInfo, VersionError> {
        self.list_timelines()?
            .into_iter()
            .find(|t| t.name == name)
            .ok_or_else(|| VersionError::TimelineNotFound(name.to_string()))
    }

    // -------------------------------------------------------------------------
    // Editor state
    // -------------------------------------------------------------------------

    /// Store an opaque editor-state blob beside a commit.
    pub fn save_editor_state(&mut self, id: &CommitId, blob: &[u8]) -> Result<(), VersionError> {
        let _lock = self.lock_for_write()?;
        self.ensure_not_interrupted()?;
        self.store.write_editor_state(id, blob)?;
        self.record(
            OpLogEntry::new(OpKind::SaveEditorState, self.active_name())
                .with_commit(id)
                .with_meta(serde_json::json!({ "bytes": blob.len() })),
        );
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Recovery
    // -------------------------------------------------------------------------

    /// Leave the `Interrupted` state.
    ///
    /// `Resume` redoes the interrupted write; `Acknowledge` keeps whatever is
    /// on disk, so any half-written result shows up as unsaved edits.
    pub fn recover(&mut self, action: RecoveryAction) -> Result<(), VersionError> {
        let _lock = self.lock_for_write()?;
        let Some(pending) = self.pending.clone() else {
            tracing::debug!("No interrupted operation to recover");
            return Ok(());
        };

        if action == RecoveryAction::Resume {
            self.resume(&pending)?;
        }

        PendingOperation::clear(&self.project.pending_path())?;
        self.pending = None;

        self.record(
            OpLogEntry::new(OpKind::Recover, self.active_name()).with_meta(serde_json::json!({
                "op": pending.op,
                "action": action,
            })),
        );
        tracing::info!("Recovered from interrupted `{}` ({:?})", pending.op, action);
        Ok(())
    }

    fn resume(&mut self, pending: &PendingOperation) -> Result<(), VersionError> {
        match pending.op {
            PendingOp::Navigate | PendingOp::StashThenNavigate | PendingOp::DiscardThenNavigate => {
                let target = pending
                    .target
                    .clone()
                    .ok_or_else(|| VersionError::corrupt(self.project.pending_path(), "missing target"))?;
                let tree = self.store.load_tree(&target)?;
                self.working.materialize(&tree)?;
                self.settle_rewind(&target)
            }
            PendingOp::StashChanges | PendingOp::DiscardChanges | PendingOp::RestoreVersion => {
                let tree = self.load_tree_or_empty(pending.target.as_ref())?;
                self.working.materialize(&tree).map(|_| ())
            }
            PendingOp::SwitchTimeline => {
                let tree = self.load_tree_or_empty(pending.target.as_ref())?;
                self.working.materialize(&tree)?;
                if let Some(name) = &pending.timeline {
                    self.registry.switch_active(name)?;
                }
                self.clear_rewind()
            }
            PendingOp::PopStash => {
                if self.stash.exists() {
                    let stash = self.stash.load()?;
                    let deleted = self.stash_deletions(&stash)?;
                    self.working.overlay(&stash.tree, &deleted)?;
                    self.stash.clear()?;
                }
                Ok(())
            }
        }
    }
}

/// Load the rewind marker, dropping one that points at a missing commit.
fn load_rewind(project: &Project, store: &CommitStore) -> Result<Option<RewindMarker>, VersionError> {
    let Some(marker) = RewindMarker::load(&project.rewind_path())? else {
        return Ok(None);
    };
    if store.exists(&marker.viewing_commit_id) {
        return Ok(Some(marker));
    }
    tracing::warn!(
        "Rewind marker points at missing commit {}; ignoring it",
        marker.viewing_commit_id
    );
    RewindMarker::clear(&project.rewind_path())?;
    Ok(None)
}

// ============================================================================
// Tests
// ============================================================================
