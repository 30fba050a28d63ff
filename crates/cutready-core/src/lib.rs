//! # cutready-core
//!
//! **CutReady versioning** – local snapshot and timeline engine.
//!
//! This crate records full snapshots of a project's tracked files (sketches,
//! storyboards, notes, the sidebar order and screenshots), lets the user
//! browse history without losing edits, and branches timelines lazily: only
//! when a save is made from a historical point.
//!
//! ## Main Types
//!
//! - [`SnapshotEngine`] – the orchestrator and state machine for one project
//! - [`ProjectHandle`] – locked, async-friendly access to an engine
//! - [`VersioningService`] – the interface the editor consumes
//! - [`VersionError`] – domain-specific error type
//!
//! ## Modules
//!
//! - [`commit_store`] – immutable commit directories
//! - [`timeline`] – timeline records, the active pointer and save targets
//! - [`working_tree`] – tracked-file enumeration, capture and materialize
//! - [`stash`] – the single-slot stash
//! - [`lock`] – per-project write lock shared by every engine instance
//! - [`graph`] – read-only lane graph projection
//! - [`oplog`] – activity log
//! - [`config`] – configuration types (GlobalConfig, ProjectConfig)
//!
//! ## Example
//!
//! ```ignore
//! use cutready_core::{SnapshotEngine, VersioningConfig};
//! use std::path::Path;
//!
//! let root = Path::new("./my-demo");
//! let mut engine = SnapshotEngine::init(root, VersioningConfig::default())?;
//!
//! // ... edit files ...
//! let saved = engine.save("First draft", None)?;
//!
//! // Look at an older version, then branch from it on the next save.
//! engine.navigate_to(&saved.commit.id)?;
//! ```

// Modules
pub mod commit_store;
pub mod config;
pub mod constants;
pub mod engine;
pub mod errors;
pub(crate) mod fsutil;
pub mod graph;
pub mod handle;
pub mod lock;
pub mod markers;
pub mod oplog;
pub mod project;
pub mod service;
pub mod stash;
pub mod timeline;
pub mod tree;
pub mod working_tree;

// Re-exports for convenience
pub use commit_store::{Commit, CommitId, CommitStore};
pub use config::{GlobalConfig, ProjectConfig, VersioningConfig, VersioningOverride};
pub use constants::{
    should_ignore_dir, ALWAYS_IGNORED_DIRS, CUTREADY_DIR, SCREENSHOTS_DIR, VERSIONS_DIR,
};
pub use engine::{
    EngineState, RecoveryAction, SaveOutcome, SnapshotEngine, StatusReport, VersionEntry,
};
pub use errors::{ErrorKind, VersionError};
pub use graph::{GhostBranch, GraphEdge, GraphLane, GraphNode, TimelineGraph};
pub use handle::ProjectHandle;
pub use lock::{LockMeta, ProjectLock};
pub use markers::{PendingOp, PendingOperation, RewindMarker};
pub use oplog::{OpKind, OpLogEntry, OpLogQuery};
pub use project::{classify, Project, TrackedCategory};
pub use service::VersioningService;
pub use stash::{Stash, StashInfo, StashManager};
pub use timeline::{
    resolve_save_target, SaveTarget, Timeline, TimelineInfo, TimelineName, TimelineRegistry,
};
pub use tree::{diff_manifests, summarize_changes, ChangeKind, FileChange, FileDigest, Manifest, Tree};
pub use working_tree::{MaterializeReport, TrackedFile, WorkingTree};
