//! Error types for cutready-core.

use std::path::PathBuf;

use thiserror::Error;

/// Coarse classification of a [`VersionError`].
///
/// The UI maps each kind to a distinct recovery path: `Conflict` errors are
/// expected precondition failures (the "Save / Stash & go / Discard" prompt),
/// `Io` errors may be retried, and `Corruption` requires manual recovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Unknown commit or timeline.
    NotFound,
    /// A precondition of the requested operation does not hold.
    Conflict,
    /// Disk failure.
    Io,
    /// Persisted state exists but cannot be understood.
    Corruption,
    /// Files changed underfoot while the engine was writing them.
    ConcurrentModification,
    /// Malformed input (bad timeline name, path escaping the project, ...).
    InvalidInput,
}

/// Domain-specific errors for versioning operations.
#[derive(Error, Debug)]
pub enum VersionError {
    // =========================================================================
    // Not found
    // =========================================================================
    /// The commit id does not exist in the store.
    #[error("Commit not found: {0}")]
    CommitNotFound(String),

    /// The timeline name is not registered.
    #[error("Timeline `{0}` not found.")]
    TimelineNotFound(String),

    /// Versioning has not been initialized for the project.
    #[error("Versioning is not initialized at `{path}`. Run `cutready init` first.")]
    NotInitialized {
        /// Expected location of the versioning store.
        path: PathBuf,
    },

    /// Versioning was already initialized for the project.
    #[error("Versioning is already initialized at `{path}`.")]
    AlreadyInitialized {
        /// Location of the existing versioning store.
        path: PathBuf,
    },

    /// The file does not exist in the given commit's snapshot.
    #[error("File `{path}` not found at version {commit}")]
    FileNotInCommit {
        /// The commit that was inspected.
        commit: String,
        /// Project-relative path that was requested.
        path: String,
    },

    // =========================================================================
    // Conflicts
    // =========================================================================
    /// A timeline with this name already exists.
    #[error("Timeline `{0}` already exists.")]
    DuplicateTimeline(String),

    /// The active timeline cannot be deleted.
    #[error("Cannot delete the active timeline `{0}`. Switch to another timeline first.")]
    CannotDeleteActive(String),

    /// A stash is already held; pushing would overwrite user work.
    #[error("A stash already exists (taken from {from_commit}). Pop or discard it first.")]
    StashAlreadyExists {
        /// Commit the existing stash was taken from.
        from_commit: String,
    },

    /// There is no stash to pop.
    #[error("No stash to pop.")]
    NoStashToPop,

    /// The working tree has no unsaved edits to stash.
    #[error("No unsaved changes to stash.")]
    NothingToStash,

    /// The working tree has unsaved edits; the caller must save, stash or discard.
    #[error("Working tree has unsaved changes. Save, stash, or discard them first.")]
    DirtyWorkingTree,

    /// The working tree matches the baseline; there is nothing to record.
    #[error("No changes to save.")]
    NothingToSave,

    /// The operation requires a clean working tree at the tip of the active timeline.
    #[error("Operation `{0}` requires a clean working tree that is not viewing history.")]
    NotClean(&'static str),

    /// A head move would not be a forward step from the current head.
    #[error("Cannot move head of `{timeline}` to {commit}: parent does not match current head {head}.")]
    NonForwardHead {
        /// The timeline being advanced.
        timeline: String,
        /// The commit the caller tried to move to.
        commit: String,
        /// The timeline's current head (or `none`).
        head: String,
    },

    /// A previous operation was interrupted; state must be recovered first.
    #[error("A previous `{op}` operation did not complete (target {target}). Run recovery before continuing.")]
    InterruptedOperation {
        /// Name of the interrupted operation.
        op: String,
        /// Commit the operation was materializing.
        target: String,
    },

    // =========================================================================
    // Input
    // =========================================================================
    /// Invalid timeline name.
    #[error("Invalid timeline name `{0}`: names must be non-empty and use only lowercase letters, digits, `-`, `_` and `/`.")]
    InvalidTimelineName(String),

    /// A path escaped the project root or is otherwise unusable.
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// A configuration value is invalid.
    #[error("Invalid configuration at `{path}`: {message}")]
    InvalidConfig {
        /// Path to the configuration file.
        path: PathBuf,
        /// Description of the problem.
        message: String,
    },

    // =========================================================================
    // Storage
    // =========================================================================
    /// Disk failure while reading or writing versioning data.
    #[error("I/O error at `{path}`: {message}")]
    StoreIo {
        /// Path that caused the error.
        path: PathBuf,
        /// Description of the I/O error.
        message: String,
    },

    /// Persisted state is unreadable or invalid.
    #[error("Corrupt versioning data at `{path}`: {message}")]
    Corruption {
        /// Path to the corrupt file.
        path: PathBuf,
        /// Description of the parse or validation failure.
        message: String,
    },

    /// A file changed while it was being materialized; retry the operation.
    #[error("File `{path}` changed while it was being written. Retry the operation.")]
    ConcurrentModification {
        /// Project-relative path that failed verification.
        path: String,
    },

    /// Another process holds the project lock.
    #[error("Another process is changing this project (lock `{path}`{}). Retry the operation.", .holder.map(|pid| format!(", held by pid {}", pid)).unwrap_or_default())]
    ProjectBusy {
        /// Path of the lock file.
        path: PathBuf,
        /// Process id recorded by the holder, when readable.
        holder: Option<u32>,
    },

    /// An I/O error occurred.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML serialization/deserialization error.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A background task failed to run to completion.
    #[error("Background task failed: {0}")]
    TaskFailed(String),
}

impl VersionError {
    /// Build a [`VersionError::StoreIo`] from a path and any displayable error.
    pub fn io(path: impl Into<PathBuf>, err: impl std::fmt::Display) -> Self {
        Self::StoreIo {
            path: path.into(),
            message: err.to_string(),
        }
    }

    /// Build a [`VersionError::Corruption`] from a path and any displayable error.
    pub fn corrupt(path: impl Into<PathBuf>, err: impl std::fmt::Display) -> Self {
        Self::Corruption {
            path: path.into(),
            message: err.to_string(),
        }
    }

    /// Classify this error for the caller.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::CommitNotFound(_)
            | Self::TimelineNotFound(_)
            | Self::FileNotInCommit { .. }
            | Self::NotInitialized { .. } => ErrorKind::NotFound,
            Self::DuplicateTimeline(_)
            | Self::CannotDeleteActive(_)
            | Self::StashAlreadyExists { .. }
            | Self::NoStashToPop
            | Self::NothingToStash
            | Self::DirtyWorkingTree
            | Self::NothingToSave
            | Self::NotClean(_)
            | Self::AlreadyInitialized { .. }
            | Self::NonForwardHead { .. }
            | Self::InterruptedOperation { .. } => ErrorKind::Conflict,
            Self::InvalidTimelineName(_) | Self::InvalidPath(_) | Self::InvalidConfig { .. } => {
                ErrorKind::InvalidInput
            }
            Self::Corruption { .. } | Self::Json(_) | Self::Yaml(_) => ErrorKind::Corruption,
            Self::ConcurrentModification { .. } | Self::ProjectBusy { .. } => {
                ErrorKind::ConcurrentModification
            }
            Self::StoreIo { .. } | Self::Io(_) | Self::TaskFailed(_) => ErrorKind::Io,
        }
    }

    /// Whether retrying the same operation may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Io | ErrorKind::ConcurrentModification
        )
    }
}
