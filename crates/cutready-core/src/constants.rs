//! Common constants used throughout cutready-core.
//!
//! This module centralizes paths, directory names, and tracked-file rules
//! to avoid duplication and ensure consistency across the codebase.

// ============================================================================
// Directory Names
// ============================================================================

/// The name of the CutReady metadata directory within a project.
///
/// Screenshots and versioning data both live under `.cutready/`.
pub const CUTREADY_DIR: &str = ".cutready";

/// The subdirectory within `.cutready` that stores versioning data.
///
/// Layout: `.cutready/versions/{commits,staging,stash,...}`
pub const VERSIONS_DIR: &str = "versions";

/// The subdirectory within `.cutready` that stores captured screenshots.
///
/// Screenshots referenced by planning rows are part of the versioned tree.
pub const SCREENSHOTS_DIR: &str = "screenshots";

/// The name of the global CutReady configuration directory (`~/.cutready/`).
pub const CUTREADY_HOME_DIR: &str = ".cutready";

// ============================================================================
// Store Layout
// ============================================================================

/// Directory holding one subdirectory per commit.
pub const COMMITS_DIR: &str = "commits";

/// Directory holding in-flight commits and stash pushes.
pub const STAGING_DIR: &str = "staging";

/// Directory holding the single stash slot.
pub const STASH_DIR: &str = "stash";

/// Subdirectory (inside a commit or the stash) holding the copied files.
pub const FILES_DIR: &str = "files";

/// Commit metadata filename.
pub const COMMIT_META_FILENAME: &str = "commit.json";

/// Optional editor-state annex filename.
pub const EDITOR_STATE_FILENAME: &str = "editor_state.bin";

/// Stash metadata filename.
pub const STASH_META_FILENAME: &str = "stash.json";

/// Timelines manifest filename.
pub const TIMELINES_FILENAME: &str = "timelines.json";

/// Active-timeline pointer filename.
pub const ACTIVE_FILENAME: &str = "ACTIVE";

/// Rewind marker filename.
pub const REWIND_FILENAME: &str = "REWIND";

/// Pending-operation journal filename.
pub const PENDING_FILENAME: &str = "PENDING";

/// Activity log filename.
pub const OPLOG_FILENAME: &str = "oplog.jsonl";

/// Per-project write lock filename.
pub const LOCK_FILENAME: &str = "LOCK";

/// How long a mutating operation waits for another process's lock.
pub const LOCK_WAIT_MS: u64 = 5_000;

/// A lock older than this is assumed to belong to a dead process.
pub const LOCK_STALE_SECS: i64 = 600;

// ============================================================================
// Tracked Files
// ============================================================================

/// Sketch file extension.
pub const SKETCH_EXTENSION: &str = "sk";

/// Storyboard file extension.
pub const STORYBOARD_EXTENSION: &str = "sb";

/// Note file extension.
pub const NOTE_EXTENSION: &str = "md";

/// Sidebar-order manifest filename (at the project root).
pub const SIDEBAR_ORDER_FILENAME: &str = ".sidebar-order.json";

/// Directories that are never walked when enumerating tracked files.
///
/// `.cutready` is handled separately: only its `screenshots/` subtree is
/// tracked.
pub const ALWAYS_IGNORED_DIRS: &[&str] = &[
    ".git",
    "node_modules",
    "target",
];

/// Check if a directory name should always be ignored.
#[inline]
pub fn should_ignore_dir(name: &str) -> bool {
    ALWAYS_IGNORED_DIRS.contains(&name)
}

/// Prefix of temporary files written during atomic replacement.
///
/// Files with this prefix are never tracked.
pub const TEMP_FILE_PREFIX: &str = ".cutready-tmp-";

// ============================================================================
// Configuration
// ============================================================================

/// The name of the global and project configuration file.
pub const CONFIG_FILENAME: &str = "config.yaml";

/// Default name of the first timeline of a project.
pub const DEFAULT_TIMELINE: &str = "main";

/// Default prefix for generated fork timeline names.
pub const DEFAULT_FORK_PREFIX: &str = "fork";

/// Width of the zero-padded decimal commit id.
pub const COMMIT_ID_WIDTH: usize = 8;
