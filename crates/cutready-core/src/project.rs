//! Project layout and tracked-file classification.
//!
//! This module provides the [`Project`] type which represents an open
//! CutReady project folder on disk, including the location of every piece of
//! versioning state, and the rules deciding which files are versioned.

use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::VersioningConfig;
use crate::constants::{
    ACTIVE_FILENAME, COMMITS_DIR, CUTREADY_DIR, LOCK_FILENAME, NOTE_EXTENSION, OPLOG_FILENAME, PENDING_FILENAME,
    REWIND_FILENAME, SCREENSHOTS_DIR, SIDEBAR_ORDER_FILENAME, SKETCH_EXTENSION, STAGING_DIR,
    STASH_DIR, STORYBOARD_EXTENSION, TEMP_FILE_PREFIX, TIMELINES_FILENAME, VERSIONS_DIR,
};
use crate::errors::VersionError;

// ============================================================================
// Helper Functions
// ============================================================================

/// Check if a path is a disk root (e.g., C:\ on Windows, / on Unix).
///
/// Versioning a filesystem root would snapshot the whole machine.
fn is_disk_root(path: &Path) -> bool {
    if path.parent().is_some() {
        return false;
    }

    #[cfg(windows)]
    {
        if let Some(s) = path.to_str() {
            if s.len() >= 2 && s.chars().nth(1) == Some(':') {
                return true;
            }
        }
    }

    #[cfg(not(windows))]
    {
        if path == Path::new("/") {
            return true;
        }
    }

    path.canonicalize().ok().is_some_and(|p| p.parent().is_none())
}

// ============================================================================
// TrackedCategory
// ============================================================================

/// Category of a versioned project file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackedCategory {
    /// A sketch (`*.sk`).
    Sketch,
    /// A storyboard (`*.sb`).
    Storyboard,
    /// A markdown note (`*.md`, plus configured extensions).
    Note,
    /// The sidebar-order manifest at the project root.
    SidebarOrder,
    /// A screenshot under `.cutready/screenshots/`.
    Screenshot,
}

impl std::fmt::Display for TrackedCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sketch => write!(f, "sketch"),
            Self::Storyboard => write!(f, "storyboard"),
            Self::Note => write!(f, "note"),
            Self::SidebarOrder => write!(f, "sidebar-order"),
            Self::Screenshot => write!(f, "screenshot"),
        }
    }
}

/// Classify a project-relative path (forward slashes).
///
/// Returns `None` for files that are not versioned.
pub fn classify(rel_path: &str, config: &VersioningConfig) -> Option<TrackedCategory> {
    let file_name = rel_path.rsplit('/').next().unwrap_or(rel_path);
    if file_name.starts_with(TEMP_FILE_PREFIX) {
        return None;
    }

    if rel_path == SIDEBAR_ORDER_FILENAME {
        return Some(TrackedCategory::SidebarOrder);
    }

    let screenshots_prefix = format!("{}/{}/", CUTREADY_DIR, SCREENSHOTS_DIR);
    if rel_path.starts_with(&screenshots_prefix) {
        return Some(TrackedCategory::Screenshot);
    }
    if rel_path.starts_with(CUTREADY_DIR) {
        return None;
    }

    let ext = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())?;

    match ext.as_str() {
        SKETCH_EXTENSION => Some(TrackedCategory::Sketch),
        STORYBOARD_EXTENSION => Some(TrackedCategory::Storyboard),
        NOTE_EXTENSION => Some(TrackedCategory::Note),
        other if config.note_extensions().any(|e| e.eq_ignore_ascii_case(other)) => {
            Some(TrackedCategory::Note)
        }
        _ => None,
    }
}

// ============================================================================
// Project
// ============================================================================

/// An open project folder.
///
/// All versioning state lives under `.cutready/versions/`; the rest of the
/// folder is the working tree.
#[derive(Debug, Clone)]
pub struct Project {
    /// Absolute path to the project root directory.
    root: PathBuf,

    /// Path to the versioning store (`.cutready/versions`).
    store_dir: PathBuf,
}

impl Project {
    /// Create a `Project` from a root directory path.
    ///
    /// # Errors
    ///
    /// Returns [`VersionError::InvalidPath`] if the path does not exist, is not
    /// a directory, or is a filesystem root.
    pub fn from_root(root: &Path) -> Result<Self, VersionError> {
        let root = root
            .canonicalize()
            .map_err(|_| VersionError::InvalidPath(format!("{} does not exist", root.display())))?;

        if !root.is_dir() {
            return Err(VersionError::InvalidPath(format!(
                "{} is not a directory",
                root.display()
            )));
        }

        if is_disk_root(&root) {
            return Err(VersionError::InvalidPath(format!(
                "Cannot version a disk root: {}. Open a project folder instead.",
                root.display()
            )));
        }

        let store_dir = root.join(CUTREADY_DIR).join(VERSIONS_DIR);
        Ok(Self { root, store_dir })
    }

    /// Get the absolute path to the project root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Get the path to the versioning store (`.cutready/versions`).
    pub fn store_dir(&self) -> &Path {
        &self.store_dir
    }

    /// Whether versioning has been initialized for this project.
    pub fn is_initialized(&self) -> bool {
        self.timelines_path().is_file()
    }

    /// `.cutready/versions/commits/`
    pub fn commits_dir(&self) -> PathBuf {
        self.store_dir.join(COMMITS_DIR)
    }

    /// `.cutready/versions/staging/`
    pub fn staging_dir(&self) -> PathBuf {
        self.store_dir.join(STAGING_DIR)
    }

    /// `.cutready/versions/stash/`
    pub fn stash_dir(&self) -> PathBuf {
        self.store_dir.join(STASH_DIR)
    }

    /// `.cutready/versions/timelines.json`
    pub fn timelines_path(&self) -> PathBuf {
        self.store_dir.join(TIMELINES_FILENAME)
    }

    /// `.cutready/versions/ACTIVE`
    pub fn active_path(&self) -> PathBuf {
        self.store_dir.join(ACTIVE_FILENAME)
    }

    /// `.cutready/versions/REWIND`
    pub fn rewind_path(&self) -> PathBuf {
        self.store_dir.join(REWIND_FILENAME)
    }

    /// `.cutready/versions/PENDING`
    pub fn pending_path(&self) -> PathBuf {
        self.store_dir.join(PENDING_FILENAME)
    }

    /// `.cutready/versions/LOCK`
    pub fn lock_path(&self) -> PathBuf {
        self.store_dir.join(LOCK_FILENAME)
    }

    /// `.cutready/versions/oplog.jsonl`
    pub fn oplog_path(&self) -> PathBuf {
        self.store_dir.join(OPLOG_FILENAME)
    }

    /// Resolve a project-relative path to an absolute path inside the root.
    ///
    /// # Errors
    ///
    /// Returns [`VersionError::InvalidPath`] for absolute paths or paths that
    /// escape the project via `..`.
    pub fn safe_resolve(&self, rel_path: &str) -> Result<PathBuf, VersionError> {
        let rel = Path::new(rel_path);
        if rel_path.is_empty() {
            return Err(VersionError::InvalidPath("empty path".to_string()));
        }

        for component in rel.components() {
            match component {
                Component::Normal(_) | Component::CurDir => {}
                _ => {
                    return Err(VersionError::InvalidPath(format!(
                        "`{}` escapes the project root",
                        rel_path
                    )))
                }
            }
        }

        Ok(self.root.join(rel))
    }

    /// Convert an absolute path inside the project to a forward-slash relative path.
    pub fn relative_path(&self, abs: &Path) -> Option<String> {
        let rel = abs.strip_prefix(&self.root).ok()?;
        let parts: Vec<&str> = rel
            .components()
            .filter_map(|c| match c {
                Component::Normal(s) => s.to_str(),
                _ => None,
            })
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join("/"))
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config() -> VersioningConfig {
        VersioningConfig::default()
    }

    #[test]
    fn test_classify_tracked_categories() {
        let c = config();
        assert_eq!(classify("intro.sk", &c), Some(TrackedCategory::Sketch));
        assert_eq!(classify("boards/main.sb", &c), Some(TrackedCategory::Storyboard));
        assert_eq!(classify("notes/todo.md", &c), Some(TrackedCategory::Note));
        assert_eq!(classify("NOTES.MD", &c), Some(TrackedCategory::Note));
        assert_eq!(
            classify(".sidebar-order.json", &c),
            Some(TrackedCategory::SidebarOrder)
        );
        assert_eq!(
            classify(".cutready/screenshots/step1.png", &c),
            Some(TrackedCategory::Screenshot)
        );
    }

    #[test]
    fn test_classify_untracked() {
        let c = config();
        assert_eq!(classify("video.mp4", &c), None);
        assert_eq!(classify("nested/.sidebar-order.json", &c), None);
        assert_eq!(classify(".cutready/versions/timelines.json", &c), None);
        assert_eq!(classify(".cutready/notes.md", &c), None);
        assert_eq!(classify(".cutready-tmp-1234-intro.sk", &c), None);
    }

    #[test]
    fn test_classify_extra_note_extensions() {
        let c = VersioningConfig {
            extra_note_extensions: vec![".txt".to_string()],
            ..Default::default()
        };
        assert_eq!(classify("readme.txt", &c), Some(TrackedCategory::Note));
    }

    #[test]
    fn test_project_paths() {
        let temp = TempDir::new().unwrap();
        let project = Project::from_root(temp.path()).unwrap();

        assert!(project.store_dir().ends_with(".cutready/versions"));
        assert!(project.commits_dir().ends_with("versions/commits"));
        assert!(project.timelines_path().ends_with("versions/timelines.json"));
        assert!(!project.is_initialized());
    }

    #[test]
    fn test_project_missing_root() {
        let temp = TempDir::new().unwrap();
        let result = Project::from_root(&temp.path().join("missing"));
        assert!(matches!(result, Err(VersionError::InvalidPath(_))));
    }

    #[test]
    fn test_project_rejects_disk_root() {
        #[cfg(not(windows))]
        {
            let result = Project::from_root(Path::new("/"));
            assert!(matches!(result, Err(VersionError::InvalidPath(_))));
        }
    }

    #[test]
    fn test_safe_resolve() {
        let temp = TempDir::new().unwrap();
        let project = Project::from_root(temp.path()).unwrap();

        assert!(project.safe_resolve("notes/a.md").is_ok());
        assert!(project.safe_resolve("../escape.md").is_err());
        assert!(project.safe_resolve("notes/../../escape.md").is_err());
        assert!(project.safe_resolve("").is_err());
    }

    #[test]
    fn test_relative_path_uses_forward_slashes() {
        let temp = TempDir::new().unwrap();
        let project = Project::from_root(temp.path()).unwrap();
        let abs = project.root().join("boards").join("main.sb");
        assert_eq!(project.relative_path(&abs).as_deref(), Some("boards/main.sb"));
        assert_eq!(project.relative_path(project.root()), None);
    }
}
