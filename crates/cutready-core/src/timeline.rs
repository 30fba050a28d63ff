//! Timeline registry.
//!
//! Timelines are named, movable pointers to a head commit. The registry is
//! persisted as two files under `.cutready/versions/`:
//!
//! - `timelines.json`: every timeline record, in creation order
//! - `ACTIVE`: the name of the active timeline
//!
//! Both are replaced atomically on every change.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::commit_store::{Commit, CommitId, CommitStore};
use crate::errors::VersionError;
use crate::fsutil;
use crate::project::Project;

// ============================================================================
// TimelineName
// ============================================================================

/// Maximum length of a timeline name.
const MAX_NAME_LEN: usize = 64;

/// A validated timeline name.
///
/// Names contain only lowercase ASCII letters, digits, `-`, `_` and `/`, and
/// may not start or end with `/` or contain `//`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimelineName(String);

impl TimelineName {
    /// Create a new timeline name after validation.
    ///
    /// # Errors
    ///
    /// Returns [`VersionError::InvalidTimelineName`] if the name is malformed.
    pub fn try_new(name: impl Into<String>) -> Result<Self, VersionError> {
        let name = name.into();
        if !is_valid_timeline_name(&name) {
            return Err(VersionError::InvalidTimelineName(name));
        }
        Ok(Self(name))
    }

    /// Create a timeline name without validation.
    ///
    /// Use only for names read back from the registry itself.
    pub fn new_unchecked(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Derive a timeline name from a free-form display label.
    ///
    /// `"My Experiment!"` becomes `my-experiment`. Returns `None` if nothing
    /// usable remains.
    pub fn slugify(label: &str) -> Option<Self> {
        let mut slug = String::with_capacity(label.len());
        let mut pending_dash = false;
        for c in label.chars() {
            if c.is_ascii_alphanumeric() || c == '_' {
                if pending_dash && !slug.is_empty() {
                    slug.push('-');
                }
                pending_dash = false;
                slug.push(c.to_ascii_lowercase());
            } else {
                pending_dash = true;
            }
        }
        slug.truncate(MAX_NAME_LEN);
        let slug = slug.trim_end_matches('-').to_string();
        Self::try_new(slug).ok()
    }

    /// Get the name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TimelineName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for TimelineName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for TimelineName {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

/// Check if a string is a valid timeline name.
fn is_valid_timeline_name(name: &str) -> bool {
    if name.is_empty() || name.len() > MAX_NAME_LEN {
        return false;
    }
    if name.starts_with('/') || name.ends_with('/') || name.contains("//") {
        return false;
    }
    name.chars().all(|c| {
        c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_' || c == '/'
    })
}

// ============================================================================
// Timeline
// ============================================================================

/// A persisted timeline record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Timeline {
    pub name: TimelineName,
    /// Display label shown in the UI.
    pub label: String,
    /// Stable lane/color index, assigned in creation order.
    pub color_index: usize,
    /// `None` only before the very first save of a project.
    pub head_commit_id: Option<CommitId>,
    pub created_at: DateTime<Utc>,
}

/// A timeline as listed to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineInfo {
    pub name: String,
    pub label: String,
    pub color_index: usize,
    pub head_commit_id: Option<CommitId>,
    pub created_at: DateTime<Utc>,
    /// Commits created on this timeline that are reachable from its head.
    pub commit_count: usize,
    pub is_active: bool,
}

// ============================================================================
// TimelineRegistry
// ============================================================================

/// The set of timelines and the active pointer.
///
/// `active` is an index into `timelines`. Every constructor and mutator keeps
/// it in range: `open` rejects an `ACTIVE` file naming an unknown timeline and
/// `delete` refuses the active one.
#[derive(Debug)]
pub struct TimelineRegistry {
    manifest_path: PathBuf,
    active_path: PathBuf,
    timelines: Vec<Timeline>,
    active: usize,
}

impl TimelineRegistry {
    /// Create the registry for a fresh project with one empty timeline.
    ///
    /// # Errors
    ///
    /// Returns [`VersionError::AlreadyInitialized`] if a manifest already exists.
    pub fn init(project: &Project, default_name: &str) -> Result<Self, VersionError> {
        let manifest_path = project.timelines_path();
        if manifest_path.exists() {
            return Err(VersionError::AlreadyInitialized {
                path: project.store_dir().to_path_buf(),
            });
        }

        let name = TimelineName::try_new(default_name)?;
        let registry = Self {
            manifest_path,
            active_path: project.active_path(),
            timelines: vec![Timeline {
                name: name.clone(),
                label: default_label(&name),
                color_index: 0,
                head_commit_id: None,
                created_at: Utc::now(),
            }],
            active: 0,
        };
        registry.persist_manifest()?;
        registry.persist_active()?;

        tracing::info!("Initialized timeline registry with `{}`", registry.active().name);
        Ok(registry)
    }

    /// Load the registry from disk.
    ///
    /// # Errors
    ///
    /// - [`VersionError::NotInitialized`] if no manifest exists.
    /// - [`VersionError::Corruption`] if the manifest or active pointer is invalid.
    pub fn open(project: &Project) -> Result<Self, VersionError> {
        let manifest_path = project.timelines_path();
        let active_path = project.active_path();

        if !manifest_path.exists() {
            return Err(VersionError::NotInitialized {
                path: project.store_dir().to_path_buf(),
            });
        }

        let timelines: Vec<Timeline> = fsutil::read_json(&manifest_path)?;
        validate_manifest(&manifest_path, &timelines)?;

        let active_raw = fs::read_to_string(&active_path)
            .map_err(|e| VersionError::corrupt(&active_path, e))?;
        let active_raw = active_raw.trim();
        let Some(active) = timelines.iter().position(|t| t.name == *active_raw) else {
            return Err(VersionError::corrupt(
                &active_path,
                format!("active timeline `{}` is not in the manifest", active_raw),
            ));
        };

        Ok(Self {
            manifest_path,
            active_path,
            timelines,
            active,
        })
    }

    fn persist_manifest(&self) -> Result<(), VersionError> {
        fsutil::write_json_atomic(&self.manifest_path, &self.timelines)
    }

    fn persist_active(&self) -> Result<(), VersionError> {
        fsutil::atomic_write(&self.active_path, self.active().name.as_str().as_bytes())
    }

    /// Register a new timeline whose head is `from`.
    ///
    /// The new timeline is not made active; that is the caller's decision.
    pub fn create(
        &mut self,
        from: Option<&CommitId>,
        name: &str,
        label: Option<&str>,
    ) -> Result<Timeline, VersionError> {
        let name = TimelineName::try_new(name)?;
        if self.get(name.as_str()).is_some() {
            return Err(VersionError::DuplicateTimeline(name.to_string()));
        }

        let color_index = self
            .timelines
            .iter()
            .map(|t| t.color_index + 1)
            .max()
            .unwrap_or(0);

        let timeline = Timeline {
            label: label
                .map(|l| l.trim().to_string())
                .filter(|l| !l.is_empty())
                .unwrap_or_else(|| default_label(&name)),
            name,
            color_index,
            head_commit_id: from.cloned(),
            created_at: Utc::now(),
        };

        self.timelines.push(timeline.clone());
        if let Err(e) = self.persist_manifest() {
            self.timelines.pop();
            return Err(e);
        }

        tracing::debug!(
            "Created timeline `{}` at {}",
            timeline.name,
            from.map(|c| c.as_str()).unwrap_or("none")
        );
        Ok(timeline)
    }

    /// Move a timeline's head forward to `commit`.
    ///
    /// # Errors
    ///
    /// Returns [`VersionError::NonForwardHead`] unless `commit.parent_id`
    /// equals the current head.
    pub fn advance_head(&mut self, name: &str, commit: &Commit) -> Result<(), VersionError> {
        let index = self.index_of(name)?;
        let head = self.timelines[index].head_commit_id.clone();

        if commit.parent_id != head {
            return Err(VersionError::NonForwardHead {
                timeline: name.to_string(),
                commit: commit.id.to_string(),
                head: head.map(|h| h.to_string()).unwrap_or_else(|| "none".to_string()),
            });
        }

        self.timelines[index].head_commit_id = Some(commit.id.clone());
        if let Err(e) = self.persist_manifest() {
            self.timelines[index].head_commit_id = head;
            return Err(e);
        }
        Ok(())
    }

    /// Make `name` the active timeline.
    pub fn switch_active(&mut self, name: &str) -> Result<(), VersionError> {
        let index = self.index_of(name)?;
        let previous = std::mem::replace(&mut self.active, index);
        if let Err(e) = self.persist_active() {
            self.active = previous;
            return Err(e);
        }
        Ok(())
    }

    /// Remove a timeline record. Its commits stay in the store.
    pub fn delete(&mut self, name: &str) -> Result<Timeline, VersionError> {
        let index = self.index_of(name)?;
        if index == self.active {
            return Err(VersionError::CannotDeleteActive(name.to_string()));
        }

        let removed = self.timelines.remove(index);
        let previous = self.active;
        if index < self.active {
            self.active -= 1;
        }
        if let Err(e) = self.persist_manifest() {
            self.timelines.insert(index, removed);
            self.active = previous;
            return Err(e);
        }
        Ok(removed)
    }

    /// Look up a timeline by name.
    pub fn get(&self, name: &str) -> Option<&Timeline> {
        self.timelines.iter().find(|t| t.name == *name)
    }

    fn index_of(&self, name: &str) -> Result<usize, VersionError> {
        self.timelines
            .iter()
            .position(|t| t.name == *name)
            .ok_or_else(|| VersionError::TimelineNotFound(name.to_string()))
    }

    /// The active timeline.
    pub fn active(&self) -> &Timeline {
        &self.timelines[self.active]
    }

    /// Head of the active timeline.
    pub fn active_head(&self) -> Option<&CommitId> {
        self.active().head_commit_id.as_ref()
    }

    /// Timeline records in creation order.
    pub fn timelines(&self) -> &[Timeline] {
        &self.timelines
    }

    /// The first timeline (in creation order) whose head is `id`.
    pub fn find_by_head(&self, id: &CommitId) -> Option<&Timeline> {
        self.timelines
            .iter()
            .find(|t| t.head_commit_id.as_ref() == Some(id))
    }

    /// Generate the next unused `<prefix>-<n>` name.
    pub fn next_fork_name(&self, prefix: &str) -> Result<TimelineName, VersionError> {
        let mut n = self.timelines.len();
        loop {
            let candidate = TimelineName::try_new(format!("{}-{}", prefix, n))?;
            if self.get(candidate.as_str()).is_none() {
                return Ok(candidate);
            }
            n += 1;
        }
    }

    /// List timelines with their commit counts.
    pub fn list(&self, store: &CommitStore) -> Result<Vec<TimelineInfo>, VersionError> {
        self.timelines
            .iter()
            .enumerate()
            .map(|(i, t)| {
                let commit_count = store
                    .history(t.head_commit_id.as_ref())?
                    .iter()
                    .filter(|c| t.name == *c.timeline_name.as_str())
                    .count();
                Ok(TimelineInfo {
                    name: t.name.to_string(),
                    label: t.label.clone(),
                    color_index: t.color_index,
                    head_commit_id: t.head_commit_id.clone(),
                    created_at: t.created_at,
                    commit_count,
                    is_active: i == self.active,
                })
            })
            .collect()
    }
}

// ============================================================================
// Save target
// ============================================================================

/// Where a save made while viewing a historical commit lands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveTarget {
    /// The viewed commit is the active head: commit on the active timeline.
    Active,
    /// The viewed commit is the head of another timeline: switch to it and commit.
    Timeline(TimelineName),
    /// The viewed commit is no timeline's head: fork a new timeline.
    Fork,
}

/// Decide where a save from `viewing` lands, given the current heads.
///
/// Must be called with the heads as they are at save time.
pub fn resolve_save_target(timelines: &[Timeline], active: &str, viewing: &CommitId) -> SaveTarget {
    let is_head = |t: &Timeline| t.head_commit_id.as_ref() == Some(viewing);

    if timelines.iter().any(|t| t.name == *active && is_head(t)) {
        return SaveTarget::Active;
    }
    match timelines.iter().find(|t| is_head(t)) {
        Some(t) => SaveTarget::Timeline(t.name.clone()),
        None => SaveTarget::Fork,
    }
}

fn default_label(name: &TimelineName) -> String {
    let mut chars = name.as_str().chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn validate_manifest(path: &Path, timelines: &[Timeline]) -> Result<(), VersionError> {
    if timelines.is_empty() {
        return Err(VersionError::corrupt(path, "manifest lists no timelines"));
    }
    for (i, t) in timelines.iter().enumerate() {
        if !is_valid_timeline_name(t.name.as_str()) {
            return Err(VersionError::corrupt(
                path,
                format!("invalid timeline name `{}`", t.name),
            ));
        }
        if timelines[..i].iter().any(|other| other.name == t.name) {
            return Err(VersionError::corrupt(
                path,
                format!("duplicate timeline `{}`", t.name),
            ));
        }
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::Tree;
    use tempfile::TempDir;

    fn setup() -> (TempDir, Project, CommitStore, TimelineRegistry) {
        let temp = TempDir::new().unwrap();
        let project = Project::from_root(temp.path()).unwrap();
        let store = CommitStore::open(&project).unwrap();
        let registry = TimelineRegistry::init(&project, "main").unwrap();
        (temp, project, store, registry)
    }

    #[test]
    fn test_timeline_name_validation() {
        assert!(TimelineName::try_new("main").is_ok());
        assert!(TimelineName::try_new("feature/intro-v2").is_ok());
        assert!(TimelineName::try_new("fork_1").is_ok());

        assert!(TimelineName::try_new("").is_err());
        assert!(TimelineName::try_new("Main").is_err());
        assert!(TimelineName::try_new("has space").is_err());
        assert!(TimelineName::try_new("/leading").is_err());
        assert!(TimelineName::try_new("trailing/").is_err());
        assert!(TimelineName::try_new("a//b").is_err());
        assert!(TimelineName::try_new("a".repeat(65)).is_err());
    }

    #[test]
    fn test_slugify() {
        assert_eq!(
            TimelineName::slugify("My Experiment!").unwrap().as_str(),
            "my-experiment"
        );
        assert_eq!(
            TimelineName::slugify("  Take 2 -- alt  ").unwrap().as_str(),
            "take-2-alt"
        );
        assert!(TimelineName::slugify("!!!").is_none());
    }

    #[test]
    fn test_init_and_open() {
        let (_temp, project, _store, registry) = setup();
        assert_eq!(registry.active().name.as_str(), "main");
        assert_eq!(registry.active().label, "Main");
        assert!(registry.active_head().is_none());

        let reopened = TimelineRegistry::open(&project).unwrap();
        assert_eq!(reopened.timelines(), registry.timelines());

        let err = TimelineRegistry::init(&project, "main").unwrap_err();
        assert!(matches!(err, VersionError::AlreadyInitialized { .. }));
    }

    #[test]
    fn test_open_uninitialized() {
        let temp = TempDir::new().unwrap();
        let project = Project::from_root(temp.path()).unwrap();
        let err = TimelineRegistry::open(&project).unwrap_err();
        assert!(matches!(err, VersionError::NotInitialized { .. }));
    }

    #[test]
    fn test_create_duplicate_and_color_index() {
        let (_temp, _project, _store, mut registry) = setup();
        let t = registry.create(None, "alt", Some("Alt take")).unwrap();
        assert_eq!(t.color_index, 1);
        assert_eq!(t.label, "Alt take");

        let err = registry.create(None, "alt", None).unwrap_err();
        assert!(matches!(err, VersionError::DuplicateTimeline(_)));

        let err = registry.create(None, "Bad Name", None).unwrap_err();
        assert!(matches!(err, VersionError::InvalidTimelineName(_)));
    }

    #[test]
    fn test_advance_head_is_forward_only() {
        let (_temp, _project, mut store, mut registry) = setup();
        let c1 = store.put(None, "main", "1", &Tree::new(), None).unwrap();
        registry.advance_head("main", &c1).unwrap();

        let c2 = store.put(Some(&c1.id), "main", "2", &Tree::new(), None).unwrap();
        registry.advance_head("main", &c2).unwrap();
        assert_eq!(registry.active_head(), Some(&c2.id));

        // A sibling of c2 does not descend from the current head.
        let sibling = store.put(Some(&c1.id), "main", "x", &Tree::new(), None).unwrap();
        let err = registry.advance_head("main", &sibling).unwrap_err();
        assert!(matches!(err, VersionError::NonForwardHead { .. }));
        assert_eq!(registry.active_head(), Some(&c2.id));
    }

    #[test]
    fn test_switch_and_delete() {
        let (_temp, project, _store, mut registry) = setup();
        registry.create(None, "alt", None).unwrap();

        let err = registry.delete("main").unwrap_err();
        assert!(matches!(err, VersionError::CannotDeleteActive(_)));
        assert_eq!(registry.timelines().len(), 2);

        registry.switch_active("alt").unwrap();
        registry.delete("main").unwrap();
        assert!(registry.get("main").is_none());
        assert_eq!(registry.active().name.as_str(), "alt");

        let reopened = TimelineRegistry::open(&project).unwrap();
        assert_eq!(reopened.active().name.as_str(), "alt");
        assert_eq!(reopened.timelines().len(), 1);

        let err = registry.switch_active("ghost").unwrap_err();
        assert!(matches!(err, VersionError::TimelineNotFound(_)));
    }

    #[test]
    fn test_list_counts_only_own_commits() {
        let (_temp, _project, mut store, mut registry) = setup();
        let c1 = store.put(None, "main", "1", &Tree::new(), None).unwrap();
        registry.advance_head("main", &c1).unwrap();
        let c2 = store.put(Some(&c1.id), "main", "2", &Tree::new(), None).unwrap();
        registry.advance_head("main", &c2).unwrap();

        registry.create(Some(&c1.id), "alt", None).unwrap();
        let c3 = store.put(Some(&c1.id), "alt", "3", &Tree::new(), None).unwrap();
        registry.advance_head("alt", &c3).unwrap();

        let list = registry.list(&store).unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].name, "main");
        assert_eq!(list[0].commit_count, 2);
        assert!(list[0].is_active);
        assert_eq!(list[1].name, "alt");
        assert_eq!(list[1].commit_count, 1);
        assert!(!list[1].is_active);
    }

    #[test]
    fn test_corrupt_manifest() {
        let (_temp, project, _store, _registry) = setup();
        fs::write(project.timelines_path(), "[{").unwrap();
        let err = TimelineRegistry::open(&project).unwrap_err();
        assert!(matches!(err, VersionError::Corruption { .. }));
    }

    #[test]
    fn test_unknown_active_pointer_is_corruption() {
        let (_temp, project, _store, mut registry) = setup();
        registry.create(None, "alt", None).unwrap();
        fs::write(project.active_path(), "ghost\n").unwrap();

        let err = TimelineRegistry::open(&project).unwrap_err();
        assert_eq!(err.kind(), crate::errors::ErrorKind::Corruption);
        assert!(err.to_string().contains("ghost"));
    }

    #[test]
    fn test_active_follows_deletions_before_it() {
        let (_temp, project, store, mut registry) = setup();
        registry.create(None, "alt", None).unwrap();
        registry.create(None, "draft", None).unwrap();
        registry.switch_active("draft").unwrap();

        registry.delete("alt").unwrap();
        assert_eq!(registry.active().name.as_str(), "draft");
        registry.delete("main").unwrap();
        assert_eq!(registry.active().name.as_str(), "draft");

        let reopened = TimelineRegistry::open(&project).unwrap();
        assert_eq!(reopened.active().name.as_str(), "draft");
        let infos = reopened.list(&store).unwrap();
        assert_eq!(infos.len(), 1);
        assert!(infos[0].is_active);
    }

    #[test]
    fn test_resolve_save_target() {
        let (_temp, _project, mut store, mut registry) = setup();
        let c1 = store.put(None, "main", "1", &Tree::new(), None).unwrap();
        registry.advance_head("main", &c1).unwrap();
        let c2 = store.put(Some(&c1.id), "main", "2", &Tree::new(), None).unwrap();
        registry.advance_head("main", &c2).unwrap();
        registry.create(Some(&c1.id), "alt", None).unwrap();

        let timelines = registry.timelines();
        assert_eq!(resolve_save_target(timelines, "main", &c2.id), SaveTarget::Active);
        assert_eq!(
            resolve_save_target(timelines, "main", &c1.id),
            SaveTarget::Timeline(TimelineName::new_unchecked("alt"))
        );

        registry.delete("alt").unwrap();
        assert_eq!(
            resolve_save_target(registry.timelines(), "main", &c1.id),
            SaveTarget::Fork
        );
    }

    #[test]
    fn test_next_fork_name_skips_taken() {
        let (_temp, _project, _store, mut registry) = setup();
        let first = registry.next_fork_name("fork").unwrap();
        assert_eq!(first.as_str(), "fork-1");
        registry.create(None, "fork-1", None).unwrap();
        registry.create(None, "fork-3", None).unwrap();
        assert_eq!(registry.next_fork_name("fork").unwrap().as_str(), "fork-4");
    }
}
