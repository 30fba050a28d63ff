//! Working-tree access: enumeration, dirty detection, capture and materialize.
//!
//! Dirty detection compares the tracked files on disk with a baseline
//! manifest. A per-file cache of `(size, mtime, hash)` lets unchanged files
//! skip hashing; a file rewritten with the same size and mtime but different
//! content is reported clean. That blind spot is accepted.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use ignore::WalkBuilder;
use rayon::prelude::*;

use crate::config::VersioningConfig;
use crate::constants::{should_ignore_dir, CUTREADY_DIR, SCREENSHOTS_DIR};
use crate::errors::VersionError;
use crate::fsutil;
use crate::project::{classify, Project, TrackedCategory};
use crate::tree::{diff_manifests, hash_bytes, FileChange, FileDigest, Manifest, Tree};

// ============================================================================
// Types
// ============================================================================

/// A tracked file found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedFile {
    /// Forward-slash path relative to the project root.
    pub rel_path: String,
    pub category: TrackedCategory,
    pub abs_path: PathBuf,
}

#[derive(Debug, Clone)]
struct CachedDigest {
    size: u64,
    mtime: Option<u128>,
    hash: String,
}

/// Counts reported by [`WorkingTree::materialize`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaterializeReport {
    pub written: usize,
    pub unchanged: usize,
    pub removed: usize,
}

/// Callback run right after a materialized file is renamed into place.
#[cfg(test)]
#[derive(Default)]
pub(crate) struct AfterWrite(Option<Box<dyn Fn(&str, &Path) + Send + Sync>>);

#[cfg(test)]
impl AfterWrite {
    fn run(&self, rel: &str, dest: &Path) {
        if let Some(hook) = &self.0 {
            hook(rel, dest);
        }
    }
}

#[cfg(test)]
impl std::fmt::Debug for AfterWrite {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(if self.0.is_some() { "AfterWrite(set)" } else { "AfterWrite" })
    }
}

/// File metadata used for the fast path.
fn stat(path: &Path) -> std::io::Result<(u64, Option<u128>)> {
    let metadata = fs::metadata(path)?;
    let mtime = metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_nanos());
    Ok((metadata.len(), mtime))
}

// ============================================================================
// WorkingTree
// ============================================================================

/// The live project folder as seen by the versioning engine.
#[derive(Debug)]
pub struct WorkingTree {
    project: Project,
    config: VersioningConfig,
    cache: HashMap<String, CachedDigest>,
    #[cfg(test)]
    after_write: AfterWrite,
}

impl WorkingTree {
    pub fn new(project: Project, config: VersioningConfig) -> Self {
        Self {
            project,
            config,
            cache: HashMap::new(),
            #[cfg(test)]
            after_write: AfterWrite::default(),
        }
    }

    /// Run `hook` after every file write, before verification.
    #[cfg(test)]
    pub(crate) fn set_after_write(&mut self, hook: impl Fn(&str, &Path) + Send + Sync + 'static) {
        self.after_write = AfterWrite(Some(Box::new(hook)));
    }

    /// Enumerate tracked files, sorted by path.
    pub fn tracked_files(&self) -> Result<Vec<TrackedFile>, VersionError> {
        let root = self.project.root().to_path_buf();
        let filter_root = root.clone();
        let extra_ignored = self.config.extra_ignored_dirs.clone();
        let screenshots = Path::new(CUTREADY_DIR).join(SCREENSHOTS_DIR);

        let walker = WalkBuilder::new(&root)
            .hidden(false)
            .git_ignore(false)
            .git_global(false)
            .git_exclude(false)
            .ignore(false)
            .parents(false)
            .follow_links(false)
            .filter_entry(move |entry| {
                let name = entry.file_name().to_string_lossy();
                let is_dir = entry.file_type().is_some_and(|t| t.is_dir());
                if is_dir
                    && (should_ignore_dir(&name)
                        || extra_ignored.iter().any(|d| d.as_str() == name.as_ref()))
                {
                    return false;
                }
                // Inside `.cutready/` only the screenshots subtree is walked.
                match entry.path().strip_prefix(&filter_root) {
                    Ok(rel) if rel.starts_with(CUTREADY_DIR) => {
                        rel == Path::new(CUTREADY_DIR)
                            || rel.starts_with(&screenshots)
                            || screenshots.starts_with(rel)
                    }
                    _ => true,
                }
            })
            .build();

        let mut files = Vec::new();
        for result in walker {
            let entry = match result {
                Ok(e) => e,
                Err(e) => {
                    if let Some(io_err) = e.io_error() {
                        if io_err.kind() == std::io::ErrorKind::PermissionDenied {
                            tracing::debug!("Skipping entry due to permission denied: {}", e);
                            continue;
                        }
                    }
                    return Err(VersionError::io(&root, e));
                }
            };

            if !entry.file_type().is_some_and(|t| t.is_file()) {
                continue;
            }
            let Some(rel_path) = self.project.relative_path(entry.path()) else {
                continue;
            };
            if let Some(category) = classify(&rel_path, &self.config) {
                files.push(TrackedFile {
                    rel_path,
                    category,
                    abs_path: entry.into_path(),
                });
            }
        }

        files.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));
        Ok(files)
    }

    /// Manifest of the tracked files currently on disk.
    ///
    /// Files whose size and mtime match the cache are not re-hashed.
    pub fn current_manifest(&mut self) -> Result<Manifest, VersionError> {
        let files = self.tracked_files()?;
        let cache = &self.cache;

        let hash_one = |file: &TrackedFile| -> Result<Option<(String, CachedDigest)>, VersionError> {
            let (size, mtime) = match stat(&file.abs_path) {
                Ok(meta) => meta,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
                Err(e) => return Err(VersionError::io(&file.abs_path, e)),
            };
            if let Some(cached) = cache.get(&file.rel_path) {
                if cached.size == size && cached.mtime.is_some() && cached.mtime == mtime {
                    return Ok(Some((file.rel_path.clone(), cached.clone())));
                }
            }
            let content = match fs::read(&file.abs_path) {
                Ok(c) => c,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
                Err(e) => return Err(VersionError::io(&file.abs_path, e)),
            };
            Ok(Some((
                file.rel_path.clone(),
                CachedDigest {
                    size: content.len() as u64,
                    mtime,
                    hash: hash_bytes(&content),
                },
            )))
        };

        let digests: Vec<Option<(String, CachedDigest)>> = if self.config.parallel_hashing {
            files.par_iter().map(hash_one).collect::<Result<_, _>>()?
        } else {
            files.iter().map(hash_one).collect::<Result<_, _>>()?
        };

        let mut manifest = Manifest::new();
        let mut fresh = HashMap::with_capacity(digests.len());
        for (path, digest) in digests.into_iter().flatten() {
            manifest.insert(
                path.clone(),
                FileDigest {
                    size: digest.size,
                    hash: digest.hash.clone(),
                },
            );
            fresh.insert(path, digest);
        }
        self.cache = fresh;
        Ok(manifest)
    }

    /// File-level changes relative to `baseline` (`None` = empty tree).
    pub fn changes(&mut self, baseline: Option<&Manifest>) -> Result<Vec<FileChange>, VersionError> {
        let current = self.current_manifest()?;
        let empty = Manifest::new();
        Ok(diff_manifests(baseline.unwrap_or(&empty), &current))
    }

    /// Whether the working tree differs from `baseline`.
    pub fn compute_dirty(&mut self, baseline: Option<&Manifest>) -> Result<bool, VersionError> {
        let current = self.current_manifest()?;
        Ok(match baseline {
            Some(base) => &current != base,
            None => !current.is_empty(),
        })
    }

    /// Read every tracked file into a [`Tree`].
    pub fn capture(&self) -> Result<Tree, VersionError> {
        let mut tree = Tree::new();
        for file in self.tracked_files()? {
            match fs::read(&file.abs_path) {
                Ok(content) => tree.insert(file.rel_path, content),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(VersionError::io(&file.abs_path, e)),
            }
        }
        tracing::debug!("Captured {} tracked files", tree.len());
        Ok(tree)
    }

    /// Make the tracked files on disk match `tree` exactly.
    ///
    /// Tracked files absent from `tree` are removed. Every other file is
    /// replaced via write-temp-then-rename; with `verify_writes` on, each file
    /// is re-hashed after the rename.
    ///
    /// # Errors
    ///
    /// Returns [`VersionError::ConcurrentModification`] if a file no longer
    /// matches what was written.
    pub fn materialize(&mut self, tree: &Tree) -> Result<MaterializeReport, VersionError> {
        let report = self.apply(tree)?;
        tracing::debug!(
            "Materialized tree: {} written, {} unchanged, {} removed",
            report.written,
            report.unchanged,
            report.removed
        );
        Ok(report)
    }

    /// Lay a stashed tree over the working tree.
    ///
    /// Every file in `tree` is written and every path in `deleted` is
    /// removed. Other tracked files, including unsaved edits, are left alone.
    pub fn overlay(
        &mut self,
        tree: &Tree,
        deleted: &[String],
    ) -> Result<MaterializeReport, VersionError> {
        let mut report = MaterializeReport::default();
        let root = self.project.root().to_path_buf();

        for rel in deleted.iter().filter(|rel| !tree.contains(rel)) {
            let abs = self.project.safe_resolve(rel)?;
            if !abs.exists() {
                continue;
            }
            fsutil::remove_file_if_exists(&abs)?;
            self.cache.remove(rel.as_str());
            if let Some(parent) = abs.parent() {
                fsutil::prune_empty_dirs(parent, &root);
            }
            report.removed += 1;
        }

        self.write_tree(tree, &mut report)?;
        tracing::debug!(
            "Overlaid stash: {} written, {} unchanged, {} removed",
            report.written,
            report.unchanged,
            report.removed
        );
        Ok(report)
    }

    fn apply(&mut self, tree: &Tree) -> Result<MaterializeReport, VersionError> {
        let mut report = MaterializeReport::default();
        let root = self.project.root().to_path_buf();

        for file in self.tracked_files()? {
            if tree.contains(&file.rel_path) {
                continue;
            }
            fsutil::remove_file_if_exists(&file.abs_path)?;
            self.cache.remove(&file.rel_path);
            if let Some(parent) = file.abs_path.parent() {
                fsutil::prune_empty_dirs(parent, &root);
            }
            report.removed += 1;
        }

        self.write_tree(tree, &mut report)?;
        Ok(report)
    }

    /// Write every file of `tree` that differs on disk.
    fn write_tree(&mut self, tree: &Tree, report: &mut MaterializeReport) -> Result<(), VersionError> {
        for (rel, content) in tree.iter() {
            let dest = self.project.safe_resolve(rel)?;
            let expected = hash_bytes(content);

            if self.matches_on_disk(rel, &dest, content.len() as u64, &expected)? {
                report.unchanged += 1;
                continue;
            }

            fsutil::atomic_write(&dest, content)?;
            #[cfg(test)]
            self.after_write.run(rel, &dest);

            if self.config.verify_writes {
                let written = fs::read(&dest).map_err(|e| VersionError::io(&dest, e))?;
                if hash_bytes(&written) != expected {
                    self.cache.remove(rel);
                    return Err(VersionError::ConcurrentModification {
                        path: rel.to_string(),
                    });
                }
            }

            let (size, mtime) = stat(&dest).map_err(|e| VersionError::io(&dest, e))?;
            self.cache.insert(
                rel.to_string(),
                CachedDigest {
                    size,
                    mtime,
                    hash: expected,
                },
            );
            report.written += 1;
        }
        Ok(())
    }

    fn matches_on_disk(
        &self,
        rel: &str,
        dest: &Path,
        size: u64,
        expected: &str,
    ) -> Result<bool, VersionError> {
        let (disk_size, mtime) = match stat(dest) {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(VersionError::io(dest, e)),
        };
        if disk_size != size {
            return Ok(false);
        }
        if let Some(cached) = self.cache.get(rel) {
            if cached.size == disk_size && cached.mtime.is_some() && cached.mtime == mtime {
                return Ok(cached.hash == expected);
            }
        }
        let content = fs::read(dest).map_err(|e| VersionError::io(dest, e))?;
        Ok(hash_bytes(&content) == expected)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (TempDir, WorkingTree) {
        let temp = TempDir::new().unwrap();
        let project = Project::from_root(temp.path()).unwrap();
        let wt = WorkingTree::new(project, VersioningConfig::default());
        (temp, wt)
    }

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_tracked_files_by_category() {
        let (temp, wt) = setup();
        let root = temp.path();
        write(root, "intro.sk", "s");
        write(root, "boards/main.sb", "b");
        write(root, "notes/plan.md", "n");
        write(root, ".sidebar-order.json", "[]");
        write(root, ".cutready/screenshots/shot.png", "png");
        write(root, ".cutready/versions/timelines.json", "[]");
        write(root, "node_modules/pkg/readme.md", "ignored");
        write(root, "render.mp4", "ignored");

        let files = wt.tracked_files().unwrap();
        let listed: Vec<_> = files
            .iter()
            .map(|f| (f.rel_path.as_str(), f.category))
            .collect();
        assert_eq!(
            listed,
            vec![
                (".cutready/screenshots/shot.png", TrackedCategory::Screenshot),
                (".sidebar-order.json", TrackedCategory::SidebarOrder),
                ("boards/main.sb", TrackedCategory::Storyboard),
                ("intro.sk", TrackedCategory::Sketch),
                ("notes/plan.md", TrackedCategory::Note),
            ]
        );
    }

    #[test]
    fn test_extra_ignored_dirs() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "exports/old.sk", "x");
        write(temp.path(), "keep.sk", "y");
        let project = Project::from_root(temp.path()).unwrap();
        let config = VersioningConfig {
            extra_ignored_dirs: vec!["exports".to_string()],
            ..Default::default()
        };
        let wt = WorkingTree::new(project, config);

        let files = wt.tracked_files().unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].rel_path, "keep.sk");
    }

    #[test]
    fn test_dirty_against_baseline() {
        let (temp, mut wt) = setup();
        write(temp.path(), "a.sk", "x");
        let baseline = wt.capture().unwrap().manifest();

        assert!(!wt.compute_dirty(Some(&baseline)).unwrap());

        write(temp.path(), "a.sk", "yy");
        assert!(wt.compute_dirty(Some(&baseline)).unwrap());

        let changes = wt.changes(Some(&baseline)).unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].path, "a.sk");
    }

    #[test]
    fn test_empty_project_is_clean_against_no_baseline() {
        let (temp, mut wt) = setup();
        assert!(!wt.compute_dirty(None).unwrap());
        write(temp.path(), "a.md", "x");
        assert!(wt.compute_dirty(None).unwrap());
    }

    #[test]
    fn test_materialize_then_capture_roundtrip() {
        let (temp, mut wt) = setup();
        write(temp.path(), "stale.sk", "remove me");
        write(temp.path(), "keep.md", "old");

        let mut tree = Tree::new();
        tree.insert("keep.md", "new");
        tree.insert("boards/b.sb", "board");
        tree.insert(".cutready/screenshots/s.png", vec![0u8, 1, 2, 255]);

        let report = wt.materialize(&tree).unwrap();
        assert_eq!(report.removed, 1);
        assert_eq!(report.written, 3);
        assert!(!temp.path().join("stale.sk").exists());

        assert_eq!(wt.capture().unwrap(), tree);
        assert!(!wt.compute_dirty(Some(&tree.manifest())).unwrap());
    }

    #[test]
    fn test_materialize_skips_identical_files() {
        let (temp, mut wt) = setup();
        write(temp.path(), "a.sk", "same");
        let tree = wt.capture().unwrap();

        let report = wt.materialize(&tree).unwrap();
        assert_eq!(report.written, 0);
        assert_eq!(report.unchanged, 1);
    }

    #[test]
    fn test_materialize_removes_emptied_directories() {
        let (temp, mut wt) = setup();
        write(temp.path(), "notes/deep/a.md", "x");

        wt.materialize(&Tree::new()).unwrap();
        assert!(!temp.path().join("notes").exists());
        assert!(temp.path().exists());
    }

    #[test]
    fn test_overlay_keeps_unrelated_edits() {
        let (temp, mut wt) = setup();
        write(temp.path(), "intro.sk", "base");
        write(temp.path(), "notes/old.md", "old");
        write(temp.path(), "scratch.md", "unsaved");

        let mut stashed = Tree::new();
        stashed.insert("intro.sk", "stashed");
        stashed.insert("new.sb", "board");
        let report = wt
            .overlay(&stashed, &["notes/old.md".to_string(), "never-there.md".to_string()])
            .unwrap();

        assert_eq!(report.written, 2);
        assert_eq!(report.removed, 1);
        assert_eq!(fs::read_to_string(temp.path().join("intro.sk")).unwrap(), "stashed");
        assert_eq!(fs::read_to_string(temp.path().join("new.sb")).unwrap(), "board");
        assert_eq!(fs::read_to_string(temp.path().join("scratch.md")).unwrap(), "unsaved");
        assert!(!temp.path().join("notes").exists());
    }

    #[test]
    fn test_materialize_detects_write_race() {
        let (temp, mut wt) = setup();
        wt.set_after_write(|rel, dest| {
            if rel == "intro.sk" {
                fs::write(dest, "edited by another app").unwrap();
            }
        });

        let mut tree = Tree::new();
        tree.insert("intro.sk", "from history");
        let err = wt.materialize(&tree).unwrap_err();

        match err {
            VersionError::ConcurrentModification { path } => assert_eq!(path, "intro.sk"),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(
            fs::read_to_string(temp.path().join("intro.sk")).unwrap(),
            "edited by another app"
        );
    }

    #[test]
    fn test_write_race_ignored_without_verification() {
        let temp = TempDir::new().unwrap();
        let project = Project::from_root(temp.path()).unwrap();
        let config = VersioningConfig {
            verify_writes: false,
            ..Default::default()
        };
        let mut wt = WorkingTree::new(project, config);
        wt.set_after_write(|_, dest| fs::write(dest, "late edit").unwrap());

        let mut tree = Tree::new();
        tree.insert("intro.sk", "from history");
        assert_eq!(wt.materialize(&tree).unwrap().written, 1);
    }

    #[test]
    fn test_temp_files_are_not_tracked() {
        let (temp, wt) = setup();
        write(temp.path(), ".cutready-tmp-123-a.sk", "partial");
        assert!(wt.tracked_files().unwrap().is_empty());
    }
}
