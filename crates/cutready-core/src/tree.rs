//! Snapshot value types.
//!
//! A [`Tree`] is the full byte content of every tracked file at one point in
//! time, keyed by project-relative path. A [`Manifest`] is its lightweight
//! summary (size and blake3 hash per path) stored alongside each commit.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Hash arbitrary bytes and return the lowercase hex blake3 digest.
pub fn hash_bytes(bytes: &[u8]) -> String {
    hex::encode(blake3::hash(bytes).as_bytes())
}

// ============================================================================
// Tree
// ============================================================================

/// Content of every tracked file, keyed by forward-slash relative path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tree {
    files: BTreeMap<String, Vec<u8>>,
}

impl Tree {
    /// Create an empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a file.
    pub fn insert(&mut self, path: impl Into<String>, content: impl Into<Vec<u8>>) {
        self.files.insert(path.into(), content.into());
    }

    /// Get a file's content.
    pub fn get(&self, path: &str) -> Option<&[u8]> {
        self.files.get(path).map(Vec::as_slice)
    }

    /// Whether the tree contains `path`.
    pub fn contains(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }

    /// Iterate files in path order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.files.iter().map(|(p, c)| (p.as_str(), c.as_slice()))
    }

    /// Iterate paths in order.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Total size of all file contents in bytes.
    pub fn total_bytes(&self) -> u64 {
        self.files.values().map(|c| c.len() as u64).sum()
    }

    /// Compute the manifest of this tree.
    pub fn manifest(&self) -> Manifest {
        self.files
            .iter()
            .map(|(path, content)| (path.clone(), FileDigest::of(content)))
            .collect()
    }
}

impl FromIterator<(String, Vec<u8>)> for Tree {
    fn from_iter<I: IntoIterator<Item = (String, Vec<u8>)>>(iter: I) -> Self {
        Self {
            files: iter.into_iter().collect(),
        }
    }
}

// ============================================================================
// Manifest
// ============================================================================

/// Size and content hash of one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDigest {
    pub size: u64,
    pub hash: String,
}

impl FileDigest {
    pub fn of(content: &[u8]) -> Self {
        Self {
            size: content.len() as u64,
            hash: hash_bytes(content),
        }
    }
}

/// Per-path digests of a tree.
pub type Manifest = BTreeMap<String, FileDigest>;

// ============================================================================
// Changes
// ============================================================================

/// How a file differs from the baseline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Added,
    Modified,
    Deleted,
}

impl std::fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Added => write!(f, "added"),
            Self::Modified => write!(f, "modified"),
            Self::Deleted => write!(f, "deleted"),
        }
    }
}

/// A single file-level change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChange {
    pub path: String,
    pub kind: ChangeKind,
}

/// Compare two manifests, returning changes in path order.
pub fn diff_manifests(base: &Manifest, current: &Manifest) -> Vec<FileChange> {
    let mut changes = Vec::new();

    for (path, digest) in current {
        match base.get(path) {
            None => changes.push(FileChange {
                path: path.clone(),
                kind: ChangeKind::Added,
            }),
            Some(old) if old != digest => changes.push(FileChange {
                path: path.clone(),
                kind: ChangeKind::Modified,
            }),
            Some(_) => {}
        }
    }

    for path in base.keys() {
        if !current.contains_key(path) {
            changes.push(FileChange {
                path: path.clone(),
                kind: ChangeKind::Deleted,
            });
        }
    }

    changes.sort_by(|a, b| a.path.cmp(&b.path));
    changes
}

/// Render a change count the way version lists show it.
pub fn summarize_changes(changes: &[FileChange]) -> String {
    match changes.len() {
        0 => "No changes".to_string(),
        1 => "1 file changed".to_string(),
        n => format!("{} files changed", n),
    }
}
