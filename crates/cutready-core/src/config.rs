//! Configuration types for the versioning engine.
//!
//! This module provides the configuration structures used by the engine:
//! - [`GlobalConfig`]: User-level configuration stored in `~/.cutready/config.yaml`
//! - [`ProjectConfig`]: Project-level overrides stored in `.cutready/versions/config.yaml`
//! - [`VersioningConfig`]: The resolved settings the engine actually runs with

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::constants::{
    CONFIG_FILENAME, CUTREADY_DIR, CUTREADY_HOME_DIR, DEFAULT_FORK_PREFIX, DEFAULT_TIMELINE,
    LOCK_WAIT_MS, VERSIONS_DIR,
};
use crate::errors::VersionError;
use crate::timeline::TimelineName;

// ============================================================================
// VersioningConfig
// ============================================================================

/// Resolved versioning settings.
///
/// # Example YAML
///
/// ```yaml
/// versioning:
///   default_timeline: main
///   fork_prefix: fork
///   verify_writes: true
///   parallel_hashing: true
///   lock_wait_ms: 5000
///   extra_ignored_dirs: [exports]
///   extra_note_extensions: [txt]
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersioningConfig {
    /// Name of the timeline created for a fresh project.
    #[serde(default = "default_timeline")]
    pub default_timeline: String,

    /// Prefix for generated fork names (`fork-1`, `fork-2`, ...).
    #[serde(default = "default_fork_prefix")]
    pub fork_prefix: String,

    /// Re-hash every materialized file after it is renamed into place.
    #[serde(default = "default_true")]
    pub verify_writes: bool,

    /// Hash tracked files on the rayon thread pool.
    #[serde(default = "default_true")]
    pub parallel_hashing: bool,

    /// How long a mutating operation waits for another process's project lock.
    #[serde(default = "default_lock_wait_ms")]
    pub lock_wait_ms: u64,

    /// Additional directory names skipped when enumerating tracked files.
    #[serde(default)]
    pub extra_ignored_dirs: Vec<String>,

    /// Additional file extensions tracked as notes.
    #[serde(default)]
    pub extra_note_extensions: Vec<String>,
}

fn default_timeline() -> String {
    DEFAULT_TIMELINE.to_string()
}

fn default_fork_prefix() -> String {
    DEFAULT_FORK_PREFIX.to_string()
}

fn default_lock_wait_ms() -> u64 {
    LOCK_WAIT_MS
}

fn default_true() -> bool {
    true
}

impl Default for VersioningConfig {
    fn default() -> Self {
        Self {
            default_timeline: default_timeline(),
            fork_prefix: default_fork_prefix(),
            verify_writes: true,
            parallel_hashing: true,
            lock_wait_ms: default_lock_wait_ms(),
            extra_ignored_dirs: Vec::new(),
            extra_note_extensions: Vec::new(),
        }
    }
}

impl VersioningConfig {
    /// Validate the settings and return non-fatal warnings.
    ///
    /// # Errors
    ///
    /// Returns [`VersionError::InvalidConfig`] if a value cannot be used.
    pub fn validate(&self, source: &Path) -> Result<Vec<String>, VersionError> {
        let mut warnings = Vec::new();

        if TimelineName::try_new(&self.default_timeline).is_err() {
            return Err(VersionError::InvalidConfig {
                path: source.to_path_buf(),
                message: format!(
                    "default_timeline `{}` is not a valid timeline name",
                    self.default_timeline
                ),
            });
        }

        if TimelineName::try_new(&format!("{}-1", self.fork_prefix)).is_err() {
            return Err(VersionError::InvalidConfig {
                path: source.to_path_buf(),
                message: format!(
                    "fork_prefix `{}` does not produce valid timeline names",
                    self.fork_prefix
                ),
            });
        }

        if !self.verify_writes {
            warnings.push(
                "verify_writes is disabled: concurrent edits during navigation will not be detected"
                    .to_string(),
            );
        }

        for ext in &self.extra_note_extensions {
            if ext.starts_with('.') {
                warnings.push(format!(
                    "extra_note_extensions entry `{}` should not include a leading dot",
                    ext
                ));
            }
        }

        Ok(warnings)
    }

    /// Note extensions tracked by this configuration, normalized without dots.
    pub fn note_extensions(&self) -> impl Iterator<Item = &str> {
        self.extra_note_extensions
            .iter()
            .map(|e| e.trim_start_matches('.'))
    }
}

// ============================================================================
// GlobalConfig
// ============================================================================

/// Global (user-level) configuration.
///
/// Loaded from `~/.cutready/config.yaml`; missing files yield defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalConfig {
    /// Versioning defaults applied to every project.
    #[serde(default)]
    pub versioning: VersioningConfig,
}

impl GlobalConfig {
    /// Load the global configuration from the default location.
    ///
    /// # Errors
    ///
    /// Returns [`VersionError::InvalidConfig`] if the file exists but cannot be parsed.
    pub fn load_default() -> Result<Self, VersionError> {
        match Self::default_path() {
            Some(path) => Self::from_path(&path),
            None => {
                tracing::debug!("Could not determine home directory, using default config");
                Ok(Self::default())
            }
        }
    }

    /// Load the global configuration from a specific path.
    ///
    /// If the file does not exist, returns a default configuration.
    ///
    /// # Errors
    ///
    /// Returns [`VersionError::InvalidConfig`] if the file cannot be parsed or
    /// fails validation.
    pub fn from_path(path: &Path) -> Result<Self, VersionError> {
        if !path.exists() {
            tracing::debug!(
                "Global config not found at {}, using defaults",
                path.display()
            );
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| VersionError::InvalidConfig {
            path: path.to_path_buf(),
            message: format!("failed to read: {}", e),
        })?;

        let config: Self = serde_yaml::from_str(&content).map_err(|e| VersionError::InvalidConfig {
            path: path.to_path_buf(),
            message: format!("failed to parse: {}", e),
        })?;

        for warning in config.versioning.validate(path)? {
            tracing::warn!("{}: {}", path.display(), warning);
        }

        Ok(config)
    }

    /// The global configuration directory (`~/.cutready`).
    pub fn default_dir() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(CUTREADY_HOME_DIR))
    }

    /// The global configuration file path (`~/.cutready/config.yaml`).
    pub fn default_path() -> Option<PathBuf> {
        Self::default_dir().map(|dir| dir.join(CONFIG_FILENAME))
    }

    /// Resolve the effective settings for a project.
    pub fn resolve(&self, project: &ProjectConfig) -> VersioningConfig {
        let mut resolved = self.versioning.clone();
        let overrides = &project.versioning;

        if let Some(name) = &overrides.default_timeline {
            resolved.default_timeline = name.clone();
        }
        if let Some(prefix) = &overrides.fork_prefix {
            resolved.fork_prefix = prefix.clone();
        }
        if let Some(verify) = overrides.verify_writes {
            resolved.verify_writes = verify;
        }
        if let Some(parallel) = overrides.parallel_hashing {
            resolved.parallel_hashing = parallel;
        }
        if let Some(wait) = overrides.lock_wait_ms {
            resolved.lock_wait_ms = wait;
        }
        resolved
            .extra_ignored_dirs
            .extend(overrides.extra_ignored_dirs.iter().cloned());
        resolved
            .extra_note_extensions
            .extend(overrides.extra_note_extensions.iter().cloned());

        resolved
    }
}

// ============================================================================
// ProjectConfig
// ============================================================================

/// Per-project overrides of [`VersioningConfig`].
///
/// Every field is optional; unset fields fall back to the global config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VersioningOverride {
    #[serde(default)]
    pub default_timeline: Option<String>,
    #[serde(default)]
    pub fork_prefix: Option<String>,
    #[serde(default)]
    pub verify_writes: Option<bool>,
    #[serde(default)]
    pub parallel_hashing: Option<bool>,
    #[serde(default)]
    pub lock_wait_ms: Option<u64>,
    #[serde(default)]
    pub extra_ignored_dirs: Vec<String>,
    #[serde(default)]
    pub extra_note_extensions: Vec<String>,
}

/// Project-level configuration stored in `.cutready/versions/config.yaml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Overrides of the global versioning settings.
    #[serde(default)]
    pub versioning: VersioningOverride,
}

impl ProjectConfig {
    /// Load the project configuration for a project root.
    ///
    /// Returns defaults if the project has no config file.
    pub fn load_from_project(project_root: &Path) -> Result<Self, VersionError> {
        Self::from_path(&Self::config_path_for_project(project_root))
    }

    /// Load a project configuration from a specific path.
    ///
    /// # Errors
    ///
    /// Returns [`VersionError::InvalidConfig`] if the file exists but cannot be parsed.
    pub fn from_path(path: &Path) -> Result<Self, VersionError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| VersionError::InvalidConfig {
            path: path.to_path_buf(),
            message: format!("failed to read: {}", e),
        })?;

        serde_yaml::from_str(&content).map_err(|e| VersionError::InvalidConfig {
            path: path.to_path_buf(),
            message: format!("failed to parse: {}", e),
        })
    }

    /// Path of the project config file for a project root.
    pub fn config_path_for_project(project_root: &Path) -> PathBuf {
        project_root
            .join(CUTREADY_DIR)
            .join(VERSIONS_DIR)
            .join(CONFIG_FILENAME)
    }
}
