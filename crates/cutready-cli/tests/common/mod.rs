//! Shared test utilities for cutready-cli integration tests.

use std::fs;
use std::path::Path;

use assert_cmd::Command;

/// Get a Command for the cutready binary.
///
/// # Panics
///
/// Panics if the cutready binary cannot be found. This should not happen
/// in a properly configured test environment.
#[allow(deprecated)]
pub fn cutready_cmd() -> Command {
    Command::cargo_bin("cutready").expect("cutready binary should exist")
}

/// A cutready command running in `project`, isolated from the user's
/// global config and with colors off.
pub fn cutready_in(project: &Path) -> Command {
    let mut cmd = cutready_cmd();
    cmd.current_dir(project)
        .env("CUTREADY_CONFIG", project.join("test-global-config.yaml"))
        .env("CUTREADY_COLOR", "never")
        .env_remove("CUTREADY_PROJECT")
        .env_remove("CUTREADY_VERBOSE")
        .env_remove("CUTREADY_QUIET");
    cmd
}

/// Write a project file, creating parent directories.
pub fn write_file(project: &Path, rel: &str, content: &str) {
    let path = project.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent dir");
    }
    fs::write(path, content).expect("write project file");
}

/// Initialize versioning in `project`.
#[allow(dead_code)]
pub fn init_project(project: &Path) {
    cutready_in(project).arg("init").assert().success();
}

/// Write `intro.sk` with `content` and save it as a version.
#[allow(dead_code)]
pub fn save_sketch(project: &Path, content: &str, message: &str) {
    write_file(project, "intro.sk", content);
    cutready_in(project)
        .args(["save", "-m", message])
        .assert()
        .success();
}
