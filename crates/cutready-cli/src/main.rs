//! # cutready CLI
//!
//! Command-line interface for CutReady project versioning.
//!
//! This binary provides human-friendly and scriptable access to
//! `cutready-core`. Run `cutready --help` for usage information.

mod cli;
pub mod ui;

use std::process::ExitCode;

fn main() -> ExitCode {
    cli::run()
}
