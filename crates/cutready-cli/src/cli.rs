//! CLI definition and command dispatch for CutReady versioning.
//!
//! This module defines the command-line interface using `clap` and provides
//! the `run()` function that dispatches commands to the engine.
//!
//! ## Configuration Precedence
//!
//! Configuration is resolved with the following precedence (highest to lowest):
//! 1. CLI flags (e.g., `--config`, `--project`)
//! 2. Environment variables (`CUTREADY_CONFIG`, `CUTREADY_PROJECT`, ...)
//! 3. Project config (`.cutready/versions/config.yaml`)
//! 4. Global config (`~/.cutready/config.yaml` or path from `--config`)
//! 5. Built-in defaults

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};

use crate::ui::{format, graph, table, ColorMode, MessageType, Style};

use cutready_core::{
    CommitId, EngineState, ErrorKind, OpKind, OpLogQuery, ProjectConfig, RecoveryAction,
    SnapshotEngine, VersionError, VersioningConfig,
};

// ============================================================================
// CLI Definition
// ============================================================================

/// Version string including git commit hash
const VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), " (", env!("GIT_HASH"), ")");

/// CutReady – local versioning for demo projects
#[derive(Parser, Debug)]
#[command(name = "cutready")]
#[command(author, version = VERSION, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output (debug logging)
    #[arg(short, long, global = true, env = "CUTREADY_VERBOSE")]
    pub verbose: bool,

    /// Suppress informational messages
    #[arg(short, long, global = true, env = "CUTREADY_QUIET")]
    pub quiet: bool,

    /// Project folder (default: current directory)
    #[arg(short = 'C', long, global = true, env = "CUTREADY_PROJECT", default_value = ".")]
    pub project: PathBuf,

    /// Path to global configuration file (default: ~/.cutready/config.yaml)
    #[arg(long, global = true, env = "CUTREADY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Color output mode: always, never, or auto (default: auto)
    #[arg(long, global = true, env = "CUTREADY_COLOR", default_value = "auto")]
    pub color: String,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start versioning the project folder
    #[command(after_help = r#"EXAMPLES:
    # Initialize in the current directory
    cutready init

    # Typical first-time workflow
    cutready init && cutready save -m "First draft"
"#)]
    Init,

    /// Show the working tree state, unsaved changes and stash
    #[command(after_help = r#"EXAMPLES:
    cutready status

    # Machine-readable
    cutready status --json | jq '.state'
"#)]
    Status {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Save the working tree as a new version
    #[command(after_help = r#"EXAMPLES:
    # Save on the active timeline
    cutready save -m "Tighten the intro"

    # While viewing an old version: name the timeline the save starts
    cutready save -m "Alternate ending" --fork-label "Experiment"
"#)]
    Save {
        /// Label for the version
        #[arg(short, long, default_value = "")]
        message: String,

        /// Name for the new timeline when saving from an old version
        #[arg(long)]
        fork_label: Option<String>,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// List versions of the active timeline, newest first
    Versions {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Show one version, or one file as it was in that version
    #[command(after_help = r#"EXAMPLES:
    cutready show 3
    cutready show 3 --file notes/script.md > script-v3.md
"#)]
    Show {
        /// Version id (e.g. `3` or `00000003`)
        id: String,

        /// Print this file's content at that version
        #[arg(long)]
        file: Option<String>,

        /// Output in JSON format
        #[arg(long, conflicts_with = "file")]
        json: bool,
    },

    /// Show a version in the working tree
    #[command(after_help = r#"EXAMPLES:
    # Look at version 2 (working tree must be clean)
    cutready goto 2

    # Keep unsaved edits in the stash, then go
    cutready goto 2 --stash

    # Throw unsaved edits away, then go
    cutready goto 2 --discard
"#)]
    Goto {
        /// Version id
        id: String,

        /// Stash unsaved changes first
        #[arg(long, conflicts_with = "discard")]
        stash: bool,

        /// Discard unsaved changes first
        #[arg(long)]
        discard: bool,
    },

    /// Move unsaved changes into the stash
    Stash,

    /// Throw away unsaved changes
    Discard,

    /// Put stashed changes back into the working tree
    Pop,

    /// Record an old version's content as a new version on the active timeline
    Restore {
        /// Version id
        id: String,
    },

    /// Manage timelines
    Timeline {
        #[command(subcommand)]
        action: TimelineAction,
    },

    /// Draw the timeline graph
    Graph {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Show the activity log
    #[command(after_help = r#"EXAMPLES:
    cutready log
    cutready log --op save,fork -n 10
    cutready log --since 2026-01-01T00:00:00Z --jsonl
"#)]
    Log {
        /// Filter by operation (comma-separated, e.g. save,navigate,pop)
        #[arg(long, value_delimiter = ',')]
        op: Option<Vec<String>>,

        /// Filter by timeline
        #[arg(long)]
        timeline: Option<String>,

        /// Entries since this timestamp (RFC 3339)
        #[arg(long)]
        since: Option<String>,

        /// Entries until this timestamp (RFC 3339)
        #[arg(long)]
        until: Option<String>,

        /// Maximum number of entries to return
        #[arg(short = 'n', long)]
        limit: Option<usize>,

        /// Output in JSON format
        #[arg(long)]
        json: bool,

        /// Output in JSONL format (one JSON object per line)
        #[arg(long, conflicts_with = "json")]
        jsonl: bool,
    },

    /// Finish or dismiss an operation that was interrupted
    #[command(after_help = r#"EXAMPLES:
    # Redo the interrupted write
    cutready recover

    # Keep the files as they are on disk
    cutready recover --acknowledge
"#)]
    Recover {
        /// Keep the working tree as it is instead of redoing the write
        #[arg(long)]
        acknowledge: bool,
    },

    /// Inspect configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Timeline subcommands
#[derive(Subcommand, Debug)]
pub enum TimelineAction {
    /// List timelines
    List {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Create a timeline and switch to it
    Create {
        /// Timeline name (lowercase letters, digits, `-`, `_`, `/`)
        name: String,

        /// Version to start from (default: head of the active timeline)
        #[arg(long)]
        from: Option<String>,

        /// Display label
        #[arg(long)]
        label: Option<String>,
    },

    /// Switch to another timeline
    Switch {
        name: String,
    },

    /// Delete a timeline (its versions are kept)
    Delete {
        name: String,
    },
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Validate configuration files and report warnings
    Check {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Show resolved configuration
    Show {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },
}

// ============================================================================
// Output context
// ============================================================================

/// Styling plus the `--quiet` switch.
struct Output {
    style: Style,
    quiet: bool,
}

impl Output {
    fn say(&self, msg_type: MessageType, text: &str) {
        if !self.quiet || matches!(msg_type, MessageType::Warn | MessageType::Err) {
            println!("{}", self.style.message(msg_type, text));
        }
    }

    fn detail(&self, label: &str, value: &str) {
        if !self.quiet {
            println!("{}", self.style.message_detail(label, value));
        }
    }
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

// ============================================================================
// Run function
// ============================================================================

/// Run the CLI application.
///
/// Parses command-line arguments, opens the project's engine, and dispatches
/// to the appropriate command handler.
///
/// # Returns
///
/// Returns `ExitCode::SUCCESS` on success, or `ExitCode::FAILURE` on error.
pub fn run() -> ExitCode {
    let cli = Cli::parse();

    // Warnings always show (config issues, recovery situations); debug with --verbose.
    let log_level = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "warn"
    };
    let filter = format!("cutready_core={},cutready={}", log_level, log_level);
    tracing_subscriber::fmt()
        .with_env_filter(&filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let color_mode = ColorMode::parse(&cli.color).unwrap_or(ColorMode::Auto);
    let out = Output {
        style: Style::new(color_mode),
        quiet: cli.quiet,
    };
    let root = cli.project.as_path();

    // Config inspection works even when the config itself is broken.
    if let Command::Config { action } = &cli.command {
        return finish(&out, handle_config(&out, root, cli.config.as_deref(), action));
    }

    let config = match SnapshotEngine::load_config(root, cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            let hint = match &cli.config {
                Some(path) => format!("Check your config at {}", path.display()),
                None => "Check ~/.cutready/config.yaml and .cutready/versions/config.yaml".to_string(),
            };
            eprintln!(
                "{}",
                out.style
                    .error_with_context("Failed to load configuration", Some(&e.to_string()), Some(&hint))
            );
            return ExitCode::FAILURE;
        }
    };

    if let Command::Init = cli.command {
        return finish(&out, handle_init(&out, root, config));
    }

    let mut engine = match SnapshotEngine::open(root, config) {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!(
                "{}",
                out.style
                    .error_with_context("Failed to open project", Some(&e.to_string()), hint_for(&e))
            );
            return ExitCode::FAILURE;
        }
    };

    let result = match cli.command {
        Command::Init | Command::Config { .. } => Ok(()),
        Command::Status { json } => handle_status(&out, &mut engine, json),
        Command::Save {
            message,
            fork_label,
            json,
        } => handle_save(&out, &mut engine, &message, fork_label.as_deref(), json),
        Command::Versions { json } => handle_versions(&out, &engine, json),
        Command::Show { id, file, json } => handle_show(&out, &engine, &id, file.as_deref(), json),
        Command::Goto { id, stash, discard } => handle_goto(&out, &mut engine, &id, stash, discard),
        Command::Stash => handle_stash(&out, &mut engine),
        Command::Discard => handle_discard(&out, &mut engine),
        Command::Pop => handle_pop(&out, &mut engine),
        Command::Restore { id } => handle_restore(&out, &mut engine, &id),
        Command::Timeline { action } => handle_timeline(&out, &mut engine, action),
        Command::Graph { json } => handle_graph(&out, &engine, json),
        Command::Log {
            op,
            timeline,
            since,
            until,
            limit,
            json,
            jsonl,
        } => handle_log(&out, &engine, op, timeline, since, until, limit, json, jsonl),
        Command::Recover { acknowledge } => handle_recover(&out, &mut engine, acknowledge),
    };

    finish(&out, result)
}

fn finish(out: &Output, result: Result<()>) -> ExitCode {
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let hint = e.downcast_ref::<VersionError>().and_then(hint_for);
            eprintln!("{}", out.style.error_with_context(&e.to_string(), None, hint));
            ExitCode::FAILURE
        }
    }
}

/// Next step for errors the user can act on.
fn hint_for(e: &VersionError) -> Option<&'static str> {
    match e {
        VersionError::DirtyWorkingTree => Some(
            "Save with `cutready save -m <label>`, or add `--stash` or `--discard` to `cutready goto`",
        ),
        VersionError::InterruptedOperation { .. } => Some(
            "Run `cutready recover` to finish it, or `cutready recover --acknowledge` to keep the files as they are",
        ),
        VersionError::StashAlreadyExists { .. } => Some("Run `cutready pop` to restore the existing stash first"),
        VersionError::NotInitialized { .. } => Some("Run `cutready init` in the project folder"),
        VersionError::CannotDeleteActive(_) => Some("Switch with `cutready timeline switch <name>` first"),
        _ => match e.kind() {
            ErrorKind::Corruption => {
                Some("Versioning data is unreadable and was left untouched; repair or restore it manually")
            }
            ErrorKind::Io | ErrorKind::ConcurrentModification => Some("Retry the operation"),
            _ => None,
        },
    }
}

// ============================================================================
// Command handlers
// ============================================================================

fn handle_init(out: &Output, root: &Path, config: VersioningConfig) -> Result<()> {
    match SnapshotEngine::init(root, config) {
        Ok(engine) => {
            out.say(
                MessageType::Ok,
                &format!(
                    "Initialized versioning at {} on timeline `{}`",
                    engine.project().root().display(),
                    engine.active_name()
                ),
            );
            if !out.quiet {
                println!();
                println!("{}", out.style.message(MessageType::Hint, "Next steps:"));
                println!("  1. Save a version:    cutready save -m \"First draft\"");
                println!("  2. Browse history:    cutready versions");
            }
            Ok(())
        }
        Err(VersionError::AlreadyInitialized { path }) => {
            out.say(
                MessageType::Info,
                &format!("Versioning is already initialized at {}", path.display()),
            );
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

fn describe_state(style: &Style, state: &EngineState) -> String {
    let at = |tip: &Option<CommitId>| match tip {
        Some(id) => style.commit_id(id.as_str()),
        None => "no versions yet".to_string(),
    };
    match state {
        EngineState::Clean { tip } => format!("clean at {}", at(tip)),
        EngineState::Dirty { tip } => format!("unsaved changes on top of {}", at(tip)),
        EngineState::Rewound {
            viewing,
            origin_tip,
            dirty,
        } => format!(
            "viewing {} (tip was {}){}",
            style.commit_id(viewing.as_str()),
            at(origin_tip),
            if *dirty { ", with unsaved changes" } else { "" }
        ),
        EngineState::Interrupted { op, target } => {
            format!("interrupted `{}` (target {})", op, target)
        }
    }
}

fn handle_status(out: &Output, engine: &mut SnapshotEngine, json: bool) -> Result<()> {
    let report = engine.status()?;

    if json {
        return print_json(&report);
    }

    let style = &out.style;
    println!("{}", style.section("STATUS"));
    println!();
    println!(
        "  {}",
        style.key_value("Project", &engine.project().root().display().to_string())
    );
    println!("  {}", style.key_value("Timeline", &report.active_timeline));
    println!("  {}", style.key_value("State", &describe_state(style, &report.state)));

    if let Some(stash) = &report.stash {
        let from = stash
            .from_commit_id
            .as_ref()
            .map(|id| id.to_string())
            .unwrap_or_else(|| "an empty project".to_string());
        println!(
            "  {}",
            style.key_value(
                "Stash",
                &format!(
                    "{} from {} ({})",
                    format::format_file_count(stash.file_count()),
                    from,
                    format::format_relative_time(stash.created_at)
                )
            )
        );
    }

    println!();
    if report.changes.is_empty() {
        println!("nothing to save, working tree clean");
    } else {
        println!("Unsaved changes:");
        println!("  (use \"cutready save -m <label>\" to save, \"cutready discard\" to drop)");
        println!();
        for change in &report.changes {
            println!("{}", style.change(change.kind, &change.path));
        }
    }

    if let Some(ghost) = &report.ghost_branch {
        println!();
        out.say(
            MessageType::Hint,
            &format!(
                "Saving now starts a new timeline from {}",
                style.commit_id(ghost.from_commit_id.as_str())
            ),
        );
    }
    if let EngineState::Interrupted { .. } = report.state {
        println!();
        out.say(
            MessageType::Warn,
            "A previous operation did not complete. Run `cutready recover`.",
        );
    }
    Ok(())
}

fn handle_save(
    out: &Output,
    engine: &mut SnapshotEngine,
    message: &str,
    fork_label: Option<&str>,
    json: bool,
) -> Result<()> {
    let outcome = match engine.save(message, fork_label) {
        Ok(outcome) => outcome,
        Err(VersionError::NothingToSave) => {
            out.say(MessageType::Info, "Nothing to save, working tree clean");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    if json {
        return print_json(&outcome);
    }

    out.say(
        MessageType::Ok,
        &format!(
            "Saved version {} on `{}`",
            out.style.commit_id(outcome.commit.id.as_str()),
            outcome.timeline
        ),
    );
    out.detail("Message", &outcome.commit.message);
    out.detail("Files", &format::format_file_count(outcome.commit.manifest.len()));
    if outcome.forked {
        let parent = outcome
            .commit
            .parent_id
            .as_ref()
            .map(|id| id.to_string())
            .unwrap_or_default();
        out.detail(
            "Forked",
            &format!("new timeline `{}` from {}", outcome.timeline, parent),
        );
    }
    Ok(())
}

fn handle_versions(out: &Output, engine: &SnapshotEngine, json: bool) -> Result<()> {
    let versions = engine.list_versions()?;

    if json {
        return print_json(&versions);
    }
    if versions.is_empty() {
        out.say(
            MessageType::Info,
            "No versions yet. Run `cutready save -m <label>` to create one.",
        );
        return Ok(());
    }

    let viewing = engine.rewind_marker().map(|m| m.viewing_commit_id.as_str());
    println!(
        "{}",
        out.style
            .section(&format!("VERSIONS ({})", engine.active_name()))
    );
    println!();
    println!("{}", table::render_versions_table(&versions, viewing));
    Ok(())
}

fn handle_show(
    out: &Output,
    engine: &SnapshotEngine,
    id: &str,
    file: Option<&str>,
    json: bool,
) -> Result<()> {
    let id = CommitId::parse(id)?;

    if let Some(path) = file {
        let bytes = engine.file_at_version(&id, path)?;
        let mut stdout = std::io::stdout().lock();
        stdout.write_all(&bytes).context("Failed to write to stdout")?;
        stdout.flush().context("Failed to write to stdout")?;
        return Ok(());
    }

    let commit = engine.commit(&id)?;
    if json {
        return print_json(&commit);
    }

    let style = &out.style;
    let parent = commit
        .parent_id
        .as_ref()
        .map(|p| p.to_string())
        .unwrap_or_else(|| "(none)".to_string());
    println!("{}", style.section("VERSION"));
    println!();
    println!("  {}", style.key_value("Id", &style.commit_id(commit.id.as_str())));
    println!("  {}", style.key_value("Parent", &parent));
    println!("  {}", style.key_value("Timeline", &commit.timeline_name));
    println!(
        "  {}",
        style.key_value("Date", &format::format_timestamp(commit.timestamp))
    );
    println!("  {}", style.key_value("Message", &commit.message));
    if let Some(blob) = engine.load_editor_state(&id)? {
        println!(
            "  {}",
            style.key_value("Editor state", &format::format_size(blob.len() as u64))
        );
    }

    println!();
    println!(
        "{}",
        style.section(&format!("FILES ({})", commit.manifest.len()))
    );
    println!();
    for (path, digest) in &commit.manifest {
        println!("  {:>10}  {}", format::format_size(digest.size), path);
    }
    Ok(())
}

fn handle_goto(
    out: &Output,
    engine: &mut SnapshotEngine,
    id: &str,
    stash: bool,
    discard: bool,
) -> Result<()> {
    let id = CommitId::parse(id)?;
    if stash {
        engine.stash_then_navigate(&id)?;
    } else if discard {
        engine.discard_then_navigate(&id)?;
    } else {
        engine.navigate_to(&id)?;
    }

    if engine.is_rewound() {
        out.say(
            MessageType::Ok,
            &format!("Viewing version {}", out.style.commit_id(id.as_str())),
        );
        if let Some(ghost) = engine.ghost_branch()? {
            out.say(
                MessageType::Hint,
                &format!(
                    "Saving here starts a new timeline from {}",
                    ghost.from_commit_id
                ),
            );
        }
    } else {
        out.say(
            MessageType::Ok,
            &format!(
                "At the latest version of `{}` ({})",
                engine.active_name(),
                out.style.commit_id(id.as_str())
            ),
        );
    }
    if stash && engine.has_stash() {
        out.say(MessageType::Hint, "Unsaved changes are stashed; `cutready pop` restores them");
    }
    Ok(())
}

fn handle_stash(out: &Output, engine: &mut SnapshotEngine) -> Result<()> {
    let info = engine.stash_changes()?;
    out.say(
        MessageType::Ok,
        &format!("Stashed {}", format::format_file_count(info.file_count())),
    );
    Ok(())
}

fn handle_discard(out: &Output, engine: &mut SnapshotEngine) -> Result<()> {
    if !engine.is_dirty()? {
        out.say(MessageType::Info, "Nothing to discard, working tree clean");
        return Ok(());
    }
    engine.discard_changes()?;
    out.say(MessageType::Ok, "Discarded unsaved changes");
    Ok(())
}

fn handle_pop(out: &Output, engine: &mut SnapshotEngine) -> Result<()> {
    let info = engine.pop_stash()?;
    out.say(
        MessageType::Ok,
        &format!(
            "Restored {} from the stash",
            format::format_file_count(info.file_count())
        ),
    );
    Ok(())
}

fn handle_restore(out: &Output, engine: &mut SnapshotEngine, id: &str) -> Result<()> {
    let id = CommitId::parse(id)?;
    let outcome = engine.restore_version(&id)?;
    out.say(
        MessageType::Ok,
        &format!(
            "Restored version {} as {} on `{}`",
            out.style.commit_id(id.as_str()),
            out.style.commit_id(outcome.commit.id.as_str()),
            outcome.timeline
        ),
    );
    Ok(())
}

fn handle_timeline(out: &Output, engine: &mut SnapshotEngine, action: TimelineAction) -> Result<()> {
    match action {
        TimelineAction::List { json } => {
            let timelines = engine.list_timelines()?;
            if json {
                return print_json(&timelines);
            }
            println!("{}", out.style.section("TIMELINES"));
            println!();
            println!("{}", table::render_timelines_table(&timelines));
        }
        TimelineAction::Create { name, from, label } => {
            let from = match from {
                Some(id) => CommitId::parse(&id)?,
                None => engine.active_head().cloned().ok_or_else(|| {
                    anyhow!(
                        "Timeline `{}` has no versions yet; pass --from <id>",
                        engine.active_name()
                    )
                })?,
            };
            let info = engine.create_timeline(&from, &name, label.as_deref())?;
            out.say(
                MessageType::Ok,
                &format!(
                    "Created timeline {} at {} and switched to it",
                    out.style.timeline(&info.name, false).trim_start(),
                    out.style.commit_id(from.as_str())
                ),
            );
        }
        TimelineAction::Switch { name } => {
            engine.switch_timeline(&name)?;
            out.say(MessageType::Ok, &format!("Switched to timeline `{}`", name));
        }
        TimelineAction::Delete { name } => {
            engine.delete_timeline(&name)?;
            out.say(
                MessageType::Ok,
                &format!("Deleted timeline `{}` (its versions are kept)", name),
            );
        }
    }
    Ok(())
}

fn handle_graph(out: &Output, engine: &SnapshotEngine, json: bool) -> Result<()> {
    let timeline_graph = engine.timeline_graph()?;
    let ghost = engine.ghost_branch()?;

    if json {
        return print_json(&serde_json::json!({
            "lanes": timeline_graph.lanes,
            "nodes": timeline_graph.nodes,
            "edges": timeline_graph.edges,
            "ghostBranch": ghost,
        }));
    }
    if timeline_graph.nodes.is_empty() {
        out.say(MessageType::Info, "No versions yet.");
        return Ok(());
    }

    let current = engine
        .rewind_marker()
        .map(|m| &m.viewing_commit_id)
        .or_else(|| engine.active_head());
    println!(
        "{}",
        graph::render_graph(&out.style, &timeline_graph, current, ghost.as_ref())
    );
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn handle_log(
    out: &Output,
    engine: &SnapshotEngine,
    op: Option<Vec<String>>,
    timeline: Option<String>,
    since: Option<String>,
    until: Option<String>,
    limit: Option<usize>,
    json: bool,
    jsonl: bool,
) -> Result<()> {
    let mut query = OpLogQuery::new();

    if let Some(ops) = op {
        for s in ops {
            let kind: OpKind = s.parse().map_err(|e: String| anyhow!(e))?;
            query = query.with_kind(kind);
        }
    }
    if let Some(name) = timeline {
        query = query.with_timeline(name);
    }
    if let Some(since_str) = since {
        let since_dt = chrono::DateTime::parse_from_rfc3339(&since_str)
            .with_context(|| format!("Invalid --since timestamp `{}`", since_str))?
            .with_timezone(&chrono::Utc);
        query = query.with_since(since_dt);
    }
    if let Some(until_str) = until {
        let until_dt = chrono::DateTime::parse_from_rfc3339(&until_str)
            .with_context(|| format!("Invalid --until timestamp `{}`", until_str))?
            .with_timezone(&chrono::Utc);
        query = query.with_until(until_dt);
    }
    if let Some(lim) = limit {
        query = query.with_limit(lim);
    }

    let entries = engine.op_log(&query)?;

    if json {
        return print_json(&entries);
    }
    if jsonl {
        for entry in &entries {
            println!("{}", serde_json::to_string(entry)?);
        }
        return Ok(());
    }
    if entries.is_empty() {
        out.say(MessageType::Info, "No log entries found.");
        return Ok(());
    }

    println!("{}", out.style.section("ACTIVITY"));
    println!();
    println!("{}", table::render_oplog_table(&entries));
    Ok(())
}

fn handle_recover(out: &Output, engine: &mut SnapshotEngine, acknowledge: bool) -> Result<()> {
    let Some(pending) = engine.pending_operation().cloned() else {
        out.say(MessageType::Info, "No interrupted operation to recover");
        return Ok(());
    };

    let action = if acknowledge {
        RecoveryAction::Acknowledge
    } else {
        RecoveryAction::Resume
    };
    engine.recover(action)?;

    let verb = match action {
        RecoveryAction::Resume => "Completed",
        RecoveryAction::Acknowledge => "Dismissed",
    };
    out.say(
        MessageType::Ok,
        &format!(
            "{} interrupted `{}` (target {})",
            verb,
            pending.op,
            pending.describe_target()
        ),
    );
    if action == RecoveryAction::Acknowledge && engine.is_dirty()? {
        out.say(
            MessageType::Hint,
            "The working tree differs from its version; review with `cutready status`",
        );
    }
    Ok(())
}

// ============================================================================
// Config command handler
// ============================================================================

fn handle_config(
    out: &Output,
    root: &Path,
    global_path: Option<&Path>,
    action: &ConfigAction,
) -> Result<()> {
    match action {
        ConfigAction::Check { json } => handle_config_check(out, root, global_path, *json),
        ConfigAction::Show { json } => handle_config_show(out, root, global_path, *json),
    }
}

/// Validate configuration files and report warnings.
fn handle_config_check(
    out: &Output,
    root: &Path,
    global_path: Option<&Path>,
    json: bool,
) -> Result<()> {
    let project_path = ProjectConfig::config_path_for_project(root);
    let checked = SnapshotEngine::load_config(root, global_path)
        .and_then(|config| config.validate(&project_path).map_err(anyhow::Error::from));

    let (warnings, error) = match checked {
        Ok(warnings) => (warnings, None),
        Err(e) => (Vec::new(), Some(format!("{:#}", e))),
    };

    if json {
        print_json(&serde_json::json!({
            "valid": error.is_none(),
            "warnings": warnings,
            "error": error,
        }))?;
    } else {
        for warning in &warnings {
            out.say(MessageType::Warn, warning);
        }
        match &error {
            None if warnings.is_empty() => out.say(MessageType::Ok, "Configuration is valid"),
            None => out.say(MessageType::Ok, "Configuration is valid with warnings"),
            Some(_) => {}
        }
    }

    match error {
        Some(message) => Err(anyhow!("Configuration has errors: {}", message)),
        None => Ok(()),
    }
}

/// Show resolved configuration (merged from all sources).
fn handle_config_show(
    out: &Output,
    root: &Path,
    global_path: Option<&Path>,
    json: bool,
) -> Result<()> {
    let config = SnapshotEngine::load_config(root, global_path)?;

    if !json {
        out.say(MessageType::Info, "Resolved configuration:");
        if !out.quiet {
            println!();
        }
    }
    print_json(&config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_goto_flags_conflict() {
        let parsed = Cli::try_parse_from(["cutready", "goto", "2", "--stash", "--discard"]);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_dirty_tree_hint_offers_three_ways_out() {
        let hint = hint_for(&VersionError::DirtyWorkingTree).unwrap();
        assert!(hint.contains("save"));
        assert!(hint.contains("--stash"));
        assert!(hint.contains("--discard"));
    }

    #[test]
    fn test_corruption_hint_is_not_retry() {
        let hint = hint_for(&VersionError::corrupt("timelines.json", "bad")).unwrap();
        assert!(!hint.contains("Retry"));
    }
}
