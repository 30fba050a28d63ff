//! Table rendering for CLI output using comfy-table.
//!
//! | Command | Table Function |
//! |---------|----------------|
//! | `cutready versions` | `render_versions_table()` |
//! | `cutready timeline list` | `render_timelines_table()` |
//! | `cutready log` | `render_oplog_table()` |

use comfy_table::presets::NOTHING;
use comfy_table::{Cell, CellAlignment, ColumnConstraint, Table, Width};

use cutready_core::{OpLogEntry, TimelineInfo, VersionEntry};

use super::color::remaining_width;
use super::format::{format_relative_time, truncate_label};

fn new_table() -> Table {
    let mut table = Table::new();
    table.load_preset(NOTHING);
    table
}

/// Render the version list of the active timeline.
///
/// `viewing` marks the version currently shown while rewound.
///
/// # Example Output
///
/// ```text
///   ID         DATE       MESSAGE                 CHANGES
/// > 00000003   2h ago     Tighten the intro       1 file changed
///   00000002   1d ago     Add storyboard          2 files changed
/// ```
pub fn render_versions_table(versions: &[VersionEntry], viewing: Option<&str>) -> String {
    if versions.is_empty() {
        return String::new();
    }

    let mut table = new_table();
    table.set_header(vec![
        Cell::new(" "),
        Cell::new("ID"),
        Cell::new("DATE"),
        Cell::new("MESSAGE"),
        Cell::new("CHANGES"),
    ]);
    table.set_constraints(vec![
        ColumnConstraint::LowerBoundary(Width::Fixed(1)),  // marker
        ColumnConstraint::LowerBoundary(Width::Fixed(8)),  // ID
        ColumnConstraint::LowerBoundary(Width::Fixed(10)), // DATE
        ColumnConstraint::LowerBoundary(Width::Fixed(24)), // MESSAGE
        ColumnConstraint::LowerBoundary(Width::Fixed(14)), // CHANGES
    ]);

    let message_width = remaining_width(50, 24);
    for version in versions {
        let marker = if viewing == Some(version.id.as_str()) { ">" } else { " " };
        table.add_row(vec![
            Cell::new(marker),
            Cell::new(version.id.as_str()),
            Cell::new(format_relative_time(version.timestamp)),
            Cell::new(truncate_label(&version.message, message_width)),
            Cell::new(&version.summary),
        ]);
    }

    table.trim_fmt().to_string()
}

/// Render the timeline list.
///
/// # Example Output
///
/// ```text
///   NAME         LABEL          HEAD       COMMITS
/// * main         Main           00000003         3
///   experiment   Experiment     00000004         1
/// ```
pub fn render_timelines_table(timelines: &[TimelineInfo]) -> String {
    if timelines.is_empty() {
        return String::new();
    }

    let mut table = new_table();
    table.set_header(vec![
        Cell::new(" "),
        Cell::new("NAME"),
        Cell::new("LABEL"),
        Cell::new("HEAD"),
        Cell::new("COMMITS").set_alignment(CellAlignment::Right),
    ]);
    table.set_constraints(vec![
        ColumnConstraint::LowerBoundary(Width::Fixed(1)),  // active
        ColumnConstraint::LowerBoundary(Width::Fixed(10)), // NAME
        ColumnConstraint::LowerBoundary(Width::Fixed(12)), // LABEL
        ColumnConstraint::LowerBoundary(Width::Fixed(8)),  // HEAD
        ColumnConstraint::LowerBoundary(Width::Fixed(7)),  // COMMITS
    ]);

    for t in timelines {
        let head = t
            .head_commit_id
            .as_ref()
            .map(|id| id.to_string())
            .unwrap_or_else(|| "-".to_string());
        table.add_row(vec![
            Cell::new(if t.is_active { "*" } else { " " }),
            Cell::new(&t.name),
            Cell::new(truncate_label(&t.label, 24)),
            Cell::new(head),
            Cell::new(t.commit_count).set_alignment(CellAlignment::Right),
        ]);
    }

    table.trim_fmt().to_string()
}

/// Render activity log entries.
///
/// # Example Output
///
/// ```text
/// DATE       OPERATION         TIMELINE   COMMIT     MESSAGE
/// 2h ago     save              main       00000003   Tighten the intro
/// 1d ago     init              main       -
/// ```
pub fn render_oplog_table(entries: &[OpLogEntry]) -> String {
    if entries.is_empty() {
        return String::new();
    }

    let mut table = new_table();
    table.set_header(vec![
        Cell::new("DATE"),
        Cell::new("OPERATION"),
        Cell::new("TIMELINE"),
        Cell::new("COMMIT"),
        Cell::new("MESSAGE"),
    ]);
    table.set_constraints(vec![
        ColumnConstraint::LowerBoundary(Width::Fixed(10)), // DATE
        ColumnConstraint::LowerBoundary(Width::Fixed(16)), // OPERATION
        ColumnConstraint::LowerBoundary(Width::Fixed(10)), // TIMELINE
        ColumnConstraint::LowerBoundary(Width::Fixed(8)),  // COMMIT
    ]);

    for entry in entries {
        let commit = entry
            .commit_id
            .as_ref()
            .map(|id| id.to_string())
            .unwrap_or_else(|| "-".to_string());
        let message = entry
            .message
            .as_deref()
            .map(|m| truncate_label(m, 40))
            .unwrap_or_default();
        table.add_row(vec![
            Cell::new(format_relative_time(entry.timestamp)),
            Cell::new(entry.kind.to_string()),
            Cell::new(&entry.timeline),
            Cell::new(commit),
            Cell::new(message),
        ]);
    }

    table.trim_fmt().to_string()
}
