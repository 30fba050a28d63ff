//! Prefixes and colors for CLI messages.
//!
//! | Prefix | Meaning | Color |
//! |--------|---------|-------|
//! | `[ok]` | Success | Green |
//! | `[err]` | Error | Red |
//! | `[warn]` | Warning | Yellow |
//! | `[info]` | Information | Blue |
//! | `[hint]` | Suggested next command | Cyan |

use cutready_core::ChangeKind;
use owo_colors::{AnsiColors, OwoColorize};

use super::color::ColorMode;

/// Kind of a one-line CLI message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Ok,
    Err,
    Warn,
    Info,
    Hint,
}

impl MessageType {
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Ok => "[ok]",
            Self::Err => "[err]",
            Self::Warn => "[warn]",
            Self::Info => "[info]",
            Self::Hint => "[hint]",
        }
    }

    fn color(&self) -> AnsiColors {
        match self {
            Self::Ok => AnsiColors::Green,
            Self::Err => AnsiColors::Red,
            Self::Warn => AnsiColors::Yellow,
            Self::Info => AnsiColors::Blue,
            Self::Hint => AnsiColors::Cyan,
        }
    }
}

/// Renders messages, ids, timelines and change lines.
///
/// The color decision is taken once, when the style is built.
///
/// ```text
/// [ok] Saved version 00000003 on `main`
///      Files: 4 files
/// ```
#[derive(Debug, Clone)]
pub struct Style {
    colors: bool,
}

impl Style {
    pub fn new(color_mode: ColorMode) -> Self {
        Self {
            colors: color_mode.is_enabled(),
        }
    }

    fn paint(&self, text: &str, color: AnsiColors) -> String {
        if self.colors {
            text.color(color).to_string()
        } else {
            text.to_string()
        }
    }

    /// `[ok] text`, `[err] text`, ...
    pub fn message(&self, msg_type: MessageType, text: &str) -> String {
        format!("{} {}", self.paint(msg_type.prefix(), msg_type.color()), text)
    }

    /// Indented `label: value` line under a message.
    pub fn message_detail(&self, label: &str, value: &str) -> String {
        format!("     {}: {}", label, value)
    }

    pub fn section(&self, title: &str) -> String {
        if self.colors {
            title.bold().to_string()
        } else {
            title.to_string()
        }
    }

    /// An `[err]` line followed by optional `Cause:` and `Hint:` lines.
    pub fn error_with_context(&self, msg: &str, cause: Option<&str>, hint: Option<&str>) -> String {
        let mut lines = vec![self.message(MessageType::Err, msg)];
        lines.extend(cause.map(|c| format!("      Cause: {}", c)));
        lines.extend(hint.map(|h| format!("      Hint: {}", h)));
        lines.join("\n")
    }

    pub fn key_value(&self, key: &str, value: &str) -> String {
        if self.colors {
            format!("{}: {}", key.dimmed(), value)
        } else {
            format!("{}: {}", key, value)
        }
    }

    pub fn commit_id(&self, id: &str) -> String {
        self.paint(id, AnsiColors::Yellow)
    }

    /// Timeline name; the active one is marked with `*`.
    pub fn timeline(&self, name: &str, active: bool) -> String {
        if active {
            format!("* {}", self.paint(name, AnsiColors::Green))
        } else {
            format!("  {}", self.paint(name, AnsiColors::Cyan))
        }
    }

    /// One unsaved change, aligned like `git status`.
    pub fn change(&self, kind: ChangeKind, path: &str) -> String {
        let (label, color) = match kind {
            ChangeKind::Added => ("added:", AnsiColors::Green),
            ChangeKind::Modified => ("modified:", AnsiColors::Yellow),
            ChangeKind::Deleted => ("deleted:", AnsiColors::Red),
        };
        format!("        {} {}", self.paint(&format!("{:<10}", label), color), path)
    }
}
