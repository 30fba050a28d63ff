//! `--color` handling and terminal width.

use std::io::IsTerminal;

/// When to emit ANSI colors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorMode {
    Always,
    Never,
    /// Colors on a TTY unless `NO_COLOR` is set (https://no-color.org/).
    #[default]
    Auto,
}

impl ColorMode {
    /// Parse a `--color` / `CUTREADY_COLOR` value, case-insensitively.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "always" | "on" => Some(Self::Always),
            "never" | "off" => Some(Self::Never),
            "auto" => Some(Self::Auto),
            _ => None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        match self {
            Self::Always => true,
            Self::Never => false,
            Self::Auto => std::env::var_os("NO_COLOR").is_none() && std::io::stdout().is_terminal(),
        }
    }
}

/// Columns left for free text after `used` fixed columns, at least `min`.
///
/// Falls back to an 80-column terminal when stdout is not a terminal.
pub fn remaining_width(used: usize, min: usize) -> usize {
    let width = terminal_size::terminal_size()
        .map(|(w, _)| usize::from(w.0))
        .unwrap_or(80);
    width.saturating_sub(used).max(min)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_color_values() {
        assert_eq!(ColorMode::parse("Always"), Some(ColorMode::Always));
        assert_eq!(ColorMode::parse("off"), Some(ColorMode::Never));
        assert_eq!(ColorMode::parse(" auto "), Some(ColorMode::Auto));
        assert_eq!(ColorMode::parse("rainbow"), None);
    }

    #[test]
    fn test_explicit_modes_ignore_terminal() {
        assert!(ColorMode::Always.is_enabled());
        assert!(!ColorMode::Never.is_enabled());
    }

    #[test]
    fn test_remaining_width_has_floor() {
        assert_eq!(remaining_width(usize::MAX, 20), 20);
    }
}
