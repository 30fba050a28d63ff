//! # CLI UI Module
//!
//! Styling and formatting layer for `cutready` output.
//!
//! Human output is meant to be read at a glance: every message carries a
//! typed prefix (`[ok]`, `[err]`, ...), colors are optional and `NO_COLOR`
//! is respected. Commands that print data also accept `--json`.
//!
//! ## Module Structure
//!
//! - `color`: `--color` handling and terminal width
//! - `style`: Message types, prefixes, and styling functions
//! - `format`: Sizes, counts, timestamps, truncation
//! - `table`: Table rendering with comfy-table
//! - `graph`: Text rendering of the timeline graph

pub mod color;
pub mod format;
pub mod graph;
pub mod style;
pub mod table;

pub use color::ColorMode;
pub use style::{MessageType, Style};
