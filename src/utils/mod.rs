//! Shared utility functions.
//!
//! - Atomic file writes with interrupted-write recovery
//! - Output truncation (UTF-8 safe)
//! - POSIX shell quoting for generated runner scripts
//! - Percentage and duration formatting

mod file_ops;
mod format;
mod string;

pub use file_ops::{remove_interrupted_writes, write_atomic};
pub use format::{format_duration, ratio_to_percent};
pub use string::{shell_quote, truncate_output, truncate_with_marker};
