//! Utility functions for string formatting.

pub mod format;

pub use format::{format_date, pad_display, truncate_string};
