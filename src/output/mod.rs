//! Output formatting module
//!
//! Provides the output formats for attempts and final run reports.

mod formatter;

pub use formatter::{OutputFormat, ResultFormatter};
