//!
//! Utility module for the scan pipeline.
//!
//! Re-exports formatting and locking helpers used throughout the codebase.
/// Utility functions for formatting and display
pub mod index;

pub use index::{format_gigabytes, format_percent, lock, now_millis};
