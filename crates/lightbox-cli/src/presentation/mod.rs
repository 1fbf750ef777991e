//! Shared CLI presentation utilities.
//!
//! Format-only helpers: terminal tables for snapshots and live progress
//! bars driven by queue events.

pub mod progress;
pub mod tables;

pub use progress::ProgressBoard;
pub use tables::{print_separator, print_task_table, truncate_string};
