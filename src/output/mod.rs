//! Output formatting for imarisha-sync.
//!
//! This module provides formatters for displaying queue data in various formats.

mod json;
mod pretty;

use crate::cli::args::OutputFormat;
use crate::error::SyncError;
use crate::features::sync::{DeadLetter, QueueStats, QueuedRequest};

pub use json::*;
pub use pretty::*;

/// Format queued requests based on output format
///
/// # Errors
///
/// Returns `SyncError::Parse` if JSON serialization fails.
pub fn format_requests(
    requests: &[QueuedRequest],
    title: &str,
    format: OutputFormat,
) -> Result<String, SyncError> {
    match format {
        OutputFormat::Pretty => Ok(format_requests_pretty(requests, title)),
        OutputFormat::Json => format_requests_json(requests),
    }
}

/// Format queue statistics based on output format
///
/// # Errors
///
/// Returns `SyncError::Parse` if JSON serialization fails.
pub fn format_stats(stats: &QueueStats, format: OutputFormat) -> Result<String, SyncError> {
    match format {
        OutputFormat::Pretty => Ok(format_stats_pretty(stats)),
        OutputFormat::Json => to_json(stats),
    }
}

/// Format dead letters based on output format
///
/// # Errors
///
/// Returns `SyncError::Parse` if JSON serialization fails.
pub fn format_dead_letters(
    letters: &[DeadLetter],
    format: OutputFormat,
) -> Result<String, SyncError> {
    match format {
        OutputFormat::Pretty => Ok(format_dead_letters_pretty(letters)),
        OutputFormat::Json => format_dead_letters_json(letters),
    }
}
