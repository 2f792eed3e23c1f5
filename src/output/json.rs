//! JSON output formatting.

use serde::Serialize;
use serde_json::json;

use crate::error::SyncError;
use crate::features::sync::{DeadLetter, QueuedRequest};

/// Format queued requests as JSON
///
/// # Errors
///
/// Returns `SyncError::Parse` if JSON serialization fails.
pub fn format_requests_json(requests: &[QueuedRequest]) -> Result<String, SyncError> {
    let output = json!({
        "count": requests.len(),
        "items": requests
    });
    Ok(serde_json::to_string_pretty(&output)?)
}

/// Format dead letters as JSON
///
/// # Errors
///
/// Returns `SyncError::Parse` if JSON serialization fails.
pub fn format_dead_letters_json(letters: &[DeadLetter]) -> Result<String, SyncError> {
    let output = json!({
        "count": letters.len(),
        "items": letters
    });
    Ok(serde_json::to_string_pretty(&output)?)
}

/// Generic JSON formatter for any serializable type
///
/// # Errors
///
/// Returns `SyncError::Parse` if JSON serialization fails.
pub fn to_json<T: Serialize>(value: &T) -> Result<String, SyncError> {
    Ok(serde_json::to_string_pretty(value)?)
}
