//! Error types for imarisha-sync.

use thiserror::Error;

/// Errors produced by the outbox and its front end.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Configuration could not be read, parsed or resolved.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The local store rejected an operation.
    #[error("Database error: {0}")]
    Database(String),

    /// Filesystem or stream failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failure.
    #[error("Parse error: {0}")]
    Parse(String),

    /// A record with the given id does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The caller supplied a request that cannot be queued or sent.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The outbound HTTP call could not be completed.
    #[error("Transport error: {0}")]
    Transport(String),
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse(err.to_string())
    }
}

impl From<rusqlite::Error> for SyncError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Database(err.to_string())
    }
}

impl SyncError {
    /// Whether the error came from the local store.
    #[must_use]
    pub const fn is_storage(&self) -> bool {
        matches!(self, Self::Database(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_context() {
        let err = SyncError::Database("disk full".to_string());
        assert_eq!(err.to_string(), "Database error: disk full");
        assert!(err.is_storage());
    }

    #[test]
    fn test_from_serde_json() {
        let err: SyncError = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert!(matches!(err, SyncError::Parse(_)));
        assert!(!err.is_storage());
    }
}
