//! Path resolution for imarisha-sync configuration and data files.
//!
//! All data lives under one home directory, `~/.imarisha/` by default:
//! - `config.yaml` - Main configuration file
//! - `outbox.db` - SQLite database holding the request queue and dead letters

use std::path::{Path, PathBuf};

use crate::error::SyncError;

/// Environment variable that overrides the home directory.
pub const HOME_ENV: &str = "IMARISHA_HOME";

/// Paths to configuration and data files.
#[derive(Debug, Clone)]
pub struct Paths {
    /// Root directory: `~/.imarisha/`
    pub root: PathBuf,
    /// Config file: `~/.imarisha/config.yaml`
    pub config_file: PathBuf,
    /// Database file: `~/.imarisha/outbox.db`
    pub database: PathBuf,
}

impl Paths {
    /// Resolve paths from `IMARISHA_HOME`, falling back to `$HOME/.imarisha`.
    ///
    /// # Errors
    ///
    /// Returns an error if neither variable is set.
    pub fn new() -> Result<Self, SyncError> {
        if let Ok(root) = std::env::var(HOME_ENV) {
            if !root.is_empty() {
                return Ok(Self::with_root(PathBuf::from(root)));
            }
        }

        let home = std::env::var("HOME")
            .map_err(|_| SyncError::Config("Could not determine home directory".to_string()))?;

        Ok(Self::with_root(PathBuf::from(home).join(".imarisha")))
    }

    /// Resolve paths from an explicit root when given, otherwise from the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if no root is given and the environment cannot be resolved.
    pub fn resolve(root: Option<&Path>) -> Result<Self, SyncError> {
        root.map_or_else(Self::new, |r| Ok(Self::with_root(r.to_path_buf())))
    }

    /// Create paths with a custom root directory.
    #[must_use]
    pub fn with_root(root: PathBuf) -> Self {
        Self {
            config_file: root.join("config.yaml"),
            database: root.join("outbox.db"),
            root,
        }
    }

    /// Ensure the root directory exists.
    ///
    /// # Errors
    ///
    /// Returns an error if directory creation fails.
    pub fn ensure_dirs(&self) -> Result<(), SyncError> {
        if !self.root.exists() {
            std::fs::create_dir_all(&self.root).map_err(|e| {
                SyncError::Config(format!(
                    "Failed to create directory {}: {e}",
                    self.root.display()
                ))
            })?;
        }
        Ok(())
    }
}
