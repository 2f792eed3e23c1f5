//! Command implementations for imarisha-sync.
//!
//! This module contains the implementation of all CLI commands.

mod dead;
mod sync;

use std::path::Path;

use clap_complete::Shell;

pub use dead::dead;
pub use sync::{clear, enqueue, list, process, remove, send, status, watch};

use crate::cli::args::OutputFormat;
use crate::config::{Config, Paths};
use crate::error::SyncError;
use crate::features::shell::{completion_install_instructions, generate_completions};
use crate::features::sync::{HttpProbe, HttpTransport, RequestQueue, SqliteRequestStore};

/// Resolved configuration shared by all commands.
pub struct Context {
    pub paths: Paths,
    pub config: Config,
    pub format: OutputFormat,
}

impl Context {
    /// Resolve paths, load the config file and pick the output format.
    ///
    /// # Errors
    ///
    /// Returns an error if the paths cannot be resolved or the config file is invalid.
    pub fn load(home: Option<&Path>, output: Option<OutputFormat>) -> Result<Self, SyncError> {
        let paths = Paths::resolve(home)?;
        let config = Config::load_from_path(&paths.config_file)?;
        let format = output.unwrap_or(config.general.default_output);

        Ok(Self {
            paths,
            config,
            format,
        })
    }

    /// Open the queue in the data directory, creating it on first use.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or database cannot be created.
    pub fn open_queue(&self) -> Result<RequestQueue, SyncError> {
        self.paths.ensure_dirs()?;
        RequestQueue::new(
            SqliteRequestStore::at_path(&self.paths.database),
            &self.config.sync,
        )
    }

    /// HTTP transport for replays.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn transport(&self) -> Result<HttpTransport, SyncError> {
        HttpTransport::new(self.config.sync.request_timeout())
    }

    /// Connectivity probe against the configured URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn probe(&self) -> Result<HttpProbe, SyncError> {
        HttpProbe::new(&self.config.sync.probe_url, self.config.sync.probe_timeout())
    }
}

/// Execute completions command
///
/// # Errors
///
/// Returns an error if the script cannot be generated.
pub fn completions(shell: Shell, install: bool) -> Result<String, SyncError> {
    if install {
        Ok(completion_install_instructions(shell))
    } else {
        generate_completions(shell)
    }
}
