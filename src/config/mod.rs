//! Configuration management for imarisha-sync.
//!
//! This module handles loading and saving configuration from the home directory.

mod paths;
mod settings;

pub use paths::{Paths, HOME_ENV};
pub use settings::{ColorSetting, Config, GeneralConfig, LoggingConfig, SyncConfig};
