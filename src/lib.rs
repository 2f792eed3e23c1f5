//! imarisha-sync - offline request outbox for the Imarisha Loans field client
//!
//! HTTP calls that cannot be delivered while the device is offline are kept
//! in a local SQLite queue and replayed, highest priority and oldest first,
//! once connectivity returns.

#![deny(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod config;
pub mod error;
pub mod features;
pub mod output;
pub mod storage;

pub use cli::args::{Cli, Commands, OutputFormat};
pub use error::SyncError;
pub use features::sync::{NewRequest, QueueProcessor, QueuedRequest, RequestQueue};
