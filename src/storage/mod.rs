//! Storage layer for imarisha-sync.
//!
//! SQLite-based persistence for the request queue and dead-letter list.

mod database;
mod migrations;

pub use database::Database;
pub use migrations::CURRENT_VERSION;
