//! Feature implementations for imarisha-sync.
//!
//! - Offline request queue and replay
//! - Shell integration

pub mod shell;
pub mod sync;
