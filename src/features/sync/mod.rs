//! Offline request queue.
//!
//! HTTP calls that cannot be delivered right now are persisted and replayed
//! later when the device is back online.
//!
//! Features:
//! - Persistent queue keyed by request id, with priorities
//! - Sequential replay in priority-then-age order
//! - Bounded retries with a dead-letter list for permanent failures
//! - Connectivity monitoring with a fixed-delay pass trigger

pub mod connectivity;
pub mod dispatcher;
pub mod processor;
pub mod queue;
pub mod request;
pub mod store;
pub mod transport;
pub mod watcher;

pub use connectivity::{
    ConnectivityMonitor, ConnectivityProbe, HttpProbe, StaticProbe, SyncTrigger, Transition,
};
pub use dispatcher::{DispatchOutcome, Dispatcher};
pub use processor::{
    format_pass_report, sort_for_replay, PassReport, ProcessorConfig, ProcessorState,
    QueueProcessor, ReplayOutcome, ReplayResult,
};
pub use queue::{QueueStats, RequestQueue};
pub use request::{
    parse_header, validate_headers, ConflictResolution, DeadLetter, DeadReason, NewRequest,
    Priority, QueuedRequest,
};
pub use store::{RequestStore, SqliteRequestStore};
pub use transport::{HttpTransport, Transport};
pub use watcher::Watcher;
