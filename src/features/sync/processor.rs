//! Queue processor.
//!
//! Replays queued requests in priority-then-age order, one at a time, and
//! applies the retry ceiling to the ones that fail.

use std::fmt;

use colored::Colorize;
use serde::Serialize;

use super::queue::RequestQueue;
use super::request::{DeadLetter, QueuedRequest};
use super::store::RequestStore;
use super::transport::{is_success, Transport};
use crate::config::SyncConfig;
use crate::error::SyncError;

/// Configuration for the processor.
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    /// Keep permanently failed requests as dead letters instead of discarding them
    pub dead_letter: bool,
    /// Report the replay order without sending anything
    pub dry_run: bool,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            dead_letter: true,
            dry_run: false,
        }
    }
}

impl From<&SyncConfig> for ProcessorConfig {
    fn from(config: &SyncConfig) -> Self {
        Self {
            dead_letter: config.dead_letter,
            dry_run: false,
        }
    }
}

/// Processor state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessorState {
    Idle,
    Processing,
}

/// What happened to one request during a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplayOutcome {
    /// Delivered and removed from the queue
    Delivered,
    /// Failed; kept with an incremented retry count
    Retrying,
    /// Failed for the last time and removed from the queue
    Dropped,
    /// Hit a conflict with `skip` resolution and removed from the queue
    Skipped,
    /// Dry run; nothing was sent
    Planned,
    /// The store rejected the follow-up write
    StorageError,
}

impl fmt::Display for ReplayOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Delivered => "delivered",
            Self::Retrying => "retrying",
            Self::Dropped => "dropped",
            Self::Skipped => "skipped",
            Self::Planned => "planned",
            Self::StorageError => "storage error",
        };
        f.write_str(s)
    }
}

/// Result of replaying a single request.
#[derive(Debug, Clone, Serialize)]
pub struct ReplayResult {
    /// Request id
    pub id: String,
    /// HTTP method
    pub method: String,
    /// Target URL
    pub url: String,
    /// Outcome of the attempt
    pub outcome: ReplayOutcome,
    /// Response status if one was received
    pub status: Option<u16>,
    /// Retry count after the attempt
    pub retry_count: u32,
    /// Error message if the attempt failed
    pub error: Option<String>,
}

/// Result of one processing pass.
#[derive(Debug, Default, Clone, Serialize)]
pub struct PassReport {
    pub delivered: usize,
    pub retrying: usize,
    pub dropped: usize,
    pub skipped: usize,
    pub planned: usize,
    pub storage_errors: usize,
    /// Individual results in replay order
    pub results: Vec<ReplayResult>,
}

impl PassReport {
    /// Add a result.
    pub fn add(&mut self, result: ReplayResult) {
        match result.outcome {
            ReplayOutcome::Delivered => self.delivered += 1,
            ReplayOutcome::Retrying => self.retrying += 1,
            ReplayOutcome::Dropped => self.dropped += 1,
            ReplayOutcome::Skipped => self.skipped += 1,
            ReplayOutcome::Planned => self.planned += 1,
            ReplayOutcome::StorageError => self.storage_errors += 1,
        }
        self.results.push(result);
    }

    /// Total requests handled in the pass.
    #[must_use]
    pub fn total(&self) -> usize {
        self.results.len()
    }

    /// Whether every replayed request was delivered.
    #[must_use]
    pub fn all_delivered(&self) -> bool {
        self.delivered == self.total()
    }

    /// Ids in replay order.
    #[must_use]
    pub fn replay_order(&self) -> Vec<&str> {
        self.results.iter().map(|r| r.id.as_str()).collect()
    }
}

/// Order requests for replay: priority descending, then oldest first.
pub fn sort_for_replay(requests: &mut [QueuedRequest]) {
    requests.sort_by(|a, b| {
        b.priority_rank()
            .cmp(&a.priority_rank())
            .then_with(|| a.timestamp.cmp(&b.timestamp))
    });
}

/// Replays the queue through a transport.
pub struct QueueProcessor<T: Transport> {
    transport: T,
    config: ProcessorConfig,
    state: ProcessorState,
}

impl<T: Transport> QueueProcessor<T> {
    /// Create a processor with default config.
    #[must_use]
    pub fn new(transport: T) -> Self {
        Self::with_config(transport, ProcessorConfig::default())
    }

    /// Create a processor with custom config.
    #[must_use]
    pub const fn with_config(transport: T, config: ProcessorConfig) -> Self {
        Self {
            transport,
            config,
            state: ProcessorState::Idle,
        }
    }

    #[must_use]
    pub const fn state(&self) -> ProcessorState {
        self.state
    }

    /// Whether a pass may start now.
    #[must_use]
    pub fn can_start(&self, online: bool, queued: usize) -> bool {
        online && self.state == ProcessorState::Idle && queued > 0
    }

    /// Run one pass over the queue.
    ///
    /// Returns `None` when the pass is not allowed to start: offline, already
    /// processing, or nothing queued. Failures of individual requests never
    /// abort the pass.
    ///
    /// # Errors
    ///
    /// Returns an error only if the queue snapshot cannot be read.
    pub fn process<S: RequestStore>(
        &mut self,
        queue: &mut RequestQueue<S>,
        online: bool,
    ) -> Result<Option<PassReport>, SyncError> {
        if !self.can_start(online, queue.len()) {
            tracing::debug!(
                online,
                state = ?self.state,
                queued = queue.len(),
                "processing pass not started"
            );
            return Ok(None);
        }

        self.state = ProcessorState::Processing;
        let result = self.run_pass(queue);
        self.state = ProcessorState::Idle;

        result.map(Some)
    }

    fn run_pass<S: RequestStore>(
        &self,
        queue: &mut RequestQueue<S>,
    ) -> Result<PassReport, SyncError> {
        let mut snapshot = queue.get_all()?;
        sort_for_replay(&mut snapshot);

        tracing::info!(
            requests = snapshot.len(),
            dry_run = self.config.dry_run,
            "processing pass started"
        );

        let mut report = PassReport::default();
        for request in snapshot {
            report.add(self.replay(queue.store(), request));
        }

        if let Err(e) = queue.refresh() {
            tracing::error!(error = %e, "failed to refresh queue after pass");
        }

        tracing::info!(
            delivered = report.delivered,
            retrying = report.retrying,
            dropped = report.dropped,
            skipped = report.skipped,
            storage_errors = report.storage_errors,
            "processing pass finished"
        );

        Ok(report)
    }

    fn replay<S: RequestStore>(&self, store: &S, mut request: QueuedRequest) -> ReplayResult {
        if self.config.dry_run {
            return result_for(&request, ReplayOutcome::Planned, None, None);
        }

        let (status, error) = match self.transport.send(&request) {
            Ok(status) if is_success(status) => {
                return match store.delete(&request.id) {
                    Ok(_) => {
                        tracing::debug!(id = %request.id, status, "request delivered");
                        result_for(&request, ReplayOutcome::Delivered, Some(status), None)
                    }
                    Err(e) => storage_failure(&request, Some(status), &e),
                };
            }
            Ok(status) => (Some(status), format!("HTTP {status}")),
            Err(e) => (None, e.to_string()),
        };

        if status.is_some_and(|status| request.skips_on(status)) {
            tracing::warn!(id = %request.id, url = %request.url, "conflict, skipping request");
            let letter = DeadLetter::skipped(request.clone(), &error);
            return match self.discard(store, letter) {
                Ok(()) => result_for(&request, ReplayOutcome::Skipped, status, Some(error)),
                Err(e) => storage_failure(&request, status, &e),
            };
        }

        if request.record_failure() {
            tracing::debug!(
                id = %request.id,
                retry_count = request.retry_count,
                max_retries = request.max_retries,
                error = %error,
                "replay failed, will retry"
            );
            return match store.put(&request) {
                Ok(()) => result_for(&request, ReplayOutcome::Retrying, status, Some(error)),
                Err(e) => storage_failure(&request, status, &e),
            };
        }

        tracing::warn!(
            id = %request.id,
            method = %request.method,
            url = %request.url,
            retry_count = request.retry_count,
            error = %error,
            "retry ceiling reached, dropping request"
        );
        match self.discard(store, DeadLetter::new(request.clone(), &error)) {
            Ok(()) => result_for(&request, ReplayOutcome::Dropped, status, Some(error)),
            Err(e) => storage_failure(&request, status, &e),
        }
    }

    fn discard<S: RequestStore>(&self, store: &S, letter: DeadLetter) -> Result<(), SyncError> {
        if self.config.dead_letter {
            store.bury(&letter)
        } else {
            store.delete(&letter.request.id).map(|_| ())
        }
    }
}

fn result_for(
    request: &QueuedRequest,
    outcome: ReplayOutcome,
    status: Option<u16>,
    error: Option<String>,
) -> ReplayResult {
    ReplayResult {
        id: request.id.clone(),
        method: request.method.clone(),
        url: request.url.clone(),
        outcome,
        status,
        retry_count: request.retry_count,
        error,
    }
}

fn storage_failure(request: &QueuedRequest, status: Option<u16>, err: &SyncError) -> ReplayResult {
    tracing::error!(id = %request.id, error = %err, "store rejected replay bookkeeping");
    result_for(request, ReplayOutcome::StorageError, status, Some(err.to_string()))
}

/// Format a pass report for display.
#[must_use]
pub fn format_pass_report(report: &PassReport) -> String {
    let mut lines = Vec::new();

    lines.push(format!("Processing pass: {} requests", report.total()));
    lines.push("─".repeat(40));

    if report.delivered > 0 {
        lines.push(format!(
            "  {} {}",
            "✓".green(),
            format!("{} delivered", report.delivered).green()
        ));
    }

    if report.retrying > 0 {
        lines.push(format!(
            "  {} {}",
            "↻".yellow(),
            format!("{} will retry", report.retrying).yellow()
        ));
    }

    if report.dropped + report.skipped > 0 {
        lines.push(format!(
            "  {} {}",
            "✗".red(),
            format!("{} dropped", report.dropped + report.skipped).red()
        ));
    }

    if report.storage_errors > 0 {
        lines.push(format!(
            "  {} {}",
            "!".red().bold(),
            format!("{} storage errors", report.storage_errors).red()
        ));
    }

    if report.planned > 0 {
        lines.push(format!("  {} {} planned (dry run)", "○".dimmed(), report.planned));
        for (n, result) in report.results.iter().enumerate() {
            lines.push(format!(
                "    {}. {} {} {}",
                n + 1,
                result.method,
                result.url,
                result.id.dimmed()
            ));
        }
    }

    let errors: Vec<_> = report
        .results
        .iter()
        .filter(|r| r.error.is_some())
        .take(3)
        .collect();

    if !errors.is_empty() {
        lines.push(String::new());
        lines.push("Errors:".to_string());
        for err in errors {
            lines.push(format!(
                "  - {} {}: {}",
                err.method,
                err.url,
                err.error.as_deref().unwrap_or("Unknown error")
            ));
        }
    }

    lines.join("\n")
}
