//! Send-now-or-queue-for-later.
//!
//! A call is attempted directly when the device is online; anything that
//! cannot be delivered right now ends up in the queue.

use serde::Serialize;

use super::connectivity::ConnectivityProbe;
use super::queue::RequestQueue;
use super::request::{NewRequest, QueuedRequest};
use super::store::RequestStore;
use super::transport::{is_success, Transport};
use crate::error::SyncError;

/// What happened to a dispatched request.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DispatchOutcome {
    /// The server accepted the call
    Delivered { status: u16 },
    /// The call was deferred
    Queued { request: QueuedRequest, reason: String },
    /// The server reported a conflict and the request asked to skip it
    Skipped { status: u16 },
}

/// Dispatches requests directly, falling back to the queue.
pub struct Dispatcher<'a, P: ConnectivityProbe, T: Transport, S: RequestStore> {
    probe: &'a P,
    transport: &'a T,
    queue: &'a mut RequestQueue<S>,
}

impl<'a, P: ConnectivityProbe, T: Transport, S: RequestStore> Dispatcher<'a, P, T, S> {
    #[must_use]
    pub fn new(probe: &'a P, transport: &'a T, queue: &'a mut RequestQueue<S>) -> Self {
        Self {
            probe,
            transport,
            queue,
        }
    }

    /// Send `request` now if possible, otherwise queue it.
    ///
    /// # Errors
    ///
    /// Returns an error if the request is invalid or cannot be queued.
    /// Malformed requests are never queued.
    pub fn send_or_queue(&mut self, request: NewRequest) -> Result<DispatchOutcome, SyncError> {
        let stamped = self.queue.stamp(request)?;

        if !self.probe.is_online() {
            return self.defer(stamped, "offline".to_string());
        }

        match self.transport.send(&stamped) {
            Ok(status) if is_success(status) => {
                tracing::debug!(
                    method = %stamped.method,
                    url = %stamped.url,
                    status,
                    "delivered directly"
                );
                Ok(DispatchOutcome::Delivered { status })
            }
            Ok(status) if stamped.skips_on(status) => {
                tracing::warn!(url = %stamped.url, status, "conflict, skipping request");
                Ok(DispatchOutcome::Skipped { status })
            }
            Ok(status) => self.defer(stamped, format!("HTTP {status}")),
            Err(e @ SyncError::InvalidRequest(_)) => Err(e),
            Err(e) => self.defer(stamped, e.to_string()),
        }
    }

    fn defer(
        &mut self,
        request: QueuedRequest,
        reason: String,
    ) -> Result<DispatchOutcome, SyncError> {
        tracing::info!(
            id = %request.id,
            url = %request.url,
            reason = %reason,
            "deferring request"
        );
        let request = self.queue.insert(request)?;
        Ok(DispatchOutcome::Queued { request, reason })
    }
}
