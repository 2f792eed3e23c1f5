//! Connectivity observation and pass scheduling.
//!
//! The monitor turns periodic probe results into online/offline transitions.
//! The trigger decides when a processing pass is due, using one fixed delay
//! for both "just came online" and "queue has items while idle".

use std::time::{Duration, Instant};

use reqwest::blocking::Client;

use crate::error::SyncError;

/// Answers whether the device can currently reach the backend.
#[cfg_attr(test, mockall::automock)]
pub trait ConnectivityProbe {
    fn is_online(&self) -> bool;
}

/// Probe that sends `HEAD` to a URL; any response means online.
pub struct HttpProbe {
    client: Client,
    url: String,
}

impl HttpProbe {
    /// Build a probe for `url` with a short timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, SyncError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::Transport(format!("Failed to build probe client: {e}")))?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

impl ConnectivityProbe for HttpProbe {
    fn is_online(&self) -> bool {
        match self.client.head(&self.url).send() {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!(url = %self.url, error = %e, "connectivity probe failed");
                false
            }
        }
    }
}

/// Probe with a fixed answer.
#[derive(Debug, Clone, Copy)]
pub struct StaticProbe(pub bool);

impl ConnectivityProbe for StaticProbe {
    fn is_online(&self) -> bool {
        self.0
    }
}

/// A change in connectivity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    CameOnline,
    WentOffline,
}

/// Tracks connectivity from an initial snapshot.
pub struct ConnectivityMonitor<P: ConnectivityProbe> {
    probe: P,
    online: bool,
}

impl<P: ConnectivityProbe> ConnectivityMonitor<P> {
    /// Take the initial snapshot.
    pub fn new(probe: P) -> Self {
        let online = probe.is_online();
        tracing::info!(online, "initial connectivity");
        Self { probe, online }
    }

    /// Last observed state.
    #[must_use]
    pub const fn is_online(&self) -> bool {
        self.online
    }

    /// Probe again and report a transition if the state changed.
    pub fn poll(&mut self) -> Option<Transition> {
        let now_online = self.probe.is_online();
        if now_online == self.online {
            return None;
        }

        self.online = now_online;
        let transition = if now_online {
            Transition::CameOnline
        } else {
            Transition::WentOffline
        };
        tracing::info!(?transition, "connectivity changed");
        Some(transition)
    }
}

/// Schedules processing passes after a fixed delay.
#[derive(Debug, Clone)]
pub struct SyncTrigger {
    delay: Duration,
    due_at: Option<Instant>,
}

impl SyncTrigger {
    #[must_use]
    pub const fn new(delay: Duration) -> Self {
        Self {
            delay,
            due_at: None,
        }
    }

    /// When the next pass is due, if one is scheduled.
    #[must_use]
    pub const fn due_at(&self) -> Option<Instant> {
        self.due_at
    }

    /// React to a connectivity change.
    ///
    /// Coming online restarts the delay so rapid flapping collapses into one
    /// pass; going offline cancels any scheduled pass.
    pub fn on_transition(&mut self, transition: Transition, now: Instant) {
        match transition {
            Transition::CameOnline => self.due_at = Some(now + self.delay),
            Transition::WentOffline => self.due_at = None,
        }
    }

    /// Schedule a pass when items are waiting, the device is online and no
    /// pass is running or already scheduled.
    pub fn on_queue_state(&mut self, online: bool, processing: bool, queued: usize, now: Instant) {
        if online && !processing && queued > 0 && self.due_at.is_none() {
            self.due_at = Some(now + self.delay);
        }
    }

    /// Consume the scheduled pass if it is due.
    pub fn take_due(&mut self, now: Instant) -> bool {
        match self.due_at {
            Some(at) if now >= at => {
                self.due_at = None;
                true
            }
            _ => false,
        }
    }
}
