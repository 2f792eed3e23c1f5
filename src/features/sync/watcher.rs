//! Polling loop that drains the queue whenever connectivity allows.

use std::time::{Duration, Instant};

use super::connectivity::{ConnectivityMonitor, ConnectivityProbe, SyncTrigger};
use super::processor::{PassReport, ProcessorState, QueueProcessor};
use super::queue::RequestQueue;
use super::store::{RequestStore, SqliteRequestStore};
use super::transport::Transport;
use crate::config::SyncConfig;
use crate::error::SyncError;

/// Ties together monitor, trigger, processor and queue.
pub struct Watcher<P: ConnectivityProbe, T: Transport, S: RequestStore = SqliteRequestStore> {
    monitor: ConnectivityMonitor<P>,
    trigger: SyncTrigger,
    processor: QueueProcessor<T>,
    queue: RequestQueue<S>,
    poll_interval: Duration,
}

impl<P: ConnectivityProbe, T: Transport, S: RequestStore> Watcher<P, T, S> {
    /// Create a watcher; takes the initial connectivity snapshot.
    pub fn new(
        probe: P,
        processor: QueueProcessor<T>,
        queue: RequestQueue<S>,
        config: &SyncConfig,
    ) -> Self {
        Self {
            monitor: ConnectivityMonitor::new(probe),
            trigger: SyncTrigger::new(config.trigger_delay()),
            processor,
            queue,
            poll_interval: config.poll_interval(),
        }
    }

    #[must_use]
    pub const fn queue(&self) -> &RequestQueue<S> {
        &self.queue
    }

    #[must_use]
    pub const fn is_online(&self) -> bool {
        self.monitor.is_online()
    }

    /// One step: poll connectivity, pick up newly queued requests and run a
    /// pass if one is due.
    ///
    /// # Errors
    ///
    /// Returns an error if the queue cannot be read.
    pub fn tick(&mut self, now: Instant) -> Result<Option<PassReport>, SyncError> {
        if let Some(transition) = self.monitor.poll() {
            self.trigger.on_transition(transition, now);
        }

        // Other processes may have queued requests since the last tick
        self.queue.refresh()?;

        let online = self.monitor.is_online();
        let processing = self.processor.state() == ProcessorState::Processing;
        self.trigger
            .on_queue_state(online, processing, self.queue.len(), now);

        if self.trigger.take_due(now) {
            return self.processor.process(&mut self.queue, online);
        }

        Ok(None)
    }

    /// Tick every poll interval until `max_ticks` is reached, or forever.
    ///
    /// Errors from a single tick are logged and the loop continues.
    pub fn run(&mut self, max_ticks: Option<u64>, mut on_pass: impl FnMut(&PassReport)) {
        let mut ticks = 0_u64;

        loop {
            match self.tick(Instant::now()) {
                Ok(Some(report)) => on_pass(&report),
                Ok(None) => {}
                Err(e) => tracing::error!(error = %e, "watcher tick failed"),
            }

            ticks += 1;
            if max_ticks.is_some_and(|max| ticks >= max) {
                break;
            }

            std::thread::sleep(self.poll_interval);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use super::*;
    use crate::features::sync::connectivity::StaticProbe;
    use crate::features::sync::request::NewRequest;
    use crate::features::sync::transport::MockTransport;

    fn config() -> SyncConfig {
        SyncConfig {
            trigger_delay_ms: 100,
            poll_interval_ms: 1,
            ..SyncConfig::default()
        }
    }

    fn queue_with(n: usize) -> RequestQueue {
        let mut queue =
            RequestQueue::new(SqliteRequestStore::in_memory(), &SyncConfig::default()).unwrap();
        for i in 0..n {
            queue
                .add_to_queue(NewRequest::new("POST", format!("http://api.test/{i}")))
                .unwrap();
        }
        queue
    }

    fn ok_transport() -> MockTransport {
        let mut transport = MockTransport::new();
        transport.expect_send().returning(|_| Ok(200));
        transport
    }

    /// Probe whose answer can be flipped from the test.
    #[derive(Clone)]
    struct Switch(Rc<Cell<bool>>);

    impl ConnectivityProbe for Switch {
        fn is_online(&self) -> bool {
            self.0.get()
        }
    }

    #[test]
    fn test_pass_runs_after_delay_when_queue_has_items() {
        let start = Instant::now();
        let mut watcher = Watcher::new(
            StaticProbe(true),
            QueueProcessor::new(ok_transport()),
            queue_with(2),
            &config(),
        );

        assert!(watcher.tick(start).unwrap().is_none());
        let report = watcher
            .tick(start + Duration::from_millis(100))
            .unwrap()
            .unwrap();

        assert_eq!(report.delivered, 2);
        assert!(watcher.queue().is_empty());
    }

    #[test]
    fn test_offline_never_processes() {
        let start = Instant::now();
        let mut transport = MockTransport::new();
        transport.expect_send().never();
        let mut watcher = Watcher::new(
            StaticProbe(false),
            QueueProcessor::new(transport),
            queue_with(1),
            &config(),
        );

        for ms in [0, 100, 200, 1_000] {
            assert!(watcher.tick(start + Duration::from_millis(ms)).unwrap().is_none());
        }
        assert_eq!(watcher.queue().len(), 1);
    }

    #[test]
    fn test_coming_online_schedules_pass() {
        let start = Instant::now();
        let online = Rc::new(Cell::new(false));
        let mut watcher = Watcher::new(
            Switch(Rc::clone(&online)),
            QueueProcessor::new(ok_transport()),
            queue_with(1),
            &config(),
        );
        assert!(!watcher.is_online());
        assert!(watcher.tick(start).unwrap().is_none());

        online.set(true);
        let came_online = start + Duration::from_millis(500);
        assert!(watcher.tick(came_online).unwrap().is_none());
        assert!(watcher.is_online());

        let report = watcher
            .tick(came_online + Duration::from_millis(100))
            .unwrap()
            .unwrap();
        assert_eq!(report.delivered, 1);
    }

    #[test]
    fn test_going_offline_cancels_scheduled_pass() {
        let start = Instant::now();
        let online = Rc::new(Cell::new(true));
        let mut transport = MockTransport::new();
        transport.expect_send().never();
        let mut watcher = Watcher::new(
            Switch(Rc::clone(&online)),
            QueueProcessor::new(transport),
            queue_with(1),
            &config(),
        );

        assert!(watcher.tick(start).unwrap().is_none());
        online.set(false);
        assert!(watcher
            .tick(start + Duration::from_millis(150))
            .unwrap()
            .is_none());
        assert_eq!(watcher.queue().len(), 1);
    }

    #[test]
    fn test_run_stops_after_max_ticks() {
        let mut watcher = Watcher::new(
            StaticProbe(true),
            QueueProcessor::new(ok_transport()),
            queue_with(0),
            &config(),
        );

        let mut passes = 0;
        watcher.run(Some(3), |_| passes += 1);
        assert_eq!(passes, 0);
    }
}
