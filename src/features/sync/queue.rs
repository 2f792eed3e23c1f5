//! Request queue manager.
//!
//! Wraps a [`RequestStore`] and keeps an in-memory mirror of the queue that
//! is refreshed on construction and after every mutation.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::request::{DeadLetter, NewRequest, QueuedRequest};
use super::store::{RequestStore, SqliteRequestStore};
use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::storage::Database;

/// Queue manager over a request store.
pub struct RequestQueue<S: RequestStore = SqliteRequestStore> {
    store: S,
    requests: Vec<QueuedRequest>,
    default_max_retries: u32,
}

impl RequestQueue<SqliteRequestStore> {
    /// Create a queue with an existing database connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the initial load fails.
    pub fn with_database(db: Database, config: &SyncConfig) -> Result<Self, SyncError> {
        Self::new(SqliteRequestStore::with_database(db), config)
    }
}

impl<S: RequestStore> RequestQueue<S> {
    /// Create a queue over `store` and load the current contents.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn new(store: S, config: &SyncConfig) -> Result<Self, SyncError> {
        let mut queue = Self {
            store,
            requests: Vec::new(),
            default_max_retries: config.max_retries,
        };
        queue.refresh()?;
        Ok(queue)
    }

    /// The underlying store.
    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Reload the mirror from the store.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn refresh(&mut self) -> Result<&[QueuedRequest], SyncError> {
        self.requests = self.store.get_all()?;
        Ok(&self.requests)
    }

    /// Current mirror of the queue, oldest first.
    #[must_use]
    pub fn requests(&self) -> &[QueuedRequest] {
        &self.requests
    }

    /// Stamp and persist a new request.
    ///
    /// # Errors
    ///
    /// Returns an error if the request is invalid or cannot be saved.
    pub fn add_to_queue(&mut self, request: NewRequest) -> Result<QueuedRequest, SyncError> {
        let queued = self.stamp(request)?;
        self.insert(queued)
    }

    /// Validate a new request and give it an id, timestamp and retry ceiling
    /// without persisting it.
    ///
    /// # Errors
    ///
    /// Returns an error if the request is invalid.
    pub fn stamp(&self, request: NewRequest) -> Result<QueuedRequest, SyncError> {
        request.validate()?;
        Ok(request.stamp(Utc::now().timestamp_millis(), self.default_max_retries))
    }

    /// Persist an already stamped request.
    ///
    /// # Errors
    ///
    /// Returns an error if the request cannot be saved.
    pub fn insert(&mut self, queued: QueuedRequest) -> Result<QueuedRequest, SyncError> {
        self.store.add(&queued)?;

        tracing::info!(
            id = %queued.id,
            method = %queued.method,
            url = %queued.url,
            priority = ?queued.priority,
            "request queued"
        );

        self.refresh()?;
        Ok(queued)
    }

    /// Read every queued request from the store.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_all(&self) -> Result<Vec<QueuedRequest>, SyncError> {
        self.store.get_all()
    }

    /// Look up a request by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get(&self, id: &str) -> Result<Option<QueuedRequest>, SyncError> {
        self.store.get(id)
    }

    /// Remove a request. Returns whether it existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub fn remove(&mut self, id: &str) -> Result<bool, SyncError> {
        let removed = self.store.delete(id)?;
        self.refresh()?;
        Ok(removed)
    }

    /// Remove every request. Safe to call on an empty queue.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub fn clear(&mut self) -> Result<(), SyncError> {
        self.store.clear()?;
        self.refresh()?;
        Ok(())
    }

    /// Whether the mirror holds no requests.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// Number of requests in the mirror.
    #[must_use]
    pub fn len(&self) -> usize {
        self.requests.len()
    }

    /// Requests that have not failed yet.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.requests.iter().filter(|r| r.is_pending()).count()
    }

    /// Requests with at least one failed replay.
    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.requests.iter().filter(|r| r.is_failed()).count()
    }

    /// Dead letters, most recent first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn dead_letters(&self) -> Result<Vec<DeadLetter>, SyncError> {
        self.store.dead_letters()
    }

    /// Put a dead letter back in the queue with its retry count reset.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if there is no such dead letter.
    pub fn requeue_dead_letter(&mut self, id: &str) -> Result<QueuedRequest, SyncError> {
        let request = self
            .store
            .requeue_dead_letter(id)?
            .ok_or_else(|| SyncError::NotFound(format!("Dead letter {id}")))?;

        tracing::info!(id = %request.id, "dead letter requeued");
        self.refresh()?;
        Ok(request)
    }

    /// Delete all dead letters. Returns how many were removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub fn purge_dead_letters(&self) -> Result<usize, SyncError> {
        self.store.purge_dead_letters()
    }

    /// Summary of the queue.
    ///
    /// # Errors
    ///
    /// Returns an error if the dead-letter count cannot be read.
    pub fn stats(&self) -> Result<QueueStats, SyncError> {
        Ok(QueueStats {
            total: self.len(),
            pending: self.pending_count(),
            failed: self.failed_count(),
            dead_letters: self.store.dead_letters()?.len(),
            oldest: self
                .requests
                .iter()
                .map(|r| r.timestamp)
                .min()
                .and_then(DateTime::from_timestamp_millis),
        })
    }
}

/// Queue statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    /// Requests in the queue
    pub total: usize,
    /// Requests that have not failed yet
    pub pending: usize,
    /// Requests with at least one failed attempt
    pub failed: usize,
    /// Requests in the dead-letter list
    pub dead_letters: usize,
    /// Creation time of the oldest queued request
    pub oldest: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::sync::request::Priority;
    use crate::features::sync::store::MockRequestStore;

    fn create_test_queue() -> RequestQueue {
        let db = Database::open_in_memory().unwrap();
        RequestQueue::with_database(db, &SyncConfig::default()).unwrap()
    }

    #[test]
    fn test_add_to_queue_stamps_request() {
        let mut queue = create_test_queue();

        let before = Utc::now().timestamp_millis();
        let queued = queue
            .add_to_queue(NewRequest::new("POST", "http://api.test/api/x").body("{}"))
            .unwrap();

        assert!(queued.timestamp >= before);
        assert_eq!(queued.retry_count, 0);
        assert_eq!(queued.max_retries, 3);
        assert_eq!(queue.requests(), std::slice::from_ref(&queued));
    }

    #[test]
    fn test_add_rejects_invalid_request() {
        let mut queue = create_test_queue();

        let err = queue.add_to_queue(NewRequest::new("POST", "/api/x")).unwrap_err();
        assert!(matches!(err, SyncError::InvalidRequest(_)));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_duplicates_are_not_merged() {
        let mut queue = create_test_queue();
        let req = NewRequest::new("POST", "http://x/api").body("{}");

        queue.add_to_queue(req.clone()).unwrap();
        queue.add_to_queue(req).unwrap();

        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_remove() {
        let mut queue = create_test_queue();
        let queued = queue.add_to_queue(NewRequest::new("GET", "http://x")).unwrap();

        assert!(queue.remove(&queued.id).unwrap());
        assert!(queue.is_empty());
        assert!(!queue.remove(&queued.id).unwrap());
    }

    #[test]
    fn test_clear_is_idempotent() {
        let mut queue = create_test_queue();
        queue.add_to_queue(NewRequest::new("GET", "http://x")).unwrap();

        queue.clear().unwrap();
        assert!(queue.get_all().unwrap().is_empty());

        queue.clear().unwrap();
        assert!(queue.get_all().unwrap().is_empty());
    }

    #[test]
    fn test_counts_partition_queue() {
        let mut queue = create_test_queue();
        let a = queue.add_to_queue(NewRequest::new("GET", "http://x/a")).unwrap();
        queue.add_to_queue(NewRequest::new("GET", "http://x/b")).unwrap();
        queue.add_to_queue(NewRequest::new("GET", "http://x/c")).unwrap();

        let mut failed = a;
        failed.retry_count = 1;
        queue.store().put(&failed).unwrap();
        queue.refresh().unwrap();

        assert_eq!(queue.pending_count(), 2);
        assert_eq!(queue.failed_count(), 1);
        assert_eq!(queue.pending_count() + queue.failed_count(), queue.len());
    }

    #[test]
    fn test_stats() {
        let mut queue = create_test_queue();
        let first = queue
            .add_to_queue(NewRequest::new("GET", "http://x/a").priority(Priority::Low))
            .unwrap();
        queue.add_to_queue(NewRequest::new("GET", "http://x/b")).unwrap();

        let stats = queue.stats().unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.pending, 2);
        assert_eq!(stats.failed, 0);
        assert_eq!(stats.dead_letters, 0);
        assert_eq!(stats.oldest, first.created_at());
    }

    #[test]
    fn test_requeue_missing_dead_letter() {
        let mut queue = create_test_queue();
        let err = queue.requeue_dead_letter("nope").unwrap_err();
        assert!(matches!(err, SyncError::NotFound(_)));
    }

    #[test]
    fn test_requeue_dead_letter_refreshes_mirror() {
        let mut queue = create_test_queue();
        let mut req = queue.add_to_queue(NewRequest::new("PUT", "http://x/a")).unwrap();
        req.retry_count = 3;
        queue.store().bury(&DeadLetter::new(req.clone(), "HTTP 503")).unwrap();
        queue.refresh().unwrap();
        assert!(queue.is_empty());

        let restored = queue.requeue_dead_letter(&req.id).unwrap();
        assert_eq!(restored.retry_count, 0);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.purge_dead_letters().unwrap(), 0);
    }

    #[test]
    fn test_storage_failure_propagates() {
        let mut store = MockRequestStore::new();
        store.expect_get_all().returning(|| Ok(Vec::new()));
        store
            .expect_add()
            .returning(|_| Err(SyncError::Database("quota exceeded".to_string())));

        let mut queue = RequestQueue::new(store, &SyncConfig::default()).unwrap();
        let err = queue
            .add_to_queue(NewRequest::new("POST", "http://x/api"))
            .unwrap_err();

        assert!(err.is_storage());
    }
}
