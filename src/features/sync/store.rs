//! Local persistent store for queued requests.
//!
//! [`SqliteRequestStore`] opens its database lazily on first use and caches
//! the handle, so every operation can be called on a fresh store.

use std::path::PathBuf;

use once_cell::unsync::OnceCell;
use rusqlite::{params, types::Type, OptionalExtension, Row};

use super::request::{DeadLetter, DeadReason, Headers, QueuedRequest};
use crate::error::SyncError;
use crate::storage::Database;

/// Record collection operations used by the queue manager and processor.
#[cfg_attr(test, mockall::automock)]
pub trait RequestStore {
    /// Insert a new request. Fails if the id already exists.
    fn add(&self, request: &QueuedRequest) -> Result<(), SyncError>;

    /// Look up a request by id.
    fn get(&self, id: &str) -> Result<Option<QueuedRequest>, SyncError>;

    /// All requests, oldest first.
    fn get_all(&self) -> Result<Vec<QueuedRequest>, SyncError>;

    /// Insert or replace a request keyed by id.
    fn put(&self, request: &QueuedRequest) -> Result<(), SyncError>;

    /// Delete a request. Returns whether a record was removed.
    fn delete(&self, id: &str) -> Result<bool, SyncError>;

    /// Delete every request.
    fn clear(&self) -> Result<(), SyncError>;

    /// Remove a request from the queue and record it as a dead letter.
    fn bury(&self, letter: &DeadLetter) -> Result<(), SyncError>;

    /// All dead letters, most recent first.
    fn dead_letters(&self) -> Result<Vec<DeadLetter>, SyncError>;

    /// Move a dead letter back into the queue with its retry count reset.
    fn requeue_dead_letter(&self, id: &str) -> Result<Option<QueuedRequest>, SyncError>;

    /// Delete every dead letter. Returns how many were removed.
    fn purge_dead_letters(&self) -> Result<usize, SyncError>;
}

#[derive(Debug, Clone)]
enum StoreLocation {
    File(PathBuf),
    Memory,
}

/// SQLite-backed request store.
pub struct SqliteRequestStore {
    location: StoreLocation,
    db: OnceCell<Database>,
}

const COLUMNS: &str = "id, url, method, headers, body, timestamp, retry_count, max_retries, \
                       priority, conflict_resolution";

const DEAD_COLUMNS: &str = "failed_at, last_error, reason";

impl SqliteRequestStore {
    /// Store backed by a database file, opened on first use.
    #[must_use]
    pub fn at_path(path: impl Into<PathBuf>) -> Self {
        Self {
            location: StoreLocation::File(path.into()),
            db: OnceCell::new(),
        }
    }

    /// Store backed by a private in-memory database.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            location: StoreLocation::Memory,
            db: OnceCell::new(),
        }
    }

    /// Store using an already opened database.
    #[must_use]
    pub fn with_database(db: Database) -> Self {
        Self {
            location: StoreLocation::Memory,
            db: OnceCell::with_value(db),
        }
    }

    /// Open the database, or return the cached handle if already open.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open(&self) -> Result<&Database, SyncError> {
        self.db.get_or_try_init(|| {
            tracing::debug!(location = ?self.location, "opening request store");
            match &self.location {
                StoreLocation::File(path) => Database::open_at(path),
                StoreLocation::Memory => Database::open_in_memory(),
            }
        })
    }

    /// Whether the database has been opened.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.db.get().is_some()
    }
}

impl RequestStore for SqliteRequestStore {
    fn add(&self, request: &QueuedRequest) -> Result<(), SyncError> {
        let conn = self.open()?.connection();
        let headers = headers_to_json(request.headers.as_ref())?;

        conn.execute(
            &format!(
                "INSERT INTO queued_requests ({COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"
            ),
            params![
                request.id,
                request.url,
                request.method,
                headers,
                request.body,
                request.timestamp,
                request.retry_count,
                request.max_retries,
                request.priority.map(|p| p.as_str()),
                request.conflict_resolution.map(|c| c.as_str()),
            ],
        )
        .map_err(|e| SyncError::Database(format!("Failed to add request {}: {e}", request.id)))?;

        Ok(())
    }

    fn get(&self, id: &str) -> Result<Option<QueuedRequest>, SyncError> {
        let conn = self.open()?.connection();

        conn.query_row(
            &format!("SELECT {COLUMNS} FROM queued_requests WHERE id = ?1"),
            [id],
            row_to_request,
        )
        .optional()
        .map_err(|e| SyncError::Database(format!("Failed to get request {id}: {e}")))
    }

    fn get_all(&self) -> Result<Vec<QueuedRequest>, SyncError> {
        let conn = self.open()?.connection();

        let mut stmt = conn
            .prepare(&format!(
                "SELECT {COLUMNS} FROM queued_requests ORDER BY timestamp ASC, id ASC"
            ))
            .map_err(|e| SyncError::Database(format!("Failed to prepare query: {e}")))?;

        let rows = stmt
            .query_map([], row_to_request)
            .map_err(|e| SyncError::Database(format!("Failed to query requests: {e}")))?;

        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| SyncError::Database(format!("Failed to read request: {e}")))
    }

    fn put(&self, request: &QueuedRequest) -> Result<(), SyncError> {
        let conn = self.open()?.connection();
        upsert(conn, request)
    }

    fn delete(&self, id: &str) -> Result<bool, SyncError> {
        let conn = self.open()?.connection();

        let rows = conn
            .execute("DELETE FROM queued_requests WHERE id = ?1", [id])
            .map_err(|e| SyncError::Database(format!("Failed to delete request {id}: {e}")))?;

        Ok(rows > 0)
    }

    fn clear(&self) -> Result<(), SyncError> {
        let conn = self.open()?.connection();

        conn.execute("DELETE FROM queued_requests", [])
            .map_err(|e| SyncError::Database(format!("Failed to clear queue: {e}")))?;

        Ok(())
    }

    fn bury(&self, letter: &DeadLetter) -> Result<(), SyncError> {
        let conn = self.open()?.connection();
        let request = &letter.request;
        let headers = headers_to_json(request.headers.as_ref())?;

        let tx = conn
            .unchecked_transaction()
            .map_err(|e| SyncError::Database(format!("Failed to begin transaction: {e}")))?;

        tx.execute("DELETE FROM queued_requests WHERE id = ?1", [&request.id])
            .map_err(|e| {
                SyncError::Database(format!("Failed to delete request {}: {e}", request.id))
            })?;

        tx.execute(
            &format!(
                "INSERT OR REPLACE INTO dead_letters ({COLUMNS}, {DEAD_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)"
            ),
            params![
                request.id,
                request.url,
                request.method,
                headers,
                request.body,
                request.timestamp,
                request.retry_count,
                request.max_retries,
                request.priority.map(|p| p.as_str()),
                request.conflict_resolution.map(|c| c.as_str()),
                letter.failed_at,
                letter.last_error,
                letter.reason.as_str(),
            ],
        )
        .map_err(|e| {
            SyncError::Database(format!("Failed to record dead letter {}: {e}", request.id))
        })?;

        tx.commit()
            .map_err(|e| SyncError::Database(format!("Failed to commit dead letter: {e}")))
    }

    fn dead_letters(&self) -> Result<Vec<DeadLetter>, SyncError> {
        let conn = self.open()?.connection();

        let mut stmt = conn
            .prepare(&format!(
                "SELECT {COLUMNS}, {DEAD_COLUMNS} FROM dead_letters ORDER BY failed_at DESC"
            ))
            .map_err(|e| SyncError::Database(format!("Failed to prepare query: {e}")))?;

        let rows = stmt
            .query_map([], row_to_dead_letter)
            .map_err(|e| SyncError::Database(format!("Failed to query dead letters: {e}")))?;

        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| SyncError::Database(format!("Failed to read dead letter: {e}")))
    }

    fn requeue_dead_letter(&self, id: &str) -> Result<Option<QueuedRequest>, SyncError> {
        let conn = self.open()?.connection();

        let tx = conn
            .unchecked_transaction()
            .map_err(|e| SyncError::Database(format!("Failed to begin transaction: {e}")))?;

        let letter = tx
            .query_row(
                &format!("SELECT {COLUMNS}, {DEAD_COLUMNS} FROM dead_letters WHERE id = ?1"),
                [id],
                row_to_dead_letter,
            )
            .optional()
            .map_err(|e| SyncError::Database(format!("Failed to get dead letter {id}: {e}")))?;

        let Some(letter) = letter else {
            return Ok(None);
        };

        let mut request = letter.request;
        request.retry_count = 0;

        tx.execute("DELETE FROM dead_letters WHERE id = ?1", [id])
            .map_err(|e| SyncError::Database(format!("Failed to delete dead letter {id}: {e}")))?;
        upsert(&tx, &request)?;

        tx.commit()
            .map_err(|e| SyncError::Database(format!("Failed to commit requeue: {e}")))?;

        Ok(Some(request))
    }

    fn purge_dead_letters(&self) -> Result<usize, SyncError> {
        let conn = self.open()?.connection();

        conn.execute("DELETE FROM dead_letters", [])
            .map_err(|e| SyncError::Database(format!("Failed to purge dead letters: {e}")))
    }
}

fn upsert(conn: &rusqlite::Connection, request: &QueuedRequest) -> Result<(), SyncError> {
    let headers = headers_to_json(request.headers.as_ref())?;

    conn.execute(
        &format!(
            r"INSERT INTO queued_requests ({COLUMNS})
              VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
              ON CONFLICT(id) DO UPDATE SET
                url = excluded.url,
                method = excluded.method,
                headers = excluded.headers,
                body = excluded.body,
                timestamp = excluded.timestamp,
                retry_count = excluded.retry_count,
                max_retries = excluded.max_retries,
                priority = excluded.priority,
                conflict_resolution = excluded.conflict_resolution"
        ),
        params![
            request.id,
            request.url,
            request.method,
            headers,
            request.body,
            request.timestamp,
            request.retry_count,
            request.max_retries,
            request.priority.map(|p| p.as_str()),
            request.conflict_resolution.map(|c| c.as_str()),
        ],
    )
    .map_err(|e| SyncError::Database(format!("Failed to update request {}: {e}", request.id)))?;

    Ok(())
}

fn headers_to_json(headers: Option<&Headers>) -> Result<Option<String>, SyncError> {
    headers
        .map(serde_json::to_string)
        .transpose()
        .map_err(SyncError::from)
}

fn row_to_request(row: &Row<'_>) -> Result<QueuedRequest, rusqlite::Error> {
    let headers_json: Option<String> = row.get(3)?;
    let headers = headers_json
        .map(|s| serde_json::from_str::<Headers>(&s))
        .transpose()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e)))?;

    let priority: Option<String> = row.get(8)?;
    let conflict: Option<String> = row.get(9)?;

    Ok(QueuedRequest {
        id: row.get(0)?,
        url: row.get(1)?,
        method: row.get(2)?,
        headers,
        body: row.get(4)?,
        timestamp: row.get(5)?,
        retry_count: row.get(6)?,
        max_retries: row.get(7)?,
        priority: priority.and_then(|p| p.parse().ok()),
        conflict_resolution: conflict.and_then(|c| c.parse().ok()),
    })
}

fn row_to_dead_letter(row: &Row<'_>) -> Result<DeadLetter, rusqlite::Error> {
    let reason: String = row.get(12)?;

    Ok(DeadLetter {
        request: row_to_request(row)?,
        failed_at: row.get(10)?,
        last_error: row.get(11)?,
        reason: reason.parse().unwrap_or(DeadReason::Exhausted),
    })
}
