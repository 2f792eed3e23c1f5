//! Database migrations for imarisha-sync.
//!
//! Each migration upgrades the schema by one version. Migrations run
//! automatically when the database is opened.

use rusqlite::Connection;

use crate::error::SyncError;

/// Current schema version.
pub const CURRENT_VERSION: i32 = 1;

/// Get the current schema version from the database.
///
/// Returns 0 if no version has been set (new database).
pub fn get_version(conn: &Connection) -> Result<i32, SyncError> {
    conn.query_row("PRAGMA user_version", [], |row| row.get(0))
        .map_err(|e| SyncError::Database(format!("Failed to get schema version: {e}")))
}

fn set_version(conn: &Connection, version: i32) -> Result<(), SyncError> {
    conn.execute_batch(&format!("PRAGMA user_version = {version};"))
        .map_err(|e| SyncError::Database(format!("Failed to set schema version: {e}")))
}

/// Run all pending migrations.
///
/// A database written by a newer schema is refused rather than guessed at.
pub fn run(conn: &Connection) -> Result<(), SyncError> {
    let current = get_version(conn)?;

    if current > CURRENT_VERSION {
        return Err(SyncError::Database(format!(
            "Database schema version {current} is newer than supported version {CURRENT_VERSION}"
        )));
    }

    for version in (current + 1)..=CURRENT_VERSION {
        run_migration(conn, version)?;
        set_version(conn, version)?;
    }

    Ok(())
}

fn run_migration(conn: &Connection, version: i32) -> Result<(), SyncError> {
    match version {
        1 => migrate_v1(conn),
        _ => Err(SyncError::Database(format!(
            "Unknown migration version: {version}"
        ))),
    }
}

/// Migration v1: Initial schema.
///
/// Creates:
/// - `queued_requests`: deferred HTTP calls awaiting replay
/// - `dead_letters`: requests dropped for good, with the reason
fn migrate_v1(conn: &Connection) -> Result<(), SyncError> {
    conn.execute_batch(
        r"
        CREATE TABLE IF NOT EXISTS queued_requests (
            id TEXT PRIMARY KEY NOT NULL,
            url TEXT NOT NULL,
            method TEXT NOT NULL,
            headers TEXT,
            body TEXT,
            timestamp INTEGER NOT NULL,
            retry_count INTEGER NOT NULL DEFAULT 0,
            max_retries INTEGER NOT NULL DEFAULT 3,
            priority TEXT,
            conflict_resolution TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_queued_requests_timestamp
        ON queued_requests(timestamp);

        CREATE INDEX IF NOT EXISTS idx_queued_requests_priority
        ON queued_requests(priority);

        CREATE INDEX IF NOT EXISTS idx_queued_requests_url
        ON queued_requests(url);

        CREATE TABLE IF NOT EXISTS dead_letters (
            id TEXT PRIMARY KEY NOT NULL,
            url TEXT NOT NULL,
            method TEXT NOT NULL,
            headers TEXT,
            body TEXT,
            timestamp INTEGER NOT NULL,
            retry_count INTEGER NOT NULL,
            max_retries INTEGER NOT NULL,
            priority TEXT,
            conflict_resolution TEXT,
            failed_at INTEGER NOT NULL,
            last_error TEXT NOT NULL,
            reason TEXT NOT NULL DEFAULT 'exhausted'
        );

        CREATE INDEX IF NOT EXISTS idx_dead_letters_failed_at
        ON dead_letters(failed_at);
        ",
    )
    .map_err(|e| SyncError::Database(format!("Migration v1 failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migration_v1() {
        let conn = Connection::open_in_memory().unwrap();

        run(&conn).unwrap();
        assert_eq!(get_version(&conn).unwrap(), CURRENT_VERSION);

        conn.execute(
            "INSERT INTO queued_requests (id, url, method, timestamp)
             VALUES ('1-abc', 'http://x/api', 'POST', 100)",
            [],
        )
        .unwrap();

        conn.execute(
            "INSERT INTO dead_letters
                 (id, url, method, timestamp, retry_count, max_retries, failed_at, last_error)
             VALUES ('1-abc', 'http://x/api', 'POST', 100, 3, 3, 200, 'HTTP 500')",
            [],
        )
        .unwrap();

        let reason: String = conn
            .query_row("SELECT reason FROM dead_letters WHERE id = '1-abc'", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(reason, "exhausted");
    }

    #[test]
    fn test_migration_idempotent() {
        let conn = Connection::open_in_memory().unwrap();

        run(&conn).unwrap();
        run(&conn).unwrap();

        assert_eq!(get_version(&conn).unwrap(), CURRENT_VERSION);
    }

    #[test]
    fn test_get_version_new_database() {
        let conn = Connection::open_in_memory().unwrap();
        assert_eq!(get_version(&conn).unwrap(), 0);
    }

    #[test]
    fn test_newer_schema_is_refused() {
        let conn = Connection::open_in_memory().unwrap();
        set_version(&conn, CURRENT_VERSION + 1).unwrap();

        let err = run(&conn).unwrap_err();
        assert!(err.to_string().contains("newer than supported"));
    }
}
