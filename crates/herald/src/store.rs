//! SQLite record store for post lifecycle tracking.
//!
//! One table, append-only except for the single `completed` transition.
//! Records are never deleted; the full history doubles as an audit trail.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use thiserror::Error;
use tracing::{info, warn};

/// Errors that can occur in record store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// SQLite error.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// The store has no schema and the fail-stall guard forbids creating one.
    #[error("post store at {path} has no schema and auto-initialization is disabled")]
    SchemaMissing { path: String },

    /// A stored timestamp failed to parse as RFC 3339.
    #[error("invalid timestamp in store: {0}")]
    InvalidTimestamp(String),
}

/// A tracked post. All timestamps are UTC, stored as RFC 3339.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostRecord {
    /// Platform-assigned identifier, immutable once created.
    pub id: String,
    /// When the post was created, as reported by the platform.
    pub posted_at: DateTime<Utc>,
    /// Fixed at creation as `posted_at + (TTL - safety margin)`; never recomputed.
    pub expires_at: DateTime<Utc>,
    /// False while pending, set true permanently once removal succeeds.
    pub completed: bool,
}

/// SQLite-backed post store.
#[derive(Debug)]
pub struct PostStore {
    conn: Mutex<Connection>,
}

impl PostStore {
    /// Open the store, creating the schema when absent.
    ///
    /// With `fail_stall` enabled an empty store is treated as a corrupted or
    /// freshly wiped one: the call fails before anything is written, and the
    /// caller is expected to abort.
    pub fn open(path: &str, fail_stall: bool) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;

        let tables: i64 = conn.query_row(
            "SELECT count(name) FROM sqlite_master WHERE type = 'table' AND name = 'posts'",
            [],
            |row| row.get(0),
        )?;

        if tables == 0 {
            if fail_stall {
                return Err(StoreError::SchemaMissing {
                    path: path.to_string(),
                });
            }

            warn!(path = %path, "creating post store schema");
            conn.execute_batch(
                "
                CREATE TABLE posts (
                    id TEXT NOT NULL,
                    posted_at TEXT NOT NULL,
                    expires_at TEXT NOT NULL,
                    completed INTEGER NOT NULL DEFAULT 0
                );
                ",
            )?;
        }

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        info!(path = %path, "post store ready");

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Append a new record.
    pub fn insert(&self, record: &PostRecord) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO posts (id, posted_at, expires_at, completed) VALUES (?1, ?2, ?3, ?4)",
            params![
                record.id,
                record.posted_at.to_rfc3339(),
                record.expires_at.to_rfc3339(),
                record.completed as i64,
            ],
        )?;
        Ok(())
    }

    /// Mark a record completed. A no-op when the id is absent.
    pub fn mark_completed(&self, id: &str) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute("UPDATE posts SET completed = 1 WHERE id = ?1", params![id])?;
        Ok(())
    }

    /// All records, in insertion order.
    pub fn list_all(&self) -> Result<Vec<PostRecord>, StoreError> {
        self.query_records("SELECT id, posted_at, expires_at, completed FROM posts ORDER BY rowid")
    }

    /// Records with `completed = 0`, in insertion order.
    pub fn list_pending(&self) -> Result<Vec<PostRecord>, StoreError> {
        self.query_records(
            "SELECT id, posted_at, expires_at, completed FROM posts WHERE completed = 0 ORDER BY rowid",
        )
    }

    /// Total number of records.
    pub fn record_count(&self) -> Result<usize, StoreError> {
        let conn = self.conn.lock().unwrap();
        let count = conn.query_row("SELECT COUNT(*) FROM posts", [], |row| {
            row.get::<_, usize>(0)
        })?;
        Ok(count)
    }

    fn query_records(&self, sql: &str) -> Result<Vec<PostRecord>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(sql)?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i64>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(id, posted_at, expires_at, completed)| {
                Ok(PostRecord {
                    id,
                    posted_at: parse_utc(&posted_at)?,
                    expires_at: parse_utc(&expires_at)?,
                    completed: completed != 0,
                })
            })
            .collect()
    }
}

/// Parse a stored RFC 3339 timestamp, normalizing to UTC.
fn parse_utc(s: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| StoreError::InvalidTimestamp(s.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::TempDir;

    fn store_path(dir: &TempDir) -> String {
        dir.path().join("posts.db").to_string_lossy().into_owned()
    }

    fn record(id: &str, posted_at: DateTime<Utc>, ttl_mins: i64) -> PostRecord {
        PostRecord {
            id: id.to_string(),
            posted_at,
            expires_at: posted_at + Duration::minutes(ttl_mins),
            completed: false,
        }
    }

    #[test]
    fn test_open_creates_schema() {
        let dir = TempDir::new().unwrap();
        let store = PostStore::open(&store_path(&dir), false).unwrap();
        assert_eq!(store.record_count().unwrap(), 0);
    }

    #[test]
    fn test_open_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let path = store_path(&dir);

        {
            let store = PostStore::open(&path, false).unwrap();
            store.insert(&record("abc", Utc::now(), 60)).unwrap();
        }

        let store = PostStore::open(&path, false).unwrap();
        assert_eq!(store.record_count().unwrap(), 1);
    }

    #[test]
    fn test_fail_stall_blocks_empty_store() {
        let dir = TempDir::new().unwrap();
        let path = store_path(&dir);

        let err = PostStore::open(&path, true).unwrap_err();
        assert!(matches!(err, StoreError::SchemaMissing { .. }));

        // Nothing was initialized: a second guarded open still fails
        let err = PostStore::open(&path, true).unwrap_err();
        assert!(matches!(err, StoreError::SchemaMissing { .. }));
    }

    #[test]
    fn test_fail_stall_allows_initialized_store() {
        let dir = TempDir::new().unwrap();
        let path = store_path(&dir);

        drop(PostStore::open(&path, false).unwrap());

        // Schema exists now, so the guard passes
        let store = PostStore::open(&path, true).unwrap();
        assert_eq!(store.record_count().unwrap(), 0);
    }

    #[test]
    fn test_insert_and_list_all() {
        let dir = TempDir::new().unwrap();
        let store = PostStore::open(&store_path(&dir), false).unwrap();

        let now = Utc::now();
        store.insert(&record("first", now, 60)).unwrap();
        store
            .insert(&record("second", now + Duration::hours(1), 60))
            .unwrap();

        let all = store.list_all().unwrap();
        assert_eq!(all.len(), 2);
        // Insertion order preserved
        assert_eq!(all[0].id, "first");
        assert_eq!(all[1].id, "second");
    }

    #[test]
    fn test_list_pending_filters_completed() {
        let dir = TempDir::new().unwrap();
        let store = PostStore::open(&store_path(&dir), false).unwrap();

        let now = Utc::now();
        store.insert(&record("done", now, 60)).unwrap();
        store.insert(&record("open", now, 60)).unwrap();
        store.mark_completed("done").unwrap();

        let pending = store.list_pending().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, "open");

        let all = store.list_all().unwrap();
        assert_eq!(all.len(), 2);
        assert!(all.iter().any(|r| r.id == "done" && r.completed));
    }

    #[test]
    fn test_mark_completed_absent_id_is_noop() {
        let dir = TempDir::new().unwrap();
        let store = PostStore::open(&store_path(&dir), false).unwrap();

        store.mark_completed("no-such-id").unwrap();
        assert_eq!(store.record_count().unwrap(), 0);
    }

    #[test]
    fn test_timestamps_round_trip_as_utc() {
        let dir = TempDir::new().unwrap();
        let store = PostStore::open(&store_path(&dir), false).unwrap();

        // Truncate to whole seconds, matching platform-reported timestamps
        let posted_at = DateTime::from_timestamp(1_767_225_600, 0).unwrap();
        let original = record("abc", posted_at, 1430);
        store.insert(&original).unwrap();

        let fetched = &store.list_all().unwrap()[0];
        assert_eq!(*fetched, original);
        assert_eq!(fetched.expires_at - fetched.posted_at, Duration::minutes(1430));
    }
}
