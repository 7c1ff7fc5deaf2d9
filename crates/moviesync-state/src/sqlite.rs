//! `SQLite`-backed implementation of [`CheckpointStore`].
//!
//! The connection is opened and closed per call: each operation acquires a
//! fresh connection, runs the idempotent DDL, does its work, and releases
//! the connection on every exit path. The store itself only holds the path.

use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::{Connection, OptionalExtension};

use crate::backend::CheckpointStore;
use crate::error::{self, StateError};

/// `SQLite` datetime format (UTC, no timezone suffix).
const SQLITE_DATETIME_FMT: &str = "%Y-%m-%d %H:%M:%S";

/// Idempotent DDL for the checkpoint ledger.
const CREATE_TABLE: &str = "
CREATE TABLE IF NOT EXISTS checkpoints (
    load_time  TEXT PRIMARY KEY,
    successful INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);
";

/// Ledger rows past the retention window are dropped on every read.
const DELETE_EXPIRED: &str = "
DELETE FROM checkpoints WHERE created_at < datetime('now', '-1 year')
";

/// The effective checkpoint: newest successful row. `rowid` breaks ties when
/// two writes land within the same second.
const SELECT_CURRENT: &str = "
SELECT load_time FROM checkpoints
WHERE successful = 1
ORDER BY created_at DESC, rowid DESC
LIMIT 1
";

const UPSERT_CHECKPOINT: &str = "
INSERT OR REPLACE INTO checkpoints (load_time, successful, created_at)
VALUES (?1, ?2, datetime('now'))
";

/// `SQLite`-backed checkpoint ledger at a configured file path.
pub struct SqliteCheckpointStore {
    path: PathBuf,
}

impl SqliteCheckpointStore {
    /// Create a store for the database at `path`, probing that it can be
    /// opened. An unreachable store is a fatal startup condition for the
    /// pipeline, so the probe fails fast here rather than mid-cycle.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Io`] if the directory can't be created, or
    /// [`StateError::Sqlite`] if the database can't be opened.
    pub fn open(path: &Path) -> error::Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let store = Self {
            path: path.to_path_buf(),
        };
        drop(store.connect()?);
        Ok(store)
    }

    /// Open a fresh connection and ensure the schema exists.
    fn connect(&self) -> error::Result<Connection> {
        let conn = Connection::open(&self.path)?;
        conn.execute_batch(CREATE_TABLE)?;
        Ok(conn)
    }

    fn parse_load_time(raw: &str) -> error::Result<DateTime<Utc>> {
        NaiveDateTime::parse_from_str(raw, SQLITE_DATETIME_FMT)
            .map(|ndt| ndt.and_utc())
            .map_err(|_| StateError::Timestamp(raw.to_string()))
    }

    #[cfg(test)]
    fn insert_raw(&self, load_time: &str, successful: bool, created_at: &str) -> error::Result<()> {
        let conn = self.connect()?;
        conn.execute(
            "INSERT OR REPLACE INTO checkpoints (load_time, successful, created_at) \
             VALUES (?1, ?2, ?3)",
            rusqlite::params![load_time, successful, created_at],
        )?;
        Ok(())
    }

    #[cfg(test)]
    fn count_rows(&self) -> error::Result<i64> {
        let conn = self.connect()?;
        let count = conn.query_row("SELECT COUNT(*) FROM checkpoints", [], |row| row.get(0))?;
        Ok(count)
    }
}

impl CheckpointStore for SqliteCheckpointStore {
    fn read_checkpoint(&self) -> error::Result<DateTime<Utc>> {
        let conn = self.connect()?;
        let expired = conn.execute(DELETE_EXPIRED, [])?;
        if expired > 0 {
            tracing::debug!(expired, "Purged expired checkpoint rows");
        }

        let raw: Option<String> = conn
            .query_row(SELECT_CURRENT, [], |row| row.get(0))
            .optional()?;

        match raw {
            Some(raw) => Self::parse_load_time(&raw),
            None => {
                tracing::debug!("No successful checkpoint found, defaulting to the epoch");
                Ok(DateTime::UNIX_EPOCH)
            }
        }
    }

    fn write_checkpoint(&self, load_time: DateTime<Utc>, successful: bool) -> error::Result<()> {
        let conn = self.connect()?;
        conn.execute(
            UPSERT_CHECKPOINT,
            rusqlite::params![
                load_time.format(SQLITE_DATETIME_FMT).to_string(),
                successful
            ],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> (TempDir, SqliteCheckpointStore) {
        let dir = TempDir::new().unwrap();
        let store = SqliteCheckpointStore::open(&dir.path().join("state/checkpoints.sqlite")).unwrap();
        (dir, store)
    }

    fn ts(s: &str) -> DateTime<Utc> {
        NaiveDateTime::parse_from_str(s, SQLITE_DATETIME_FMT)
            .unwrap()
            .and_utc()
    }

    #[test]
    fn empty_ledger_defaults_to_epoch() {
        let (_dir, store) = store();
        assert_eq!(store.read_checkpoint().unwrap(), DateTime::UNIX_EPOCH);
    }

    #[test]
    fn unsuccessful_rows_do_not_advance_checkpoint() {
        let (_dir, store) = store();
        store.write_checkpoint(ts("2024-06-01 10:00:00"), false).unwrap();
        assert_eq!(store.read_checkpoint().unwrap(), DateTime::UNIX_EPOCH);
    }

    #[test]
    fn start_then_finish_marker_replaces_row() {
        let (_dir, store) = store();
        let start = ts("2024-06-01 10:00:00");
        store.write_checkpoint(start, false).unwrap();
        store.write_checkpoint(start, true).unwrap();
        assert_eq!(store.read_checkpoint().unwrap(), start);
        assert_eq!(store.count_rows().unwrap(), 1);
    }

    #[test]
    fn most_recent_successful_row_wins() {
        let (_dir, store) = store();
        store.write_checkpoint(ts("2024-06-01 10:00:00"), true).unwrap();
        store.write_checkpoint(ts("2024-06-01 10:05:00"), true).unwrap();
        // A later failed attempt must not mask the last success.
        store.write_checkpoint(ts("2024-06-01 10:10:00"), false).unwrap();
        assert_eq!(store.read_checkpoint().unwrap(), ts("2024-06-01 10:05:00"));
    }

    #[test]
    fn write_is_idempotent() {
        let (_dir, store) = store();
        let t = ts("2024-06-01 10:00:00");
        store.write_checkpoint(t, true).unwrap();
        store.write_checkpoint(t, true).unwrap();
        assert_eq!(store.read_checkpoint().unwrap(), t);
        assert_eq!(store.count_rows().unwrap(), 1);
    }

    #[test]
    fn expired_rows_are_purged_on_read() {
        let (_dir, store) = store();
        store
            .insert_raw("2020-01-01 00:00:00", true, "2020-01-01 00:00:00")
            .unwrap();
        store.write_checkpoint(ts("2024-06-01 10:00:00"), true).unwrap();

        assert_eq!(store.read_checkpoint().unwrap(), ts("2024-06-01 10:00:00"));
        assert_eq!(store.count_rows().unwrap(), 1);
    }

    #[test]
    fn purging_the_only_successful_row_falls_back_to_epoch() {
        let (_dir, store) = store();
        store
            .insert_raw("2020-01-01 00:00:00", true, "2020-01-01 00:00:00")
            .unwrap();
        assert_eq!(store.read_checkpoint().unwrap(), DateTime::UNIX_EPOCH);
    }

    #[test]
    fn state_survives_reopening_the_store() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("checkpoints.sqlite");
        let t = ts("2024-06-01 10:00:00");
        {
            let store = SqliteCheckpointStore::open(&path).unwrap();
            store.write_checkpoint(t, true).unwrap();
        }
        let store = SqliteCheckpointStore::open(&path).unwrap();
        assert_eq!(store.read_checkpoint().unwrap(), t);
    }

    #[test]
    fn malformed_load_time_surfaces_as_error() {
        let (_dir, store) = store();
        let created_at = Utc::now().format(SQLITE_DATETIME_FMT).to_string();
        store.insert_raw("garbage", true, &created_at).unwrap();
        let err = store.read_checkpoint().unwrap_err();
        assert!(matches!(err, StateError::Timestamp(_)));
    }
}
