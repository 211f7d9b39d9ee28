//! `SQLite`-backed version store
//!
//! One row per `(kind, item_id)`. Writes are upserts so a record is created
//! on first observation and updated in place afterwards, never duplicated.

use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;
use zomboid_core::{MonitorError, Result, VersionKind, VersionRecord};

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS versions (
    id INTEGER PRIMARY KEY,
    kind TEXT NOT NULL,
    item_id TEXT NOT NULL,
    build_id TEXT NOT NULL,
    last_checked INTEGER NOT NULL,
    UNIQUE(kind, item_id)
);
";

fn store_err(err: rusqlite::Error) -> MonitorError {
    MonitorError::Store(err.to_string())
}

fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Persistent table of last observed versions
pub struct VersionStore {
    conn: Mutex<Connection>,
}

impl VersionStore {
    /// Open (and create if needed) the database at `path`
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).map_err(store_err)?;
        debug!("Opened version store at {}", path.display());
        Self::with_connection(conn)
    }

    /// Open a private in-memory database
    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory().map_err(store_err)?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA_SQL).map_err(store_err)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| MonitorError::Store("version store lock poisoned".to_string()))
    }

    /// Look up the record for one item
    pub fn get(&self, kind: VersionKind, item_id: &str) -> Result<Option<VersionRecord>> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT build_id, last_checked FROM versions WHERE kind = ?1 AND item_id = ?2",
            params![kind.as_str(), item_id],
            |row| {
                Ok(VersionRecord {
                    kind,
                    item_id: item_id.to_string(),
                    build_id: row.get(0)?,
                    last_checked: row.get(1)?,
                })
            },
        )
        .optional()
        .map_err(store_err)
    }

    /// Insert or replace the build id for one item
    pub fn upsert(&self, kind: VersionKind, item_id: &str, build_id: &str) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO versions (kind, item_id, build_id, last_checked)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(kind, item_id)
             DO UPDATE SET build_id = excluded.build_id, last_checked = excluded.last_checked",
            params![kind.as_str(), item_id, build_id, now_secs()],
        )
        .map_err(store_err)?;
        Ok(())
    }

    /// Refresh `last_checked` without changing the build id
    pub fn touch(&self, kind: VersionKind, item_id: &str) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE versions SET last_checked = ?3 WHERE kind = ?1 AND item_id = ?2",
            params![kind.as_str(), item_id, now_secs()],
        )
        .map_err(store_err)?;
        Ok(())
    }

    /// All records, ordered by kind then item
    pub fn list(&self) -> Result<Vec<VersionRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT kind, item_id, build_id, last_checked FROM versions
                 ORDER BY kind, item_id",
            )
            .map_err(store_err)?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i64>(3)?,
                ))
            })
            .map_err(store_err)?;

        let mut records = Vec::new();
        for row in rows {
            let (kind, item_id, build_id, last_checked) = row.map_err(store_err)?;
            let kind = VersionKind::from_str_opt(&kind)
                .ok_or_else(|| MonitorError::Store(format!("unknown version kind: {}", kind)))?;
            records.push(VersionRecord {
                kind,
                item_id,
                build_id,
                last_checked,
            });
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upsert_creates_then_updates() {
        let store = VersionStore::open_in_memory().unwrap();
        assert_eq!(store.get(VersionKind::Game, "108600").unwrap(), None);

        store.upsert(VersionKind::Game, "108600", "100").unwrap();
        store.upsert(VersionKind::Game, "108600", "101").unwrap();

        let records = store.list().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].build_id, "101");
        assert!(records[0].last_checked > 0);
    }

    #[test]
    fn test_kind_is_part_of_key() {
        let store = VersionStore::open_in_memory().unwrap();
        store.upsert(VersionKind::Game, "42", "7").unwrap();
        store.upsert(VersionKind::Mod, "42", "1700000000").unwrap();

        assert_eq!(store.list().unwrap().len(), 2);
        assert_eq!(
            store.get(VersionKind::Mod, "42").unwrap().unwrap().build_id,
            "1700000000"
        );
    }

    #[test]
    fn test_touch_keeps_build() {
        let store = VersionStore::open_in_memory().unwrap();
        store.upsert(VersionKind::Game, "108600", "100").unwrap();
        store.touch(VersionKind::Game, "108600").unwrap();
        store.touch(VersionKind::Game, "missing").unwrap();

        let records = store.list().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].build_id, "100");
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pz_versions.db");

        {
            let store = VersionStore::open(&path).unwrap();
            store.upsert(VersionKind::Game, "108600", "15500000").unwrap();
        }

        let store = VersionStore::open(&path).unwrap();
        let record = store.get(VersionKind::Game, "108600").unwrap().unwrap();
        assert_eq!(record.build_id, "15500000");
    }
}
