//! SQLite-backed key-value store with per-key expiry.

use super::KvBackend;
use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::info;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS kv (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    expires_at INTEGER NOT NULL
)";

/// SQLite-backed KV store.
///
/// Expiry is enforced on read (expired rows are invisible) and expired rows
/// are purged lazily on writes. A single write connection behind a mutex is
/// enough here: values are small and writes are rare compared to reads.
#[derive(Clone)]
pub struct SqliteKvBackend {
    conn: Arc<Mutex<Connection>>,
}

fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

impl SqliteKvBackend {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = Connection::open(db_path.as_ref()).context("Failed to open kv database")?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .context("Failed to set WAL mode on kv database")?;
        conn.execute(SCHEMA, [])?;

        let live: i64 = conn.query_row(
            "SELECT COUNT(*) FROM kv WHERE expires_at > ?1",
            params![now_secs()],
            |r| r.get(0),
        )?;
        info!("KV store ready at {:?}: {} live entries", db_path.as_ref(), live);

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// In-memory store, used by tests.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute(SCHEMA, [])?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn purge_expired(conn: &Connection) -> Result<()> {
        conn.execute("DELETE FROM kv WHERE expires_at <= ?1", params![now_secs()])?;
        Ok(())
    }
}

impl KvBackend for SqliteKvBackend {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare_cached("SELECT value FROM kv WHERE key = ?1 AND expires_at > ?2")?;
        let result = stmt
            .query_row(params![key, now_secs()], |row| row.get(0))
            .optional()?;
        Ok(result)
    }

    fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        Self::purge_expired(&conn)?;
        conn.execute(
            "INSERT OR REPLACE INTO kv (key, value, expires_at) VALUES (?1, ?2, ?3)",
            params![key, value, now_secs() + ttl.as_secs() as i64],
        )?;
        Ok(())
    }

    fn get_many(&self, keys: &[String]) -> Result<Vec<Option<String>>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare_cached("SELECT value FROM kv WHERE key = ?1 AND expires_at > ?2")?;
        let now = now_secs();
        let mut result = Vec::with_capacity(keys.len());
        for key in keys {
            let value = stmt
                .query_row(params![key, now], |row| row.get(0))
                .optional()?;
            result.push(value);
        }
        Ok(result)
    }

    fn set_many(&self, entries: &[(String, String)], ttl: Duration) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        Self::purge_expired(&conn)?;
        let expires_at = now_secs() + ttl.as_secs() as i64;
        let tx = conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT OR REPLACE INTO kv (key, value, expires_at) VALUES (?1, ?2, ?3)",
            )?;
            for (key, value) in entries {
                stmt.execute(params![key, value, expires_at])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn incr(&self, key: &str, by: i64, ttl: Duration) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        let now = now_secs();
        let expires_at = now + ttl.as_secs() as i64;
        // Single upsert keeps the increment atomic. An expired row restarts
        // the count at `by` instead of continuing the stale value.
        conn.execute(
            "INSERT INTO kv (key, value, expires_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET
                value = CASE
                    WHEN expires_at <= ?4 THEN ?2
                    ELSE CAST(CAST(value AS INTEGER) + ?5 AS TEXT)
                END,
                expires_at = ?3",
            params![key, by.to_string(), expires_at, now, by],
        )?;
        let value: String = conn.query_row(
            "SELECT value FROM kv WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )?;
        Ok(value.parse::<i64>().unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const TTL: Duration = Duration::from_secs(60);

    fn create_test_store() -> (SqliteKvBackend, TempDir) {
        let tmp = TempDir::new().unwrap();
        let store = SqliteKvBackend::new(tmp.path().join("kv.db")).unwrap();
        (store, tmp)
    }

    #[test]
    fn test_get_set_roundtrip() {
        let (store, _tmp) = create_test_store();

        assert!(store.get("missing").unwrap().is_none());

        store.set("k1", "v1", TTL).unwrap();
        assert_eq!(store.get("k1").unwrap(), Some("v1".to_string()));

        // Overwrite
        store.set("k1", "v2", TTL).unwrap();
        assert_eq!(store.get("k1").unwrap(), Some("v2".to_string()));
    }

    #[test]
    fn test_expired_entry_reads_as_absent() {
        let (store, _tmp) = create_test_store();

        store.set("k1", "v1", Duration::from_secs(0)).unwrap();
        assert!(store.get("k1").unwrap().is_none());
    }

    #[test]
    fn test_get_many_aligned_with_keys() {
        let (store, _tmp) = create_test_store();

        store.set("a", "1", TTL).unwrap();
        store.set("c", "3", TTL).unwrap();

        let keys = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let values = store.get_many(&keys).unwrap();
        assert_eq!(
            values,
            vec![Some("1".to_string()), None, Some("3".to_string())]
        );
    }

    #[test]
    fn test_set_many() {
        let (store, _tmp) = create_test_store();

        let entries = vec![
            ("a".to_string(), "1".to_string()),
            ("b".to_string(), "2".to_string()),
        ];
        store.set_many(&entries, TTL).unwrap();

        assert_eq!(store.get("a").unwrap(), Some("1".to_string()));
        assert_eq!(store.get("b").unwrap(), Some("2".to_string()));
    }

    #[test]
    fn test_incr_from_zero_and_accumulating() {
        let (store, _tmp) = create_test_store();

        assert_eq!(store.incr("counter", 100, TTL).unwrap(), 100);
        assert_eq!(store.incr("counter", 1, TTL).unwrap(), 101);
        assert_eq!(store.incr("counter", 100, TTL).unwrap(), 201);
    }

    #[test]
    fn test_incr_restarts_after_expiry() {
        let (store, _tmp) = create_test_store();

        store.incr("counter", 50, Duration::from_secs(0)).unwrap();
        // Expired row: the next increment starts fresh.
        assert_eq!(store.incr("counter", 5, TTL).unwrap(), 5);
    }

    #[test]
    fn test_incr_does_not_clobber_ttl_semantics_for_get() {
        let (store, _tmp) = create_test_store();

        store.incr("counter", 7, TTL).unwrap();
        assert_eq!(store.get("counter").unwrap(), Some("7".to_string()));
    }
}
