use crate::error::StorageError;
use chrono::Utc;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, ErrorCode, OptionalExtension};
use std::path::Path;

pub mod memory;

pub use memory::MemoryStore;

pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Durable string-valued key-value store shared by the analytics recorder and
/// the privacy settings record.
pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> StorageResult<Option<String>>;
    fn set(&self, key: &str, value: &str) -> StorageResult<()>;
    fn remove(&self, key: &str) -> StorageResult<()>;
}

// Helper to convert rusqlite errors, mapping a full database onto the quota error
trait SqliteResultExt<T> {
    fn map_store_err(self, requested: usize) -> StorageResult<T>;
}

impl<T> SqliteResultExt<T> for rusqlite::Result<T> {
    fn map_store_err(self, requested: usize) -> StorageResult<T> {
        self.map_err(|e| match e.sqlite_error_code() {
            Some(ErrorCode::DiskFull) => StorageError::QuotaExceeded { requested, limit: 0 },
            _ => StorageError::Sqlite(e),
        })
    }
}

pub type DbPool = Pool<SqliteConnectionManager>;

/// SQLite-backed store. Each record lives in one row of `kv_store`.
pub struct SqliteStore {
    pool: DbPool,
    quota_bytes: Option<usize>,
}

impl SqliteStore {
    pub fn new<P: AsRef<Path>>(db_path: P, pool_size: u32, quota_bytes: Option<usize>) -> StorageResult<Self> {
        let manager = SqliteConnectionManager::file(db_path).with_init(|conn| {
            conn.execute_batch(
                "PRAGMA journal_mode = WAL;
                 PRAGMA synchronous = NORMAL;
                 PRAGMA temp_store = MEMORY;",
            )
        });

        let pool = Pool::builder().max_size(pool_size.max(1)).build(manager)?;

        let store = Self { pool, quota_bytes };
        store.initialize_schema()?;
        Ok(store)
    }

    /// Private in-memory database, mostly for tests
    pub fn in_memory() -> StorageResult<Self> {
        let manager = SqliteConnectionManager::memory();
        // A single connection so every checkout sees the same database
        let pool = Pool::builder().max_size(1).build(manager)?;
        let store = Self { pool, quota_bytes: None };
        store.initialize_schema()?;
        Ok(store)
    }

    pub fn with_quota(mut self, quota_bytes: usize) -> Self {
        self.quota_bytes = Some(quota_bytes);
        self
    }

    fn get_connection(&self) -> StorageResult<r2d2::PooledConnection<SqliteConnectionManager>> {
        Ok(self.pool.get()?)
    }

    fn initialize_schema(&self) -> StorageResult<()> {
        let conn = self.get_connection()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS kv_store (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            )",
            [],
        )?;

        Ok(())
    }

    pub fn health_check(&self) -> StorageResult<bool> {
        let conn = self.get_connection()?;

        let integrity: String = conn.query_row("PRAGMA integrity_check", [], |row| row.get(0))?;
        if integrity != "ok" {
            return Err(StorageError::Corruption(integrity));
        }

        Ok(true)
    }
}

impl KvStore for SqliteStore {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let conn = self.get_connection()?;
        let value = conn
            .query_row("SELECT value FROM kv_store WHERE key = ?1", params![key], |row| row.get(0))
            .optional()?;
        Ok(value)
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        if let Some(limit) = self.quota_bytes {
            if value.len() > limit {
                return Err(StorageError::QuotaExceeded { requested: value.len(), limit });
            }
        }

        let conn = self.get_connection()?;
        conn.execute(
            "INSERT INTO kv_store (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, Utc::now().timestamp()],
        )
        .map_store_err(value.len())?;
        Ok(())
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        let conn = self.get_connection()?;
        conn.execute("DELETE FROM kv_store WHERE key = ?1", params![key])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_sqlite_store_roundtrip() {
        let dir = tempdir().unwrap();
        let store = SqliteStore::new(dir.path().join("kv.db"), 2, None).unwrap();

        assert_eq!(store.get("missing").unwrap(), None);
        store.set("settings", "{\"a\":1}").unwrap();
        store.set("settings", "{\"a\":2}").unwrap();
        assert_eq!(store.get("settings").unwrap().as_deref(), Some("{\"a\":2}"));

        store.remove("settings").unwrap();
        assert_eq!(store.get("settings").unwrap(), None);
        assert!(store.health_check().unwrap());
    }

    #[test]
    fn test_sqlite_store_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("kv.db");
        {
            let store = SqliteStore::new(&path, 1, None).unwrap();
            store.set("events", "[]").unwrap();
        }
        let reopened = SqliteStore::new(&path, 1, None).unwrap();
        assert_eq!(reopened.get("events").unwrap().as_deref(), Some("[]"));
    }

    #[test]
    fn test_sqlite_store_quota() {
        let store = SqliteStore::in_memory().unwrap().with_quota(8);
        let err = store.set("events", "0123456789").unwrap_err();
        assert!(err.is_quota_exceeded());
        store.set("events", "short").unwrap();
    }
}
