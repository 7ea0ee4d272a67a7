use crate::history::error::StorageError;
use crate::history::schema;
use anyhow::{Context, Result};
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

/// Opaque byte-blob store keyed by name.
pub trait KvStore: Send + Sync {
    /// Read the blob stored under `key`; `Ok(None)` when the key was never written.
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Replace the blob stored under `key`.
    fn write(&self, key: &str, value: &[u8]) -> Result<(), StorageError>;
}

/// Key-value store backed by a single SQLite table.
pub struct SqliteKvStore {
    conn: Mutex<Connection>,
    db_path: Option<PathBuf>,
}

impl SqliteKvStore {
    /// Open (or create) the history database at `db_dir/history.db`.
    pub fn open(db_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(db_dir)
            .with_context(|| format!("creating history dir: {}", db_dir.display()))?;

        let db_path = db_dir.join("history.db");
        let conn = Connection::open(&db_path)
            .with_context(|| format!("opening history db: {}", db_path.display()))?;
        Self::prepare(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
            db_path: Some(db_path),
        })
    }

    /// Volatile store, mostly useful for tests and dry runs.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("opening in-memory history db")?;
        Self::prepare(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            db_path: None,
        })
    }

    fn prepare(conn: &Connection) -> Result<()> {
        conn.execute_batch(schema::PRAGMAS)
            .context("history PRAGMA setup")?;
        conn.execute_batch(schema::KV_DDL).context("kv_blobs DDL")?;
        Ok(())
    }

    /// Path to the underlying database file, `None` for in-memory stores.
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }
}

impl KvStore for SqliteKvStore {
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let conn = self.conn.lock();
        let value = conn
            .query_row(schema::SELECT_BLOB, [key], |row| row.get::<_, Vec<u8>>(0))
            .optional()?;
        Ok(value)
    }

    fn write(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default();
        let updated_ms = i64::try_from(now.as_millis()).unwrap_or(i64::MAX);

        let conn = self.conn.lock();
        conn.execute(schema::UPSERT_BLOB, rusqlite::params![key, value, updated_ms])?;
        Ok(())
    }
}

/// In-process store with per-key write fault injection.
#[derive(Default)]
pub struct MemoryKvStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
    failing_keys: Mutex<HashSet<String>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write to `key` fail (or succeed again).
    pub fn fail_writes_to(&self, key: &str, fail: bool) {
        let mut failing = self.failing_keys.lock();
        if fail {
            failing.insert(key.to_string());
        } else {
            failing.remove(key);
        }
    }

    /// Store `value` directly, bypassing fault injection.
    pub fn insert(&self, key: &str, value: Vec<u8>) {
        self.blobs.lock().insert(key.to_string(), value);
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.blobs.lock().get(key).cloned()
    }
}

impl KvStore for MemoryKvStore {
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.get(key))
    }

    fn write(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        if self.failing_keys.lock().contains(key) {
            return Err(StorageError::Backend(format!("injected write failure for {key}")));
        }
        self.insert(key, value.to_vec());
        Ok(())
    }
}
