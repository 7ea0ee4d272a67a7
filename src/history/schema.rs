// DDL constants for the history key-value database.

pub const KV_DDL: &str = "\
CREATE TABLE IF NOT EXISTS kv_blobs (
    key         TEXT    PRIMARY KEY,
    value       BLOB    NOT NULL,
    updated_ms  INTEGER NOT NULL
);
";

pub const PRAGMAS: &str = "\
PRAGMA journal_mode = WAL;
PRAGMA synchronous  = NORMAL;
PRAGMA cache_size   = -256;
PRAGMA temp_store   = MEMORY;
";

pub const UPSERT_BLOB: &str = "\
INSERT INTO kv_blobs (key, value, updated_ms) VALUES (?1, ?2, ?3)
ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_ms = excluded.updated_ms
";

pub const SELECT_BLOB: &str = "SELECT value FROM kv_blobs WHERE key = ?1";

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn ddl_executes_on_in_memory_db() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(PRAGMAS).unwrap();
        conn.execute_batch(KV_DDL).unwrap();
    }

    #[test]
    fn ddl_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(KV_DDL).unwrap();
        conn.execute_batch(KV_DDL).unwrap();
    }

    #[test]
    fn upsert_replaces_existing_value() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(KV_DDL).unwrap();
        conn.execute(UPSERT_BLOB, rusqlite::params!["a", vec![1u8], 1i64])
            .unwrap();
        conn.execute(UPSERT_BLOB, rusqlite::params!["a", vec![2u8, 3], 2i64])
            .unwrap();
        let value: Vec<u8> = conn
            .query_row(SELECT_BLOB, ["a"], |r| r.get(0))
            .unwrap();
        assert_eq!(value, vec![2, 3]);
    }
}
