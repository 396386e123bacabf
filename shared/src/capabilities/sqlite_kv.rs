use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, instrument};

use super::kv::{KeyValueStore, KvError, KvKey, StorageErrorCode, MAX_VALUE_SIZE};

/// SQLite-backed persistent key-value storage for native shells.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self, KvError> {
        let conn = Connection::open(path.as_ref()).map_err(map_sqlite_error)?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self, KvError> {
        let conn = Connection::open_in_memory().map_err(map_sqlite_error)?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self, KvError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS kv_entries (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            );
            "#,
        )
        .map_err(map_sqlite_error)?;
        debug!("kv schema ready");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn with_conn<R>(
        &self,
        f: impl FnOnce(&Connection) -> rusqlite::Result<R>,
    ) -> Result<R, KvError> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| KvError::storage(StorageErrorCode::Locked, "sqlite lock poisoned"))?;
        f(&conn).map_err(map_sqlite_error)
    }
}

impl KeyValueStore for SqliteStore {
    fn get(&self, key: &KvKey) -> Result<Option<String>, KvError> {
        let raw = key.raw();
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT value FROM kv_entries WHERE key = ?1",
                params![raw],
                |row| row.get(0),
            )
            .optional()
        })
    }

    fn set(&self, key: &KvKey, value: String) -> Result<(), KvError> {
        if value.len() > MAX_VALUE_SIZE {
            return Err(KvError::ValueTooLarge {
                size: value.len(),
                max: MAX_VALUE_SIZE,
            });
        }
        let raw = key.raw();
        let now = crate::get_current_time_ms();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO kv_entries (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                params![raw, value, now as i64],
            )
            .map(|_| ())
        })
    }

    fn remove(&self, key: &KvKey) -> Result<bool, KvError> {
        let raw = key.raw();
        self.with_conn(|conn| {
            conn.execute("DELETE FROM kv_entries WHERE key = ?1", params![raw])
                .map(|changed| changed > 0)
        })
    }
}

fn map_sqlite_error(e: rusqlite::Error) -> KvError {
    let code = match &e {
        rusqlite::Error::SqliteFailure(err, _) => match err.code {
            rusqlite::ErrorCode::DatabaseBusy => StorageErrorCode::Busy,
            rusqlite::ErrorCode::DatabaseLocked => StorageErrorCode::Locked,
            rusqlite::ErrorCode::DiskFull => StorageErrorCode::DiskFull,
            rusqlite::ErrorCode::PermissionDenied | rusqlite::ErrorCode::ReadOnly => {
                StorageErrorCode::PermissionDenied
            }
            rusqlite::ErrorCode::DatabaseCorrupt | rusqlite::ErrorCode::NotADatabase => {
                StorageErrorCode::Corrupted
            }
            rusqlite::ErrorCode::CannotOpen => StorageErrorCode::ConnectionFailed,
            _ => StorageErrorCode::IoError,
        },
        _ => StorageErrorCode::Unknown,
    };
    KvError::storage(code, e.to_string())
}
