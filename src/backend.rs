// Key-value persistence media behind the store

use fs2::FileExt;
use rusqlite::{Connection, OptionalExtension};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::clock::now_ms;
use crate::error::StoreError;

/// A string-keyed, string-valued store with an optional byte quota
///
/// Writes replace the whole value. A write that would push total usage past
/// the quota fails with [`StoreError::QuotaExceeded`] and leaves the old
/// value in place.
pub trait Backend {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError>;

    fn remove(&mut self, key: &str) -> Result<(), StoreError>;

    /// Total bytes held across all keys
    fn used_bytes(&self) -> Result<u64, StoreError>;

    fn quota(&self) -> Option<u64>;

    /// Fail if replacing `key` with `new_len` bytes would exceed the quota
    fn ensure_capacity(&self, key: &str, new_len: u64) -> Result<(), StoreError> {
        let Some(quota) = self.quota() else {
            return Ok(());
        };

        let current = self.get(key)?.map(|v| v.len() as u64).unwrap_or(0);
        let needed = self.used_bytes()?.saturating_sub(current) + new_len;
        if needed > quota {
            return Err(StoreError::QuotaExceeded {
                key: key.to_string(),
                needed,
                quota,
            });
        }
        Ok(())
    }
}

/// In-process map, for tests and throwaway sessions
#[derive(Debug, Default, Clone)]
pub struct MemoryBackend {
    values: HashMap<String, String>,
    quota: Option<u64>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quota(quota: u64) -> Self {
        Self {
            values: HashMap::new(),
            quota: Some(quota),
        }
    }
}

impl Backend for MemoryBackend {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.values.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        self.ensure_capacity(key, value.len() as u64)?;
        self.values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StoreError> {
        self.values.remove(key);
        Ok(())
    }

    fn used_bytes(&self) -> Result<u64, StoreError> {
        Ok(self.values.values().map(|v| v.len() as u64).sum())
    }

    fn quota(&self) -> Option<u64> {
        self.quota
    }
}

/// Lock file guarding a [`FileBackend`] directory; never a valid key
const LOCK_FILE: &str = ".lock";

/// One `{key}.json` file per key in a directory
#[derive(Debug, Clone)]
pub struct FileBackend {
    dir: PathBuf,
    quota: Option<u64>,
}

impl FileBackend {
    /// Open or create the directory
    pub fn open<P: AsRef<Path>>(dir: P, quota: Option<u64>) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|source| StoreError::Io {
            key: dir.display().to_string(),
            source,
        })?;
        Ok(Self { dir, quota })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StoreError> {
        validate_key(key)?;
        Ok(self.dir.join(format!("{}.json", key)))
    }

    /// Directory-wide lock, released when the returned file drops
    ///
    /// Readers share it; writers hold it exclusively across the rename.
    fn lock(&self, exclusive: bool) -> Result<File, StoreError> {
        let io = |source| StoreError::Io {
            key: LOCK_FILE.to_string(),
            source,
        };

        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(self.dir.join(LOCK_FILE))
            .map_err(io)?;

        if exclusive {
            FileExt::lock_exclusive(&file).map_err(io)?;
        } else {
            FileExt::lock_shared(&file).map_err(io)?;
        }
        Ok(file)
    }
}

impl Backend for FileBackend {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let path = self.path_for(key)?;
        let _lock = self.lock(false)?;

        match fs::read_to_string(&path) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StoreError::Io {
                key: key.to_string(),
                source,
            }),
        }
    }

    /// Write to a temp file beside the key file, then rename it into place
    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        self.ensure_capacity(key, value.len() as u64)?;

        let io = |source| StoreError::Io {
            key: key.to_string(),
            source,
        };

        let _lock = self.lock(true)?;
        let mut temp = NamedTempFile::new_in(&self.dir).map_err(io)?;
        temp.write_all(value.as_bytes()).map_err(io)?;
        temp.as_file().sync_all().map_err(io)?;
        temp.persist(&path).map_err(|e| io(e.error))?;

        debug!(key, bytes = value.len(), "Wrote key file");
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        let _lock = self.lock(true)?;

        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StoreError::Io {
                key: key.to_string(),
                source,
            }),
        }
    }

    fn used_bytes(&self) -> Result<u64, StoreError> {
        let io = |source| StoreError::Io {
            key: self.dir.display().to_string(),
            source,
        };

        let mut total = 0;
        for entry in fs::read_dir(&self.dir).map_err(io)? {
            let path = entry.map_err(io)?.path();
            if path.extension().and_then(|s| s.to_str()) != Some("json") {
                continue;
            }
            total += fs::metadata(&path).map_err(io)?.len();
        }
        Ok(total)
    }

    fn quota(&self) -> Option<u64> {
        self.quota
    }
}

/// Single `kv` table in a SQLite database
pub struct SqliteBackend {
    db: Connection,
    quota: Option<u64>,
}

impl SqliteBackend {
    pub fn open<P: AsRef<Path>>(path: P, quota: Option<u64>) -> Result<Self, StoreError> {
        let db = Connection::open(path.as_ref()).map_err(|source| StoreError::Database {
            key: path.as_ref().display().to_string(),
            source,
        })?;
        Self::init(db, quota)
    }

    pub fn open_in_memory(quota: Option<u64>) -> Result<Self, StoreError> {
        let db = Connection::open_in_memory().map_err(|source| StoreError::Database {
            key: ":memory:".to_string(),
            source,
        })?;
        Self::init(db, quota)
    }

    fn init(db: Connection, quota: Option<u64>) -> Result<Self, StoreError> {
        debug!("Creating kv schema");
        db.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            );
            "#,
        )
        .map_err(|source| StoreError::Database {
            key: "kv".to_string(),
            source,
        })?;

        Ok(Self { db, quota })
    }

    fn db_err(key: &str) -> impl FnOnce(rusqlite::Error) -> StoreError + '_ {
        move |source| StoreError::Database {
            key: key.to_string(),
            source,
        }
    }
}

impl Backend for SqliteBackend {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.db
            .query_row("SELECT value FROM kv WHERE key = ?1", [key], |row| row.get(0))
            .optional()
            .map_err(Self::db_err(key))
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        self.ensure_capacity(key, value.len() as u64)?;
        self.db
            .execute(
                "INSERT OR REPLACE INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)",
                rusqlite::params![key, value, now_ms()],
            )
            .map_err(Self::db_err(key))?;
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StoreError> {
        self.db
            .execute("DELETE FROM kv WHERE key = ?1", [key])
            .map_err(Self::db_err(key))?;
        Ok(())
    }

    fn used_bytes(&self) -> Result<u64, StoreError> {
        let total: i64 = self
            .db
            .query_row(
                "SELECT COALESCE(SUM(length(CAST(value AS BLOB))), 0) FROM kv",
                [],
                |row| row.get(0),
            )
            .map_err(Self::db_err("kv"))?;
        Ok(total.max(0) as u64)
    }

    fn quota(&self) -> Option<u64> {
        self.quota
    }
}

/// Keys double as file names, so keep them to a safe alphabet
fn validate_key(key: &str) -> Result<(), StoreError> {
    let invalid = |reason: &str| StoreError::Io {
        key: key.to_string(),
        source: std::io::Error::new(std::io::ErrorKind::InvalidInput, reason.to_string()),
    };

    if key.is_empty() {
        return Err(invalid("key cannot be empty"));
    }
    if key.len() > 64 {
        return Err(invalid("key too long (max 64 chars)"));
    }
    if !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
        return Err(invalid("key must be alphanumeric with _/-"));
    }
    Ok(())
}
