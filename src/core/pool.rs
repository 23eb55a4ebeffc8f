//! SQLite connection access with read/write separation.
//!
//! - Writes hold a per-database mutex, so every in-process mutation of the
//!   user/habit aggregates is serialized; one consolidated DB makes that a
//!   single lock.
//! - Reads open fresh connections without the mutex; WAL allows concurrent
//!   readers across threads and processes.
//! - Cross-process write races are resolved by `busy_timeout` plus the
//!   uniqueness constraints in `schemas.rs`, which give the loser a
//!   distinguishable conflict instead of silent double-writes.
//!
//! Connections are opened fresh each time rather than pooled, avoiding
//! WAL/SHM handle conflicts when tests run many stores in one process.

use crate::core::db;
use crate::core::error::HabitError;
use rusqlite::Connection;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};

const WRITE_BUSY_TIMEOUT_SECS: u32 = 5;
const READ_BUSY_TIMEOUT_SECS: u32 = 5;

struct PoolEntry {
    write_lock: Mutex<()>,
    db_path: PathBuf,
}

pub struct SqlitePool {
    entries: Mutex<HashMap<PathBuf, &'static PoolEntry>>,
}

impl SqlitePool {
    fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn get_entry(&self, db_path: &Path) -> Result<&'static PoolEntry, HabitError> {
        let canonical = db_path.to_path_buf();
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| HabitError::InternalError("SqlitePool entries lock poisoned".to_string()))?;
        if let Some(entry) = entries.get(&canonical) {
            return Ok(*entry);
        }
        let entry = Box::leak(Box::new(PoolEntry {
            write_lock: Mutex::new(()),
            db_path: canonical.clone(),
        }));
        entries.insert(canonical, entry);
        Ok(entry)
    }

    /// Execute a closure with an exclusive write connection for the given DB.
    /// The connection is `&mut` so callers can open rusqlite transactions.
    pub fn with_write<F, R>(&self, db_path: &Path, f: F) -> Result<R, HabitError>
    where
        F: FnOnce(&mut Connection) -> Result<R, HabitError>,
    {
        let entry = self.get_entry(db_path)?;
        let _guard = entry
            .write_lock
            .lock()
            .map_err(|_| HabitError::InternalError("Pool write lock poisoned".to_string()))?;

        let mut conn = db::db_connect_with_timeout(
            &entry.db_path.to_string_lossy(),
            WRITE_BUSY_TIMEOUT_SECS,
        )?;
        db::ensure_schema(&conn)?;

        f(&mut conn)
    }

    /// Execute a closure with a read connection (no mutex serialization).
    pub fn with_read<F, R>(&self, db_path: &Path, f: F) -> Result<R, HabitError>
    where
        F: FnOnce(&Connection) -> Result<R, HabitError>,
    {
        let conn =
            db::db_connect_with_timeout(&db_path.to_string_lossy(), READ_BUSY_TIMEOUT_SECS)?;
        db::ensure_schema(&conn)?;

        f(&conn)
    }
}

/// Global pool instance (same lifetime as the process).
pub fn global_pool() -> &'static SqlitePool {
    static POOL: OnceLock<SqlitePool> = OnceLock::new();
    POOL.get_or_init(SqlitePool::new)
}
