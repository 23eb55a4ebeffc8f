use crate::core::error;
use crate::core::schemas;
use crate::core::store::Store;
use rusqlite::{Connection, OptionalExtension};
use std::fs;
use std::path::PathBuf;

pub fn db_connect(db_path: &str) -> Result<Connection, error::HabitError> {
    db_connect_with_timeout(db_path, 5)
}

pub fn db_connect_with_timeout(
    db_path: &str,
    busy_timeout_secs: u32,
) -> Result<Connection, error::HabitError> {
    let conn = Connection::open(db_path)?;
    conn.busy_timeout(std::time::Duration::from_secs(busy_timeout_secs as u64))
        .map_err(error::HabitError::RusqliteError)?;
    conn.query_row("PRAGMA journal_mode=WAL;", [], |_| Ok(()))
        .map_err(error::HabitError::RusqliteError)?;
    conn.execute("PRAGMA foreign_keys=ON;", [])
        .map_err(error::HabitError::RusqliteError)?;
    Ok(conn)
}

pub fn habit_db_path(store: &Store) -> PathBuf {
    store.root.join(schemas::HABIT_DB_NAME)
}

/// Create the store directory and bring the schema up to the current version.
pub fn initialize_store(store: &Store) -> Result<(), error::HabitError> {
    fs::create_dir_all(&store.root).map_err(error::HabitError::IoError)?;
    let db_path = habit_db_path(store);
    let conn = db_connect(&db_path.to_string_lossy())?;
    ensure_schema(&conn)
}

pub fn ensure_schema(conn: &Connection) -> Result<(), error::HabitError> {
    conn.execute(schemas::DB_SCHEMA_META, [])?;

    let current: Option<String> = conn
        .query_row(
            "SELECT value FROM meta WHERE key = 'schema_version'",
            [],
            |row| row.get(0),
        )
        .optional()
        .map_err(error::HabitError::RusqliteError)?;

    let current_version: u32 = current
        .as_deref()
        .and_then(|s| s.parse::<u32>().ok())
        .unwrap_or(0);

    if current_version >= schemas::SCHEMA_VERSION {
        return Ok(());
    }

    conn.execute(schemas::DB_SCHEMA_USERS, [])?;
    conn.execute(schemas::DB_SCHEMA_HABITS, [])?;
    conn.execute(schemas::DB_SCHEMA_INDEX_HABITS_USER, [])?;
    conn.execute(schemas::DB_SCHEMA_HABIT_LOGS, [])?;
    conn.execute(schemas::DB_SCHEMA_INDEX_LOGS_HABIT_DAY, [])?;
    conn.execute(schemas::DB_SCHEMA_INDEX_LOGS_MANUAL_UNIQUE, [])?;
    conn.execute(schemas::DB_SCHEMA_CONNECTIONS, [])?;
    conn.execute(schemas::DB_SCHEMA_INDEX_CONNECTIONS_ACCOUNT, [])?;
    conn.execute(schemas::DB_SCHEMA_INBOUND_EVENTS, [])?;
    conn.execute(schemas::DB_SCHEMA_GITHUB_EVENTS, [])?;
    conn.execute(schemas::DB_SCHEMA_INDEX_GITHUB_EVENTS_USER, [])?;
    conn.execute(schemas::DB_SCHEMA_REPOSITORIES, [])?;

    conn.execute(
        "INSERT INTO meta(key, value) VALUES('schema_version', ?1)
         ON CONFLICT(key) DO UPDATE SET value=excluded.value",
        [schemas::SCHEMA_VERSION.to_string()],
    )?;

    Ok(())
}
