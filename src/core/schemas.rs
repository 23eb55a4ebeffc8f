//! Centralized database schema definitions for the devhabit store.
//!
//! All state lives in one consolidated SQLite database, `devhabit.db`:
//! users, habits, completion logs, GitHub connections, inbound-event
//! idempotency records, per-habit event records, and repository projections.
//!
//! Two invariants are enforced at the storage layer rather than in code:
//! 1. `inbound_events` is keyed by (event_key, event_kind), so the
//!    check-then-insert of the idempotency guard is a single atomic insert.
//! 2. At most one *manual* completion per (habit, calendar day), via a
//!    partial unique index on habit_logs.

pub const HABIT_DB_NAME: &str = "devhabit.db";
pub const SCHEMA_VERSION: u32 = 1;

pub const DB_SCHEMA_META: &str = "
    CREATE TABLE IF NOT EXISTS meta (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    )
";

pub const DB_SCHEMA_USERS: &str = "
    CREATE TABLE IF NOT EXISTS users (
        id TEXT PRIMARY KEY,
        username TEXT NOT NULL UNIQUE,
        email TEXT UNIQUE,
        total_xp INTEGER NOT NULL DEFAULT 0 CHECK (total_xp >= 0),
        level INTEGER NOT NULL DEFAULT 1,
        current_streak INTEGER NOT NULL DEFAULT 0,
        longest_streak INTEGER NOT NULL DEFAULT 0,
        is_active INTEGER NOT NULL DEFAULT 1,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
";

pub const DB_SCHEMA_HABITS: &str = "
    CREATE TABLE IF NOT EXISTS habits (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        name TEXT NOT NULL,
        description TEXT NOT NULL DEFAULT '',
        category TEXT NOT NULL DEFAULT 'other',
        frequency TEXT NOT NULL DEFAULT 'daily',
        auto_track INTEGER NOT NULL DEFAULT 0,
        tracked_event TEXT,
        is_active INTEGER NOT NULL DEFAULT 1,
        archived_at TEXT,
        current_streak INTEGER NOT NULL DEFAULT 0,
        longest_streak INTEGER NOT NULL DEFAULT 0,
        total_completions INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        FOREIGN KEY(user_id) REFERENCES users(id)
    )
";
pub const DB_SCHEMA_INDEX_HABITS_USER: &str =
    "CREATE INDEX IF NOT EXISTS idx_habits_user ON habits(user_id, is_active)";

pub const DB_SCHEMA_HABIT_LOGS: &str = "
    CREATE TABLE IF NOT EXISTS habit_logs (
        id TEXT PRIMARY KEY,
        habit_id TEXT NOT NULL,
        user_id TEXT NOT NULL,
        completed_at TEXT NOT NULL,
        completed_day TEXT NOT NULL,
        origin TEXT NOT NULL CHECK (origin IN ('manual', 'auto')),
        note TEXT,
        xp_earned INTEGER NOT NULL DEFAULT 10,
        created_at TEXT NOT NULL,
        FOREIGN KEY(habit_id) REFERENCES habits(id)
    )
";
pub const DB_SCHEMA_INDEX_LOGS_HABIT_DAY: &str =
    "CREATE INDEX IF NOT EXISTS idx_habit_logs_habit_day ON habit_logs(habit_id, completed_day)";
// Storage-level backstop for manual daily exclusivity: two concurrent manual
// check-ins cannot both pass the "not completed yet" read.
pub const DB_SCHEMA_INDEX_LOGS_MANUAL_UNIQUE: &str = "
    CREATE UNIQUE INDEX IF NOT EXISTS idx_habit_logs_manual_day
    ON habit_logs(habit_id, completed_day) WHERE origin = 'manual'
";

pub const DB_SCHEMA_CONNECTIONS: &str = "
    CREATE TABLE IF NOT EXISTS connections (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL UNIQUE,
        github_user_id INTEGER NOT NULL,
        github_login TEXT NOT NULL,
        github_email TEXT,
        avatar_url TEXT,
        access_token TEXT NOT NULL,
        scope TEXT NOT NULL DEFAULT '',
        is_active INTEGER NOT NULL DEFAULT 1,
        connected_at TEXT NOT NULL,
        last_synced_at TEXT,
        updated_at TEXT NOT NULL,
        FOREIGN KEY(user_id) REFERENCES users(id)
    )
";
// One active connection per external GitHub account.
pub const DB_SCHEMA_INDEX_CONNECTIONS_ACCOUNT: &str = "
    CREATE UNIQUE INDEX IF NOT EXISTS idx_connections_active_account
    ON connections(github_user_id) WHERE is_active = 1
";

// Write-once idempotency records; the primary key IS the dedup constraint.
pub const DB_SCHEMA_INBOUND_EVENTS: &str = "
    CREATE TABLE IF NOT EXISTS inbound_events (
        event_key TEXT NOT NULL,
        event_kind TEXT NOT NULL,
        processed_at TEXT NOT NULL,
        PRIMARY KEY(event_key, event_kind)
    )
";

pub const DB_SCHEMA_GITHUB_EVENTS: &str = "
    CREATE TABLE IF NOT EXISTS github_events (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        habit_id TEXT NOT NULL,
        habit_log_id TEXT NOT NULL,
        event_kind TEXT NOT NULL,
        event_key TEXT NOT NULL,
        repo_name TEXT NOT NULL DEFAULT '',
        repo_full_name TEXT NOT NULL DEFAULT '',
        commit_sha TEXT,
        commit_message TEXT,
        pr_number INTEGER,
        pr_title TEXT,
        issue_number INTEGER,
        issue_title TEXT,
        created_at TEXT NOT NULL,
        FOREIGN KEY(user_id) REFERENCES users(id),
        FOREIGN KEY(habit_id) REFERENCES habits(id)
    )
";
pub const DB_SCHEMA_INDEX_GITHUB_EVENTS_USER: &str =
    "CREATE INDEX IF NOT EXISTS idx_github_events_user ON github_events(user_id, created_at)";

pub const DB_SCHEMA_REPOSITORIES: &str = "
    CREATE TABLE IF NOT EXISTS repositories (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        github_repo_id INTEGER NOT NULL,
        name TEXT NOT NULL,
        full_name TEXT NOT NULL,
        description TEXT,
        is_private INTEGER NOT NULL DEFAULT 0,
        is_tracked INTEGER NOT NULL DEFAULT 0,
        language TEXT,
        stargazers INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        UNIQUE(user_id, github_repo_id),
        FOREIGN KEY(user_id) REFERENCES users(id)
    )
";
