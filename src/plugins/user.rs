//! User accounts and derived reward stats.
//!
//! XP, level, and user-wide streaks are derived fields owned by the reward
//! aggregator; this module only creates/reads users and renders stats.

use crate::core::db;
use crate::core::error;
use crate::core::pool;
use crate::core::rewards;
use crate::core::store::Store;
use crate::core::time;
use clap::{Parser, Subcommand, ValueEnum};
use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Parser, Debug)]
#[clap(name = "user", about = "Manage devhabit user accounts.")]
pub struct UserCli {
    /// Output format for this command group.
    #[clap(long, global = true, value_enum, default_value = "text")]
    format: OutputFormat,
    #[clap(subcommand)]
    command: UserCommand,
}

#[derive(Subcommand, Debug)]
pub enum UserCommand {
    /// Create a user account.
    Add {
        #[clap(value_name = "USERNAME")]
        username: String,
        #[clap(long)]
        email: Option<String>,
    },
    /// Show a user with XP/level/streak stats.
    Show {
        /// User id or username.
        #[clap(value_name = "USER")]
        user: String,
    },
    /// List all users.
    List,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: Option<String>,
    pub total_xp: i64,
    pub level: i64,
    pub current_streak: i64,
    pub longest_streak: i64,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
}

fn map_user(row: &rusqlite::Row<'_>) -> Result<User, rusqlite::Error> {
    Ok(User {
        id: row.get("id")?,
        username: row.get("username")?,
        email: row.get("email")?,
        total_xp: row.get("total_xp")?,
        level: row.get("level")?,
        current_streak: row.get("current_streak")?,
        longest_streak: row.get("longest_streak")?,
        is_active: row.get::<_, i64>("is_active")? != 0,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

const USER_COLUMNS: &str = "id, username, email, total_xp, level, current_streak, \
                            longest_streak, is_active, created_at, updated_at";

pub fn create_user(
    store: &Store,
    username: &str,
    email: Option<&str>,
) -> Result<User, error::HabitError> {
    let username = username.trim();
    if username.is_empty() {
        return Err(error::HabitError::ValidationError(
            "username must not be empty".to_string(),
        ));
    }

    let user_id = format!("usr_{}", Ulid::new());
    let ts = time::now_rfc3339();
    let db_path = db::habit_db_path(store);

    pool::global_pool().with_write(&db_path, |conn| {
        let inserted = conn.execute(
            "INSERT INTO users(id, username, email, total_xp, level, current_streak,
                               longest_streak, is_active, created_at, updated_at)
             VALUES(?1, ?2, ?3, 0, ?4, 0, 0, 1, ?5, ?5)",
            rusqlite::params![user_id, username, email, rewards::level_for_xp(0), ts],
        );
        match inserted {
            Ok(_) => get_user(conn, &user_id),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(error::HabitError::ValidationError(format!(
                    "username '{}' is already taken",
                    username
                )))
            }
            Err(e) => Err(error::HabitError::RusqliteError(e)),
        }
    })
}

pub fn get_user(conn: &Connection, user_id: &str) -> Result<User, error::HabitError> {
    conn.query_row(
        &format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS),
        [user_id],
        map_user,
    )
    .optional()?
    .ok_or_else(|| error::HabitError::NotFound(format!("user {}", user_id)))
}

/// Resolve a user by id or username; CLI surfaces accept either.
pub fn resolve_user(conn: &Connection, ident: &str) -> Result<User, error::HabitError> {
    conn.query_row(
        &format!(
            "SELECT {} FROM users WHERE id = ?1 OR username = ?1",
            USER_COLUMNS
        ),
        [ident],
        map_user,
    )
    .optional()?
    .ok_or_else(|| error::HabitError::NotFound(format!("user {}", ident)))
}

pub fn list_users(conn: &Connection) -> Result<Vec<User>, error::HabitError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM users ORDER BY created_at",
        USER_COLUMNS
    ))?;
    let rows = stmt.query_map([], map_user)?;
    let mut users = Vec::new();
    for row in rows {
        users.push(row?);
    }
    Ok(users)
}

fn print_user(user: &User, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let envelope = time::command_envelope(
                "user.show",
                "ok",
                serde_json::json!({ "user": user }),
            );
            println!("{}", serde_json::to_string_pretty(&envelope).unwrap_or_default());
        }
        OutputFormat::Text => {
            use colored::Colorize;
            println!(
                "{}  {} (level {}, {} xp)",
                user.id.dimmed(),
                user.username.bold(),
                user.level,
                user.total_xp
            );
            println!(
                "    streak: {} current / {} longest",
                user.current_streak, user.longest_streak
            );
        }
    }
}

pub fn handle_user_cli(store: &Store, cli: &UserCli) -> Result<(), error::HabitError> {
    let db_path = db::habit_db_path(store);
    match &cli.command {
        UserCommand::Add { username, email } => {
            let user = create_user(store, username, email.as_deref())?;
            match cli.format {
                OutputFormat::Json => {
                    let envelope = time::command_envelope(
                        "user.add",
                        "ok",
                        serde_json::json!({ "user": user }),
                    );
                    println!("{}", serde_json::to_string_pretty(&envelope).unwrap_or_default());
                }
                OutputFormat::Text => println!("Created user {} ({})", user.username, user.id),
            }
            Ok(())
        }
        UserCommand::Show { user } => {
            let user = pool::global_pool().with_read(&db_path, |conn| resolve_user(conn, user))?;
            print_user(&user, cli.format);
            Ok(())
        }
        UserCommand::List => {
            let users = pool::global_pool().with_read(&db_path, list_users)?;
            match cli.format {
                OutputFormat::Json => {
                    let envelope = time::command_envelope(
                        "user.list",
                        "ok",
                        serde_json::json!({ "users": users, "count": users.len() }),
                    );
                    println!("{}", serde_json::to_string_pretty(&envelope).unwrap_or_default());
                }
                OutputFormat::Text => {
                    for user in &users {
                        print_user(user, OutputFormat::Text);
                    }
                }
            }
            Ok(())
        }
    }
}

pub fn schema() -> serde_json::Value {
    serde_json::json!({
        "name": "user",
        "version": "0.1.0",
        "description": "User accounts with derived XP/level/streak stats",
        "commands": [
            { "name": "add", "description": "Create a user account" },
            { "name": "show", "description": "Show a user with stats" },
            { "name": "list", "description": "List all users" }
        ],
        "storage": ["devhabit.db"]
    })
}
