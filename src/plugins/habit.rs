//! Habit lifecycle and the completion recorder.
//!
//! Derived fields on the habit aggregate (`current_streak`,
//! `longest_streak`, `total_completions`) are recomputed by
//! `record_completion` and never set by callers. Archive/restore are
//! explicit state transitions; archived habits drop out of auto-track
//! matching and reward aggregation but keep their logs (append-only,
//! never deleted).

use crate::core::db;
use crate::core::error;
use crate::core::pool;
use crate::core::rewards;
use crate::core::store::Store;
use crate::core::streak;
use crate::core::time;
use crate::plugins::github::EventKind;
use chrono::{DateTime, Local, NaiveDate};
use clap::{Parser, Subcommand, ValueEnum};
use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

pub use crate::plugins::user::OutputFormat;

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HabitCategory {
    Code,
    Learn,
    Fitness,
    Mindfulness,
    Creative,
    Social,
    Other,
}

impl HabitCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            HabitCategory::Code => "code",
            HabitCategory::Learn => "learn",
            HabitCategory::Fitness => "fitness",
            HabitCategory::Mindfulness => "mindfulness",
            HabitCategory::Creative => "creative",
            HabitCategory::Social => "social",
            HabitCategory::Other => "other",
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HabitFrequency {
    Daily,
    Weekly,
    Custom,
}

impl HabitFrequency {
    pub fn as_str(self) -> &'static str {
        match self {
            HabitFrequency::Daily => "daily",
            HabitFrequency::Weekly => "weekly",
            HabitFrequency::Custom => "custom",
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionOrigin {
    Manual,
    Auto,
}

impl CompletionOrigin {
    pub fn as_str(self) -> &'static str {
        match self {
            CompletionOrigin::Manual => "manual",
            CompletionOrigin::Auto => "auto",
        }
    }
}

#[derive(Parser, Debug)]
#[clap(name = "habit", about = "Manage habits and daily check-ins.")]
pub struct HabitCli {
    /// Output format for this command group.
    #[clap(long, global = true, value_enum, default_value = "text")]
    format: OutputFormat,
    #[clap(subcommand)]
    command: HabitCommand,
}

#[derive(Subcommand, Debug)]
pub enum HabitCommand {
    /// Create a habit for a user.
    Add {
        /// Owning user id or username.
        #[clap(long)]
        user: String,
        #[clap(value_name = "NAME")]
        name: String,
        #[clap(long, default_value = "")]
        description: String,
        #[clap(long, value_enum, default_value = "other")]
        category: HabitCategory,
        #[clap(long, value_enum, default_value = "daily")]
        frequency: HabitFrequency,
        /// Auto-complete this habit from the given GitHub event kind.
        #[clap(long, value_enum)]
        track_event: Option<EventKind>,
    },
    /// List a user's habits.
    List {
        #[clap(long)]
        user: String,
        #[clap(long)]
        include_archived: bool,
    },
    /// Get a habit by id.
    Get {
        #[clap(long)]
        id: String,
    },
    /// Edit a habit's descriptive fields or auto-track configuration.
    Edit {
        #[clap(long)]
        id: String,
        #[clap(long)]
        name: Option<String>,
        #[clap(long)]
        description: Option<String>,
        #[clap(long, value_enum)]
        category: Option<HabitCategory>,
        #[clap(long, value_enum)]
        frequency: Option<HabitFrequency>,
        #[clap(long, value_enum)]
        track_event: Option<EventKind>,
        /// Disable GitHub auto-tracking.
        #[clap(long, conflicts_with = "track_event")]
        no_auto_track: bool,
    },
    /// Archive a habit (soft delete; logs are kept).
    Archive {
        #[clap(long)]
        id: String,
    },
    /// Restore an archived habit.
    Restore {
        #[clap(long)]
        id: String,
    },
    /// Record a manual check-in for today.
    Checkin {
        #[clap(long)]
        id: String,
        #[clap(long)]
        note: Option<String>,
    },
    /// List a habit's completion log.
    Logs {
        #[clap(long)]
        id: String,
    },
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Habit {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub description: String,
    pub category: String,
    pub frequency: String,
    pub auto_track: bool,
    pub tracked_event: Option<String>,
    pub is_active: bool,
    pub archived_at: Option<String>,
    pub current_streak: i64,
    pub longest_streak: i64,
    pub total_completions: i64,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CompletionLog {
    pub id: String,
    pub habit_id: String,
    pub user_id: String,
    pub completed_at: String,
    pub completed_day: String,
    pub origin: String,
    pub note: Option<String>,
    pub xp_earned: i64,
}

/// Result of a completion attempt. `created == false` means an auto
/// re-trigger coalesced into an existing same-day completion.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CompletionOutcome {
    pub log_id: String,
    pub habit_id: String,
    pub created: bool,
    pub current_streak: i64,
    pub longest_streak: i64,
    pub total_completions: i64,
    pub xp_earned: i64,
}

const HABIT_COLUMNS: &str = "id, user_id, name, description, category, frequency, auto_track, \
                             tracked_event, is_active, archived_at, current_streak, \
                             longest_streak, total_completions, created_at, updated_at";

fn map_habit(row: &rusqlite::Row<'_>) -> Result<Habit, rusqlite::Error> {
    Ok(Habit {
        id: row.get("id")?,
        user_id: row.get("user_id")?,
        name: row.get("name")?,
        description: row.get("description")?,
        category: row.get("category")?,
        frequency: row.get("frequency")?,
        auto_track: row.get::<_, i64>("auto_track")? != 0,
        tracked_event: row.get("tracked_event")?,
        is_active: row.get::<_, i64>("is_active")? != 0,
        archived_at: row.get("archived_at")?,
        current_streak: row.get("current_streak")?,
        longest_streak: row.get("longest_streak")?,
        total_completions: row.get("total_completions")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

pub fn get_habit(conn: &Connection, habit_id: &str) -> Result<Habit, error::HabitError> {
    conn.query_row(
        &format!("SELECT {} FROM habits WHERE id = ?1", HABIT_COLUMNS),
        [habit_id],
        map_habit,
    )
    .optional()?
    .ok_or_else(|| error::HabitError::NotFound(format!("habit {}", habit_id)))
}

pub fn list_habits(
    conn: &Connection,
    user_id: &str,
    include_archived: bool,
) -> Result<Vec<Habit>, error::HabitError> {
    let sql = if include_archived {
        format!(
            "SELECT {} FROM habits WHERE user_id = ?1 ORDER BY created_at",
            HABIT_COLUMNS
        )
    } else {
        format!(
            "SELECT {} FROM habits WHERE user_id = ?1 AND is_active = 1 ORDER BY created_at",
            HABIT_COLUMNS
        )
    };
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([user_id], map_habit)?;
    let mut habits = Vec::new();
    for row in rows {
        habits.push(row?);
    }
    Ok(habits)
}

pub fn create_habit(
    store: &Store,
    user_ident: &str,
    name: &str,
    description: &str,
    category: HabitCategory,
    frequency: HabitFrequency,
    track_event: Option<EventKind>,
) -> Result<Habit, error::HabitError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(error::HabitError::ValidationError(
            "habit name must not be empty".to_string(),
        ));
    }

    let db_path = db::habit_db_path(store);
    pool::global_pool().with_write(&db_path, |conn| {
        let owner = crate::plugins::user::resolve_user(conn, user_ident)?;
        let habit_id = format!("hab_{}", Ulid::new());
        let ts = time::now_rfc3339();
        conn.execute(
            "INSERT INTO habits(id, user_id, name, description, category, frequency,
                                auto_track, tracked_event, is_active, archived_at,
                                current_streak, longest_streak, total_completions,
                                created_at, updated_at)
             VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 1, NULL, 0, 0, 0, ?9, ?9)",
            rusqlite::params![
                habit_id,
                owner.id,
                name,
                description,
                category.as_str(),
                frequency.as_str(),
                track_event.is_some() as i64,
                track_event.map(|e| e.as_str()),
                ts
            ],
        )?;
        get_habit(conn, &habit_id)
    })
}

pub fn archive_habit(store: &Store, habit_id: &str) -> Result<Habit, error::HabitError> {
    let db_path = db::habit_db_path(store);
    pool::global_pool().with_write(&db_path, |conn| {
        let habit = get_habit(conn, habit_id)?;
        if !habit.is_active {
            return Ok(habit);
        }
        let ts = time::now_rfc3339();
        conn.execute(
            "UPDATE habits SET is_active = 0, archived_at = ?2, updated_at = ?2 WHERE id = ?1",
            rusqlite::params![habit_id, ts],
        )?;
        get_habit(conn, habit_id)
    })
}

pub fn restore_habit(store: &Store, habit_id: &str) -> Result<Habit, error::HabitError> {
    let db_path = db::habit_db_path(store);
    pool::global_pool().with_write(&db_path, |conn| {
        let habit = get_habit(conn, habit_id)?;
        if habit.is_active {
            return Ok(habit);
        }
        let ts = time::now_rfc3339();
        conn.execute(
            "UPDATE habits SET is_active = 1, archived_at = NULL, updated_at = ?2 WHERE id = ?1",
            rusqlite::params![habit_id, ts],
        )?;
        get_habit(conn, habit_id)
    })
}

#[allow(clippy::too_many_arguments)]
pub fn edit_habit(
    store: &Store,
    habit_id: &str,
    name: Option<&str>,
    description: Option<&str>,
    category: Option<HabitCategory>,
    frequency: Option<HabitFrequency>,
    track_event: Option<EventKind>,
    no_auto_track: bool,
) -> Result<Habit, error::HabitError> {
    let db_path = db::habit_db_path(store);
    pool::global_pool().with_write(&db_path, |conn| {
        let habit = get_habit(conn, habit_id)?;
        let ts = time::now_rfc3339();
        conn.execute(
            "UPDATE habits
             SET name = ?2, description = ?3, category = ?4, frequency = ?5,
                 auto_track = ?6, tracked_event = ?7, updated_at = ?8
             WHERE id = ?1",
            rusqlite::params![
                habit_id,
                name.unwrap_or(&habit.name),
                description.unwrap_or(&habit.description),
                category.map(|c| c.as_str().to_string()).unwrap_or(habit.category),
                frequency.map(|f| f.as_str().to_string()).unwrap_or(habit.frequency),
                if no_auto_track {
                    0i64
                } else if track_event.is_some() {
                    1i64
                } else {
                    habit.auto_track as i64
                },
                if no_auto_track {
                    None
                } else {
                    track_event.map(|e| e.as_str().to_string()).or(habit.tracked_event)
                },
                ts
            ],
        )?;
        get_habit(conn, habit_id)
    })
}

/// Distinct completion days for one habit, ascending.
pub fn completed_days(conn: &Connection, habit_id: &str) -> Result<Vec<NaiveDate>, error::HabitError> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT completed_day FROM habit_logs WHERE habit_id = ?1 ORDER BY completed_day",
    )?;
    let rows = stmt.query_map([habit_id], |row| row.get::<_, String>(0))?;
    let mut days = Vec::new();
    for row in rows {
        let raw = row?;
        let day = time::parse_day(&raw).ok_or_else(|| {
            error::HabitError::InternalError(format!("unparseable completed_day '{}'", raw))
        })?;
        days.push(day);
    }
    Ok(days)
}

pub fn last_completed_at(
    conn: &Connection,
    habit_id: &str,
) -> Result<Option<String>, error::HabitError> {
    conn.query_row(
        "SELECT completed_at FROM habit_logs WHERE habit_id = ?1
         ORDER BY completed_at DESC LIMIT 1",
        [habit_id],
        |row| row.get(0),
    )
    .optional()
    .map_err(error::HabitError::RusqliteError)
}

pub fn list_logs(conn: &Connection, habit_id: &str) -> Result<Vec<CompletionLog>, error::HabitError> {
    let mut stmt = conn.prepare(
        "SELECT id, habit_id, user_id, completed_at, completed_day, origin, note, xp_earned
         FROM habit_logs WHERE habit_id = ?1 ORDER BY completed_at DESC",
    )?;
    let rows = stmt.query_map([habit_id], |row| {
        Ok(CompletionLog {
            id: row.get(0)?,
            habit_id: row.get(1)?,
            user_id: row.get(2)?,
            completed_at: row.get(3)?,
            completed_day: row.get(4)?,
            origin: row.get(5)?,
            note: row.get(6)?,
            xp_earned: row.get(7)?,
        })
    })?;
    let mut logs = Vec::new();
    for row in rows {
        logs.push(row?);
    }
    Ok(logs)
}

/// Record a completion for `habit_id` on the calendar day of `now`.
///
/// One rusqlite transaction covers the same-day check, the log insert, the
/// habit's derived-field recompute, and the reward aggregation, so no
/// intermediate state is observable by a concurrent reader.
///
/// Same-day behavior by origin:
/// - manual: `AlreadyCompletedToday`, no mutation (the partial unique index
///   in the schema backstops concurrent manual check-ins);
/// - auto: success returning the existing log id, no new row.
pub fn record_completion(
    conn: &mut Connection,
    habit_id: &str,
    origin: CompletionOrigin,
    note: Option<&str>,
    now: DateTime<Local>,
) -> Result<CompletionOutcome, error::HabitError> {
    let tx = conn.transaction()?;
    let outcome = record_completion_in(&tx, habit_id, origin, note, now)?;
    tx.commit()?;
    Ok(outcome)
}

/// Transactional body of [`record_completion`]. `conn` must already be
/// inside the caller's transaction or savepoint, so additional writes (an
/// event record, for instance) can join the same unit of work.
pub(crate) fn record_completion_in(
    conn: &Connection,
    habit_id: &str,
    origin: CompletionOrigin,
    note: Option<&str>,
    now: DateTime<Local>,
) -> Result<CompletionOutcome, error::HabitError> {
    let habit = get_habit(conn, habit_id)?;
    if !habit.is_active {
        return Err(error::HabitError::ValidationError(format!(
            "habit {} is archived",
            habit_id
        )));
    }

    let day = time::day_of(now);
    let existing: Option<String> = conn
        .query_row(
            "SELECT id FROM habit_logs WHERE habit_id = ?1 AND completed_day = ?2
             ORDER BY completed_at DESC LIMIT 1",
            rusqlite::params![habit_id, day],
            |row| row.get(0),
        )
        .optional()?;

    if let Some(log_id) = existing {
        // Nothing has been written yet at this point.
        return match origin {
            CompletionOrigin::Manual => {
                Err(error::HabitError::AlreadyCompletedToday(habit_id.to_string()))
            }
            CompletionOrigin::Auto => Ok(CompletionOutcome {
                log_id,
                habit_id: habit_id.to_string(),
                created: false,
                current_streak: habit.current_streak,
                longest_streak: habit.longest_streak,
                total_completions: habit.total_completions,
                xp_earned: 0,
            }),
        };
    }

    let log_id = format!("log_{}", Ulid::new());
    let ts = time::to_rfc3339(now);
    let inserted = conn.execute(
        "INSERT INTO habit_logs(id, habit_id, user_id, completed_at, completed_day,
                                origin, note, xp_earned, created_at)
         VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        rusqlite::params![
            log_id,
            habit_id,
            habit.user_id,
            ts,
            day,
            origin.as_str(),
            note,
            rewards::XP_PER_COMPLETION,
            time::now_rfc3339()
        ],
    );
    if let Err(rusqlite::Error::SqliteFailure(e, _)) = &inserted {
        if e.code == rusqlite::ErrorCode::ConstraintViolation {
            return Err(error::HabitError::AlreadyCompletedToday(habit_id.to_string()));
        }
    }
    inserted?;

    let days = completed_days(conn, habit_id)?;
    let current = streak::current_streak(&days, now.date_naive()) as i64;
    let longest = (streak::longest_streak(&days) as i64).max(habit.longest_streak);

    conn.execute(
        "UPDATE habits
         SET total_completions = total_completions + 1,
             current_streak = ?2,
             longest_streak = ?3,
             updated_at = ?4
         WHERE id = ?1",
        rusqlite::params![habit_id, current, longest, time::now_rfc3339()],
    )?;

    rewards::apply_completion_reward(conn, &habit.user_id)?;

    Ok(CompletionOutcome {
        log_id,
        habit_id: habit_id.to_string(),
        created: true,
        current_streak: current,
        longest_streak: longest,
        total_completions: habit.total_completions + 1,
        xp_earned: rewards::XP_PER_COMPLETION,
    })
}

/// Manual check-in entry point used by the CLI.
pub fn check_in(
    store: &Store,
    habit_id: &str,
    note: Option<&str>,
    now: DateTime<Local>,
) -> Result<CompletionOutcome, error::HabitError> {
    let db_path = db::habit_db_path(store);
    pool::global_pool().with_write(&db_path, |conn| {
        record_completion(conn, habit_id, CompletionOrigin::Manual, note, now)
    })
}

fn print_habit_line(conn: &Connection, habit: &Habit, today: NaiveDate) {
    use colored::Colorize;
    let done_today = last_completed_day_is(conn, &habit.id, today);
    let days = completed_days(conn, &habit.id).unwrap_or_default();
    let at_risk = streak::streak_at_risk(&days, today);
    let marker = if done_today {
        "✓".green().to_string()
    } else if at_risk {
        "!".yellow().to_string()
    } else {
        "·".dimmed().to_string()
    };
    let status = if habit.is_active { "" } else { " (archived)" };
    println!(
        "{} {}  {}{}  streak {} (best {}), {} total",
        marker,
        habit.id.dimmed(),
        habit.name.bold(),
        status,
        habit.current_streak,
        habit.longest_streak,
        habit.total_completions
    );
}

fn last_completed_day_is(conn: &Connection, habit_id: &str, today: NaiveDate) -> bool {
    let day = today.format("%Y-%m-%d").to_string();
    conn.query_row(
        "SELECT 1 FROM habit_logs WHERE habit_id = ?1 AND completed_day = ?2 LIMIT 1",
        rusqlite::params![habit_id, day],
        |_| Ok(()),
    )
    .optional()
    .map(|r| r.is_some())
    .unwrap_or(false)
}

pub fn handle_habit_cli(store: &Store, cli: &HabitCli) -> Result<(), error::HabitError> {
    let db_path = db::habit_db_path(store);
    match &cli.command {
        HabitCommand::Add {
            user,
            name,
            description,
            category,
            frequency,
            track_event,
        } => {
            let habit = create_habit(
                store,
                user,
                name,
                description,
                *category,
                *frequency,
                *track_event,
            )?;
            emit(cli.format, "habit.add", serde_json::json!({ "habit": habit }), || {
                println!("Created habit {} ({})", habit.name, habit.id)
            });
            Ok(())
        }
        HabitCommand::List {
            user,
            include_archived,
        } => {
            let today = Local::now().date_naive();
            pool::global_pool().with_read(&db_path, |conn| {
                let owner = crate::plugins::user::resolve_user(conn, user)?;
                let habits = list_habits(conn, &owner.id, *include_archived)?;
                match cli.format {
                    OutputFormat::Json => {
                        let envelope = time::command_envelope(
                            "habit.list",
                            "ok",
                            serde_json::json!({ "habits": habits, "count": habits.len() }),
                        );
                        println!(
                            "{}",
                            serde_json::to_string_pretty(&envelope).unwrap_or_default()
                        );
                    }
                    OutputFormat::Text => {
                        for habit in &habits {
                            print_habit_line(conn, habit, today);
                        }
                    }
                }
                Ok(())
            })
        }
        HabitCommand::Get { id } => {
            let (habit, last) = pool::global_pool().with_read(&db_path, |conn| {
                Ok((get_habit(conn, id)?, last_completed_at(conn, id)?))
            })?;
            emit(
                cli.format,
                "habit.get",
                serde_json::json!({ "habit": habit, "last_completed_at": last }),
                || {
                    println!("{:#?}", habit);
                    println!("last completed: {}", last.as_deref().unwrap_or("never"));
                },
            );
            Ok(())
        }
        HabitCommand::Edit {
            id,
            name,
            description,
            category,
            frequency,
            track_event,
            no_auto_track,
        } => {
            let habit = edit_habit(
                store,
                id,
                name.as_deref(),
                description.as_deref(),
                *category,
                *frequency,
                *track_event,
                *no_auto_track,
            )?;
            emit(cli.format, "habit.edit", serde_json::json!({ "habit": habit }), || {
                println!("Updated habit {}", habit.id)
            });
            Ok(())
        }
        HabitCommand::Archive { id } => {
            let habit = archive_habit(store, id)?;
            emit(cli.format, "habit.archive", serde_json::json!({ "habit": habit }), || {
                println!("Archived habit {}", habit.id)
            });
            Ok(())
        }
        HabitCommand::Restore { id } => {
            let habit = restore_habit(store, id)?;
            emit(cli.format, "habit.restore", serde_json::json!({ "habit": habit }), || {
                println!("Restored habit {}", habit.id)
            });
            Ok(())
        }
        HabitCommand::Checkin { id, note } => {
            let outcome = check_in(store, id, note.as_deref(), Local::now())?;
            emit(
                cli.format,
                "habit.checkin",
                serde_json::json!({ "completion": outcome }),
                || {
                    println!(
                        "Checked in {} (+{} xp, streak {})",
                        outcome.habit_id, outcome.xp_earned, outcome.current_streak
                    )
                },
            );
            Ok(())
        }
        HabitCommand::Logs { id } => {
            let logs = pool::global_pool().with_read(&db_path, |conn| list_logs(conn, id))?;
            match cli.format {
                OutputFormat::Json => {
                    let envelope = time::command_envelope(
                        "habit.logs",
                        "ok",
                        serde_json::json!({ "logs": logs, "count": logs.len() }),
                    );
                    println!(
                        "{}",
                        serde_json::to_string_pretty(&envelope).unwrap_or_default()
                    );
                }
                OutputFormat::Text => {
                    for log in &logs {
                        println!(
                            "{}  {}  [{}] {}",
                            log.completed_day,
                            log.id,
                            log.origin,
                            log.note.as_deref().unwrap_or("")
                        );
                    }
                }
            }
            Ok(())
        }
    }
}

fn emit<F: FnOnce()>(format: OutputFormat, cmd: &str, extra: serde_json::Value, text: F) {
    match format {
        OutputFormat::Json => {
            let envelope = time::command_envelope(cmd, "ok", extra);
            println!(
                "{}",
                serde_json::to_string_pretty(&envelope).unwrap_or_default()
            );
        }
        OutputFormat::Text => text(),
    }
}

pub fn schema() -> serde_json::Value {
    serde_json::json!({
        "name": "habit",
        "version": "0.1.0",
        "description": "Habit lifecycle, daily check-ins, and derived streak state",
        "commands": [
            { "name": "add", "description": "Create a habit" },
            { "name": "list", "description": "List a user's habits" },
            { "name": "get", "description": "Get a habit by id" },
            { "name": "edit", "description": "Edit a habit" },
            { "name": "archive", "description": "Archive a habit (soft delete)" },
            { "name": "restore", "description": "Restore an archived habit" },
            { "name": "checkin", "description": "Record a manual check-in" },
            { "name": "logs", "description": "List a habit's completion log" }
        ],
        "storage": ["devhabit.db"]
    })
}
