//! GitHub integration: event ingestion, idempotent auto-completion,
//! connection lifecycle, and repository sync.
//!
//! The ingestion pipeline runs classify → idempotency guard → connection &
//! habit matching → per-habit completion. Every stop along the way is an
//! explicit `WebhookOutcome`, converted to log-and-continue only at this
//! orchestration boundary; per-habit failures are isolated and never abort
//! siblings or the acknowledgment to the sender.

use crate::core::config::GitHubConfig;
use crate::core::db;
use crate::core::error;
use crate::core::github_api::{GitHubApi, HttpGitHubApi};
use crate::core::pool;
use crate::core::store::Store;
use crate::core::time;
use crate::plugins::habit::{self, CompletionOrigin, OutputFormat};
use chrono::{DateTime, Duration, Local, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::PathBuf;
use ulid::Ulid;

/// Canonical event kinds a habit can auto-track.
#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Commit,
    PullRequest,
    CodeReview,
    Issue,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Commit => "commit",
            EventKind::PullRequest => "pull_request",
            EventKind::CodeReview => "code_review",
            EventKind::Issue => "issue",
        }
    }
}

/// Map a raw webhook (kind, action) pair to a canonical event kind.
/// `None` means the delivery is ignored and short-circuits the pipeline.
pub fn classify(raw_kind: &str, action: Option<&str>) -> Option<EventKind> {
    match raw_kind.to_ascii_lowercase().as_str() {
        "push" => Some(EventKind::Commit),
        "pull_request" => match action {
            Some("opened") => Some(EventKind::PullRequest),
            _ => None,
        },
        "pull_request_review" => Some(EventKind::CodeReview),
        "issues" => match action {
            Some("opened") | Some("closed") => Some(EventKind::Issue),
            _ => None,
        },
        _ => None,
    }
}

// ---- Webhook payload (fields outside this set are ignored) ----

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookPayload {
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub repository: Option<RepositoryRef>,
    #[serde(default)]
    pub sender: Option<SenderRef>,
    #[serde(default)]
    pub head_commit: Option<HeadCommitRef>,
    #[serde(default)]
    pub pull_request: Option<PullRequestRef>,
    #[serde(default)]
    pub issue: Option<IssueRef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RepositoryRef {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub full_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SenderRef {
    pub id: i64,
    #[serde(default)]
    pub login: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HeadCommitRef {
    #[serde(default)]
    pub sha: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PullRequestRef {
    pub number: i64,
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IssueRef {
    pub number: i64,
    #[serde(default)]
    pub title: Option<String>,
}

/// Dedup key for a delivery, in priority order: head-commit SHA, then
/// `pr-{repo}-{number}`, then `issue-{repo}-{number}`. Deliveries with none
/// of those fields get a fresh ULID and are therefore never deduplicated —
/// accepted limitation for event shapes without stable identity.
pub fn derive_event_key(payload: &WebhookPayload) -> String {
    if let Some(sha) = payload.head_commit.as_ref().and_then(|c| c.sha.as_deref()) {
        return sha.to_string();
    }
    let repo_full_name = payload
        .repository
        .as_ref()
        .map(|r| r.full_name.as_str())
        .unwrap_or("");
    if let Some(pr) = &payload.pull_request {
        return format!("pr-{}-{}", repo_full_name, pr.number);
    }
    if let Some(issue) = &payload.issue {
        return format!("issue-{}-{}", repo_full_name, issue.number);
    }
    Ulid::new().to_string()
}

/// Atomically record (key, kind) as processed. Returns false if it was
/// already seen; the `inbound_events` primary key makes the check-then-insert
/// a single operation even across processes.
pub fn mark_event_seen(
    conn: &Connection,
    event_key: &str,
    kind: EventKind,
) -> Result<bool, error::HabitError> {
    let changed = conn.execute(
        "INSERT OR IGNORE INTO inbound_events(event_key, event_kind, processed_at)
         VALUES(?1, ?2, ?3)",
        rusqlite::params![event_key, kind.as_str(), time::now_rfc3339()],
    )?;
    Ok(changed > 0)
}

fn event_note(kind: EventKind, payload: &WebhookPayload) -> String {
    match kind {
        EventKind::Commit => {
            let message = payload
                .head_commit
                .as_ref()
                .and_then(|c| c.message.as_deref())
                .unwrap_or("Commit");
            format!("GitHub Commit: {}", message)
        }
        EventKind::PullRequest => {
            let title = payload
                .pull_request
                .as_ref()
                .and_then(|p| p.title.as_deref())
                .unwrap_or("PR");
            format!("GitHub PR: {}", title)
        }
        EventKind::CodeReview => "GitHub Code Review completed".to_string(),
        EventKind::Issue => {
            let title = payload
                .issue
                .as_ref()
                .and_then(|i| i.title.as_deref())
                .unwrap_or("Issue");
            format!("GitHub Issue: {}", title)
        }
    }
}

// ---- Connections ----

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct GitHubConnection {
    pub id: String,
    pub user_id: String,
    pub github_user_id: i64,
    pub github_login: String,
    pub github_email: Option<String>,
    pub avatar_url: Option<String>,
    #[serde(skip_serializing)]
    pub access_token: String,
    pub scope: String,
    pub is_active: bool,
    pub connected_at: String,
    pub last_synced_at: Option<String>,
}

const CONNECTION_COLUMNS: &str = "id, user_id, github_user_id, github_login, github_email, \
                                  avatar_url, access_token, scope, is_active, connected_at, \
                                  last_synced_at";

fn map_connection(row: &rusqlite::Row<'_>) -> Result<GitHubConnection, rusqlite::Error> {
    Ok(GitHubConnection {
        id: row.get("id")?,
        user_id: row.get("user_id")?,
        github_user_id: row.get("github_user_id")?,
        github_login: row.get("github_login")?,
        github_email: row.get("github_email")?,
        avatar_url: row.get("avatar_url")?,
        access_token: row.get("access_token")?,
        scope: row.get("scope")?,
        is_active: row.get::<_, i64>("is_active")? != 0,
        connected_at: row.get("connected_at")?,
        last_synced_at: row.get("last_synced_at")?,
    })
}

pub fn active_connection_for_user(
    conn: &Connection,
    user_id: &str,
) -> Result<Option<GitHubConnection>, error::HabitError> {
    conn.query_row(
        &format!(
            "SELECT {} FROM connections WHERE user_id = ?1 AND is_active = 1",
            CONNECTION_COLUMNS
        ),
        [user_id],
        map_connection,
    )
    .optional()
    .map_err(error::HabitError::RusqliteError)
}

fn active_connection_for_account(
    conn: &Connection,
    github_user_id: i64,
) -> Result<Option<GitHubConnection>, error::HabitError> {
    conn.query_row(
        &format!(
            "SELECT {} FROM connections WHERE github_user_id = ?1 AND is_active = 1",
            CONNECTION_COLUMNS
        ),
        [github_user_id],
        map_connection,
    )
    .optional()
    .map_err(error::HabitError::RusqliteError)
}

const CONNECTION_SCOPE: &str = "user:email,read:user,repo";

/// Exchange an OAuth code, link the GitHub account to the user, and kick off
/// a best-effort repository sync.
pub fn connect(
    store: &Store,
    api: &dyn GitHubApi,
    user_ident: &str,
    code: &str,
) -> Result<GitHubConnection, error::HabitError> {
    let token = api.exchange_code(code)?;
    let account = api.fetch_current_user(&token)?;

    let db_path = db::habit_db_path(store);
    let connection = pool::global_pool().with_write(&db_path, |conn| {
        let owner = crate::plugins::user::resolve_user(conn, user_ident)?;

        if let Some(existing) = active_connection_for_account(conn, account.id)? {
            if existing.user_id != owner.id {
                return Err(error::HabitError::ValidationError(format!(
                    "GitHub account {} is already connected to another user",
                    account.login
                )));
            }
        }

        let ts = time::now_rfc3339();
        conn.execute(
            "INSERT INTO connections(id, user_id, github_user_id, github_login, github_email,
                                     avatar_url, access_token, scope, is_active, connected_at,
                                     last_synced_at, updated_at)
             VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 1, ?9, NULL, ?9)
             ON CONFLICT(user_id) DO UPDATE SET
                 github_user_id = excluded.github_user_id,
                 github_login = excluded.github_login,
                 github_email = excluded.github_email,
                 avatar_url = excluded.avatar_url,
                 access_token = excluded.access_token,
                 scope = excluded.scope,
                 is_active = 1,
                 updated_at = excluded.updated_at",
            rusqlite::params![
                format!("con_{}", Ulid::new()),
                owner.id,
                account.id,
                account.login,
                account.email,
                account.avatar_url,
                token,
                CONNECTION_SCOPE,
                ts
            ],
        )?;
        active_connection_for_user(conn, &owner.id)?.ok_or_else(|| {
            error::HabitError::InternalError("connection upsert left no active row".to_string())
        })
    })?;

    // Repo sync is best-effort; a failed sync must not fail the connect.
    if let Err(e) = sync_repositories(store, api, &connection.user_id) {
        eprintln!("Warning: repository sync after connect failed: {}", e);
    }

    Ok(connection)
}

pub fn disconnect(store: &Store, user_ident: &str) -> Result<(), error::HabitError> {
    let db_path = db::habit_db_path(store);
    pool::global_pool().with_write(&db_path, |conn| {
        let owner = crate::plugins::user::resolve_user(conn, user_ident)?;
        let changed = conn.execute(
            "UPDATE connections SET is_active = 0, updated_at = ?2
             WHERE user_id = ?1 AND is_active = 1",
            rusqlite::params![owner.id, time::now_rfc3339()],
        )?;
        if changed == 0 {
            return Err(error::HabitError::NotFound(format!(
                "active GitHub connection for user {}",
                owner.id
            )));
        }
        Ok(())
    })
}

// ---- Repository sync ----

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct TrackedRepository {
    pub id: String,
    pub user_id: String,
    pub github_repo_id: i64,
    pub name: String,
    pub full_name: String,
    pub description: Option<String>,
    pub is_private: bool,
    pub is_tracked: bool,
    pub language: Option<String>,
    pub stargazers: i64,
}

#[derive(Serialize, Debug, Clone)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SyncOutcome {
    Synced { count: usize },
    Skipped { reason: String },
}

/// Pull the first (bounded) page of remote repositories and upsert local
/// projections. The locally-owned `is_tracked` flag is never overwritten.
/// Remote failures are logged and swallowed; sync never fails its caller
/// beyond a missing connection.
pub fn sync_repositories(
    store: &Store,
    api: &dyn GitHubApi,
    user_id: &str,
) -> Result<SyncOutcome, error::HabitError> {
    let db_path = db::habit_db_path(store);
    let connection = pool::global_pool()
        .with_read(&db_path, |conn| active_connection_for_user(conn, user_id))?
        .ok_or_else(|| {
            error::HabitError::NotFound(format!("active GitHub connection for user {}", user_id))
        })?;

    let repos = match api.list_repositories(&connection.access_token) {
        Ok(repos) => repos,
        Err(e) => {
            eprintln!("Warning: repository listing failed for {}: {}", user_id, e);
            return Ok(SyncOutcome::Skipped {
                reason: e.to_string(),
            });
        }
    };

    let count = repos.len();
    pool::global_pool().with_write(&db_path, |conn| {
        let ts = time::now_rfc3339();
        for repo in &repos {
            conn.execute(
                "INSERT INTO repositories(id, user_id, github_repo_id, name, full_name,
                                          description, is_private, is_tracked, language,
                                          stargazers, created_at, updated_at)
                 VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, 0, ?8, ?9, ?10, ?10)
                 ON CONFLICT(user_id, github_repo_id) DO UPDATE SET
                     name = excluded.name,
                     full_name = excluded.full_name,
                     description = excluded.description,
                     is_private = excluded.is_private,
                     language = excluded.language,
                     stargazers = excluded.stargazers,
                     updated_at = excluded.updated_at",
                rusqlite::params![
                    format!("repo_{}", Ulid::new()),
                    user_id,
                    repo.id,
                    repo.name,
                    repo.full_name,
                    repo.description,
                    repo.is_private as i64,
                    repo.language,
                    repo.stargazers_count,
                    ts
                ],
            )?;
        }
        conn.execute(
            "UPDATE connections SET last_synced_at = ?2, updated_at = ?2 WHERE user_id = ?1",
            rusqlite::params![user_id, ts],
        )?;
        Ok(())
    })?;

    Ok(SyncOutcome::Synced { count })
}

pub fn list_repositories(
    conn: &Connection,
    user_id: &str,
) -> Result<Vec<TrackedRepository>, error::HabitError> {
    let mut stmt = conn.prepare(
        "SELECT id, user_id, github_repo_id, name, full_name, description, is_private,
                is_tracked, language, stargazers
         FROM repositories WHERE user_id = ?1 ORDER BY full_name",
    )?;
    let rows = stmt.query_map([user_id], |row| {
        Ok(TrackedRepository {
            id: row.get(0)?,
            user_id: row.get(1)?,
            github_repo_id: row.get(2)?,
            name: row.get(3)?,
            full_name: row.get(4)?,
            description: row.get(5)?,
            is_private: row.get::<_, i64>(6)? != 0,
            is_tracked: row.get::<_, i64>(7)? != 0,
            language: row.get(8)?,
            stargazers: row.get(9)?,
        })
    })?;
    let mut repos = Vec::new();
    for row in rows {
        repos.push(row?);
    }
    Ok(repos)
}

pub fn toggle_repository_tracking(
    store: &Store,
    user_ident: &str,
    repo_id: &str,
) -> Result<bool, error::HabitError> {
    let db_path = db::habit_db_path(store);
    pool::global_pool().with_write(&db_path, |conn| {
        let owner = crate::plugins::user::resolve_user(conn, user_ident)?;
        let current: Option<(String, i64)> = conn
            .query_row(
                "SELECT user_id, is_tracked FROM repositories WHERE id = ?1",
                [repo_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        let Some((repo_user, tracked)) = current else {
            return Err(error::HabitError::NotFound(format!("repository {}", repo_id)));
        };
        if repo_user != owner.id {
            return Err(error::HabitError::ValidationError(
                "repository does not belong to user".to_string(),
            ));
        }
        let next = if tracked != 0 { 0 } else { 1 };
        conn.execute(
            "UPDATE repositories SET is_tracked = ?2, updated_at = ?3 WHERE id = ?1",
            rusqlite::params![repo_id, next, time::now_rfc3339()],
        )?;
        Ok(next != 0)
    })
}

// ---- Ingestion orchestrator ----

#[derive(Serialize, Debug, Clone)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum WebhookOutcome {
    /// Event kind/action pair is not tracked.
    Ignored,
    /// The sender has no linked account; not an error.
    NoConnection,
    /// Already processed under the same (key, kind).
    Duplicate { event_key: String },
    /// Linked user has no habit tracking this event kind.
    NoMatches,
    Processed {
        event_key: String,
        completed: Vec<habit::CompletionOutcome>,
        failed: usize,
    },
}

#[derive(Serialize, Debug, Clone)]
pub struct GitHubEventRecord {
    pub id: String,
    pub user_id: String,
    pub habit_id: String,
    pub habit_log_id: String,
    pub event_kind: String,
    pub event_key: String,
    pub repo_full_name: String,
    pub created_at: String,
}

/// Run one webhook delivery through the full ingestion pipeline.
///
/// The signature header is accepted for interface compatibility but NOT
/// verified; this must be closed before exposing the ingest path to
/// untrusted senders.
/// TODO: verify `signature` as HMAC-SHA256 of the raw body against
/// `github.webhook_secret` and reject mismatches.
pub fn process_webhook(
    store: &Store,
    raw_kind: &str,
    payload: &WebhookPayload,
    signature: Option<&str>,
) -> Result<WebhookOutcome, error::HabitError> {
    if signature.is_some() {
        eprintln!("Warning: webhook signature present but not verified");
    }

    let Some(kind) = classify(raw_kind, payload.action.as_deref()) else {
        return Ok(WebhookOutcome::Ignored);
    };

    let sender_id = payload
        .sender
        .as_ref()
        .map(|s| s.id)
        .ok_or_else(|| error::HabitError::ValidationError("payload has no sender".to_string()))?;

    let db_path = db::habit_db_path(store);
    pool::global_pool().with_write(&db_path, |conn| {
        let event_key = derive_event_key(payload);
        if !mark_event_seen(conn, &event_key, kind)? {
            return Ok(WebhookOutcome::Duplicate { event_key });
        }

        let Some(connection) = active_connection_for_account(conn, sender_id)? else {
            return Ok(WebhookOutcome::NoConnection);
        };

        let matched = matching_habits(conn, &connection.user_id, kind)?;
        if matched.is_empty() {
            return Ok(WebhookOutcome::NoMatches);
        }

        let note = event_note(kind, payload);
        let now = Local::now();
        let mut completed = Vec::new();
        let mut failed = 0usize;
        for habit_row in &matched {
            // Each habit is its own unit of work: the completion and its
            // event record commit together under one savepoint, and a
            // failure here must not abort or roll back siblings.
            let result: Result<habit::CompletionOutcome, error::HabitError> = (|| {
                let sp = conn.savepoint()?;
                let outcome = habit::record_completion_in(
                    &sp,
                    &habit_row.id,
                    CompletionOrigin::Auto,
                    Some(note.as_str()),
                    now,
                )?;
                insert_event_record(&sp, &connection.user_id, &outcome, kind, &event_key, payload)?;
                sp.commit()?;
                Ok(outcome)
            })();
            match result {
                Ok(outcome) => completed.push(outcome),
                Err(e) => {
                    failed += 1;
                    eprintln!(
                        "Warning: auto-completion failed for habit {}: {}",
                        habit_row.id, e
                    );
                }
            }
        }

        conn.execute(
            "UPDATE connections SET last_synced_at = ?2, updated_at = ?2 WHERE user_id = ?1",
            rusqlite::params![connection.user_id, time::now_rfc3339()],
        )?;

        Ok(WebhookOutcome::Processed {
            event_key,
            completed,
            failed,
        })
    })
}

/// Non-archived habits of `user_id` configured to auto-track `kind`.
fn matching_habits(
    conn: &Connection,
    user_id: &str,
    kind: EventKind,
) -> Result<Vec<habit::Habit>, error::HabitError> {
    let habits = habit::list_habits(conn, user_id, false)?;
    Ok(habits
        .into_iter()
        .filter(|h| h.auto_track && h.tracked_event.as_deref() == Some(kind.as_str()))
        .collect())
}

fn insert_event_record(
    conn: &Connection,
    user_id: &str,
    outcome: &habit::CompletionOutcome,
    kind: EventKind,
    event_key: &str,
    payload: &WebhookPayload,
) -> Result<(), error::HabitError> {
    let (repo_name, repo_full_name) = payload
        .repository
        .as_ref()
        .map(|r| (r.name.clone(), r.full_name.clone()))
        .unwrap_or_default();
    conn.execute(
        "INSERT INTO github_events(id, user_id, habit_id, habit_log_id, event_kind, event_key,
                                   repo_name, repo_full_name, commit_sha, commit_message,
                                   pr_number, pr_title, issue_number, issue_title, created_at)
         VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
        rusqlite::params![
            format!("evt_{}", Ulid::new()),
            user_id,
            outcome.habit_id,
            outcome.log_id,
            kind.as_str(),
            event_key,
            repo_name,
            repo_full_name,
            payload.head_commit.as_ref().and_then(|c| c.sha.clone()),
            payload.head_commit.as_ref().and_then(|c| c.message.clone()),
            payload.pull_request.as_ref().map(|p| p.number),
            payload.pull_request.as_ref().and_then(|p| p.title.clone()),
            payload.issue.as_ref().map(|i| i.number),
            payload.issue.as_ref().and_then(|i| i.title.clone()),
            time::now_rfc3339()
        ],
    )?;
    Ok(())
}

pub fn recent_events(
    conn: &Connection,
    user_id: &str,
    days: i64,
) -> Result<Vec<GitHubEventRecord>, error::HabitError> {
    let since = (Local::now() - Duration::days(days)).with_timezone(&Utc);
    let mut stmt = conn.prepare(
        "SELECT id, user_id, habit_id, habit_log_id, event_kind, event_key, repo_full_name,
                created_at
         FROM github_events WHERE user_id = ?1
         ORDER BY created_at DESC",
    )?;
    let rows = stmt.query_map(rusqlite::params![user_id], |row| {
        Ok(GitHubEventRecord {
            id: row.get(0)?,
            user_id: row.get(1)?,
            habit_id: row.get(2)?,
            habit_log_id: row.get(3)?,
            event_kind: row.get(4)?,
            event_key: row.get(5)?,
            repo_full_name: row.get(6)?,
            created_at: row.get(7)?,
        })
    })?;
    let mut events = Vec::new();
    for row in rows {
        let event = row?;
        // Stored offsets can differ (DST shifts, imported rows), so the
        // cutoff is applied to parsed timestamps, not string order.
        let keep = DateTime::parse_from_rfc3339(&event.created_at)
            .map(|ts| ts.with_timezone(&Utc) >= since)
            .unwrap_or(true);
        if keep {
            events.push(event);
        }
    }
    Ok(events)
}

// ---- CLI ----

#[derive(Parser, Debug)]
#[clap(name = "github", about = "GitHub connection, sync, and event ingestion.")]
pub struct GitHubCli {
    /// Output format for this command group.
    #[clap(long, global = true, value_enum, default_value = "text")]
    format: OutputFormat,
    #[clap(subcommand)]
    command: GitHubCommand,
}

#[derive(Subcommand, Debug)]
pub enum GitHubCommand {
    /// Link a GitHub account via an OAuth authorization code.
    Connect {
        #[clap(long)]
        user: String,
        #[clap(long)]
        code: String,
    },
    /// Unlink the user's GitHub account.
    Disconnect {
        #[clap(long)]
        user: String,
    },
    /// Show the user's connection status.
    Status {
        #[clap(long)]
        user: String,
    },
    /// Sync the user's repository list (best-effort).
    Sync {
        #[clap(long)]
        user: String,
    },
    /// List synced repositories.
    Repos {
        #[clap(long)]
        user: String,
    },
    /// Toggle tracking for a synced repository.
    Track {
        #[clap(long)]
        user: String,
        #[clap(long)]
        repo: String,
    },
    /// List recent auto-completion event records.
    Events {
        #[clap(long)]
        user: String,
        #[clap(long, default_value = "30")]
        days: i64,
    },
    /// Ingest a webhook delivery from a JSON payload file ('-' for stdin).
    Webhook {
        /// Raw event kind, e.g. push, pull_request, issues.
        #[clap(long)]
        event: String,
        #[clap(long, value_name = "FILE")]
        payload: PathBuf,
        /// Delivery signature header; accepted, not yet verified.
        #[clap(long)]
        signature: Option<String>,
    },
}

fn read_payload(path: &PathBuf) -> Result<WebhookPayload, error::HabitError> {
    let raw = if path.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .map_err(error::HabitError::IoError)?;
        buf
    } else {
        std::fs::read_to_string(path).map_err(error::HabitError::IoError)?
    };
    serde_json::from_str(&raw)
        .map_err(|e| error::HabitError::ValidationError(format!("malformed webhook payload: {}", e)))
}

fn emit(format: OutputFormat, cmd: &str, extra: serde_json::Value, text: String) {
    match format {
        OutputFormat::Json => {
            let envelope = time::command_envelope(cmd, "ok", extra);
            println!(
                "{}",
                serde_json::to_string_pretty(&envelope).unwrap_or_default()
            );
        }
        OutputFormat::Text => println!("{}", text),
    }
}

pub fn handle_github_cli(
    store: &Store,
    config: &GitHubConfig,
    cli: &GitHubCli,
) -> Result<(), error::HabitError> {
    let db_path = db::habit_db_path(store);
    match &cli.command {
        GitHubCommand::Connect { user, code } => {
            if config.client_id.is_empty() || config.client_secret.is_empty() {
                return Err(error::HabitError::ValidationError(
                    "github.client_id and github.client_secret must be configured".to_string(),
                ));
            }
            let api = HttpGitHubApi::new(config.clone());
            let connection = connect(store, &api, user, code)?;
            emit(
                cli.format,
                "github.connect",
                serde_json::json!({ "connection": connection }),
                format!(
                    "Connected GitHub account {} for user {}",
                    connection.github_login, connection.user_id
                ),
            );
            Ok(())
        }
        GitHubCommand::Disconnect { user } => {
            disconnect(store, user)?;
            emit(
                cli.format,
                "github.disconnect",
                serde_json::json!({}),
                format!("Disconnected GitHub account for {}", user),
            );
            Ok(())
        }
        GitHubCommand::Status { user } => {
            let connection = pool::global_pool().with_read(&db_path, |conn| {
                let owner = crate::plugins::user::resolve_user(conn, user)?;
                active_connection_for_user(conn, &owner.id)
            })?;
            match connection {
                Some(connection) => emit(
                    cli.format,
                    "github.status",
                    serde_json::json!({ "connection": connection }),
                    format!(
                        "Connected as {} (last sync: {})",
                        connection.github_login,
                        connection.last_synced_at.as_deref().unwrap_or("never")
                    ),
                ),
                None => emit(
                    cli.format,
                    "github.status",
                    serde_json::json!({ "connection": null }),
                    "No active GitHub connection".to_string(),
                ),
            }
            Ok(())
        }
        GitHubCommand::Sync { user } => {
            let user_id = pool::global_pool()
                .with_read(&db_path, |conn| crate::plugins::user::resolve_user(conn, user))?
                .id;
            let api = HttpGitHubApi::new(config.clone());
            let outcome = sync_repositories(store, &api, &user_id)?;
            emit(
                cli.format,
                "github.sync",
                serde_json::json!({ "sync": outcome }),
                match &outcome {
                    SyncOutcome::Synced { count } => format!("Synced {} repositories", count),
                    SyncOutcome::Skipped { reason } => format!("Sync skipped: {}", reason),
                },
            );
            Ok(())
        }
        GitHubCommand::Repos { user } => {
            let repos = pool::global_pool().with_read(&db_path, |conn| {
                let owner = crate::plugins::user::resolve_user(conn, user)?;
                list_repositories(conn, &owner.id)
            })?;
            match cli.format {
                OutputFormat::Json => {
                    let envelope = time::command_envelope(
                        "github.repos",
                        "ok",
                        serde_json::json!({ "repositories": repos, "count": repos.len() }),
                    );
                    println!(
                        "{}",
                        serde_json::to_string_pretty(&envelope).unwrap_or_default()
                    );
                }
                OutputFormat::Text => {
                    use colored::Colorize;
                    for repo in &repos {
                        let marker = if repo.is_tracked { "●".green().to_string() } else { "○".dimmed().to_string() };
                        println!("{} {}  {}", marker, repo.id.dimmed(), repo.full_name);
                    }
                }
            }
            Ok(())
        }
        GitHubCommand::Track { user, repo } => {
            let tracked = toggle_repository_tracking(store, user, repo)?;
            emit(
                cli.format,
                "github.track",
                serde_json::json!({ "repo": repo, "tracked": tracked }),
                format!(
                    "Repository {} is now {}",
                    repo,
                    if tracked { "tracked" } else { "untracked" }
                ),
            );
            Ok(())
        }
        GitHubCommand::Events { user, days } => {
            let events = pool::global_pool().with_read(&db_path, |conn| {
                let owner = crate::plugins::user::resolve_user(conn, user)?;
                recent_events(conn, &owner.id, *days)
            })?;
            match cli.format {
                OutputFormat::Json => {
                    let envelope = time::command_envelope(
                        "github.events",
                        "ok",
                        serde_json::json!({ "events": events, "count": events.len() }),
                    );
                    println!(
                        "{}",
                        serde_json::to_string_pretty(&envelope).unwrap_or_default()
                    );
                }
                OutputFormat::Text => {
                    for event in &events {
                        println!(
                            "{}  {}  {}  {}",
                            event.created_at, event.event_kind, event.repo_full_name, event.habit_id
                        );
                    }
                }
            }
            Ok(())
        }
        GitHubCommand::Webhook {
            event,
            payload,
            signature,
        } => {
            let payload = read_payload(payload)?;
            let outcome = process_webhook(store, event, &payload, signature.as_deref())?;
            let text = match &outcome {
                WebhookOutcome::Ignored => "Ignored: event kind not tracked".to_string(),
                WebhookOutcome::NoConnection => "Ignored: sender has no linked account".to_string(),
                WebhookOutcome::Duplicate { event_key } => {
                    format!("Duplicate delivery for {}", event_key)
                }
                WebhookOutcome::NoMatches => "No habits track this event kind".to_string(),
                WebhookOutcome::Processed {
                    completed, failed, ..
                } => format!("Completed {} habit(s), {} failed", completed.len(), failed),
            };
            emit(
                cli.format,
                "github.webhook",
                serde_json::json!({ "result": outcome }),
                text,
            );
            Ok(())
        }
    }
}

pub fn schema() -> serde_json::Value {
    serde_json::json!({
        "name": "github",
        "version": "0.1.0",
        "description": "GitHub connection lifecycle, repo sync, and idempotent event ingestion",
        "commands": [
            { "name": "connect", "description": "Link a GitHub account" },
            { "name": "disconnect", "description": "Unlink a GitHub account" },
            { "name": "status", "description": "Show connection status" },
            { "name": "sync", "description": "Sync repositories (best-effort)" },
            { "name": "repos", "description": "List synced repositories" },
            { "name": "track", "description": "Toggle repository tracking" },
            { "name": "events", "description": "List recent auto-completion events" },
            { "name": "webhook", "description": "Ingest a webhook delivery" }
        ],
        "storage": ["devhabit.db"]
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_push_is_commit_for_any_action() {
        assert_eq!(classify("push", None), Some(EventKind::Commit));
        assert_eq!(classify("push", Some("whatever")), Some(EventKind::Commit));
        assert_eq!(classify("PUSH", None), Some(EventKind::Commit));
    }

    #[test]
    fn test_classify_pull_request_only_on_opened() {
        assert_eq!(
            classify("pull_request", Some("opened")),
            Some(EventKind::PullRequest)
        );
        assert_eq!(classify("pull_request", Some("closed")), None);
        assert_eq!(classify("pull_request", None), None);
    }

    #[test]
    fn test_classify_review_for_any_action() {
        assert_eq!(
            classify("pull_request_review", Some("submitted")),
            Some(EventKind::CodeReview)
        );
        assert_eq!(classify("pull_request_review", None), Some(EventKind::CodeReview));
    }

    #[test]
    fn test_classify_issues_opened_or_closed_only() {
        assert_eq!(classify("issues", Some("opened")), Some(EventKind::Issue));
        assert_eq!(classify("issues", Some("closed")), Some(EventKind::Issue));
        assert_eq!(classify("issues", Some("reopened")), None);
    }

    #[test]
    fn test_classify_unknown_kind_is_ignored() {
        assert_eq!(classify("star", Some("created")), None);
        assert_eq!(classify("deployment", None), None);
    }

    #[test]
    fn test_event_key_prefers_head_commit_sha() {
        let payload = WebhookPayload {
            head_commit: Some(HeadCommitRef {
                sha: Some("abc123".to_string()),
                message: None,
            }),
            repository: Some(RepositoryRef {
                name: "repo".to_string(),
                full_name: "octo/repo".to_string(),
            }),
            pull_request: Some(PullRequestRef {
                number: 7,
                title: None,
            }),
            ..Default::default()
        };
        assert_eq!(derive_event_key(&payload), "abc123");
    }

    #[test]
    fn test_event_key_pr_then_issue() {
        let pr = WebhookPayload {
            repository: Some(RepositoryRef {
                name: "repo".to_string(),
                full_name: "octo/repo".to_string(),
            }),
            pull_request: Some(PullRequestRef {
                number: 7,
                title: None,
            }),
            ..Default::default()
        };
        assert_eq!(derive_event_key(&pr), "pr-octo/repo-7");

        let issue = WebhookPayload {
            repository: Some(RepositoryRef {
                name: "repo".to_string(),
                full_name: "octo/repo".to_string(),
            }),
            issue: Some(IssueRef {
                number: 42,
                title: None,
            }),
            ..Default::default()
        };
        assert_eq!(derive_event_key(&issue), "issue-octo/repo-42");
    }

    #[test]
    fn test_event_key_without_identity_is_unique_per_call() {
        let payload = WebhookPayload::default();
        // No SHA/PR/issue: such events can never be deduplicated.
        assert_ne!(derive_event_key(&payload), derive_event_key(&payload));
    }

    #[test]
    fn test_event_note_formats() {
        let payload = WebhookPayload {
            head_commit: Some(HeadCommitRef {
                sha: Some("abc".to_string()),
                message: Some("fix parser".to_string()),
            }),
            ..Default::default()
        };
        assert_eq!(
            event_note(EventKind::Commit, &payload),
            "GitHub Commit: fix parser"
        );
        assert_eq!(
            event_note(EventKind::CodeReview, &payload),
            "GitHub Code Review completed"
        );
    }
}
