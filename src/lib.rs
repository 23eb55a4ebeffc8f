//! devhabit: a local-first developer habit tracker.
//!
//! Habits live in a consolidated SQLite store under `~/.devhabit` (or
//! `DEVHABIT_HOME`, or `--data-dir`). Check-ins earn XP, streaks are
//! recomputed from the full completion history, and habits configured for
//! auto-tracking complete themselves from GitHub webhook deliveries —
//! idempotently, so redeliveries never double-count.
//!
//! # Examples
//!
//! ```bash
//! # Create a user and a habit
//! devhabit user add alice
//! devhabit habit add --user alice "Write code daily" --track-event commit
//!
//! # Manual check-in
//! devhabit habit checkin --id hab_...
//!
//! # Link GitHub and ingest a webhook delivery
//! devhabit github connect --user alice --code <oauth-code>
//! devhabit github webhook --event push --payload delivery.json
//! ```
//!
//! # Crate Structure
//!
//! - [`core`]: storage, config, streak/reward math, GitHub API seam
//! - [`plugins`]: command groups (user, habit, github)

pub mod core;
pub mod plugins;

use core::{config, db, error, store::Store};
use plugins::{github, habit, user};

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(
    name = "devhabit",
    version = env!("CARGO_PKG_VERSION"),
    about = "Local-first developer habit tracker: streaks, XP, and idempotent auto-completion from GitHub activity."
)]
struct Cli {
    /// Store directory (defaults to DEVHABIT_HOME, then ~/.devhabit).
    #[clap(long, global = true, value_name = "DIR")]
    data_dir: Option<PathBuf>,
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the store directory and database
    #[clap(name = "init")]
    Init,

    /// Manage user accounts
    #[clap(name = "user", visible_alias = "u")]
    User(user::UserCli),

    /// Manage habits and check-ins
    #[clap(name = "habit", visible_alias = "h")]
    Habit(habit::HabitCli),

    /// GitHub connection, sync, and event ingestion
    #[clap(name = "github", visible_alias = "gh")]
    Github(github::GitHubCli),

    /// Print command-group schemas for discovery
    #[clap(name = "schema")]
    Schema {
        /// Optional: filter by command group name
        #[clap(long)]
        group: Option<String>,
    },

    /// Show version information
    #[clap(name = "version")]
    Version,
}

pub fn run() -> Result<(), error::HabitError> {
    let cli = Cli::parse();
    let store = Store::resolve(cli.data_dir.clone());

    match cli.command {
        Command::Version => {
            println!("v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Command::Init => {
            db::initialize_store(&store)?;
            println!("Initialized devhabit store at {}", store.root.display());
            Ok(())
        }
        Command::Schema { group } => {
            let mut schemas = std::collections::BTreeMap::new();
            schemas.insert("user", user::schema());
            schemas.insert("habit", habit::schema());
            schemas.insert("github", github::schema());

            let output = if let Some(name) = group {
                schemas
                    .get(name.as_str())
                    .cloned()
                    .unwrap_or(serde_json::json!({ "error": "command group not found" }))
            } else {
                serde_json::json!({
                    "schema_version": "1.0.0",
                    "groups": schemas
                })
            };
            println!(
                "{}",
                serde_json::to_string_pretty(&output).unwrap_or_default()
            );
            Ok(())
        }
        Command::User(user_cli) => {
            db::initialize_store(&store)?;
            user::handle_user_cli(&store, &user_cli)
        }
        Command::Habit(habit_cli) => {
            db::initialize_store(&store)?;
            habit::handle_habit_cli(&store, &habit_cli)
        }
        Command::Github(github_cli) => {
            db::initialize_store(&store)?;
            let app_config = config::load(&store);
            github::handle_github_cli(&store, &app_config.github, &github_cli)
        }
    }
}
