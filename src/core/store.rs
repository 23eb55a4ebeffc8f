//! Store handle for the devhabit state directory.
//!
//! A Store is the logical container for the consolidated database and the
//! optional `config.toml`. Resolution order: explicit `--data-dir`, then
//! the `DEVHABIT_HOME` environment variable, then `~/.devhabit`.

use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Store {
    /// Absolute path to the store root directory.
    pub root: PathBuf,
}

impl Store {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn resolve(data_dir: Option<PathBuf>) -> Self {
        if let Some(dir) = data_dir {
            return Self { root: dir };
        }
        if let Ok(home) = std::env::var("DEVHABIT_HOME") {
            if !home.is_empty() {
                return Self {
                    root: PathBuf::from(home),
                };
            }
        }
        let base = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        Self {
            root: base.join(".devhabit"),
        }
    }
}
