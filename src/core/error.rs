use rusqlite;
use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HabitError {
    #[error("SQLite error: {0}")]
    RusqliteError(#[from] rusqlite::Error),
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Already completed today: habit {0}")]
    AlreadyCompletedToday(String),
    #[error("External service error: {0}")]
    ExternalServiceError(String),
    #[error("Internal error: {0}")]
    InternalError(String),
}
