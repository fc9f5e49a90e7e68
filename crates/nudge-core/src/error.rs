use thiserror::Error;

use crate::recurrence::ParseRuleError;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Database error")]
    Database(#[from] sqlx::Error),

    #[error("Migration error")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("IO error")]
    Io(#[from] std::io::Error),

    #[error("Task not found: {0}")]
    NotFound(i64),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    InvalidRule(#[from] ParseRuleError),

    #[error("Invalid stored timestamp: {0}")]
    InvalidTimestamp(String),
}
