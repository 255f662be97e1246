// ================================================================
// File: wainbox-common/src/error.rs
// ================================================================

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// A required field is missing or carries a value the store would reject.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The `external_id` already exists. Expected when a payload is re-ingested.
    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    /// The message store cannot be reached. Fatal to an ingestion run.
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Database error: {0}")]
    Database(sqlx::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Address parse error: {0}")]
    AddrParse(#[from] std::net::AddrParseError),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl Error {
    /// Only an unreachable store stops a run; everything else is per-item.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::StoreUnavailable(_))
    }
}

/// Postgres SQLSTATE for `unique_violation`.
const UNIQUE_VIOLATION: &str = "23505";

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                Error::StoreUnavailable(err.to_string())
            }
            sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some(UNIQUE_VIOLATION) => {
                Error::DuplicateKey(db_err.message().to_string())
            }
            _ => Error::Database(err),
        }
    }
}
