//! Common error types for Kinstone

use thiserror::Error;

/// Common result type for Kinstone operations
pub type Result<T> = std::result::Result<T, Error>;

/// SQLite result codes that mean "another unit of work holds the lock".
///
/// SQLITE_BUSY (5), SQLITE_LOCKED (6), SQLITE_BUSY_RECOVERY (261),
/// SQLITE_LOCKED_SHAREDCACHE (262), SQLITE_BUSY_SNAPSHOT (517)
const SQLITE_CONTENTION_CODES: &[&str] = &["5", "6", "261", "262", "517"];

/// Common error types across the fusion service
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed or self-referential request
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Referenced user, entry, piece or reward does not exist (or is inactive)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Concurrency or ownership violation. No partial state was written.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Inventory is at capacity
    #[error("Capacity exceeded: {0}")]
    CapacityExceeded(String),

    /// Unexpected failure
    #[error("Internal error: {0}")]
    Internal(String),

    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Recoverable outcome classes reported to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidInput,
    NotFound,
    Conflict,
    CapacityExceeded,
    Internal,
}

impl Error {
    /// Collapse infrastructure failures into [`ErrorKind::Internal`]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidInput(_) => ErrorKind::InvalidInput,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::Conflict(_) => ErrorKind::Conflict,
            Error::CapacityExceeded(_) => ErrorKind::CapacityExceeded,
            Error::Internal(_) | Error::Database(_) | Error::Io(_) | Error::Config(_) => {
                ErrorKind::Internal
            }
        }
    }

    /// Whether the caller may safely retry the whole operation
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Conflict
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db_err) => {
                let contended = db_err
                    .code()
                    .map(|code| SQLITE_CONTENTION_CODES.contains(&code.as_ref()))
                    .unwrap_or(false);
                if contended {
                    return Error::Conflict(format!("store contention: {}", db_err.message()));
                }
                Error::Database(err)
            }
            sqlx::Error::PoolTimedOut => {
                Error::Conflict("timed out waiting for a database connection".to_string())
            }
            _ => Error::Database(err),
        }
    }
}
