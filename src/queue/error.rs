//! Error types for queue store operations

use std::fmt;

/// Result type alias for queue store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur while talking to the queue store
#[derive(Debug)]
pub enum StoreError {
    /// Store connection failed
    ConnectionFailed(String),

    /// A single read or write failed
    QueryFailed(String),

    /// A multi-step transaction was aborted; none of its writes are visible
    TransactionAborted(String),

    /// Migration failed
    MigrationFailed(String),

    /// A write that must create a new entry found one already present
    DuplicateKey(String),

    /// The store has been closed
    Closed,

    /// I/O error (file access, etc.)
    IoError(std::io::Error),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::ConnectionFailed(msg) => {
                write!(f, "failed to connect to queue store: {}", msg)
            }
            StoreError::QueryFailed(msg) => write!(f, "queue store operation failed: {}", msg),
            StoreError::TransactionAborted(msg) => {
                write!(f, "queue store transaction aborted: {}", msg)
            }
            StoreError::MigrationFailed(msg) => write!(f, "queue store migration failed: {}", msg),
            StoreError::DuplicateKey(key) => write!(f, "queue store key already exists: {}", key),
            StoreError::Closed => write!(f, "queue store is closed"),
            StoreError::IoError(err) => write!(f, "I/O error: {}", err),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::IoError(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::IoError(err)
    }
}

#[cfg(feature = "storage-sqlite")]
impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(io_err) => StoreError::IoError(io_err),
            sqlx::Error::PoolClosed => StoreError::Closed,
            _ => StoreError::QueryFailed(err.to_string()),
        }
    }
}

#[cfg(feature = "storage-sqlite")]
impl From<sqlx::migrate::MigrateError> for StoreError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        StoreError::MigrationFailed(err.to_string())
    }
}
