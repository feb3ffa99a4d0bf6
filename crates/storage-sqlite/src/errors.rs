//! Storage error types.

use thiserror::Error;

/// Errors raised by the SQLite layer before they are folded into the core
/// error type.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database connection failed: {0}")]
    ConnectionFailed(#[from] diesel::ConnectionError),

    #[error("Connection pool error: {0}")]
    PoolFailed(#[from] diesel::r2d2::PoolError),

    #[error("Query failed: {0}")]
    QueryFailed(#[from] diesel::result::Error),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<StorageError> for tokenboard_core::Error {
    fn from(err: StorageError) -> Self {
        tokenboard_core::Error::Settings(err.to_string())
    }
}
