//! Errors raised while opening SQLite connections.

use thiserror::Error;

/// SQLite driver errors.
#[derive(Debug, Error)]
pub enum SqliteError {
    /// The database could not be opened or prepared.
    #[error("failed to open sqlite database {path}: {source}")]
    Open {
        /// Database path as configured.
        path: String,
        /// Underlying rusqlite error.
        #[source]
        source: rusqlite::Error,
    },

    /// The worker thread owning the connection could not be started or has exited.
    #[error("sqlite worker unavailable: {0}")]
    WorkerGone(String),

    /// Any other rusqlite failure.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result alias for the SQLite driver.
pub type Result<T> = std::result::Result<T, SqliteError>;
