//! Error types for the query pool.

use thiserror::Error;

use crate::driver::RequestId;

/// Boxed error returned by a failing query callback.
pub type CallbackError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Why a settled query produced no result set.
///
/// Delivered to the query's callback as the `Err` side of its outcome.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    /// The driver reported an error string for the connection.
    #[error("driver error: {message}")]
    Driver {
        /// Message returned by the driver's error query.
        message: String,
    },

    /// The driver placed the connection in its reject set.
    #[error("query rejected by driver{}", rejected_suffix(.message))]
    Rejected {
        /// Error string, if the driver had one.
        message: Option<String>,
    },

    /// The query settled but neither a result nor an error was available.
    #[error("query settled without a result")]
    NoResult,
}

fn rejected_suffix(message: &Option<String>) -> String {
    match message {
        Some(m) => format!(": {}", m),
        None => String::new(),
    }
}

/// Error variants for pool operations.
#[derive(Debug, Error)]
pub enum PoolError {
    /// A query callback failed; the pool state is consistent, the failure is the caller's.
    #[error("callback for request {request_id} failed: {source}")]
    Callback {
        /// Request whose callback failed.
        request_id: RequestId,
        /// Error returned by the callback.
        #[source]
        source: CallbackError,
    },

    /// Invalid configuration.
    #[error("invalid pool configuration: {reason}")]
    Config {
        /// What is wrong with the configuration.
        reason: String,
    },

    /// Configuration file could not be parsed.
    #[error("config parse error: {reason}")]
    Parse {
        /// Parser message.
        reason: String,
    },

    /// Wraps standard I/O errors.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for pool operations.
pub type Result<T> = std::result::Result<T, PoolError>;
