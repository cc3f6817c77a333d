//! Error types for driver operations.

use std::io;
use thinker_value::ValueError;
use thiserror::Error;

/// Result type for driver operations.
pub type DriverResult<T> = Result<T, DriverError>;

/// Errors a driver call can fail with.
#[derive(Debug, Error)]
pub enum DriverError {
    /// Network or transport failure.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the call can be retried.
        retryable: bool,
    },

    /// The database does not exist.
    #[error("database `{0}` does not exist")]
    DatabaseNotFound(String),

    /// The table does not exist.
    #[error("table `{0}` does not exist")]
    TableNotFound(String),

    /// The table already exists.
    #[error("table `{0}` already exists")]
    TableExists(String),

    /// The index does not exist on the table.
    #[error("index `{index}` does not exist on table `{table}`")]
    IndexNotFound {
        /// Table name.
        table: String,
        /// Index name.
        index: String,
    },

    /// The cursor is not open (never opened, exhausted and closed, or lost).
    #[error("cursor {0} is not open")]
    CursorNotFound(u64),

    /// A written document has no primary key.
    #[error("document is missing primary key `{0}`")]
    MissingPrimaryKey(String),

    /// An insert hit an existing primary key under the `Error` conflict policy.
    #[error("duplicate primary key {0}")]
    DuplicateKey(String),

    /// A written value is not a valid document.
    #[error("invalid document: {0}")]
    InvalidDocument(String),

    /// A value could not be converted.
    #[error("value error: {0}")]
    Value(#[from] ValueError),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Stored data could not be parsed.
    #[error("malformed data: {0}")]
    Json(#[from] serde_json::Error),
}

impl DriverError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if this error is transient and the call can be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            DriverError::Transport { retryable, .. } => *retryable,
            DriverError::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::Interrupted
                    | io::ErrorKind::TimedOut
                    | io::ErrorKind::WouldBlock
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
            ),
            _ => false,
        }
    }
}
