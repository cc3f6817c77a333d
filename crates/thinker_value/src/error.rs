//! Error types for the value crate.

use thiserror::Error;

/// Result type for value conversions.
pub type ValueResult<T> = Result<T, ValueError>;

/// Errors that can occur converting values to or from their raw JSON form.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValueError {
    /// A pseudo-type object lacks a required field.
    #[error("{reql_type} pseudo-type is missing field `{field}`")]
    MissingField {
        /// The pseudo-type tag.
        reql_type: String,
        /// Name of the missing field.
        field: &'static str,
    },

    /// A `TIME` pseudo-type could not be decoded.
    #[error("invalid time: {message}")]
    InvalidTime {
        /// Description of the problem.
        message: String,
    },

    /// A timezone string is not of the form `+HH:MM` / `-HH:MM`.
    #[error("invalid timezone `{0}`")]
    InvalidTimezone(String),

    /// A `BINARY` pseudo-type could not be decoded.
    #[error("invalid binary data: {message}")]
    InvalidBinary {
        /// Description of the problem.
        message: String,
    },

    /// Non-finite numbers cannot be written as JSON.
    #[error("number {0} is not finite")]
    NonFiniteNumber(f64),

    /// A JSON number does not fit a double.
    #[error("number {0} cannot be represented")]
    UnrepresentableNumber(String),
}

impl ValueError {
    /// Create an invalid time error.
    pub fn invalid_time(message: impl Into<String>) -> Self {
        Self::InvalidTime {
            message: message.into(),
        }
    }

    /// Create an invalid binary error.
    pub fn invalid_binary(message: impl Into<String>) -> Self {
        Self::InvalidBinary {
            message: message.into(),
        }
    }
}
