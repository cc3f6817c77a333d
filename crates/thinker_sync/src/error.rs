//! Error types for clone and sync runs.

use std::fmt;
use thinker_driver::DriverError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Stage of a table's run in which an error occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Reading or preparing table metadata.
    Schema,
    /// Fetching pages from an ordered stream.
    Read,
    /// Comparing keys of the two streams.
    Compare,
    /// Applying write batches to the target.
    Write,
}

impl Phase {
    /// Lowercase phase name.
    pub fn name(self) -> &'static str {
        match self {
            Phase::Schema => "schema",
            Phase::Read => "read",
            Phase::Compare => "compare",
            Phase::Write => "write",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Errors that can occur during clone and sync runs.
///
/// Everything except [`SyncError::InvalidConfig`] and run-level
/// [`SyncError::Driver`] failures belongs to one table and fails only that
/// table.
#[derive(Error, Debug)]
pub enum SyncError {
    /// A driver call failed with a permanent error.
    #[error("table `{table}` ({phase}): {source}")]
    Driver {
        /// Table name; empty for run-level calls.
        table: String,
        /// Phase of the failed call.
        phase: Phase,
        /// Driver error.
        #[source]
        source: DriverError,
    },

    /// A transient failure kept recurring until the attempt budget ran out.
    #[error("table `{table}` ({phase}): gave up after {attempts} attempts: {source}")]
    RetriesExhausted {
        /// Table name.
        table: String,
        /// Phase of the failed call.
        phase: Phase,
        /// Attempts made.
        attempts: u32,
        /// Last driver error.
        #[source]
        source: DriverError,
    },

    /// A requested table does not exist in the source database.
    #[error("table `{table}` does not exist in the source database")]
    TableNotFound {
        /// Table name.
        table: String,
    },

    /// Source and target tables use different primary keys.
    #[error(
        "table `{table}`: primary key mismatch (source `{source_key}`, target `{target_key}`)"
    )]
    PrimaryKeyMismatch {
        /// Table name.
        table: String,
        /// Source primary key.
        source_key: String,
        /// Target primary key.
        target_key: String,
    },

    /// The ordering index of a stream does not exist.
    #[error("table `{table}`: ordering index `{index}` does not exist")]
    MissingIndex {
        /// Table name.
        table: String,
        /// Index name.
        index: String,
    },

    /// A streamed document lacks the field it is ordered by.
    #[error("table `{table}`: document is missing ordering field `{field}`")]
    MissingKey {
        /// Table name.
        table: String,
        /// Field name.
        field: String,
    },

    /// A stream returned a key that does not sort after its predecessor.
    #[error("table `{table}`: key {key} does not sort after {previous}")]
    OutOfOrder {
        /// Table name.
        table: String,
        /// Previously received key.
        previous: String,
        /// Offending key.
        key: String,
    },

    /// The run was cancelled.
    #[error("table `{table}` ({phase}): cancelled")]
    Cancelled {
        /// Table name.
        table: String,
        /// Phase the table was in.
        phase: Phase,
    },

    /// The configuration cannot be used.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl SyncError {
    /// Wraps a permanent driver failure, mapping missing tables and indexes
    /// to their schema errors.
    pub fn from_driver(table: &str, phase: Phase, source: DriverError) -> Self {
        match source {
            DriverError::TableNotFound(_) if phase == Phase::Schema => Self::TableNotFound {
                table: table.to_string(),
            },
            DriverError::IndexNotFound { index, .. } => Self::MissingIndex {
                table: table.to_string(),
                index,
            },
            source => Self::Driver {
                table: table.to_string(),
                phase,
                source,
            },
        }
    }

    /// Returns the table the error belongs to.
    pub fn table(&self) -> Option<&str> {
        match self {
            SyncError::Driver { table, .. }
            | SyncError::RetriesExhausted { table, .. }
            | SyncError::TableNotFound { table }
            | SyncError::PrimaryKeyMismatch { table, .. }
            | SyncError::MissingIndex { table, .. }
            | SyncError::MissingKey { table, .. }
            | SyncError::OutOfOrder { table, .. }
            | SyncError::Cancelled { table, .. } => {
                (!table.is_empty()).then_some(table.as_str())
            }
            SyncError::InvalidConfig(_) => None,
        }
    }

    /// Returns the phase the error occurred in.
    pub fn phase(&self) -> Option<Phase> {
        match self {
            SyncError::Driver { phase, .. }
            | SyncError::RetriesExhausted { phase, .. }
            | SyncError::Cancelled { phase, .. } => Some(*phase),
            SyncError::TableNotFound { .. }
            | SyncError::PrimaryKeyMismatch { .. }
            | SyncError::MissingIndex { .. } => Some(Phase::Schema),
            SyncError::MissingKey { .. } | SyncError::OutOfOrder { .. } => Some(Phase::Read),
            SyncError::InvalidConfig(_) => None,
        }
    }

    /// Returns true if this error can be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Driver { source, .. } => source.is_retryable(),
            _ => false,
        }
    }

    /// Returns true if the run was cancelled.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, SyncError::Cancelled { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors() {
        let transient =
            SyncError::from_driver("users", Phase::Read, DriverError::transport_retryable("reset"));
        assert!(transient.is_retryable());

        let exhausted = SyncError::RetriesExhausted {
            table: "users".into(),
            phase: Phase::Read,
            attempts: 3,
            source: DriverError::transport_retryable("reset"),
        };
        assert!(!exhausted.is_retryable());
        assert!(!SyncError::InvalidConfig("x".into()).is_retryable());
    }

    #[test]
    fn errors_carry_table_and_phase() {
        let err = SyncError::PrimaryKeyMismatch {
            table: "users".into(),
            source_key: "id".into(),
            target_key: "uid".into(),
        };
        assert_eq!(err.table(), Some("users"));
        assert_eq!(err.phase(), Some(Phase::Schema));

        let err = SyncError::OutOfOrder {
            table: "posts".into(),
            previous: "2".into(),
            key: "1".into(),
        };
        assert_eq!(err.table(), Some("posts"));
        assert_eq!(err.phase(), Some(Phase::Read));

        let err = SyncError::InvalidConfig("bad".into());
        assert_eq!(err.table(), None);
        assert_eq!(err.phase(), None);
    }

    #[test]
    fn from_driver_maps_schema_errors() {
        let err = SyncError::from_driver(
            "users",
            Phase::Schema,
            DriverError::TableNotFound("users".into()),
        );
        assert!(matches!(err, SyncError::TableNotFound { .. }));

        let err = SyncError::from_driver(
            "users",
            Phase::Read,
            DriverError::IndexNotFound {
                table: "users".into(),
                index: "uid".into(),
            },
        );
        assert!(matches!(err, SyncError::MissingIndex { ref index, .. } if index == "uid"));
        assert_eq!(err.phase(), Some(Phase::Schema));
    }

    #[test]
    fn error_display() {
        let err = SyncError::Cancelled {
            table: "users".into(),
            phase: Phase::Write,
        };
        assert_eq!(err.to_string(), "table `users` (write): cancelled");
        assert_eq!(Phase::Compare.to_string(), "compare");
    }
}
