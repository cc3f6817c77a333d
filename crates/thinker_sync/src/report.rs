//! Per-table and per-run results.

use crate::error::{Phase, SyncError};
use crate::progress::SyncProgress;
use std::fmt;
use thinker_value::Value;

/// A pair of keys the comparator could not order.
///
/// Anomalies do not stop a table; they make its report non-clean.
#[derive(Debug, Clone, PartialEq)]
pub struct Anomaly {
    /// Where the pair was met: `Read` for consecutive keys of one stream,
    /// `Compare` for the heads of the two diffed streams.
    pub phase: Phase,
    /// The earlier (or source) key.
    pub first: Value,
    /// The later (or target) key.
    pub second: Value,
}

impl Anomaly {
    /// Creates an anomaly.
    pub fn new(phase: Phase, first: Value, second: Value) -> Self {
        Self {
            phase,
            first,
            second,
        }
    }
}

impl fmt::Display for Anomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: keys {} and {} are not comparable",
            self.phase, self.first, self.second
        )
    }
}

/// How a table's run ended.
#[derive(Debug)]
pub enum TableOutcome {
    /// Created on the target and copied.
    Cloned,
    /// Diffed and patched.
    Synced,
    /// Left untouched.
    Skipped(String),
    /// Stopped by an error.
    Failed(SyncError),
}

/// Result of one table.
#[derive(Debug)]
pub struct TableReport {
    /// Table name.
    pub table: String,
    /// How the run ended.
    pub outcome: TableOutcome,
    /// Counters at the end of the run.
    pub progress: SyncProgress,
    /// Ordering anomalies met along the way.
    pub anomalies: Vec<Anomaly>,
}

impl TableReport {
    /// Creates a report with empty counters.
    pub fn new(table: impl Into<String>, outcome: TableOutcome) -> Self {
        Self {
            table: table.into(),
            outcome,
            progress: SyncProgress::default(),
            anomalies: Vec::new(),
        }
    }

    /// Returns true unless the table failed.
    pub fn succeeded(&self) -> bool {
        !matches!(self.outcome, TableOutcome::Failed(_))
    }

    /// Returns true if the table succeeded with no anomalies and no
    /// skipped deletes.
    pub fn is_clean(&self) -> bool {
        self.succeeded() && self.anomalies.is_empty() && self.progress.skipped == 0
    }

    /// The error that stopped the table, if any.
    pub fn error(&self) -> Option<&SyncError> {
        match &self.outcome {
            TableOutcome::Failed(err) => Some(err),
            _ => None,
        }
    }
}

/// Result of a whole run, one report per selected table, sorted by name.
#[derive(Debug, Default)]
pub struct RunReport {
    /// Table reports.
    pub tables: Vec<TableReport>,
}

impl RunReport {
    /// Builds a report, sorting tables by name.
    pub fn new(mut tables: Vec<TableReport>) -> Self {
        tables.sort_by(|a, b| a.table.cmp(&b.table));
        Self { tables }
    }

    /// Returns true if no table failed.
    pub fn succeeded(&self) -> bool {
        self.tables.iter().all(TableReport::succeeded)
    }

    /// Returns true if every table is clean.
    pub fn is_clean(&self) -> bool {
        self.tables.iter().all(TableReport::is_clean)
    }

    /// Reports of failed tables.
    pub fn failures(&self) -> impl Iterator<Item = &TableReport> {
        self.tables.iter().filter(|t| !t.succeeded())
    }

    /// Looks up a table's report.
    pub fn table(&self, name: &str) -> Option<&TableReport> {
        self.tables.iter().find(|t| t.table == name)
    }

    /// Counters summed over all tables.
    pub fn totals(&self) -> SyncProgress {
        self.tables
            .iter()
            .fold(SyncProgress::default(), |acc, t| acc.merged(&t.progress))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_report_sorts_and_sums() {
        let mut users = TableReport::new("users", TableOutcome::Synced);
        users.progress.inserted = 2;
        users.progress.scanned = 5;
        let mut posts = TableReport::new("posts", TableOutcome::Cloned);
        posts.progress.inserted = 3;

        let report = RunReport::new(vec![users, posts]);
        assert_eq!(report.tables[0].table, "posts");
        assert_eq!(report.totals().inserted, 5);
        assert_eq!(report.totals().scanned, 5);
        assert!(report.succeeded());
        assert!(report.is_clean());
    }

    #[test]
    fn anomalies_and_failures_are_not_clean() {
        let mut users = TableReport::new("users", TableOutcome::Synced);
        users
            .anomalies
            .push(Anomaly::new(Phase::Compare, Value::from(f64::NAN), Value::from(1)));
        assert!(users.succeeded());
        assert!(!users.is_clean());

        let failed = TableReport::new(
            "posts",
            TableOutcome::Failed(SyncError::TableNotFound {
                table: "posts".into(),
            }),
        );
        assert!(failed.error().is_some());

        let report = RunReport::new(vec![users, failed]);
        assert!(!report.succeeded());
        assert_eq!(report.failures().count(), 1);
        assert!(report.table("posts").is_some());
    }
}
