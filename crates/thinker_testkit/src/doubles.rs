//! Test doubles for the confirmation and progress hooks.

use async_trait::async_trait;
use parking_lot::Mutex;
use thinker_sync::{ConfirmationProvider, ProgressObserver, SyncProgress};

/// Records every progress report.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    reports: Mutex<Vec<(String, SyncProgress)>>,
}

impl RecordingObserver {
    /// Creates an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// All reports, in arrival order.
    pub fn reports(&self) -> Vec<(String, SyncProgress)> {
        self.reports.lock().clone()
    }

    /// Reports of one table, in arrival order.
    pub fn reports_for(&self, table: &str) -> Vec<SyncProgress> {
        self.reports
            .lock()
            .iter()
            .filter(|(t, _)| t == table)
            .map(|(_, p)| *p)
            .collect()
    }

    /// The completion report of a table, if it arrived.
    pub fn final_report(&self, table: &str) -> Option<SyncProgress> {
        self.reports_for(table).into_iter().find(|p| p.complete)
    }
}

impl ProgressObserver for RecordingObserver {
    fn report(&self, table: &str, progress: &SyncProgress) {
        self.reports.lock().push((table.to_string(), *progress));
    }
}

/// Answers confirmations with a fixed value and records the questions.
#[derive(Debug)]
pub struct ScriptedConfirmation {
    answer: bool,
    asked: Mutex<Vec<String>>,
}

impl ScriptedConfirmation {
    /// Always answers `answer`.
    pub fn new(answer: bool) -> Self {
        Self {
            answer,
            asked: Mutex::new(Vec::new()),
        }
    }

    /// Questions asked so far.
    pub fn asked(&self) -> Vec<String> {
        self.asked.lock().clone()
    }
}

#[async_trait]
impl ConfirmationProvider for ScriptedConfirmation {
    async fn confirm(&self, description: &str) -> bool {
        self.asked.lock().push(description.to_string());
        self.answer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_observer_filters_by_table() {
        let observer = RecordingObserver::new();
        observer.report("a", &SyncProgress::default());
        observer.report(
            "b",
            &SyncProgress {
                inserted: 1,
                complete: true,
                ..Default::default()
            },
        );

        assert_eq!(observer.reports().len(), 2);
        assert_eq!(observer.reports_for("a").len(), 1);
        assert_eq!(observer.final_report("b").unwrap().inserted, 1);
        assert!(observer.final_report("a").is_none());
    }

    #[tokio::test]
    async fn scripted_confirmation_records_questions() {
        let confirm = ScriptedConfirmation::new(false);
        assert!(!confirm.confirm("delete?").await);
        assert_eq!(confirm.asked(), vec!["delete?"]);
    }
}
