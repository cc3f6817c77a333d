//! Progress counters and observers.

use tracing::{debug, info};

/// Counters of one table's run. Only ever increase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncProgress {
    /// Source documents read.
    pub scanned: u64,
    /// Documents inserted into the target.
    pub inserted: u64,
    /// Target documents replaced with the source version.
    pub updated: u64,
    /// Target documents deleted.
    pub deleted: u64,
    /// Deletes not applied because confirmation was declined.
    pub skipped: u64,
    /// Set on the final report of a table.
    pub complete: bool,
}

impl SyncProgress {
    /// Total number of write operations applied.
    pub fn applied(&self) -> u64 {
        self.inserted + self.updated + self.deleted
    }

    /// Sums two sets of counters.
    pub fn merged(&self, other: &SyncProgress) -> SyncProgress {
        SyncProgress {
            scanned: self.scanned + other.scanned,
            inserted: self.inserted + other.inserted,
            updated: self.updated + other.updated,
            deleted: self.deleted + other.deleted,
            skipped: self.skipped + other.skipped,
            complete: self.complete && other.complete,
        }
    }
}

/// Receives progress after every flushed batch and once at table completion.
///
/// Called from the table's task; implementations must be cheap and must
/// not block.
pub trait ProgressObserver: Send + Sync {
    /// Reports the current counters of `table`.
    fn report(&self, table: &str, progress: &SyncProgress);
}

/// Discards progress.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl ProgressObserver for NoopObserver {
    fn report(&self, _table: &str, _progress: &SyncProgress) {}
}

/// Emits progress as tracing events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl ProgressObserver for TracingObserver {
    fn report(&self, table: &str, progress: &SyncProgress) {
        if progress.complete {
            info!(
                table = %table,
                scanned = progress.scanned,
                inserted = progress.inserted,
                updated = progress.updated,
                deleted = progress.deleted,
                skipped = progress.skipped,
                "table complete"
            );
        } else {
            debug!(
                table = %table,
                scanned = progress.scanned,
                applied = progress.applied(),
                "progress"
            );
        }
    }
}
