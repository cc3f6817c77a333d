//! Incremental sync of whole databases.

use crate::config::SyncConfig;
use crate::confirm::{AssumeNo, ConfirmationProvider, DeleteGate};
use crate::diff::{DiffOperation, MergeDiff};
use crate::error::{Phase, SyncError, SyncResult};
use crate::progress::{NoopObserver, ProgressObserver, SyncProgress};
use crate::reader::OrderedBatchReader;
use crate::report::{Anomaly, RunReport, TableOutcome, TableReport};
use crate::retry::with_retry;
use crate::schema;
use crate::stream::OrderedStream;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use thinker_driver::{ConflictPolicy, Driver, WriteBatch, WriteSummary};
use thinker_value::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Operations waiting to be written, bounded by the batch size.
#[derive(Debug, Default)]
struct PendingWrites {
    inserts: Vec<Value>,
    updates: Vec<Value>,
    deletes: Vec<Value>,
}

impl PendingWrites {
    fn push(&mut self, op: DiffOperation) {
        match op {
            DiffOperation::Insert(document) => self.inserts.push(document),
            DiffOperation::Update(_, document) => self.updates.push(document),
            DiffOperation::Delete(key) => self.deletes.push(key),
        }
    }

    fn len(&self) -> usize {
        self.inserts.len() + self.updates.len() + self.deletes.len()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Brings target tables in line with their source tables.
///
/// For every selected table the orchestrator prepares the target schema,
/// diffs both tables over their primary key with a [`MergeDiff`], and
/// applies the resulting operations in bounded batches. Tables run
/// concurrently up to [`SyncConfig::workers`]; within a table everything is
/// sequential. A failing table never stops its siblings.
///
/// Deletes need confirmation: unless [`SyncConfig::assume_yes`] is set the
/// [`ConfirmationProvider`] is asked once per run, and a declined answer
/// keeps every extra target document.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use thinker_driver::{InMemoryDriver, TableDescriptor};
/// use thinker_sync::{SyncConfig, SyncOrchestrator};
/// use thinker_value::Value;
///
/// # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
/// let source = Arc::new(InMemoryDriver::new());
/// source.insert_table("app", TableDescriptor::new("users", "id"), vec![
///     Value::object([("id", 1)]),
/// ]);
/// let target = Arc::new(InMemoryDriver::new());
///
/// let report = SyncOrchestrator::new(source, target.clone(), SyncConfig::new("app", "copy"))
///     .run()
///     .await
///     .unwrap();
/// assert!(report.succeeded());
/// assert_eq!(target.documents("copy", "users").unwrap().len(), 1);
/// # });
/// ```
pub struct SyncOrchestrator {
    pub(crate) source: Arc<dyn Driver>,
    pub(crate) target: Arc<dyn Driver>,
    pub(crate) config: SyncConfig,
    pub(crate) confirmation: Arc<dyn ConfirmationProvider>,
    pub(crate) observer: Arc<dyn ProgressObserver>,
    pub(crate) cancel: CancellationToken,
}

impl SyncOrchestrator {
    /// Creates an orchestrator that declines deletes and reports no progress.
    pub fn new(source: Arc<dyn Driver>, target: Arc<dyn Driver>, config: SyncConfig) -> Self {
        Self {
            source,
            target,
            config,
            confirmation: Arc::new(AssumeNo),
            observer: Arc::new(NoopObserver),
            cancel: CancellationToken::new(),
        }
    }

    /// Sets the provider asked before the first delete.
    pub fn with_confirmation(mut self, confirmation: Arc<dyn ConfirmationProvider>) -> Self {
        self.confirmation = confirmation;
        self
    }

    /// Sets the progress observer.
    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Sets the token that aborts the run.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Returns the run's configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Returns a handle that aborts the run when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Syncs every selected table.
    ///
    /// Returns once every table has finished and closed its cursors.
    ///
    /// # Errors
    ///
    /// Fails only for problems affecting the whole run: an invalid
    /// configuration, or the source tables or target databases not being
    /// listable. Table failures are reported in the [`RunReport`].
    pub async fn run(&self) -> SyncResult<RunReport> {
        self.config.validate()?;
        let (tables, mut reports) = self.select().await?;
        schema::ensure_database(
            self.target.as_ref(),
            &self.config.target_db,
            &self.config.retry,
            &self.cancel,
        )
        .await?;

        let gate = self.delete_gate();
        info!(
            source = %self.config.source_db,
            target = %self.config.target_db,
            tables = tables.len(),
            "starting sync"
        );
        let synced: Vec<TableReport> = stream::iter(tables)
            .map(|table| self.sync_with_gate(table, &gate))
            .buffer_unordered(self.config.workers)
            .collect()
            .await;
        reports.extend(synced);
        Ok(RunReport::new(reports))
    }

    /// Syncs one table, asking for delete confirmation on its own.
    pub async fn sync_table(&self, table: &str) -> TableReport {
        let gate = self.delete_gate();
        self.sync_with_gate(table.to_string(), &gate).await
    }

    pub(crate) fn delete_gate(&self) -> DeleteGate {
        DeleteGate::new(self.confirmation.clone(), self.config.assume_yes)
    }

    /// Resolves the selected tables, turning unknown ones into failed reports.
    pub(crate) async fn select(&self) -> SyncResult<(Vec<String>, Vec<TableReport>)> {
        let selection = schema::select_tables(
            self.source.as_ref(),
            &self.config.source_db,
            self.config.tables.as_deref(),
            &self.config.retry,
            &self.cancel,
        )
        .await?;
        let missing = selection
            .missing
            .into_iter()
            .map(|table| {
                warn!(table = %table, "table not found in source database");
                let error = SyncError::TableNotFound {
                    table: table.clone(),
                };
                TableReport::new(table, TableOutcome::Failed(error))
            })
            .collect();
        Ok((selection.found, missing))
    }

    pub(crate) async fn sync_with_gate(&self, table: String, gate: &DeleteGate) -> TableReport {
        let mut progress = SyncProgress::default();
        let mut anomalies = Vec::new();
        let result = self
            .diff_and_apply(&table, gate, &mut progress, &mut anomalies)
            .await;

        progress.complete = true;
        self.observer.report(&table, &progress);

        let outcome = match result {
            Ok(()) => {
                info!(
                    table = %table,
                    scanned = progress.scanned,
                    inserted = progress.inserted,
                    updated = progress.updated,
                    deleted = progress.deleted,
                    anomalies = anomalies.len(),
                    "table synced"
                );
                TableOutcome::Synced
            }
            Err(err) => {
                error!(table = %table, error = %err, "table sync failed");
                TableOutcome::Failed(err)
            }
        };
        TableReport {
            table,
            outcome,
            progress,
            anomalies,
        }
    }

    async fn diff_and_apply(
        &self,
        table: &str,
        gate: &DeleteGate,
        progress: &mut SyncProgress,
        anomalies: &mut Vec<Anomaly>,
    ) -> SyncResult<()> {
        let retry = &self.config.retry;
        let descriptor = schema::describe(
            self.source.as_ref(),
            &self.config.source_db,
            table,
            retry,
            &self.cancel,
        )
        .await?;
        schema::prepare_target(
            self.target.as_ref(),
            &self.config.target_db,
            &descriptor,
            retry,
            &self.cancel,
        )
        .await?;

        let pk = descriptor.primary_key.as_str();
        let source = self.reader(self.source.clone(), &self.config.source_db, table, pk);
        let target = self.reader(self.target.clone(), &self.config.target_db, table, pk);
        let mut diff = MergeDiff::new(table, source, target);

        let result = self.apply(table, &mut diff, gate, progress).await;

        let (mut source, mut target, diff_anomalies) = diff.into_parts();
        source.close().await;
        target.close().await;
        anomalies.extend_from_slice(source.anomalies());
        anomalies.extend_from_slice(target.anomalies());
        anomalies.extend(diff_anomalies);
        let flushed = self.flush_target(table).await;
        result.and(flushed)
    }

    async fn apply<S: OrderedStream, T: OrderedStream>(
        &self,
        table: &str,
        diff: &mut MergeDiff<S, T>,
        gate: &DeleteGate,
        progress: &mut SyncProgress,
    ) -> SyncResult<()> {
        let mut pending = PendingWrites::default();
        while let Some(op) = diff.next_op().await? {
            pending.push(op);
            if pending.len() >= self.config.batch_size {
                progress.scanned = diff.scanned();
                self.flush(table, &mut pending, gate, progress).await?;
                self.observer.report(table, progress);
            }
        }

        progress.scanned = diff.scanned();
        if !pending.is_empty() {
            self.flush(table, &mut pending, gate, progress).await?;
            self.observer.report(table, progress);
        }
        Ok(())
    }

    async fn flush(
        &self,
        table: &str,
        pending: &mut PendingWrites,
        gate: &DeleteGate,
        progress: &mut SyncProgress,
    ) -> SyncResult<()> {
        if !pending.inserts.is_empty() {
            // Overwrite on conflict so a retried batch converges.
            let batch = WriteBatch::Insert {
                documents: std::mem::take(&mut pending.inserts),
                conflict: ConflictPolicy::Replace,
            };
            self.write(table, &batch).await?;
            progress.inserted += batch.len() as u64;
        }

        if !pending.updates.is_empty() {
            let batch = WriteBatch::Replace {
                documents: std::mem::take(&mut pending.updates),
            };
            self.write(table, &batch).await?;
            progress.updated += batch.len() as u64;
        }

        if !pending.deletes.is_empty() {
            let keys = std::mem::take(&mut pending.deletes);
            let description = format!(
                "Delete documents of `{}` that are missing from `{}` (first table `{}`)?",
                self.config.target_db, self.config.source_db, table
            );
            if gate.allows_deletes(&description).await {
                let batch = WriteBatch::Delete { keys };
                let summary = self.write(table, &batch).await?;
                // Keys already gone from the target are not counted.
                progress.deleted += summary.deleted;
            } else {
                debug!(table = %table, count = keys.len(), "skipping declined deletes");
                progress.skipped += keys.len() as u64;
            }
        }
        Ok(())
    }

    pub(crate) async fn write(&self, table: &str, batch: &WriteBatch) -> SyncResult<WriteSummary> {
        let target = self.target.as_ref();
        let db = self.config.target_db.as_str();
        let summary = with_retry(&self.config.retry, &self.cancel, table, Phase::Write, || {
            target.write(db, table, batch)
        })
        .await?;
        debug!(
            table = %table,
            kind = batch.kind(),
            len = batch.len(),
            inserted = summary.inserted,
            replaced = summary.replaced,
            deleted = summary.deleted,
            "flushed batch"
        );
        Ok(summary)
    }

    /// Makes the table's writes durable on the target.
    ///
    /// Runs after the table's cursors are closed, whether or not the table
    /// succeeded, so partial progress is kept. Not retried, and not skipped
    /// on cancellation.
    pub(crate) async fn flush_target(&self, table: &str) -> SyncResult<()> {
        self.target
            .flush_table(&self.config.target_db, table)
            .await
            .map_err(|source| SyncError::from_driver(table, Phase::Write, source))
    }

    pub(crate) fn reader(
        &self,
        driver: Arc<dyn Driver>,
        db: &str,
        table: &str,
        index: &str,
    ) -> OrderedBatchReader {
        OrderedBatchReader::new(driver, db, table, index)
            .with_batch_size(self.config.batch_size)
            .with_retry(self.config.retry.clone())
            .with_cancellation(self.cancel.clone())
    }
}

impl std::fmt::Debug for SyncOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncOrchestrator")
            .field("config", &self.config)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}
