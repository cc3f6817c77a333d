//! Schema and bulk copy of tables into a target database.

use crate::config::{ExistingTables, SyncConfig};
use crate::confirm::{ConfirmationProvider, DeleteGate};
use crate::error::{Phase, SyncResult};
use crate::orchestrator::SyncOrchestrator;
use crate::progress::{ProgressObserver, SyncProgress};
use crate::reader::OrderedBatchReader;
use crate::report::{Anomaly, RunReport, TableOutcome, TableReport};
use crate::retry::with_retry;
use crate::schema;
use crate::stream::OrderedStream;
use futures::stream::{self, StreamExt};
use std::collections::BTreeSet;
use std::sync::Arc;
use thinker_driver::{ConflictPolicy, Driver, WriteBatch};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Copies tables that are missing from the target.
///
/// Each missing table is created with the source's primary key and
/// secondary indexes, then filled page by page in primary key order with
/// insert-or-replace writes, so a re-run after a failure converges. Tables
/// already on the target are skipped or synced depending on
/// [`SyncConfig::existing_tables`].
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use thinker_driver::{InMemoryDriver, TableDescriptor};
/// use thinker_sync::{ClonePipeline, SyncConfig};
/// use thinker_value::Value;
///
/// # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
/// let source = Arc::new(InMemoryDriver::new());
/// source.insert_table("app", TableDescriptor::new("users", "id").with_index("email"), vec![
///     Value::object([("id", 1)]),
///     Value::object([("id", 2)]),
/// ]);
/// let target = Arc::new(InMemoryDriver::new());
///
/// let report = ClonePipeline::new(source, target.clone(), SyncConfig::new("app", "backup"))
///     .run()
///     .await
///     .unwrap();
/// assert!(report.succeeded());
/// assert_eq!(target.documents("backup", "users").unwrap().len(), 2);
/// # });
/// ```
#[derive(Debug)]
pub struct ClonePipeline {
    sync: SyncOrchestrator,
}

impl ClonePipeline {
    /// Creates a pipeline that declines deletes and reports no progress.
    pub fn new(source: Arc<dyn Driver>, target: Arc<dyn Driver>, config: SyncConfig) -> Self {
        Self {
            sync: SyncOrchestrator::new(source, target, config),
        }
    }

    /// Sets the provider asked before deletes in synced existing tables.
    pub fn with_confirmation(mut self, confirmation: Arc<dyn ConfirmationProvider>) -> Self {
        self.sync = self.sync.with_confirmation(confirmation);
        self
    }

    /// Sets the progress observer.
    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.sync = self.sync.with_observer(observer);
        self
    }

    /// Sets the token that aborts the run.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.sync = self.sync.with_cancellation(cancel);
        self
    }

    /// Returns a handle that aborts the run when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.sync.cancellation_token()
    }

    /// Clones every selected table.
    ///
    /// # Errors
    ///
    /// Fails only for problems affecting the whole run; see
    /// [`SyncOrchestrator::run`].
    pub async fn run(&self) -> SyncResult<RunReport> {
        let sync = &self.sync;
        sync.config.validate()?;
        let (tables, mut reports) = sync.select().await?;
        schema::ensure_database(
            sync.target.as_ref(),
            &sync.config.target_db,
            &sync.config.retry,
            &sync.cancel,
        )
        .await?;

        let target_db = sync.config.target_db.as_str();
        let target = sync.target.as_ref();
        let existing: BTreeSet<String> = with_retry(
            &sync.config.retry,
            &sync.cancel,
            "",
            Phase::Schema,
            || target.list_tables(target_db),
        )
        .await?
        .into_iter()
        .collect();

        let gate = sync.delete_gate();
        info!(
            source = %sync.config.source_db,
            target = %target_db,
            tables = tables.len(),
            "starting clone"
        );
        let cloned: Vec<TableReport> = stream::iter(tables)
            .map(|table| {
                let exists = existing.contains(&table);
                self.clone_or_skip(table, exists, &gate)
            })
            .buffer_unordered(sync.config.workers)
            .collect()
            .await;
        reports.extend(cloned);
        Ok(RunReport::new(reports))
    }

    async fn clone_or_skip(&self, table: String, exists: bool, gate: &DeleteGate) -> TableReport {
        if !exists {
            return self.clone_table(table).await;
        }
        match self.sync.config.existing_tables {
            ExistingTables::Sync => self.sync.sync_with_gate(table, gate).await,
            ExistingTables::Skip => {
                info!(table = %table, "table exists on target, skipping");
                TableReport::new(
                    table,
                    TableOutcome::Skipped("already exists on target".into()),
                )
            }
        }
    }

    async fn clone_table(&self, table: String) -> TableReport {
        let mut progress = SyncProgress::default();
        let mut anomalies = Vec::new();
        let result = self.copy(&table, &mut progress, &mut anomalies).await;

        progress.complete = true;
        self.sync.observer.report(&table, &progress);

        let outcome = match result {
            Ok(()) => {
                info!(table = %table, documents = progress.inserted, "table cloned");
                TableOutcome::Cloned
            }
            Err(err) => {
                error!(table = %table, error = %err, "table clone failed");
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

    async fn copy(
        &self,
        table: &str,
        progress: &mut SyncProgress,
        anomalies: &mut Vec<Anomaly>,
    ) -> SyncResult<()> {
        let sync = &self.sync;
        let descriptor = schema::describe(
            sync.source.as_ref(),
            &sync.config.source_db,
            table,
            &sync.config.retry,
            &sync.cancel,
        )
        .await?;
        schema::create_table_like(
            sync.target.as_ref(),
            &sync.config.target_db,
            &descriptor,
            &sync.config.retry,
            &sync.cancel,
        )
        .await?;

        let mut reader = sync.reader(
            sync.source.clone(),
            &sync.config.source_db,
            table,
            &descriptor.primary_key,
        );
        let result = self.copy_pages(table, &mut reader, progress).await;
        reader.close().await;
        anomalies.extend_from_slice(reader.anomalies());
        let flushed = sync.flush_target(table).await;
        result.and(flushed)
    }

    async fn copy_pages(
        &self,
        table: &str,
        reader: &mut OrderedBatchReader,
        progress: &mut SyncProgress,
    ) -> SyncResult<()> {
        loop {
            let entries = reader.next_batch().await?;
            if entries.is_empty() {
                return Ok(());
            }
            let count = entries.len() as u64;
            let batch = WriteBatch::Insert {
                documents: entries.into_iter().map(|entry| entry.document).collect(),
                conflict: ConflictPolicy::Replace,
            };
            self.sync.write(table, &batch).await?;
            progress.scanned += count;
            progress.inserted += count;
            self.sync.observer.report(table, progress);
        }
    }
}
