//! CLI command implementations.

pub mod clone;
pub mod sync;

use async_trait::async_trait;
use clap::Args;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use thinker_driver::{DirectoryDriver, Driver, DriverResult};
use thinker_sync::{
    ConfirmationProvider, NoopObserver, ProgressObserver, RunReport, SyncConfig, SyncProgress,
    TableOutcome, DEFAULT_BATCH_SIZE, DEFAULT_WORKERS,
};
use tracing::warn;

/// Arguments shared by `clone` and `sync`.
#[derive(Args, Debug)]
pub struct ReplicationArgs {
    /// Source host data directory
    #[arg(long, visible_alias = "sh")]
    pub source_host: PathBuf,

    /// Target host data directory
    #[arg(long, visible_alias = "th")]
    pub target_host: PathBuf,

    /// Source database
    #[arg(long, visible_alias = "sd")]
    pub source_db: String,

    /// Target database
    #[arg(long, visible_alias = "td")]
    pub target_db: String,

    /// Comma-separated tables to process (default: all)
    #[arg(long, visible_alias = "pt", value_delimiter = ',')]
    pub tables: Vec<String>,

    /// Do not print progress lines
    #[arg(long)]
    pub no_progress: bool,

    /// Documents per page and per write batch
    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
    pub batch_size: usize,

    /// Tables processed concurrently
    #[arg(long, default_value_t = DEFAULT_WORKERS)]
    pub workers: usize,

    /// Delete extra target documents without asking
    #[arg(short, long)]
    pub yes: bool,
}

impl ReplicationArgs {
    /// Builds the run configuration.
    pub fn config(&self) -> SyncConfig {
        let config = SyncConfig::new(&self.source_db, &self.target_db)
            .with_batch_size(self.batch_size)
            .with_workers(self.workers)
            .with_assume_yes(self.yes);
        if self.tables.is_empty() {
            config
        } else {
            config.with_tables(self.tables.iter().map(|t| t.trim().to_string()))
        }
    }

    /// The progress observer selected by `--no-progress`.
    pub fn observer(&self) -> Arc<dyn ProgressObserver> {
        if self.no_progress {
            Arc::new(NoopObserver)
        } else {
            Arc::new(StderrProgress)
        }
    }
}

/// Opens the source and target hosts.
///
/// Both names resolving to the same directory share one driver, so a
/// same-server copy sees its own writes.
pub async fn open_hosts(
    source: &Path,
    target: &Path,
) -> DriverResult<(Arc<dyn Driver>, Arc<dyn Driver>)> {
    let source_driver: Arc<dyn Driver> = Arc::new(DirectoryDriver::open(source).await?);
    if same_host(source, target) {
        return Ok((source_driver.clone(), source_driver));
    }
    let target_driver: Arc<dyn Driver> = Arc::new(DirectoryDriver::open(target).await?);
    Ok((source_driver, target_driver))
}

fn same_host(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

/// Cancels the run on Ctrl-C.
pub fn cancel_on_interrupt(cancel: impl FnOnce() + Send + 'static) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, closing cursors");
            cancel();
        }
    });
}

/// Asks on the terminal.
#[derive(Debug, Default)]
pub struct StdinConfirmation;

#[async_trait]
impl ConfirmationProvider for StdinConfirmation {
    async fn confirm(&self, description: &str) -> bool {
        let prompt = description.to_string();
        tokio::task::spawn_blocking(move || {
            let mut stderr = io::stderr();
            // A prompt that cannot be shown is a refusal.
            if write!(stderr, "{prompt} [y/N] ").and_then(|_| stderr.flush()).is_err() {
                return false;
            }
            let mut line = String::new();
            match io::stdin().lock().read_line(&mut line) {
                Ok(_) => parse_answer(&line),
                Err(_) => false,
            }
        })
        .await
        .unwrap_or(false)
    }
}

fn parse_answer(line: &str) -> bool {
    matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

/// Prints one progress line per report to stderr.
#[derive(Debug, Default)]
pub struct StderrProgress;

impl ProgressObserver for StderrProgress {
    fn report(&self, table: &str, progress: &SyncProgress) {
        eprintln!("{}", progress_line(table, progress));
    }
}

fn progress_line(table: &str, progress: &SyncProgress) -> String {
    let state = if progress.complete { "done" } else { "..." };
    format!(
        "{table}: scanned {}, inserted {}, updated {}, deleted {} {state}",
        progress.scanned, progress.inserted, progress.updated, progress.deleted
    )
}

/// Prints the per-table summary.
pub fn print_summary(report: &RunReport) {
    println!();
    for table in &report.tables {
        println!("{}", summary_line(table));
        for anomaly in &table.anomalies {
            println!("    ! {anomaly}");
        }
    }
    println!();
    let totals = report.totals();
    if report.succeeded() {
        println!(
            "✓ {} tables, {} documents scanned, {} written",
            report.tables.len(),
            totals.scanned,
            totals.applied()
        );
    } else {
        println!(
            "✗ {} of {} tables failed",
            report.failures().count(),
            report.tables.len()
        );
    }
}

fn summary_line(table: &thinker_sync::TableReport) -> String {
    let p = &table.progress;
    match &table.outcome {
        TableOutcome::Cloned => format!("✓ {}: cloned {} documents", table.table, p.inserted),
        TableOutcome::Synced => {
            let mut line = format!(
                "✓ {}: inserted {}, updated {}, deleted {}",
                table.table, p.inserted, p.updated, p.deleted
            );
            if p.skipped > 0 {
                line.push_str(&format!(" ({} deletes skipped)", p.skipped));
            }
            line
        }
        TableOutcome::Skipped(reason) => format!("- {}: skipped, {reason}", table.table),
        TableOutcome::Failed(err) => format!("✗ {}: {err}", table.table),
    }
}

/// Zero if every table succeeded.
pub fn exit_code(report: &RunReport) -> ExitCode {
    if report.succeeded() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
