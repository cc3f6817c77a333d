//! Configuration for clone and sync runs.

use crate::error::{SyncError, SyncResult};
use std::time::Duration;

/// Default number of documents per fetched page and per write batch.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Default number of tables processed concurrently.
pub const DEFAULT_WORKERS: usize = 4;

/// What a clone does with tables that already exist on the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExistingTables {
    /// Leave them alone and report them as skipped.
    #[default]
    Skip,
    /// Bring them up to date with an incremental sync.
    Sync,
}

/// Configuration for a clone or sync run.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Database read from.
    pub source_db: String,
    /// Database written to.
    pub target_db: String,
    /// Tables to process. `None` selects every source table.
    pub tables: Option<Vec<String>>,
    /// Page size for reads and maximum size of a write batch.
    pub batch_size: usize,
    /// Number of tables processed concurrently.
    pub workers: usize,
    /// Clone behaviour for tables already on the target.
    pub existing_tables: ExistingTables,
    /// Deletes are pre-authorised; the confirmation provider is not asked.
    pub assume_yes: bool,
    /// Retry configuration for transient driver failures.
    pub retry: RetryConfig,
}

impl SyncConfig {
    /// Creates a configuration copying `source_db` into `target_db`.
    pub fn new(source_db: impl Into<String>, target_db: impl Into<String>) -> Self {
        Self {
            source_db: source_db.into(),
            target_db: target_db.into(),
            tables: None,
            batch_size: DEFAULT_BATCH_SIZE,
            workers: DEFAULT_WORKERS,
            existing_tables: ExistingTables::Skip,
            assume_yes: false,
            retry: RetryConfig::default(),
        }
    }

    /// Restricts the run to the given tables.
    pub fn with_tables<I, S>(mut self, tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tables = Some(tables.into_iter().map(Into::into).collect());
        self
    }

    /// Sets the batch size.
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    /// Sets the number of concurrent tables.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Sets the clone behaviour for existing tables.
    pub fn with_existing_tables(mut self, existing: ExistingTables) -> Self {
        self.existing_tables = existing;
        self
    }

    /// Pre-authorises deletes.
    pub fn with_assume_yes(mut self, assume_yes: bool) -> Self {
        self.assume_yes = assume_yes;
        self
    }

    /// Sets the retry configuration.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Checks the configuration for values a run cannot work with.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidConfig`] for a zero batch size, zero
    /// workers, zero retry attempts or an empty database name.
    pub fn validate(&self) -> SyncResult<()> {
        if self.source_db.is_empty() || self.target_db.is_empty() {
            return Err(SyncError::InvalidConfig(
                "database names must not be empty".into(),
            ));
        }
        if self.batch_size == 0 {
            return Err(SyncError::InvalidConfig(
                "batch size must be at least 1".into(),
            ));
        }
        if self.workers == 0 {
            return Err(SyncError::InvalidConfig("workers must be at least 1".into()));
        }
        if self.retry.max_attempts == 0 {
            return Err(SyncError::InvalidConfig(
                "retry attempts must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, the first one included.
    pub max_attempts: u32,
    /// Initial delay between retries.
    pub initial_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,
    /// Whether to add jitter to delays.
    pub add_jitter: bool,
}

impl RetryConfig {
    /// Creates a new retry configuration.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            add_jitter: true,
        }
    }

    /// Creates a configuration with no retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
            add_jitter: false,
        }
    }

    /// Retries immediately, without waiting between attempts.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Self::no_retry()
        }
    }

    /// Sets the initial delay.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the maximum delay.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the backoff multiplier.
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Enables or disables jitter.
    pub fn with_jitter(mut self, add_jitter: bool) -> Self {
        self.add_jitter = add_jitter;
        self
    }

    /// Calculates the delay before a given attempt (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let base_delay = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);

        let delay_secs = base_delay.min(self.max_delay.as_secs_f64());

        if self.add_jitter {
            // Up to 25% on top of the base delay
            let jitter = delay_secs * 0.25 * rand_jitter();
            Duration::from_secs_f64(delay_secs + jitter)
        } else {
            Duration::from_secs_f64(delay_secs)
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(3)
    }
}

/// Pseudo-random factor in `[0, 1)` derived from the clock.
fn rand_jitter() -> f64 {
    use std::time::SystemTime;
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();
    f64::from(nanos % 1000) / 1000.0
}
