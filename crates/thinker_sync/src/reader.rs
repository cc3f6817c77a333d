//! Paginated ordered reads with retry.

use crate::config::{RetryConfig, DEFAULT_BATCH_SIZE};
use crate::error::{Phase, SyncError, SyncResult};
use crate::report::Anomaly;
use crate::retry::Attempts;
use crate::stream::{Entry, OrderedStream};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Arc;
use thinker_driver::{CursorId, Driver, DriverResult, OrderedQuery, Page};
use thinker_value::{compare, Comparison, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Reads a table ascending by one index, one page at a time.
///
/// The reader opens its cursor lazily on the first [`OrderedStream::fill`].
/// At most one page is resident. When a fetch fails transiently the cursor
/// is dropped and reopened after the last received key that orders against
/// itself. Rows received since that key (indeterminate or opaque keys) are
/// dropped when the reopened cursor sends them again, so rows are never
/// replayed or skipped.
///
/// Every key is checked against its predecessor: a key that does not sort
/// strictly after it is fatal ([`SyncError::OutOfOrder`]); a pair the
/// comparator cannot order is recorded as an [`Anomaly`].
pub struct OrderedBatchReader {
    driver: Arc<dyn Driver>,
    db: String,
    table: String,
    index: String,
    batch_size: usize,
    retry: RetryConfig,
    cancel: CancellationToken,
    cursor: Option<CursorId>,
    page: VecDeque<Entry>,
    exhausted: bool,
    last_key: Option<Value>,
    resume_key: Option<Value>,
    since_resume: Vec<Value>,
    replays: Vec<Value>,
    fetched: u64,
    anomalies: Vec<Anomaly>,
}

impl OrderedBatchReader {
    /// Creates a reader over `db.table` ordered by `index`.
    pub fn new(
        driver: Arc<dyn Driver>,
        db: impl Into<String>,
        table: impl Into<String>,
        index: impl Into<String>,
    ) -> Self {
        Self {
            driver,
            db: db.into(),
            table: table.into(),
            index: index.into(),
            batch_size: DEFAULT_BATCH_SIZE,
            retry: RetryConfig::default(),
            cancel: CancellationToken::new(),
            cursor: None,
            page: VecDeque::new(),
            exhausted: false,
            last_key: None,
            resume_key: None,
            since_resume: Vec::new(),
            replays: Vec::new(),
            fetched: 0,
            anomalies: Vec::new(),
        }
    }

    /// Sets the page size.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Sets the retry configuration.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the token that aborts fetches and backoff waits.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Starts after `key` instead of at the beginning of the index.
    pub fn resume_after(mut self, key: Value) -> Self {
        self.last_key = Some(key.clone());
        self.resume_key = Some(key);
        self
    }

    /// Table name.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Number of rows received from the server so far.
    pub fn fetched(&self) -> u64 {
        self.fetched
    }

    /// Returns true if the server has no further rows.
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Fetches the next page and hands over everything resident.
    ///
    /// Returns an empty batch at the end of the stream.
    pub async fn next_batch(&mut self) -> SyncResult<Vec<Entry>> {
        self.fill().await?;
        Ok(self.page.drain(..).collect())
    }

    async fn load_page(&mut self) -> SyncResult<()> {
        let retry = self.retry.clone();
        let cancel = self.cancel.clone();
        let table = self.table.clone();
        let mut attempts = Attempts::new(&retry, &cancel, &table, Phase::Read);

        loop {
            attempts.check_cancelled()?;
            let outcome = tokio::select! {
                _ = cancel.cancelled() => None,
                result = self.fetch_once() => Some(result),
            };
            match outcome {
                None => return Err(attempts.cancelled()),
                Some(Ok(page)) => return self.accept(page).await,
                Some(Err(error)) => {
                    self.release_cursor().await;
                    self.replays.clone_from(&self.since_resume);
                    attempts.failed(error).await?;
                }
            }
        }
    }

    async fn fetch_once(&mut self) -> DriverResult<Page> {
        let cursor = match self.cursor {
            Some(cursor) => cursor,
            None => {
                let mut query = OrderedQuery::new(self.index.clone());
                if let Some(key) = &self.resume_key {
                    query = query.starting_after(key.clone());
                }
                let cursor = self.driver.open_cursor(&self.db, &self.table, &query).await?;
                debug!(
                    table = %self.table,
                    index = %self.index,
                    cursor = cursor.0,
                    "opened cursor"
                );
                self.cursor = Some(cursor);
                cursor
            }
        };
        self.driver.fetch_page(cursor, self.batch_size).await
    }

    async fn accept(&mut self, page: Page) -> SyncResult<()> {
        for document in page.documents {
            if let Some(i) = self.replays.iter().position(|seen| *seen == document) {
                self.replays.swap_remove(i);
                continue;
            }

            let key = document
                .get(&self.index)
                .cloned()
                .ok_or_else(|| SyncError::MissingKey {
                    table: self.table.clone(),
                    field: self.index.clone(),
                })?;

            if let Some(previous) = &self.last_key {
                match compare(previous, &key) {
                    Comparison::Less => {}
                    Comparison::Incomparable => {
                        warn!(
                            table = %self.table,
                            previous = %previous,
                            key = %key,
                            "stream keys are not comparable"
                        );
                        self.anomalies
                            .push(Anomaly::new(Phase::Read, previous.clone(), key.clone()));
                    }
                    Comparison::Equal | Comparison::Greater => {
                        return Err(SyncError::OutOfOrder {
                            table: self.table.clone(),
                            previous: previous.to_string(),
                            key: key.to_string(),
                        });
                    }
                }
            }

            // Only keys the server can position are safe to resume after.
            if compare(&key, &key) == Comparison::Equal {
                self.resume_key = Some(key.clone());
                self.since_resume.clear();
            } else {
                self.since_resume.push(document.clone());
            }
            self.last_key = Some(key.clone());
            self.fetched += 1;
            self.page.push_back(Entry::new(key, document));
        }

        if !page.has_more {
            self.exhausted = true;
            self.release_cursor().await;
        }
        Ok(())
    }

    async fn release_cursor(&mut self) {
        if let Some(cursor) = self.cursor.take() {
            if let Err(error) = self.driver.close_cursor(cursor).await {
                debug!(
                    table = %self.table,
                    cursor = cursor.0,
                    error = %error,
                    "closing cursor failed"
                );
            }
        }
    }
}

#[async_trait]
impl OrderedStream for OrderedBatchReader {
    async fn fill(&mut self) -> SyncResult<()> {
        while self.page.is_empty() && !self.exhausted {
            self.load_page().await?;
        }
        Ok(())
    }

    fn peek(&self) -> Option<&Entry> {
        self.page.front()
    }

    fn advance(&mut self) -> Option<Entry> {
        self.page.pop_front()
    }

    async fn close(&mut self) {
        self.release_cursor().await;
        self.page.clear();
        self.exhausted = true;
    }

    fn anomalies(&self) -> &[Anomaly] {
        &self.anomalies
    }
}

impl std::fmt::Debug for OrderedBatchReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderedBatchReader")
            .field("db", &self.db)
            .field("table", &self.table)
            .field("index", &self.index)
            .field("batch_size", &self.batch_size)
            .field("cursor", &self.cursor)
            .field("resident", &self.page.len())
            .field("exhausted", &self.exhausted)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use thinker_driver::{InMemoryDriver, TableDescriptor};

    fn seeded(count: i32) -> Arc<InMemoryDriver> {
        let driver = InMemoryDriver::new();
        driver.insert_table(
            "db",
            TableDescriptor::new("users", "id"),
            (0..count).rev().map(|i| Value::object([("id", i)])).collect(),
        );
        Arc::new(driver)
    }

    async fn keys(reader: &mut OrderedBatchReader) -> Vec<Value> {
        let mut keys = Vec::new();
        while let Some(entry) = reader.next_entry().await.unwrap() {
            keys.push(entry.key);
        }
        keys
    }

    #[tokio::test]
    async fn reads_in_pages() {
        let driver = seeded(7);
        let mut reader = OrderedBatchReader::new(driver.clone(), "db", "users", "id")
            .with_batch_size(3);

        let keys = keys(&mut reader).await;
        assert_eq!(keys, (0..7).map(Value::from).collect::<Vec<_>>());
        assert_eq!(reader.fetched(), 7);
        assert!(reader.is_exhausted());
        assert_eq!(driver.open_cursors(), 0);
    }

    #[tokio::test]
    async fn peek_does_not_consume() {
        let driver = seeded(2);
        let mut reader = OrderedBatchReader::new(driver, "db", "users", "id");

        reader.fill().await.unwrap();
        assert_eq!(reader.peek().unwrap().key, Value::from(0));
        reader.fill().await.unwrap();
        assert_eq!(reader.advance().unwrap().key, Value::from(0));
        assert_eq!(reader.next_entry().await.unwrap().unwrap().key, Value::from(1));
        assert!(reader.next_entry().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn resumes_after_key() {
        let driver = seeded(5);
        let mut reader =
            OrderedBatchReader::new(driver, "db", "users", "id").resume_after(Value::from(2));
        assert_eq!(keys(&mut reader).await, vec![Value::from(3), Value::from(4)]);
    }

    #[tokio::test]
    async fn transient_fetch_failures_reopen_without_replay() {
        let driver = seeded(6);
        let mut reader = OrderedBatchReader::new(driver.clone(), "db", "users", "id")
            .with_batch_size(2)
            .with_retry(RetryConfig::immediate(3));

        assert_eq!(reader.next_batch().await.unwrap().len(), 2);
        driver.fail_fetches(2);
        let rest = keys(&mut reader).await;
        assert_eq!(rest, (2..6).map(Value::from).collect::<Vec<_>>());
        assert_eq!(driver.open_cursors(), 0);
    }

    #[tokio::test]
    async fn transient_failure_after_unordered_keys_loses_nothing() {
        let driver = InMemoryDriver::new();
        driver.insert_table(
            "db",
            TableDescriptor::new("t", "id"),
            vec![
                Value::object([("id", Value::from(1))]),
                Value::object([("id", Value::from(f64::INFINITY))]),
                Value::object([("id", Value::from(f64::NEG_INFINITY))]),
                Value::object([("id", Value::from(f64::NAN))]),
            ],
        );
        let driver = Arc::new(driver);
        let mut reader = OrderedBatchReader::new(driver.clone(), "db", "t", "id")
            .with_batch_size(2)
            .with_retry(RetryConfig::immediate(3));

        let mut seen = reader.next_batch().await.unwrap();
        assert_eq!(seen.len(), 2);
        driver.fail_fetches(1);
        while let Some(entry) = reader.next_entry().await.unwrap() {
            seen.push(entry);
        }

        let mut keys: Vec<String> = seen.iter().map(|e| e.key.to_string()).collect();
        keys.sort();
        let mut expected: Vec<String> = [1.0, f64::INFINITY, f64::NEG_INFINITY, f64::NAN]
            .into_iter()
            .map(|n| Value::from(n).to_string())
            .collect();
        expected.sort();
        assert_eq!(keys, expected);
        assert_eq!(reader.fetched(), 4);
        assert_eq!(driver.open_cursors(), 0);
    }

    #[tokio::test]
    async fn retries_exhausted_is_fatal() {
        let driver = seeded(3);
        driver.fail_fetches(10);
        let mut reader = OrderedBatchReader::new(driver.clone(), "db", "users", "id")
            .with_retry(RetryConfig::immediate(2));

        let err = reader.fill().await.unwrap_err();
        assert!(matches!(err, SyncError::RetriesExhausted { attempts: 2, .. }));
        reader.close().await;
        assert_eq!(driver.open_cursors(), 0);
    }

    #[tokio::test]
    async fn missing_index_is_a_schema_error() {
        let driver = seeded(3);
        let mut reader = OrderedBatchReader::new(driver, "db", "users", "name");
        let err = reader.fill().await.unwrap_err();
        assert!(matches!(err, SyncError::MissingIndex { .. }));
    }

    #[tokio::test]
    async fn incomparable_keys_are_anomalies() {
        let driver = InMemoryDriver::new();
        driver.insert_table(
            "db",
            TableDescriptor::new("t", "id"),
            vec![
                Value::object([("id", Value::from(1))]),
                Value::object([("id", Value::from(f64::INFINITY))]),
                Value::object([("id", Value::from(f64::NEG_INFINITY))]),
            ],
        );
        let mut reader = OrderedBatchReader::new(Arc::new(driver), "db", "t", "id");

        let mut count = 0;
        while reader.next_entry().await.unwrap().is_some() {
            count += 1;
        }
        assert_eq!(count, 3);
        assert_eq!(reader.anomalies().len(), 1);
        assert_eq!(reader.anomalies()[0].phase, Phase::Read);
    }

    #[tokio::test]
    async fn close_releases_cursor() {
        let driver = seeded(10);
        let mut reader =
            OrderedBatchReader::new(driver.clone(), "db", "users", "id").with_batch_size(2);
        reader.fill().await.unwrap();
        assert_eq!(driver.open_cursors(), 1);

        reader.close().await;
        reader.close().await;
        assert_eq!(driver.open_cursors(), 0);
        assert!(reader.next_entry().await.unwrap().is_none());
    }
}
