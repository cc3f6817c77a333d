//! Driver trait definition.

use crate::error::DriverResult;
use crate::types::{CursorId, OrderedQuery, Page, TableDescriptor, WriteBatch, WriteSummary};
use async_trait::async_trait;

/// A connection to one database server.
///
/// Every call is a request/response round trip that may fail with a
/// transient error (see [`crate::DriverError::is_retryable`]) or a permanent
/// one. Callers own retry policy; drivers never retry on their own.
///
/// # Invariants
///
/// - Cursors return rows ascending by the queried index in native value
///   order, as defined by [`thinker_value::compare`]; values it cannot
///   order still get a fixed slot ([`thinker_value::total_order`])
/// - `start_after` keeps exactly the rows that slot after the key, so a
///   cursor reopened after a received key neither repeats nor skips rows
/// - A cursor never returns a row twice and never rewinds
/// - `close_cursor` releases server resources; closing an unknown cursor
///   is an error the caller may ignore
///
/// # Implementors
///
/// - [`crate::InMemoryDriver`] - For testing
/// - [`crate::DirectoryDriver`] - For tables stored as JSON files
#[async_trait]
pub trait Driver: Send + Sync {
    /// Lists database names.
    async fn list_databases(&self) -> DriverResult<Vec<String>>;

    /// Creates a database. Creating an existing database is not an error.
    async fn create_database(&self, db: &str) -> DriverResult<()>;

    /// Lists table names of a database, sorted.
    async fn list_tables(&self, db: &str) -> DriverResult<Vec<String>>;

    /// Reads a table's primary key and secondary indexes.
    async fn describe_table(&self, db: &str, table: &str) -> DriverResult<TableDescriptor>;

    /// Creates a table with the descriptor's primary key.
    ///
    /// Secondary indexes are created separately with [`Driver::create_index`].
    async fn create_table(&self, db: &str, descriptor: &TableDescriptor) -> DriverResult<()>;

    /// Creates a secondary index.
    async fn create_index(&self, db: &str, table: &str, index: &str) -> DriverResult<()>;

    /// Runs an ordered query and returns a cursor over its rows.
    async fn open_cursor(&self, db: &str, table: &str, query: &OrderedQuery)
        -> DriverResult<CursorId>;

    /// Fetches up to `max` rows from a cursor.
    async fn fetch_page(&self, cursor: CursorId, max: usize) -> DriverResult<Page>;

    /// Closes a cursor.
    async fn close_cursor(&self, cursor: CursorId) -> DriverResult<()>;

    /// Executes a bulk write against a table.
    async fn write(&self, db: &str, table: &str, batch: &WriteBatch) -> DriverResult<WriteSummary>;

    /// Makes every acknowledged write to a table durable.
    ///
    /// Drivers that persist each write as it is executed keep the default.
    async fn flush_table(&self, _db: &str, _table: &str) -> DriverResult<()> {
        Ok(())
    }
}
