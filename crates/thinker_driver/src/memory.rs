//! In-memory driver for testing.

use crate::driver::Driver;
use crate::error::{DriverError, DriverResult};
use crate::types::{
    ConflictPolicy, CursorId, OrderedQuery, Page, TableDescriptor, WriteBatch, WriteSummary,
};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::ops::Bound;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use thinker_value::{total_order, Value};

/// An in-memory database server.
///
/// This driver keeps every database in memory and is suitable for:
/// - Unit and integration tests
/// - Backing other local drivers (see [`crate::DirectoryDriver`])
///
/// Secondary index names are field names: an index `by` orders rows by
/// their `by` field and skips rows that lack it. Cursors snapshot their rows
/// when opened.
///
/// Transient failures can be injected with [`InMemoryDriver::fail_fetches`],
/// [`InMemoryDriver::fail_writes`] and [`InMemoryDriver::fail_opens`].
///
/// # Example
///
/// ```rust
/// use thinker_driver::{InMemoryDriver, TableDescriptor};
/// use thinker_value::Value;
///
/// let driver = InMemoryDriver::new();
/// driver.insert_table(
///     "test",
///     TableDescriptor::new("users", "id"),
///     vec![Value::object([("id", 1)])],
/// );
/// assert_eq!(driver.documents("test", "users").unwrap().len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct InMemoryDriver {
    state: RwLock<State>,
    faults: Mutex<Faults>,
    writes: Mutex<Vec<WriteRecord>>,
    next_cursor: AtomicU64,
}

#[derive(Debug, Default)]
struct State {
    databases: BTreeMap<String, BTreeMap<String, MemTable>>,
    cursors: HashMap<CursorId, VecDeque<Value>>,
}

#[derive(Debug, Clone)]
struct MemTable {
    descriptor: TableDescriptor,
    rows: BTreeMap<RowKey, Value>,
}

/// A primary key ordered by [`total_order`], so every key has a slot.
#[derive(Debug, Clone)]
struct RowKey(Value);

impl Ord for RowKey {
    fn cmp(&self, other: &Self) -> Ordering {
        total_order(&self.0, &other.0)
    }
}

impl PartialOrd for RowKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for RowKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for RowKey {}

#[derive(Debug, Default)]
struct Faults {
    fetches: usize,
    writes: usize,
    opens: usize,
}

/// A write batch the driver executed successfully.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRecord {
    /// Database name.
    pub db: String,
    /// Table name.
    pub table: String,
    /// Operation kind (`insert`, `replace`, `delete`).
    pub kind: &'static str,
    /// Number of documents or keys in the batch.
    pub len: usize,
}

fn order(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => total_order(a, b),
        (a, b) => a.is_some().cmp(&b.is_some()),
    }
}

impl State {
    fn database(&self, db: &str) -> DriverResult<&BTreeMap<String, MemTable>> {
        self.databases
            .get(db)
            .ok_or_else(|| DriverError::DatabaseNotFound(db.to_string()))
    }

    fn table(&self, db: &str, table: &str) -> DriverResult<&MemTable> {
        self.database(db)?
            .get(table)
            .ok_or_else(|| DriverError::TableNotFound(table.to_string()))
    }

    fn table_mut(&mut self, db: &str, table: &str) -> DriverResult<&mut MemTable> {
        self.databases
            .get_mut(db)
            .ok_or_else(|| DriverError::DatabaseNotFound(db.to_string()))?
            .get_mut(table)
            .ok_or_else(|| DriverError::TableNotFound(table.to_string()))
    }
}

impl MemTable {
    fn new(descriptor: TableDescriptor) -> Self {
        Self {
            descriptor,
            rows: BTreeMap::new(),
        }
    }

    fn key_of(&self, doc: &Value) -> DriverResult<RowKey> {
        if doc.as_object().is_none() {
            return Err(DriverError::InvalidDocument(format!(
                "expected an object, got {doc}"
            )));
        }
        doc.get(&self.descriptor.primary_key)
            .map(|key| RowKey(key.clone()))
            .ok_or_else(|| DriverError::MissingPrimaryKey(self.descriptor.primary_key.clone()))
    }

    fn insert(&mut self, documents: &[Value], conflict: ConflictPolicy) -> DriverResult<WriteSummary> {
        if conflict == ConflictPolicy::Error {
            // Validate the whole batch first so a conflict leaves the table untouched.
            let mut seen = BTreeSet::new();
            for doc in documents {
                let key = self.key_of(doc)?;
                if self.rows.contains_key(&key) || !seen.insert(key.clone()) {
                    return Err(DriverError::DuplicateKey(key.0.to_string()));
                }
            }
        }
        self.upsert(documents)
    }

    fn upsert(&mut self, documents: &[Value]) -> DriverResult<WriteSummary> {
        let mut summary = WriteSummary::default();
        for doc in documents {
            let key = self.key_of(doc)?;
            match self.rows.get_mut(&key) {
                Some(row) if *row == *doc => summary.unchanged += 1,
                Some(row) => {
                    *row = doc.clone();
                    summary.replaced += 1;
                }
                None => {
                    self.rows.insert(key, doc.clone());
                    summary.inserted += 1;
                }
            }
        }
        Ok(summary)
    }

    fn delete(&mut self, keys: &[Value]) -> WriteSummary {
        let mut summary = WriteSummary::default();
        for key in keys {
            match self.rows.remove(&RowKey(key.clone())) {
                Some(_) => summary.deleted += 1,
                None => summary.skipped += 1,
            }
        }
        summary
    }

    /// Rows of a cursor over `query`, in index order.
    fn scan(&self, query: &OrderedQuery) -> Vec<Value> {
        let index = query.index.as_str();
        if index == self.descriptor.primary_key {
            let lower = match &query.start_after {
                Some(after) => Bound::Excluded(RowKey(after.clone())),
                None => Bound::Unbounded,
            };
            return self
                .rows
                .range((lower, Bound::Unbounded))
                .map(|(_, row)| row.clone())
                .collect();
        }

        // Rows are already in primary key order, and the sort is stable.
        let mut rows: Vec<Value> = self
            .rows
            .values()
            .filter(|row| match (row.get(index), &query.start_after) {
                (None, _) => false,
                (Some(_), None) => true,
                (Some(key), Some(after)) => total_order(key, after) == Ordering::Greater,
            })
            .cloned()
            .collect();
        rows.sort_by(|a, b| order(a.get(index), b.get(index)));
        rows
    }
}

impl InMemoryDriver {
    /// Creates an empty server.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates (or replaces) a table with its indexes and documents.
    ///
    /// The database is created if needed. Documents are keyed by primary
    /// key; later documents win, and documents without one are ignored.
    pub fn insert_table(&self, db: &str, descriptor: TableDescriptor, documents: Vec<Value>) {
        let mut table = MemTable::new(descriptor);
        for doc in documents {
            if let Ok(key) = table.key_of(&doc) {
                table.rows.insert(key, doc);
            }
        }
        let mut state = self.state.write();
        state
            .databases
            .entry(db.to_string())
            .or_default()
            .insert(table.descriptor.name.clone(), table);
    }

    /// Returns a table's documents ordered by primary key.
    pub fn documents(&self, db: &str, table: &str) -> Option<Vec<Value>> {
        let state = self.state.read();
        let table = state.table(db, table).ok()?;
        Some(table.rows.values().cloned().collect())
    }

    /// Number of cursors opened and not yet closed.
    pub fn open_cursors(&self) -> usize {
        self.state.read().cursors.len()
    }

    /// Makes the next `n` page fetches fail with a retryable error.
    pub fn fail_fetches(&self, n: usize) {
        self.faults.lock().fetches = n;
    }

    /// Makes the next `n` writes fail with a retryable error.
    pub fn fail_writes(&self, n: usize) {
        self.faults.lock().writes = n;
    }

    /// Makes the next `n` cursor opens fail with a retryable error.
    pub fn fail_opens(&self, n: usize) {
        self.faults.lock().opens = n;
    }

    /// Write batches executed so far, oldest first.
    pub fn writes(&self) -> Vec<WriteRecord> {
        self.writes.lock().clone()
    }

    fn inject(counter: &mut usize, what: &str) -> DriverResult<()> {
        if *counter > 0 {
            *counter -= 1;
            return Err(DriverError::transport_retryable(format!(
                "injected {what} failure"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Driver for InMemoryDriver {
    async fn list_databases(&self) -> DriverResult<Vec<String>> {
        Ok(self.state.read().databases.keys().cloned().collect())
    }

    async fn create_database(&self, db: &str) -> DriverResult<()> {
        self.state
            .write()
            .databases
            .entry(db.to_string())
            .or_default();
        Ok(())
    }

    async fn list_tables(&self, db: &str) -> DriverResult<Vec<String>> {
        Ok(self.state.read().database(db)?.keys().cloned().collect())
    }

    async fn describe_table(&self, db: &str, table: &str) -> DriverResult<TableDescriptor> {
        Ok(self.state.read().table(db, table)?.descriptor.clone())
    }

    async fn create_table(&self, db: &str, descriptor: &TableDescriptor) -> DriverResult<()> {
        let mut state = self.state.write();
        let tables = state
            .databases
            .get_mut(db)
            .ok_or_else(|| DriverError::DatabaseNotFound(db.to_string()))?;
        if tables.contains_key(&descriptor.name) {
            return Err(DriverError::TableExists(descriptor.name.clone()));
        }
        tables.insert(
            descriptor.name.clone(),
            MemTable::new(TableDescriptor::new(&descriptor.name, &descriptor.primary_key)),
        );
        Ok(())
    }

    async fn create_index(&self, db: &str, table: &str, index: &str) -> DriverResult<()> {
        let mut state = self.state.write();
        state
            .table_mut(db, table)?
            .descriptor
            .indexes
            .insert(index.to_string());
        Ok(())
    }

    async fn open_cursor(
        &self,
        db: &str,
        table: &str,
        query: &OrderedQuery,
    ) -> DriverResult<CursorId> {
        Self::inject(&mut self.faults.lock().opens, "open")?;

        let mut state = self.state.write();
        let mem = state.table(db, table)?;
        if !mem.descriptor.has_index(&query.index) {
            return Err(DriverError::IndexNotFound {
                table: table.to_string(),
                index: query.index.clone(),
            });
        }

        let rows = mem.scan(query);
        let id = CursorId(self.next_cursor.fetch_add(1, AtomicOrdering::SeqCst));
        state.cursors.insert(id, rows.into());
        Ok(id)
    }

    async fn fetch_page(&self, cursor: CursorId, max: usize) -> DriverResult<Page> {
        Self::inject(&mut self.faults.lock().fetches, "fetch")?;

        let mut state = self.state.write();
        let rows = state
            .cursors
            .get_mut(&cursor)
            .ok_or(DriverError::CursorNotFound(cursor.0))?;
        let take = max.min(rows.len());
        let documents: Vec<Value> = rows.drain(..take).collect();
        Ok(Page {
            documents,
            has_more: !rows.is_empty(),
        })
    }

    async fn close_cursor(&self, cursor: CursorId) -> DriverResult<()> {
        self.state
            .write()
            .cursors
            .remove(&cursor)
            .map(|_| ())
            .ok_or(DriverError::CursorNotFound(cursor.0))
    }

    async fn write(&self, db: &str, table: &str, batch: &WriteBatch) -> DriverResult<WriteSummary> {
        Self::inject(&mut self.faults.lock().writes, "write")?;

        let summary = {
            let mut state = self.state.write();
            let mem = state.table_mut(db, table)?;
            match batch {
                WriteBatch::Insert {
                    documents,
                    conflict,
                } => mem.insert(documents, *conflict)?,
                WriteBatch::Replace { documents } => mem.upsert(documents)?,
                WriteBatch::Delete { keys } => mem.delete(keys),
            }
        };

        self.writes.lock().push(WriteRecord {
            db: db.to_string(),
            table: table.to_string(),
            kind: batch.kind(),
            len: batch.len(),
        });
        Ok(summary)
    }
}
