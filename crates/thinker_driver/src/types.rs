//! Request and response types exchanged with a driver.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thinker_value::Value;

/// Primary key field used when a table does not name one.
pub const DEFAULT_PRIMARY_KEY: &str = "id";

/// Schema of one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDescriptor {
    /// Table name.
    pub name: String,
    /// Primary key field name.
    pub primary_key: String,
    /// Secondary index names.
    #[serde(default)]
    pub indexes: BTreeSet<String>,
}

impl TableDescriptor {
    /// Creates a descriptor with the given primary key and no secondary indexes.
    pub fn new(name: impl Into<String>, primary_key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            primary_key: primary_key.into(),
            indexes: BTreeSet::new(),
        }
    }

    /// Adds a secondary index.
    pub fn with_index(mut self, index: impl Into<String>) -> Self {
        self.indexes.insert(index.into());
        self
    }

    /// Returns true if `index` is the primary key or a secondary index.
    pub fn has_index(&self, index: &str) -> bool {
        index == self.primary_key || self.indexes.contains(index)
    }
}

/// Server-side cursor handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CursorId(pub u64);

/// An ordered range read over one index.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderedQuery {
    /// Index to order by. The primary key counts as an index.
    pub index: String,
    /// Only return rows whose index value sorts strictly after this key.
    pub start_after: Option<Value>,
}

impl OrderedQuery {
    /// Reads the whole table ordered by `index`.
    pub fn new(index: impl Into<String>) -> Self {
        Self {
            index: index.into(),
            start_after: None,
        }
    }

    /// Resumes after `key`.
    pub fn starting_after(mut self, key: Value) -> Self {
        self.start_after = Some(key);
        self
    }
}

/// One page fetched from a cursor.
#[derive(Debug, Clone, Default)]
pub struct Page {
    /// Documents in index order.
    pub documents: Vec<Value>,
    /// Whether the cursor has further rows.
    pub has_more: bool,
}

/// What an insert does when the primary key already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConflictPolicy {
    /// Fail the batch.
    #[default]
    Error,
    /// Overwrite the stored document.
    Replace,
}

/// A bulk write against one table.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteBatch {
    /// Insert documents.
    Insert {
        /// Documents to insert.
        documents: Vec<Value>,
        /// Behaviour on an existing primary key.
        conflict: ConflictPolicy,
    },
    /// Replace documents by primary key, inserting absent ones.
    Replace {
        /// Replacement documents.
        documents: Vec<Value>,
    },
    /// Delete documents by primary key.
    Delete {
        /// Primary keys to delete.
        keys: Vec<Value>,
    },
}

impl WriteBatch {
    /// Number of documents or keys in the batch.
    pub fn len(&self) -> usize {
        match self {
            WriteBatch::Insert { documents, .. } | WriteBatch::Replace { documents } => {
                documents.len()
            }
            WriteBatch::Delete { keys } => keys.len(),
        }
    }

    /// Returns true if the batch carries nothing.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Short name of the operation kind, for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            WriteBatch::Insert { .. } => "insert",
            WriteBatch::Replace { .. } => "replace",
            WriteBatch::Delete { .. } => "delete",
        }
    }
}

/// Outcome counters of a write batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteSummary {
    /// Newly inserted documents.
    pub inserted: u64,
    /// Documents overwritten with different content.
    pub replaced: u64,
    /// Documents left as they were (identical content).
    pub unchanged: u64,
    /// Documents deleted.
    pub deleted: u64,
    /// Deletes or replaces that found nothing to act on.
    pub skipped: u64,
}
