//! Ordered streams of keyed documents.

use crate::error::SyncResult;
use crate::report::Anomaly;
use async_trait::async_trait;
use std::collections::VecDeque;
use thinker_value::Value;

/// A document with the value it is ordered by.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    /// Ordering key.
    pub key: Value,
    /// Full document.
    pub document: Value,
}

impl Entry {
    /// Creates an entry.
    pub fn new(key: Value, document: Value) -> Self {
        Self { key, document }
    }
}

/// A forward-only sequence of entries ascending by key.
///
/// The head entry is loaded with [`OrderedStream::fill`] and can then be
/// inspected with [`OrderedStream::peek`] any number of times before
/// [`OrderedStream::advance`] consumes it.
#[async_trait]
pub trait OrderedStream: Send {
    /// Makes sure the head entry is loaded, fetching if needed.
    ///
    /// After `fill` returns `Ok`, `peek` returns `None` only at the end of
    /// the stream.
    async fn fill(&mut self) -> SyncResult<()>;

    /// Returns the loaded head entry.
    fn peek(&self) -> Option<&Entry>;

    /// Consumes and returns the loaded head entry.
    fn advance(&mut self) -> Option<Entry>;

    /// Releases server resources. Idempotent.
    async fn close(&mut self);

    /// Ordering anomalies met while reading.
    fn anomalies(&self) -> &[Anomaly] {
        &[]
    }

    /// Fetches and consumes the next entry.
    async fn next_entry(&mut self) -> SyncResult<Option<Entry>> {
        self.fill().await?;
        Ok(self.advance())
    }
}

/// An in-memory ordered stream.
#[derive(Debug, Clone, Default)]
pub struct VecStream {
    entries: VecDeque<Entry>,
}

impl VecStream {
    /// Creates a stream over entries already sorted by key.
    pub fn new(entries: impl IntoIterator<Item = Entry>) -> Self {
        Self {
            entries: entries.into_iter().collect(),
        }
    }

    /// Creates a stream over documents, keyed by `field`.
    ///
    /// Documents lacking the field are dropped.
    pub fn from_documents(field: &str, documents: impl IntoIterator<Item = Value>) -> Self {
        Self::new(documents.into_iter().filter_map(|doc| {
            let key = doc.get(field)?.clone();
            Some(Entry::new(key, doc))
        }))
    }

    /// Number of entries not yet consumed.
    pub fn remaining(&self) -> usize {
        self.entries.len()
    }
}

#[async_trait]
impl OrderedStream for VecStream {
    async fn fill(&mut self) -> SyncResult<()> {
        Ok(())
    }

    fn peek(&self) -> Option<&Entry> {
        self.entries.front()
    }

    fn advance(&mut self) -> Option<Entry> {
        self.entries.pop_front()
    }

    async fn close(&mut self) {
        self.entries.clear();
    }
}
