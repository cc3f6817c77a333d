//! Sorted merge-join diff of two ordered streams.

use crate::error::{Phase, SyncResult};
use crate::report::Anomaly;
use crate::stream::OrderedStream;
use thinker_value::{compare, Comparison, Value};
use tracing::warn;

/// One change that brings the target closer to the source.
#[derive(Debug, Clone, PartialEq)]
pub enum DiffOperation {
    /// The source document has no counterpart on the target.
    Insert(Value),
    /// Both sides hold the key with different documents: `(key, source document)`.
    Update(Value, Value),
    /// The target key has no counterpart on the source.
    Delete(Value),
}

impl DiffOperation {
    /// Short name of the operation kind, for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            DiffOperation::Insert(_) => "insert",
            DiffOperation::Update(..) => "update",
            DiffOperation::Delete(_) => "delete",
        }
    }
}

enum Step {
    Done,
    TakeSource,
    TakeTarget,
    TakeBoth,
    Incomparable,
}

/// Walks a source and a target stream in key order and yields the
/// operations that make the target equal to the source.
///
/// Operations are produced lazily, one per [`MergeDiff::next_op`] call,
/// with one lookahead entry per side. Equal keys with structurally equal
/// documents produce nothing. Keys the comparator cannot order are recorded
/// as anomalies and both sides move on.
#[derive(Debug)]
pub struct MergeDiff<S, T> {
    source: S,
    target: T,
    table: String,
    scanned: u64,
    anomalies: Vec<Anomaly>,
}

impl<S: OrderedStream, T: OrderedStream> MergeDiff<S, T> {
    /// Creates a diff of `table` over two streams sorted by the same key.
    pub fn new(table: impl Into<String>, source: S, target: T) -> Self {
        Self {
            source,
            target,
            table: table.into(),
            scanned: 0,
            anomalies: Vec::new(),
        }
    }

    /// Number of source entries consumed so far.
    pub fn scanned(&self) -> u64 {
        self.scanned
    }

    /// Key pairs the comparator could not order so far.
    pub fn anomalies(&self) -> &[Anomaly] {
        &self.anomalies
    }

    /// Returns the next operation, or `None` once both streams are drained.
    ///
    /// # Errors
    ///
    /// Propagates read errors of either stream.
    pub async fn next_op(&mut self) -> SyncResult<Option<DiffOperation>> {
        loop {
            self.source.fill().await?;
            self.target.fill().await?;

            let step = match (self.source.peek(), self.target.peek()) {
                (None, None) => Step::Done,
                (Some(_), None) => Step::TakeSource,
                (None, Some(_)) => Step::TakeTarget,
                (Some(s), Some(t)) => match compare(&s.key, &t.key) {
                    Comparison::Less => Step::TakeSource,
                    Comparison::Greater => Step::TakeTarget,
                    Comparison::Equal => Step::TakeBoth,
                    Comparison::Incomparable => Step::Incomparable,
                },
            };

            match step {
                Step::Done => return Ok(None),
                Step::TakeSource => {
                    if let Some(entry) = self.source.advance() {
                        self.scanned += 1;
                        return Ok(Some(DiffOperation::Insert(entry.document)));
                    }
                }
                Step::TakeTarget => {
                    if let Some(entry) = self.target.advance() {
                        return Ok(Some(DiffOperation::Delete(entry.key)));
                    }
                }
                Step::TakeBoth => {
                    let source = self.source.advance();
                    let target = self.target.advance();
                    if let (Some(source), Some(target)) = (source, target) {
                        self.scanned += 1;
                        if source.document != target.document {
                            return Ok(Some(DiffOperation::Update(source.key, source.document)));
                        }
                    }
                }
                Step::Incomparable => {
                    let source = self.source.advance();
                    let target = self.target.advance();
                    if let (Some(source), Some(target)) = (source, target) {
                        self.scanned += 1;
                        warn!(
                            table = %self.table,
                            source_key = %source.key,
                            target_key = %target.key,
                            "keys are not comparable, skipping both"
                        );
                        self.anomalies
                            .push(Anomaly::new(Phase::Compare, source.key, target.key));
                    }
                }
            }
        }
    }

    /// Drains the diff into a vector.
    pub async fn collect_ops(&mut self) -> SyncResult<Vec<DiffOperation>> {
        let mut ops = Vec::new();
        while let Some(op) = self.next_op().await? {
            ops.push(op);
        }
        Ok(ops)
    }

    /// Gives back both streams and the recorded anomalies.
    pub fn into_parts(self) -> (S, T, Vec<Anomaly>) {
        (self.source, self.target, self.anomalies)
    }
}
