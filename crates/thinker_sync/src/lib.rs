//! # Thinker Sync
//!
//! Clone and incremental sync between two document databases.
//!
//! This crate provides:
//! - Ordered batch reads with retry and resume ([`OrderedBatchReader`])
//! - Sorted merge-join diff of two ordered streams ([`MergeDiff`])
//! - Whole-database incremental sync ([`SyncOrchestrator`])
//! - Schema and bulk copy of missing tables ([`ClonePipeline`])
//! - Delete confirmation and progress reporting hooks
//!
//! ## Architecture
//!
//! Both tables of a pair are read ascending by primary key, one page at a
//! time, and walked in lockstep:
//! 1. A source key missing from the target becomes an insert
//! 2. A target key missing from the source becomes a delete
//! 3. A shared key with differing documents becomes an update
//!
//! Operations are buffered into one bounded batch per table and flushed
//! with bulk writes. No table is ever held in memory as a whole.
//!
//! ## Key Invariants
//!
//! - Keys are ordered by [`thinker_value::compare`], the database's index order
//! - A converged target yields zero operations
//! - Inserts overwrite on conflict, so re-runs converge
//! - A failing table never stops its siblings
//! - Every cursor is closed before a run returns

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod clone;
mod config;
mod confirm;
mod diff;
mod error;
mod orchestrator;
mod progress;
mod reader;
mod report;
mod retry;
mod schema;
mod stream;

pub use clone::ClonePipeline;
pub use config::{ExistingTables, RetryConfig, SyncConfig, DEFAULT_BATCH_SIZE, DEFAULT_WORKERS};
pub use confirm::{AssumeNo, AssumeYes, ConfirmationProvider};
pub use diff::{DiffOperation, MergeDiff};
pub use error::{Phase, SyncError, SyncResult};
pub use orchestrator::SyncOrchestrator;
pub use progress::{NoopObserver, ProgressObserver, SyncProgress, TracingObserver};
pub use reader::OrderedBatchReader;
pub use report::{Anomaly, RunReport, TableOutcome, TableReport};
pub use stream::{Entry, OrderedStream, VecStream};
