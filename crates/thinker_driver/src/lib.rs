//! # Thinker Driver
//!
//! The database collaborator the replication core talks to.
//!
//! This crate provides the boundary between the sync engine and a database
//! server. Drivers are **request/response** endpoints: list and describe
//! tables, create tables and indexes, open ordered cursors and fetch pages
//! from them, and execute bulk writes. They never retry; callers classify
//! failures with [`DriverError::is_retryable`].
//!
//! ## Available Drivers
//!
//! - [`InMemoryDriver`] - For testing, with fault injection
//! - [`DirectoryDriver`] - Databases stored as JSON files on disk
//!
//! ## Example
//!
//! ```rust
//! use thinker_driver::{Driver, InMemoryDriver, OrderedQuery, TableDescriptor};
//! use thinker_value::Value;
//!
//! # tokio_test_block(async {
//! let driver = InMemoryDriver::new();
//! driver.insert_table("test", TableDescriptor::new("users", "id"), vec![
//!     Value::object([("id", 2)]),
//!     Value::object([("id", 1)]),
//! ]);
//! let cursor = driver.open_cursor("test", "users", &OrderedQuery::new("id")).await.unwrap();
//! let page = driver.fetch_page(cursor, 10).await.unwrap();
//! assert_eq!(page.documents[0].get("id"), Some(&Value::from(1)));
//! # });
//! # fn tokio_test_block<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod directory;
mod driver;
mod error;
mod memory;
mod types;

pub use directory::DirectoryDriver;
pub use driver::Driver;
pub use error::{DriverError, DriverResult};
pub use memory::{InMemoryDriver, WriteRecord};
pub use types::{
    ConflictPolicy, CursorId, OrderedQuery, Page, TableDescriptor, WriteBatch, WriteSummary,
    DEFAULT_PRIMARY_KEY,
};
