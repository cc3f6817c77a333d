//! # Thinker Testkit
//!
//! Test utilities for Thinker.
//!
//! This crate provides:
//! - Fixtures: the typed six-document dataset, ordered value ladders,
//!   seeded drivers
//! - Property-based test generators using proptest
//! - Test doubles for confirmation and progress hooks
//!
//! ## Usage
//!
//! ```rust
//! use thinker_testkit::prelude::*;
//!
//! let driver = seeded_driver("test", "dataset", typed_dataset());
//! assert_eq!(driver.documents("test", "dataset").unwrap().len(), 6);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod doubles;
pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::doubles::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use doubles::*;
pub use fixtures::*;
pub use generators::*;
