//! # Thinker Value
//!
//! Dynamic document values and the database's native index ordering.
//!
//! This crate provides:
//! - [`Value`], a closed tagged variant over the database's value classes
//! - [`compare`], the native order used by every primary and secondary index
//! - [`total_order`], a total refinement of it for laying out stored rows
//! - Structural equality used to decide whether a document changed
//! - Conversion to and from the raw JSON wire representation
//!
//! ## Ordering
//!
//! ```text
//! ARRAY < BOOL < NULL < NUMBER < OBJECT < PTYPE<BINARY> < PTYPE<TIME> < STRING
//! ```
//!
//! Non-finite numbers and unknown pseudo-types have no defined position;
//! comparing them yields [`Comparison::Incomparable`] instead of panicking.
//!
//! ## Usage
//!
//! ```
//! use thinker_value::{compare, Comparison, Value};
//!
//! let a = Value::from(vec![1, 2, 3]);
//! let b = Value::from(false);
//! assert_eq!(compare(&a, &b), Comparison::Less);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod compare;
mod error;
mod json;
mod value;

pub use compare::{compare, total_order, Comparison};
pub use error::{ValueError, ValueResult};
pub use json::{decode_time, parse_timezone, REQL_TYPE_FIELD};
pub use value::{Class, Value};
