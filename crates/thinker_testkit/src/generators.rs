//! Property-based test generators using proptest.
//!
//! Provides strategies for values of every class and for tables whose
//! documents have unique primary keys.

use crate::fixtures::millis;
use proptest::prelude::*;
use std::collections::BTreeMap;
use thinker_value::Value;

/// Strategy for finite scalar values of every class.
pub fn scalar_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        (-1000i32..1000).prop_map(Value::from),
        (-1.0e6f64..1.0e6).prop_map(Value::Number),
        "[a-c]{0,3}".prop_map(Value::String),
        prop::collection::vec(any::<u8>(), 0..3).prop_map(Value::Binary),
        (0i64..4_000_000_000_000).prop_map(millis),
    ]
}

/// Strategy for arbitrary nested values without non-finite numbers.
pub fn value_strategy() -> impl Strategy<Value = Value> {
    scalar_strategy().prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map("[a-c]{1,2}", inner, 0..3).prop_map(Value::Object),
        ]
    })
}

/// Strategy for primary key values: integers, strings, or times.
pub fn key_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        (0i32..200).prop_map(Value::from),
        "[a-e]{1,2}".prop_map(Value::String),
        (0i64..50).prop_map(|s| millis(s * 1000)),
    ]
}

/// Strategy for a table of up to `max` documents keyed by `id`.
///
/// Keys are unique under the comparator. Payloads come from a small domain
/// so that two independently generated tables share documents.
pub fn table_strategy(max: usize) -> impl Strategy<Value = Vec<Value>> {
    prop::collection::vec((key_strategy(), 0u8..3), 0..=max).prop_map(|rows| {
        let mut by_key: Vec<(Value, u8)> = Vec::with_capacity(rows.len());
        for (key, payload) in rows {
            if !by_key.iter().any(|(k, _)| k == &key) {
                by_key.push((key, payload));
            }
        }
        by_key
            .into_iter()
            .map(|(key, payload)| {
                let mut fields = BTreeMap::new();
                fields.insert("id".to_string(), key);
                fields.insert("payload".to_string(), Value::from(u32::from(payload)));
                Value::Object(fields)
            })
            .collect()
    })
}
