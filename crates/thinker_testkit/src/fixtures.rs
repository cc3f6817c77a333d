//! Test fixtures and driver helpers.

use chrono::{DateTime, FixedOffset, TimeZone};
use std::sync::Arc;
use tempfile::TempDir;
use thinker_driver::{DirectoryDriver, InMemoryDriver, TableDescriptor, DEFAULT_PRIMARY_KEY};
use thinker_value::Value;

/// Parses an RFC 3339 timestamp into a time value.
///
/// # Panics
///
/// Panics on malformed input; fixtures are static.
pub fn time(rfc3339: &str) -> Value {
    Value::Time(DateTime::parse_from_rfc3339(rfc3339).expect("valid fixture timestamp"))
}

/// A UTC time value `ms` milliseconds after the epoch.
pub fn millis(ms: i64) -> Value {
    let utc = FixedOffset::east_opt(0).expect("zero offset");
    Value::Time(utc.timestamp_millis_opt(ms).single().expect("in range"))
}

/// Six documents exercising numeric and time primary keys.
///
/// Three documents have numeric keys and a time field in different zones;
/// three have time keys at the same wall clock in different zones (distinct
/// instants).
pub fn typed_dataset() -> Vec<Value> {
    let doc = |id: Value, test: Value| Value::object([("id", id), ("test", test)]);
    vec![
        doc(Value::from(1), time("2017-01-01T00:00:00+00:00")),
        doc(Value::from(2), time("2017-01-01T00:00:00+03:00")),
        doc(Value::from(3), time("2017-01-01T00:00:00-07:00")),
        doc(time("2017-01-01T00:00:00+00:00"), Value::from("UTC")),
        doc(time("2017-01-01T00:00:00-07:00"), Value::from("UTC-7")),
        doc(time("2017-01-01T00:00:00+03:00"), Value::from("UTC+3")),
    ]
}

/// Values in strictly ascending native order, one per position.
///
/// Covers every class in rank order and ends with the non-finite sentinel.
pub fn ordered_values() -> Vec<Value> {
    vec![
        Value::from(Vec::<i32>::new()),
        Value::from(vec![1, 2, 3]),
        Value::from(vec![3, 2, 1]),
        Value::from(vec!["foo", "bar"]),
        Value::Bool(false),
        Value::Bool(true),
        Value::Null,
        Value::from(1),
        Value::from(1.25),
        Value::from(1.5),
        Value::from(2),
        Value::from(10),
        Value::from(20),
        Value::from(1000.0),
        Value::object([("foo", 1), ("bar", 2)]),
        Value::binary(b"test".to_vec()),
        millis(1_000_000_000_000),
        millis(1_400_000_000_000),
        Value::from("bar"),
        Value::from("bar1"),
        Value::from("baz"),
        Value::from("foo"),
        Value::from("z"),
        Value::Number(f64::INFINITY),
    ]
}

/// `count` documents with integer keys `0..count` and a text payload.
pub fn numbered_documents(count: i32) -> Vec<Value> {
    (0..count)
        .map(|i| {
            Value::object([
                ("id", Value::from(i)),
                ("payload", Value::from(format!("doc-{i}"))),
            ])
        })
        .collect()
}

/// An in-memory server holding one table keyed by `id`.
pub fn seeded_driver(db: &str, table: &str, documents: Vec<Value>) -> Arc<InMemoryDriver> {
    let driver = InMemoryDriver::new();
    driver.insert_table(db, TableDescriptor::new(table, DEFAULT_PRIMARY_KEY), documents);
    Arc::new(driver)
}

/// A directory-backed server in a temporary directory.
///
/// The directory lives as long as the returned [`TempDir`].
///
/// # Panics
///
/// Panics if the directory cannot be created.
pub async fn temp_directory_driver() -> (TempDir, DirectoryDriver) {
    let dir = TempDir::new().expect("Failed to create temp directory");
    let driver = DirectoryDriver::open(dir.path())
        .await
        .expect("Failed to open directory driver");
    (dir, driver)
}

#[cfg(test)]
mod tests {
    use super::*;
    use thinker_value::{compare, Comparison};

    #[test]
    fn typed_dataset_keys_are_distinct() {
        let docs = typed_dataset();
        for (i, a) in docs.iter().enumerate() {
            for b in &docs[i + 1..] {
                assert_ne!(
                    compare(a.get("id").unwrap(), b.get("id").unwrap()),
                    Comparison::Equal
                );
            }
        }
    }

    #[test]
    fn seeded_driver_holds_documents() {
        let driver = seeded_driver("db", "t", numbered_documents(4));
        assert_eq!(driver.documents("db", "t").unwrap().len(), 4);
    }

    #[tokio::test]
    async fn temp_directory_driver_starts_empty() {
        use thinker_driver::Driver;
        let (_dir, driver) = temp_directory_driver().await;
        assert!(driver.list_databases().await.unwrap().is_empty());
    }
}
