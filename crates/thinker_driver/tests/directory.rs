//! Directory driver persistence of typed documents.

use thinker_driver::{ConflictPolicy, Driver, OrderedQuery, TableDescriptor, WriteBatch};
use thinker_testkit::{temp_directory_driver, time, typed_dataset};
use thinker_value::Value;

#[tokio::test]
async fn typed_documents_survive_reopen_with_offsets() {
    let (dir, driver) = temp_directory_driver().await;
    driver.create_database("test").await.unwrap();
    driver
        .create_table("test", &TableDescriptor::new("dataset", "id"))
        .await
        .unwrap();
    driver
        .write(
            "test",
            "dataset",
            &WriteBatch::Insert {
                documents: typed_dataset(),
                conflict: ConflictPolicy::Error,
            },
        )
        .await
        .unwrap();
    driver.flush_table("test", "dataset").await.unwrap();
    drop(driver);

    let reopened = thinker_driver::DirectoryDriver::open(dir.path()).await.unwrap();
    let cursor = reopened
        .open_cursor("test", "dataset", &OrderedQuery::new("id"))
        .await
        .unwrap();
    let page = reopened.fetch_page(cursor, 100).await.unwrap();
    assert!(!page.has_more);
    assert_eq!(page.documents.len(), 6);

    // Numbers sort before times; times ascend by instant.
    let keys: Vec<&Value> = page.documents.iter().map(|d| d.get("id").unwrap()).collect();
    assert_eq!(keys[0], &Value::from(1));
    assert_eq!(keys[3], &time("2017-01-01T00:00:00+03:00"));
    assert_eq!(keys[4], &time("2017-01-01T00:00:00+00:00"));
    assert_eq!(keys[5], &time("2017-01-01T00:00:00-07:00"));

    let mut expected = typed_dataset();
    expected.retain(|d| d.get("id") == Some(&Value::from(2)));
    assert_eq!(page.documents[1], expected[0]);
}

#[tokio::test]
async fn replace_and_delete_are_persisted() {
    let (dir, driver) = temp_directory_driver().await;
    driver.create_database("test").await.unwrap();
    driver
        .create_table("test", &TableDescriptor::new("t", "id"))
        .await
        .unwrap();
    let doc = |id: i32, v: &str| Value::object([("id", Value::from(id)), ("v", Value::from(v))]);

    driver
        .write(
            "test",
            "t",
            &WriteBatch::Replace {
                documents: vec![doc(1, "a"), doc(2, "b")],
            },
        )
        .await
        .unwrap();
    let summary = driver
        .write(
            "test",
            "t",
            &WriteBatch::Delete {
                keys: vec![Value::from(1), Value::from(9)],
            },
        )
        .await
        .unwrap();
    assert_eq!(summary.deleted, 1);
    assert_eq!(summary.skipped, 1);
    driver.flush().await.unwrap();

    let reopened = thinker_driver::DirectoryDriver::open(dir.path()).await.unwrap();
    let cursor = reopened
        .open_cursor("test", "t", &OrderedQuery::new("id"))
        .await
        .unwrap();
    let page = reopened.fetch_page(cursor, 10).await.unwrap();
    assert_eq!(page.documents, vec![doc(2, "b")]);
}
