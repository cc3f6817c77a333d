//! Table selection and target schema preparation.

use crate::config::RetryConfig;
use crate::error::{Phase, SyncError, SyncResult};
use crate::retry::with_retry;
use thinker_driver::{Driver, TableDescriptor};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Tables a run works on.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct Selection {
    /// Requested tables present in the source, sorted.
    pub(crate) found: Vec<String>,
    /// Requested tables absent from the source.
    pub(crate) missing: Vec<String>,
}

/// Resolves the allow-list against the source database.
pub(crate) async fn select_tables(
    source: &dyn Driver,
    db: &str,
    allow: Option<&[String]>,
    retry: &RetryConfig,
    cancel: &CancellationToken,
) -> SyncResult<Selection> {
    let mut available =
        with_retry(retry, cancel, "", Phase::Schema, || source.list_tables(db)).await?;
    available.sort();

    let Some(allow) = allow else {
        return Ok(Selection {
            found: available,
            missing: Vec::new(),
        });
    };

    let mut selection = Selection::default();
    for name in allow {
        if selection.found.contains(name) || selection.missing.contains(name) {
            continue;
        }
        if available.binary_search(name).is_ok() {
            selection.found.push(name.clone());
        } else {
            selection.missing.push(name.clone());
        }
    }
    selection.found.sort();
    Ok(selection)
}

/// Creates the target database if it does not exist.
pub(crate) async fn ensure_database(
    target: &dyn Driver,
    db: &str,
    retry: &RetryConfig,
    cancel: &CancellationToken,
) -> SyncResult<()> {
    let databases =
        with_retry(retry, cancel, "", Phase::Schema, || target.list_databases()).await?;
    if !databases.iter().any(|name| name == db) {
        info!(db = %db, "creating target database");
        with_retry(retry, cancel, "", Phase::Schema, || target.create_database(db)).await?;
    }
    Ok(())
}

/// Reads a source table's descriptor.
pub(crate) async fn describe(
    driver: &dyn Driver,
    db: &str,
    table: &str,
    retry: &RetryConfig,
    cancel: &CancellationToken,
) -> SyncResult<TableDescriptor> {
    with_retry(retry, cancel, table, Phase::Schema, || {
        driver.describe_table(db, table)
    })
    .await
}

/// Creates `descriptor` on the target with all of its secondary indexes.
pub(crate) async fn create_table_like(
    target: &dyn Driver,
    db: &str,
    descriptor: &TableDescriptor,
    retry: &RetryConfig,
    cancel: &CancellationToken,
) -> SyncResult<()> {
    let table = descriptor.name.as_str();
    info!(table = %table, primary_key = %descriptor.primary_key, "creating target table");
    with_retry(retry, cancel, table, Phase::Schema, || {
        target.create_table(db, descriptor)
    })
    .await?;
    for index in &descriptor.indexes {
        debug!(table = %table, index = %index, "creating index");
        with_retry(retry, cancel, table, Phase::Schema, || {
            target.create_index(db, table, index)
        })
        .await?;
    }
    Ok(())
}

/// Makes the target table match the source descriptor.
///
/// A missing table is created. An existing one must use the same primary
/// key; missing secondary indexes are added. Returns true if the table was
/// created.
pub(crate) async fn prepare_target(
    target: &dyn Driver,
    db: &str,
    source: &TableDescriptor,
    retry: &RetryConfig,
    cancel: &CancellationToken,
) -> SyncResult<bool> {
    let table = source.name.as_str();
    let existing = with_retry(retry, cancel, table, Phase::Schema, || target.list_tables(db))
        .await?;
    if !existing.iter().any(|name| name == table) {
        create_table_like(target, db, source, retry, cancel).await?;
        return Ok(true);
    }

    let current = describe(target, db, table, retry, cancel).await?;
    if current.primary_key != source.primary_key {
        return Err(SyncError::PrimaryKeyMismatch {
            table: table.to_string(),
            source_key: source.primary_key.clone(),
            target_key: current.primary_key,
        });
    }

    for index in source.indexes.difference(&current.indexes) {
        debug!(table = %table, index = %index, "creating missing index");
        with_retry(retry, cancel, table, Phase::Schema, || {
            target.create_index(db, table, index)
        })
        .await?;
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use thinker_driver::InMemoryDriver;

    fn retry() -> RetryConfig {
        RetryConfig::immediate(2)
    }

    #[tokio::test]
    async fn selects_all_tables_sorted() {
        let source = InMemoryDriver::new();
        source.insert_table("db", TableDescriptor::new("posts", "id"), vec![]);
        source.insert_table("db", TableDescriptor::new("authors", "id"), vec![]);

        let selection = select_tables(&source, "db", None, &retry(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(selection.found, vec!["authors", "posts"]);
        assert!(selection.missing.is_empty());
    }

    #[tokio::test]
    async fn allow_list_splits_found_and_missing() {
        let source = InMemoryDriver::new();
        source.insert_table("db", TableDescriptor::new("posts", "id"), vec![]);
        let allow = vec!["posts".to_string(), "ghost".to_string(), "posts".to_string()];

        let selection =
            select_tables(&source, "db", Some(&allow), &retry(), &CancellationToken::new())
                .await
                .unwrap();
        assert_eq!(selection.found, vec!["posts"]);
        assert_eq!(selection.missing, vec!["ghost"]);
    }

    #[tokio::test]
    async fn creates_missing_table_with_indexes() {
        let target = InMemoryDriver::new();
        target.create_database("db").await.unwrap();
        let desc = TableDescriptor::new("users", "uid").with_index("email");

        let created = prepare_target(&target, "db", &desc, &retry(), &CancellationToken::new())
            .await
            .unwrap();
        assert!(created);
        assert_eq!(target.describe_table("db", "users").await.unwrap(), desc);
    }

    #[tokio::test]
    async fn adds_missing_indexes_to_existing_table() {
        let target = InMemoryDriver::new();
        target.insert_table("db", TableDescriptor::new("users", "id"), vec![]);
        let desc = TableDescriptor::new("users", "id").with_index("email");

        let created = prepare_target(&target, "db", &desc, &retry(), &CancellationToken::new())
            .await
            .unwrap();
        assert!(!created);
        assert!(target
            .describe_table("db", "users")
            .await
            .unwrap()
            .has_index("email"));
    }

    #[tokio::test]
    async fn primary_key_mismatch_is_fatal() {
        let target = InMemoryDriver::new();
        target.insert_table("db", TableDescriptor::new("users", "uid"), vec![]);
        let desc = TableDescriptor::new("users", "id");

        let err = prepare_target(&target, "db", &desc, &retry(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::PrimaryKeyMismatch { .. }));
        assert_eq!(err.table(), Some("users"));
    }

    #[tokio::test]
    async fn ensure_database_is_idempotent() {
        let target = InMemoryDriver::new();
        let cancel = CancellationToken::new();
        ensure_database(&target, "db", &retry(), &cancel).await.unwrap();
        ensure_database(&target, "db", &retry(), &cancel).await.unwrap();
        assert_eq!(target.list_databases().await.unwrap(), vec!["db"]);
    }
}
