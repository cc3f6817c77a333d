//! Directory-backed driver.

use crate::driver::Driver;
use crate::error::{DriverError, DriverResult};
use crate::memory::InMemoryDriver;
use crate::types::{
    CursorId, OrderedQuery, Page, TableDescriptor, WriteBatch, WriteSummary, DEFAULT_PRIMARY_KEY,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use thinker_value::Value;
use tracing::debug;

const TABLE_EXTENSION: &str = "json";

/// A server whose databases live in a directory.
///
/// Layout: `<root>/<db>/<table>.json`, each file holding
///
/// ```text
/// {"primary_key": "id", "indexes": ["by_name"], "documents": [ ... ]}
/// ```
///
/// with documents in raw JSON form (pseudo-types as `$reql_type$` objects).
/// Everything is loaded on [`DirectoryDriver::open`]. Schema changes are
/// written back immediately; document writes mark the table dirty and reach
/// disk on [`Driver::flush_table`], through a temporary file and a rename.
///
/// # Example
///
/// ```no_run
/// use thinker_driver::{DirectoryDriver, Driver};
///
/// # async fn example() -> thinker_driver::DriverResult<()> {
/// let driver = DirectoryDriver::open("/var/lib/thinker/source").await?;
/// let tables = driver.list_tables("test").await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct DirectoryDriver {
    root: PathBuf,
    inner: InMemoryDriver,
    dirty: Mutex<BTreeSet<(String, String)>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct TableFile {
    #[serde(default = "default_primary_key")]
    primary_key: String,
    #[serde(default)]
    indexes: BTreeSet<String>,
    #[serde(default)]
    documents: Vec<serde_json::Value>,
}

fn default_primary_key() -> String {
    DEFAULT_PRIMARY_KEY.to_string()
}

impl DirectoryDriver {
    /// Opens (creating if needed) the directory and loads every table.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be read or a table file is
    /// malformed.
    pub async fn open(root: impl Into<PathBuf>) -> DriverResult<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        let inner = InMemoryDriver::new();

        let mut dbs = tokio::fs::read_dir(&root).await?;
        while let Some(db_entry) = dbs.next_entry().await? {
            if !db_entry.file_type().await?.is_dir() {
                continue;
            }
            let db = db_entry.file_name().to_string_lossy().into_owned();
            inner.create_database(&db).await?;

            let mut tables = tokio::fs::read_dir(db_entry.path()).await?;
            while let Some(entry) = tables.next_entry().await? {
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) != Some(TABLE_EXTENSION) {
                    continue;
                }
                let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                    continue;
                };
                let file: TableFile = serde_json::from_slice(&tokio::fs::read(&path).await?)?;
                let documents = file
                    .documents
                    .into_iter()
                    .map(Value::from_json)
                    .collect::<Result<Vec<_>, _>>()?;
                if documents.iter().any(|doc| doc.get(&file.primary_key).is_none()) {
                    return Err(DriverError::MissingPrimaryKey(file.primary_key));
                }
                debug!(db = %db, table = %name, documents = documents.len(), "loaded table");
                inner.insert_table(
                    &db,
                    TableDescriptor {
                        name: name.to_string(),
                        primary_key: file.primary_key,
                        indexes: file.indexes,
                    },
                    documents,
                );
            }
        }

        Ok(Self {
            root,
            inner,
            dirty: Mutex::new(BTreeSet::new()),
        })
    }

    /// Returns the root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Writes every dirty table back to disk.
    ///
    /// # Errors
    ///
    /// Returns the first failure; tables not yet written stay dirty.
    pub async fn flush(&self) -> DriverResult<()> {
        let dirty: Vec<(String, String)> = self.dirty.lock().iter().cloned().collect();
        for (db, table) in dirty {
            self.flush_table(&db, &table).await?;
        }
        Ok(())
    }

    /// Number of tables with writes not yet on disk.
    pub fn dirty_tables(&self) -> usize {
        self.dirty.lock().len()
    }

    fn table_path(&self, db: &str, table: &str) -> PathBuf {
        self.root.join(db).join(format!("{table}.{TABLE_EXTENSION}"))
    }

    async fn persist(&self, db: &str, table: &str) -> DriverResult<()> {
        let descriptor = self.inner.describe_table(db, table).await?;
        let documents = self
            .inner
            .documents(db, table)
            .unwrap_or_default()
            .iter()
            .map(Value::to_json)
            .collect::<Result<Vec<_>, _>>()?;
        let file = TableFile {
            primary_key: descriptor.primary_key,
            indexes: descriptor.indexes,
            documents,
        };

        let path = self.table_path(db, table);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(&file)?).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }
}

#[async_trait]
impl Driver for DirectoryDriver {
    async fn list_databases(&self) -> DriverResult<Vec<String>> {
        self.inner.list_databases().await
    }

    async fn create_database(&self, db: &str) -> DriverResult<()> {
        tokio::fs::create_dir_all(self.root.join(db)).await?;
        self.inner.create_database(db).await
    }

    async fn list_tables(&self, db: &str) -> DriverResult<Vec<String>> {
        self.inner.list_tables(db).await
    }

    async fn describe_table(&self, db: &str, table: &str) -> DriverResult<TableDescriptor> {
        self.inner.describe_table(db, table).await
    }

    async fn create_table(&self, db: &str, descriptor: &TableDescriptor) -> DriverResult<()> {
        self.inner.create_table(db, descriptor).await?;
        self.persist(db, &descriptor.name).await
    }

    async fn create_index(&self, db: &str, table: &str, index: &str) -> DriverResult<()> {
        self.inner.create_index(db, table, index).await?;
        self.persist(db, table).await
    }

    async fn open_cursor(
        &self,
        db: &str,
        table: &str,
        query: &OrderedQuery,
    ) -> DriverResult<CursorId> {
        self.inner.open_cursor(db, table, query).await
    }

    async fn fetch_page(&self, cursor: CursorId, max: usize) -> DriverResult<Page> {
        self.inner.fetch_page(cursor, max).await
    }

    async fn close_cursor(&self, cursor: CursorId) -> DriverResult<()> {
        self.inner.close_cursor(cursor).await
    }

    async fn write(&self, db: &str, table: &str, batch: &WriteBatch) -> DriverResult<WriteSummary> {
        let summary = self.inner.write(db, table, batch).await?;
        self.dirty.lock().insert((db.to_string(), table.to_string()));
        Ok(summary)
    }

    async fn flush_table(&self, db: &str, table: &str) -> DriverResult<()> {
        let key = (db.to_string(), table.to_string());
        if !self.dirty.lock().contains(&key) {
            return Ok(());
        }
        self.persist(db, table).await?;
        self.dirty.lock().remove(&key);
        debug!(db = %db, table = %table, "flushed table");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ConflictPolicy;

    #[tokio::test]
    async fn tables_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let driver = DirectoryDriver::open(dir.path()).await.unwrap();
            driver.create_database("test").await.unwrap();
            driver
                .create_table("test", &TableDescriptor::new("users", "id"))
                .await
                .unwrap();
            driver.create_index("test", "users", "name").await.unwrap();
            let batch = WriteBatch::Insert {
                documents: vec![
                    Value::object([("id", Value::from(2)), ("name", Value::from("bob"))]),
                    Value::object([("id", Value::from(1)), ("blob", Value::binary(b"hi".to_vec()))]),
                ],
                conflict: ConflictPolicy::Error,
            };
            driver.write("test", "users", &batch).await.unwrap();
            driver.flush().await.unwrap();
        }

        assert!(dir.path().join("test").join("users.json").exists());

        let driver = DirectoryDriver::open(dir.path()).await.unwrap();
        let desc = driver.describe_table("test", "users").await.unwrap();
        assert_eq!(desc, TableDescriptor::new("users", "id").with_index("name"));
        let cursor = driver
            .open_cursor("test", "users", &OrderedQuery::new("id"))
            .await
            .unwrap();
        let page = driver.fetch_page(cursor, 10).await.unwrap();
        assert_eq!(page.documents.len(), 2);
        assert_eq!(page.documents[0].get("blob"), Some(&Value::binary(b"hi".to_vec())));
    }

    #[tokio::test]
    async fn ignores_stray_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("test")).unwrap();
        std::fs::write(dir.path().join("README"), "not a database").unwrap();
        std::fs::write(dir.path().join("test").join("notes.txt"), "not a table").unwrap();

        let driver = DirectoryDriver::open(dir.path()).await.unwrap();
        assert_eq!(driver.list_databases().await.unwrap(), vec!["test"]);
        assert!(driver.list_tables("test").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn primary_key_defaults_to_id() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("test")).unwrap();
        std::fs::write(
            dir.path().join("test").join("users.json"),
            r#"{"documents": [{"id": "a"}]}"#,
        )
        .unwrap();

        let driver = DirectoryDriver::open(dir.path()).await.unwrap();
        let desc = driver.describe_table("test", "users").await.unwrap();
        assert_eq!(desc.primary_key, "id");
    }

    #[tokio::test]
    async fn writes_reach_disk_on_flush() {
        let dir = tempfile::tempdir().unwrap();
        let driver = DirectoryDriver::open(dir.path()).await.unwrap();
        driver.create_database("test").await.unwrap();
        driver
            .create_table("test", &TableDescriptor::new("t", "id"))
            .await
            .unwrap();
        for i in 0..5 {
            let batch = WriteBatch::Replace {
                documents: vec![Value::object([("id", i)])],
            };
            driver.write("test", "t", &batch).await.unwrap();
        }
        assert_eq!(driver.dirty_tables(), 1);

        let before = DirectoryDriver::open(dir.path()).await.unwrap();
        assert!(before.inner.documents("test", "t").unwrap().is_empty());

        driver.flush_table("test", "t").await.unwrap();
        assert_eq!(driver.dirty_tables(), 0);
        let after = DirectoryDriver::open(dir.path()).await.unwrap();
        assert_eq!(after.inner.documents("test", "t").unwrap().len(), 5);

        // Clean tables are not rewritten.
        let path = dir.path().join("test").join("t.json");
        std::fs::remove_file(&path).unwrap();
        driver.flush_table("test", "t").await.unwrap();
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn documents_without_primary_key_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("test")).unwrap();
        std::fs::write(
            dir.path().join("test").join("users.json"),
            r#"{"primary_key": "uid", "documents": [{"id": "a"}]}"#,
        )
        .unwrap();
        let err = DirectoryDriver::open(dir.path()).await.unwrap_err();
        assert!(matches!(err, DriverError::MissingPrimaryKey(ref pk) if pk == "uid"));
    }

    #[tokio::test]
    async fn malformed_table_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("test")).unwrap();
        std::fs::write(dir.path().join("test").join("users.json"), "{").unwrap();
        assert!(DirectoryDriver::open(dir.path()).await.is_err());
    }
}
