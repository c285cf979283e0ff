//! SQLite collection store
//!
//! Each collection is a table of JSON documents:
//!
//! ```sql
//! CREATE TABLE "<collection>" (_id INTEGER PRIMARY KEY, doc TEXT NOT NULL)
//! ```
//!
//! `_id` is the implicit default key and is never listed or dropped.
//! Declared indexes are expression indexes over `json_extract(doc, '$.<field>')`,
//! partial when the index is sparse.

use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use crate::domain::{validate_identifier, CollectionStore, IndexSpec};
use crate::{Result, StorageError};

/// SQLite-backed [`CollectionStore`]
///
/// Holds exactly one connection for its whole lifetime.
pub struct SqliteCollectionStore {
    conn: Mutex<Connection>,
}

impl SqliteCollectionStore {
    /// Open (or create) a store file
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let path = db_path.as_ref();
        let conn = Connection::open(path).map_err(|e| {
            StorageError::connection(format!("cannot open store at {}: {}", path.display(), e))
                .with_source(e)
        })?;
        conn.busy_timeout(Duration::from_secs(5))?;
        debug!("Opened SQLite store at {}", path.display());
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| StorageError::connection("cannot open in-memory store").with_source(e))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Release the connection, surfacing any error the engine reports on close
    pub fn close(self) -> Result<()> {
        self.conn
            .into_inner()
            .close()
            .map_err(|(_, e)| StorageError::connection("error while closing store").with_source(e))
    }

    fn ensure_collection(conn: &Connection, collection: &str) -> Result<()> {
        validate_identifier(collection)?;
        conn.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS \"{}\" (
                    _id INTEGER PRIMARY KEY,
                    doc TEXT NOT NULL
                )",
                collection
            ),
            [],
        )?;
        Ok(())
    }

    fn field_expr(field: &str) -> String {
        format!("json_extract(doc, '$.{}')", field)
    }

    fn index_statement(collection: &str, spec: &IndexSpec) -> String {
        let keys = spec
            .fields
            .iter()
            .map(|f| Self::field_expr(f))
            .collect::<Vec<_>>()
            .join(", ");

        let mut sql = format!(
            "CREATE {}INDEX \"{}\" ON \"{}\" ({})",
            if spec.unique { "UNIQUE " } else { "" },
            spec.name,
            collection,
            keys
        );

        if spec.sparse {
            let predicate = spec
                .fields
                .iter()
                .map(|f| {
                    let expr = Self::field_expr(f);
                    format!("{expr} IS NOT NULL AND {expr} <> ''")
                })
                .collect::<Vec<_>>()
                .join(" AND ");
            sql.push_str(" WHERE ");
            sql.push_str(&predicate);
        }
        sql
    }
}

#[async_trait]
impl CollectionStore for SqliteCollectionStore {
    async fn truncate(&self, collection: &str) -> Result<usize> {
        let conn = self.conn.lock();
        Self::ensure_collection(&conn, collection)?;
        let removed = conn.execute(&format!("DELETE FROM \"{}\"", collection), [])?;
        Ok(removed)
    }

    async fn insert_many(
        &self,
        collection: &str,
        documents: &[serde_json::Value],
    ) -> Result<usize> {
        let mut conn = self.conn.lock();
        Self::ensure_collection(&conn, collection)?;

        let tx = conn.transaction()?;
        let mut inserted = 0;
        {
            let mut stmt =
                tx.prepare(&format!("INSERT INTO \"{}\" (doc) VALUES (?1)", collection))?;
            for document in documents {
                let text = serde_json::to_string(document)?;
                inserted += stmt.execute(params![text])?;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    async fn list_indexes(&self, collection: &str) -> Result<Vec<String>> {
        let conn = self.conn.lock();
        Self::ensure_collection(&conn, collection)?;

        let mut stmt = conn.prepare(
            "SELECT name FROM sqlite_master
             WHERE type = 'index' AND tbl_name = ?1 AND name NOT LIKE 'sqlite_autoindex_%'
             ORDER BY name",
        )?;
        let names = stmt
            .query_map(params![collection], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(names)
    }

    async fn drop_index(&self, collection: &str, name: &str) -> Result<bool> {
        validate_identifier(name)?;
        let conn = self.conn.lock();
        Self::ensure_collection(&conn, collection)?;

        let exists = conn
            .query_row(
                "SELECT 1 FROM sqlite_master WHERE type = 'index' AND tbl_name = ?1 AND name = ?2",
                params![collection, name],
                |_| Ok(()),
            )
            .optional()?
            .is_some();
        if !exists {
            return Ok(false);
        }

        conn.execute(&format!("DROP INDEX IF EXISTS \"{}\"", name), [])?;
        Ok(true)
    }

    async fn create_index(&self, collection: &str, spec: &IndexSpec) -> Result<()> {
        spec.validate()?;
        let conn = self.conn.lock();
        Self::ensure_collection(&conn, collection)?;

        let sql = Self::index_statement(collection, spec);
        debug!("{}", sql);
        conn.execute(&sql, [])?;
        Ok(())
    }

    async fn field_values(&self, collection: &str, field: &str) -> Result<BTreeSet<String>> {
        validate_identifier(field)?;
        let conn = self.conn.lock();
        Self::ensure_collection(&conn, collection)?;

        let expr = Self::field_expr(field);
        let mut stmt = conn.prepare(&format!(
            "SELECT DISTINCT {expr} FROM \"{collection}\" WHERE {expr} IS NOT NULL"
        ))?;
        let rows = stmt.query_map([], |row| row.get::<_, SqlValue>(0))?;

        let mut values = BTreeSet::new();
        for value in rows {
            let text = match value? {
                SqlValue::Text(s) => s,
                SqlValue::Integer(i) => i.to_string(),
                SqlValue::Real(f) => f.to_string(),
                SqlValue::Null | SqlValue::Blob(_) => continue,
            };
            if !text.is_empty() {
                values.insert(text);
            }
        }
        Ok(values)
    }

    async fn find_all(&self, collection: &str) -> Result<Vec<serde_json::Value>> {
        let conn = self.conn.lock();
        Self::ensure_collection(&conn, collection)?;

        let mut stmt = conn.prepare(&format!("SELECT doc FROM \"{}\" ORDER BY _id", collection))?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut documents = Vec::new();
        for row in rows {
            documents.push(serde_json::from_str(&row?)?);
        }
        Ok(documents)
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        let conn = self.conn.lock();
        Self::ensure_collection(&conn, collection)?;

        let count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM \"{}\"", collection),
            [],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}
