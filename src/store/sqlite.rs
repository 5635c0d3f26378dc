/// SQLite persistence layer for knowledge-base documents
///
/// Every document lives in a single `documents` table keyed by (collection, id) with
/// the full document stored as JSON. Node `type` uniqueness is enforced by a partial
/// expression index, so concurrent creates of the same type are rejected by SQLite.

use crate::store::{
    apply_patch, document_id, stamp_new, Collection, Document, DocumentStore, Filter, StoreError,
};
use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions},
    Row,
};
use std::{str::FromStr, time::Duration};

/// sqlx-backed [`DocumentStore`]
#[derive(Debug, Clone)]
pub struct SqliteDocumentStore {
    /// SQLite connection pool for the document database
    pool: SqlitePool,
}

impl SqliteDocumentStore {
    /// Create store instance over an existing pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to a database URL (e.g. "sqlite://data/nodekb.db"), creating the file if missing
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        let store = Self::new(pool);
        store.init_schema().await?;
        Ok(store)
    }

    /// Private in-memory database
    ///
    /// Pinned to one connection that never expires: every SQLite `:memory:`
    /// connection is its own database.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let store = Self::new(pool);
        store.init_schema().await?;
        Ok(store)
    }

    /// Initialize the document schema
    ///
    /// Safe to call multiple times (uses IF NOT EXISTS).
    pub async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                collection TEXT NOT NULL,
                id TEXT NOT NULL,
                data JSON NOT NULL,
                created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                PRIMARY KEY (collection, id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // One node record per type, system-wide
        sqlx::query(
            r#"
            CREATE UNIQUE INDEX IF NOT EXISTS idx_nodes_type
            ON documents(json_extract(data, '$.type'))
            WHERE collection = 'n8n-nodes'
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    fn decode(row: &sqlx::sqlite::SqliteRow) -> Result<Document, StoreError> {
        let data: String = row.try_get("data")?;
        match serde_json::from_str::<Value>(&data)? {
            Value::Object(doc) => Ok(doc),
            other => Err(StoreError::InvalidDocument(format!(
                "stored document is not an object: {}",
                other
            ))),
        }
    }

    /// Translate constraint failures into store-level errors
    fn map_write_error(collection: Collection, doc: &Document, err: sqlx::Error) -> StoreError {
        let is_unique = err
            .as_database_error()
            .map(|db| db.is_unique_violation())
            .unwrap_or(false);
        if !is_unique {
            return StoreError::Database(err);
        }

        let message = err.to_string();
        let field = if message.contains("documents.id") {
            "id"
        } else {
            collection.unique_field().unwrap_or("id")
        };
        StoreError::UniqueViolation {
            collection,
            field: field.to_string(),
            value: super::unique_value(doc, field).unwrap_or_default(),
        }
    }
}

/// JSON path for a top-level field; rejects anything that is not a plain identifier
fn field_path(field: &str) -> Result<String, StoreError> {
    let valid = !field.is_empty()
        && field
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if !valid {
        return Err(StoreError::InvalidDocument(format!(
            "unsupported filter field '{}'",
            field
        )));
    }
    Ok(format!("$.\"{}\"", field))
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    async fn find(
        &self,
        collection: Collection,
        filter: &Filter,
        limit: Option<usize>,
    ) -> Result<Vec<Document>, StoreError> {
        // SQLite treats a negative LIMIT as "no limit"
        let limit = limit.map(|l| l as i64).unwrap_or(-1);

        let rows = match filter {
            Filter::All => {
                sqlx::query(
                    "SELECT data FROM documents WHERE collection = ? ORDER BY rowid LIMIT ?",
                )
                .bind(collection.slug())
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
            Filter::Equals { field, value } => {
                sqlx::query(
                    r#"
                    SELECT data FROM documents
                    WHERE collection = ? AND json_extract(data, ?) = json_extract(?, '$')
                    ORDER BY rowid LIMIT ?
                    "#,
                )
                .bind(collection.slug())
                .bind(field_path(field)?)
                .bind(serde_json::to_string(value)?)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
            Filter::In { field, values } => {
                if values.is_empty() {
                    return Ok(Vec::new());
                }
                sqlx::query(
                    r#"
                    SELECT data FROM documents
                    WHERE collection = ?
                      AND json_extract(data, ?) IN (SELECT value FROM json_each(?))
                    ORDER BY rowid LIMIT ?
                    "#,
                )
                .bind(collection.slug())
                .bind(field_path(field)?)
                .bind(serde_json::to_string(values)?)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.iter().map(Self::decode).collect()
    }

    async fn create(&self, collection: Collection, data: Document) -> Result<Document, StoreError> {
        let doc = stamp_new(data);
        let id = document_id(&doc)
            .ok_or_else(|| StoreError::InvalidDocument("document id could not be assigned".to_string()))?;
        let json = serde_json::to_string(&doc)?;

        sqlx::query("INSERT INTO documents (collection, id, data) VALUES (?, ?, ?)")
            .bind(collection.slug())
            .bind(&id)
            .bind(&json)
            .execute(&self.pool)
            .await
            .map_err(|e| Self::map_write_error(collection, &doc, e))?;

        Ok(doc)
    }

    async fn update(
        &self,
        collection: Collection,
        id: &str,
        data: Document,
    ) -> Result<Document, StoreError> {
        // Take the write lock before reading: a deferred transaction fails with
        // SQLITE_BUSY on the read-to-write upgrade when other writers are active
        let mut tx = self.pool.begin_with("BEGIN IMMEDIATE").await?;

        let row = sqlx::query("SELECT data FROM documents WHERE collection = ? AND id = ?")
            .bind(collection.slug())
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| StoreError::NotFound {
                collection,
                id: id.to_string(),
            })?;

        let patched = apply_patch(Self::decode(&row)?, data);
        let json = serde_json::to_string(&patched)?;

        sqlx::query(
            r#"
            UPDATE documents SET data = ?, updated_at = CURRENT_TIMESTAMP
            WHERE collection = ? AND id = ?
            "#,
        )
        .bind(&json)
        .bind(collection.slug())
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(|e| Self::map_write_error(collection, &patched, e))?;

        tx.commit().await?;
        Ok(patched)
    }

    async fn find_by_id(&self, collection: Collection, id: &str) -> Result<Document, StoreError> {
        let row = sqlx::query("SELECT data FROM documents WHERE collection = ? AND id = ?")
            .bind(collection.slug())
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Self::decode(&row),
            None => Err(StoreError::NotFound {
                collection,
                id: id.to_string(),
            }),
        }
    }
}
