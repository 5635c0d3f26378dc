/// Document store collaborator
///
/// The sync routines only ever talk to storage through the [`DocumentStore`] trait:
/// a find/create/update/find-by-id surface over JSON documents grouped in collections.
/// Two implementations ship with the crate:
/// - `SqliteDocumentStore`: sqlx-backed persistence, one JSON row per document
/// - `MemoryDocumentStore`: in-process maps for embedding and tests

// SQLite persistence with sqlx
pub mod sqlite;

// In-process store
pub mod memory;

pub use memory::MemoryDocumentStore;
pub use sqlite::SqliteDocumentStore;

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

/// A stored document: a JSON object that always carries a string `id` once persisted
pub type Document = Map<String, Value>;

/// Collections known to the knowledge base
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    /// Workflow templates carrying the embedded n8n node list
    WorkflowTemplates,
    /// Normalized node records, one per distinct node `type`
    Nodes,
}

impl Collection {
    /// Collection slug used as the storage key
    pub fn slug(&self) -> &'static str {
        match self {
            Collection::WorkflowTemplates => "n8n-workflow-templates",
            Collection::Nodes => "n8n-nodes",
        }
    }

    /// Field that must be unique across the collection, besides `id`
    pub fn unique_field(&self) -> Option<&'static str> {
        match self {
            Collection::WorkflowTemplates => None,
            Collection::Nodes => Some("type"),
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

/// Query filter for [`DocumentStore::find`]
///
/// Field names address top-level document fields only.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Every document in the collection
    All,
    /// `field == value`
    Equals { field: String, value: Value },
    /// `field` is one of `values`
    In { field: String, values: Vec<Value> },
}

impl Filter {
    pub fn equals(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Equals { field: field.into(), value: value.into() }
    }

    pub fn is_in(field: impl Into<String>, values: Vec<Value>) -> Self {
        Filter::In { field: field.into(), values }
    }

    /// Evaluate the filter against a single document
    pub fn matches(&self, doc: &Document) -> bool {
        match self {
            Filter::All => true,
            Filter::Equals { field, value } => doc.get(field) == Some(value),
            Filter::In { field, values } => doc
                .get(field)
                .map(|actual| values.contains(actual))
                .unwrap_or(false),
        }
    }
}

/// Errors surfaced by a document store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Document not found: {collection}/{id}")]
    NotFound { collection: Collection, id: String },
    #[error("Unique constraint violated on {collection}.{field}: {value}")]
    UniqueViolation {
        collection: Collection,
        field: String,
        value: String,
    },
    #[error("Invalid document: {0}")]
    InvalidDocument(String),
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, StoreError::UniqueViolation { .. })
    }
}

/// Asynchronous CRUD surface over JSON documents
///
/// `update` is a patch: top-level fields in `data` replace the stored ones, a `null`
/// removes the stored field, every other stored field is kept. All calls may fail independently, including with
/// [`StoreError::UniqueViolation`] when a node `type` is already taken.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Find up to `limit` documents matching `filter` (`None` means no limit)
    async fn find(
        &self,
        collection: Collection,
        filter: &Filter,
        limit: Option<usize>,
    ) -> Result<Vec<Document>, StoreError>;

    /// Insert a document; an `id` is generated when `data` does not carry one
    async fn create(&self, collection: Collection, data: Document) -> Result<Document, StoreError>;

    /// Patch an existing document and return the stored result
    async fn update(
        &self,
        collection: Collection,
        id: &str,
        data: Document,
    ) -> Result<Document, StoreError>;

    /// Fetch a single document by id
    async fn find_by_id(&self, collection: Collection, id: &str) -> Result<Document, StoreError>;
}

/// Read the document id as a string, accepting numeric ids supplied by callers
pub fn document_id(doc: &Document) -> Option<String> {
    match doc.get("id")? {
        Value::String(id) if !id.is_empty() => Some(id.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Assign the id field and the timestamps expected on freshly created documents
pub(crate) fn stamp_new(mut data: Document) -> Document {
    let id = document_id(&data).unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let now = Value::String(chrono::Utc::now().to_rfc3339());
    data.insert("id".to_string(), Value::String(id));
    data.insert("createdAt".to_string(), now.clone());
    data.insert("updatedAt".to_string(), now);
    data
}

/// Apply a patch on top of a stored document, keeping identity and creation time
pub(crate) fn apply_patch(mut stored: Document, patch: Document) -> Document {
    for (key, value) in patch {
        if key == "id" || key == "createdAt" {
            continue;
        }
        if value.is_null() {
            stored.remove(&key);
        } else {
            stored.insert(key, value);
        }
    }
    stored.insert(
        "updatedAt".to_string(),
        Value::String(chrono::Utc::now().to_rfc3339()),
    );
    stored
}

/// Render a unique-key value for error messages
pub(crate) fn unique_value(doc: &Document, field: &str) -> Option<String> {
    match doc.get(field)? {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}
