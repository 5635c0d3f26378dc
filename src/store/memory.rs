/// In-process document store
///
/// Keeps every collection in an insertion-ordered map behind a tokio RwLock.
/// Enforces the same uniqueness rules as the SQLite store so sync behavior
/// (including rejected duplicate creates) is identical in tests and embeddings.

use crate::store::{
    apply_patch, document_id, stamp_new, unique_value, Collection, Document, DocumentStore,
    Filter, StoreError,
};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct CollectionData {
    /// Document ids in insertion order
    order: Vec<String>,
    docs: HashMap<String, Document>,
}

impl CollectionData {
    fn conflicting(&self, collection: Collection, candidate: &Document, own_id: &str) -> Option<StoreError> {
        let field = collection.unique_field()?;
        let value = unique_value(candidate, field)?;
        let taken = self.docs.iter().any(|(id, doc)| {
            id != own_id && unique_value(doc, field).as_deref() == Some(value.as_str())
        });
        taken.then(|| StoreError::UniqueViolation {
            collection,
            field: field.to_string(),
            value,
        })
    }
}

#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    collections: RwLock<HashMap<Collection, CollectionData>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of documents stored in a collection
    pub async fn count(&self, collection: Collection) -> usize {
        self.collections
            .read()
            .await
            .get(&collection)
            .map(|data| data.docs.len())
            .unwrap_or(0)
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn find(
        &self,
        collection: Collection,
        filter: &Filter,
        limit: Option<usize>,
    ) -> Result<Vec<Document>, StoreError> {
        let guard = self.collections.read().await;
        let Some(data) = guard.get(&collection) else {
            return Ok(Vec::new());
        };

        let found = data
            .order
            .iter()
            .filter_map(|id| data.docs.get(id))
            .filter(|doc| filter.matches(doc))
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect();

        Ok(found)
    }

    async fn create(&self, collection: Collection, data: Document) -> Result<Document, StoreError> {
        let doc = stamp_new(data);
        let id = document_id(&doc)
            .ok_or_else(|| StoreError::InvalidDocument("document id could not be assigned".to_string()))?;

        let mut guard = self.collections.write().await;
        let entry = guard.entry(collection).or_default();

        if entry.docs.contains_key(&id) {
            return Err(StoreError::UniqueViolation {
                collection,
                field: "id".to_string(),
                value: id,
            });
        }
        if let Some(err) = entry.conflicting(collection, &doc, &id) {
            return Err(err);
        }

        entry.order.push(id.clone());
        entry.docs.insert(id, doc.clone());
        Ok(doc)
    }

    async fn update(
        &self,
        collection: Collection,
        id: &str,
        data: Document,
    ) -> Result<Document, StoreError> {
        let mut guard = self.collections.write().await;
        let entry = guard.entry(collection).or_default();

        let stored = entry.docs.get(id).cloned().ok_or_else(|| StoreError::NotFound {
            collection,
            id: id.to_string(),
        })?;
        let patched = apply_patch(stored, data);

        if let Some(err) = entry.conflicting(collection, &patched, id) {
            return Err(err);
        }

        entry.docs.insert(id.to_string(), patched.clone());
        Ok(patched)
    }

    async fn find_by_id(&self, collection: Collection, id: &str) -> Result<Document, StoreError> {
        self.collections
            .read()
            .await
            .get(&collection)
            .and_then(|data| data.docs.get(id))
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                collection,
                id: id.to_string(),
            })
    }
}
