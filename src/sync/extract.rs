/// Extraction / reconciliation of embedded workflow nodes
///
/// Turns the `workflow.nodes` list of a workflow template into node records:
/// one lookup for every referenced type, then a create for unseen types and a merge
/// for known ones, all dispatched together. Individual writes may fail without
/// affecting the rest of the batch.

use crate::kb::{NodeDescriptor, WorkflowDocument, WriteOperation};
use crate::store::{document_id, Collection, Document, DocumentStore, Filter, StoreError};
use crate::sync::{insert_link, linked_workflows, SyncFailure};
use futures::future::join_all;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;

/// Failures that stop extraction for a whole document
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("Workflow nodes is not an array (found {0})")]
    NotASequence(&'static str),
    #[error("Node lookup failed: {0}")]
    Lookup(#[from] StoreError),
}

/// Result of reconciling one workflow's embedded nodes
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExtractionOutcome {
    /// Ids of every node record persisted, in first-appearance order, without duplicates
    pub node_ids: Vec<String>,
    /// Types that got a new node record
    pub created: Vec<String>,
    /// Types merged onto an existing node record
    pub updated: Vec<String>,
    pub failures: Vec<SyncFailure>,
    /// Descriptors ignored because they carry no usable `type`
    pub skipped: usize,
}

/// Embedded descriptors collapsed per type
#[derive(Debug)]
struct PendingNode {
    node_type: String,
    name: String,
    parameters: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteKind {
    Create,
    Update,
}

/// Collapse descriptors sharing a type: later names win, parameters only when supplied
fn collect_pending(nodes: &[Value], outcome: &mut ExtractionOutcome) -> Vec<PendingNode> {
    let mut pending: Vec<PendingNode> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for raw in nodes {
        let descriptor = match serde_json::from_value::<NodeDescriptor>(raw.clone()) {
            Ok(d) if !d.node_type.is_empty() => d,
            Ok(_) => {
                tracing::warn!("⚠️ Skipping embedded node with empty type");
                outcome.skipped += 1;
                continue;
            }
            Err(e) => {
                tracing::warn!("⚠️ Skipping malformed embedded node: {}", e);
                outcome.skipped += 1;
                continue;
            }
        };

        match index.get(&descriptor.node_type) {
            Some(&i) => {
                let entry = &mut pending[i];
                entry.name = descriptor.name;
                if descriptor.parameters.is_some() {
                    entry.parameters = descriptor.parameters;
                }
            }
            None => {
                index.insert(descriptor.node_type.clone(), pending.len());
                pending.push(PendingNode {
                    node_type: descriptor.node_type,
                    name: descriptor.name,
                    parameters: descriptor.parameters,
                });
            }
        }
    }

    pending
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Data for a brand-new node record
fn create_data(node: &PendingNode, link: Option<&str>) -> Document {
    let mut data = Document::new();
    data.insert("name".to_string(), Value::String(node.name.clone()));
    data.insert("type".to_string(), Value::String(node.node_type.clone()));
    data.insert("description".to_string(), Value::String(String::new()));
    let properties = node
        .parameters
        .as_ref()
        .map(|p| p.to_string())
        .unwrap_or_else(|| "{}".to_string());
    data.insert("properties".to_string(), Value::String(properties));
    let workflows = link.map(|id| vec![Value::String(id.to_string())]).unwrap_or_default();
    data.insert("workflows".to_string(), Value::Array(workflows));
    data
}

/// Patch merging a descriptor onto an existing record
///
/// Description and usage guidelines are never sent, so the stored values survive.
fn merge_data(node: &PendingNode, existing: &Document, link: Option<&str>) -> Document {
    let mut data = Document::new();
    data.insert("name".to_string(), Value::String(node.name.clone()));
    if let Some(parameters) = &node.parameters {
        data.insert("properties".to_string(), Value::String(parameters.to_string()));
    }
    if let Some(id) = link {
        let mut workflows = linked_workflows(existing);
        if insert_link(&mut workflows, id) {
            data.insert(
                "workflows".to_string(),
                Value::Array(workflows.into_iter().map(Value::String).collect()),
            );
        }
    }
    data
}

/// Reconcile the embedded nodes of `workflow` against the node collection
///
/// The workflow id is written onto node records only for `update` operations, where it
/// is already committed. On `create` the backward link is left to the backfill step.
/// A missing node list yields an empty outcome; a node list that is not an array is an
/// error for the caller to log.
pub async fn extract_nodes(
    store: &dyn DocumentStore,
    workflow: &WorkflowDocument,
    operation: WriteOperation,
) -> Result<ExtractionOutcome, ExtractError> {
    let workflow_id = workflow.id.as_deref().unwrap_or("<new>");
    tracing::info!(workflow_id, %operation, "🔎 Extracting nodes from workflow");

    let mut outcome = ExtractionOutcome::default();
    let nodes = match workflow.embedded_nodes() {
        None | Some(Value::Null) => {
            tracing::debug!(workflow_id, "Workflow has no embedded node list");
            return Ok(outcome);
        }
        Some(Value::Array(nodes)) => nodes,
        Some(other) => return Err(ExtractError::NotASequence(json_kind(other))),
    };

    let pending = collect_pending(nodes, &mut outcome);
    if pending.is_empty() {
        return Ok(outcome);
    }

    let link = match operation {
        WriteOperation::Update => workflow.id.as_deref(),
        WriteOperation::Create => None,
    };

    // Single batched lookup for every referenced type
    let types: Vec<Value> = pending
        .iter()
        .map(|node| Value::String(node.node_type.clone()))
        .collect();
    let existing = store
        .find(Collection::Nodes, &Filter::is_in("type", types), Some(pending.len()))
        .await?;

    let existing_by_type: HashMap<String, Document> = existing
        .into_iter()
        .filter_map(|doc| {
            let node_type = doc.get("type")?.as_str()?.to_string();
            Some((node_type, doc))
        })
        .collect();

    let writes = pending.iter().map(|node| {
        let existing = existing_by_type.get(&node.node_type);
        async move {
            let result = match existing {
                Some(doc) => {
                    let Some(id) = document_id(doc) else {
                        let err = StoreError::InvalidDocument(format!(
                            "stored node record for '{}' has no id",
                            node.node_type
                        ));
                        return (node, WriteKind::Update, Err(err));
                    };
                    tracing::debug!(node_type = %node.node_type, node_id = %id, "Merging onto existing node record");
                    let updated = store
                        .update(Collection::Nodes, &id, merge_data(node, doc, link))
                        .await;
                    updated.map(|_| id)
                }
                None => {
                    tracing::debug!(node_type = %node.node_type, "Creating node record");
                    store
                        .create(Collection::Nodes, create_data(node, link))
                        .await
                        .and_then(|doc| {
                            document_id(&doc).ok_or_else(|| {
                                StoreError::InvalidDocument("created node record has no id".to_string())
                            })
                        })
                }
            };
            let kind = if existing.is_some() { WriteKind::Update } else { WriteKind::Create };
            (node, kind, result)
        }
    });

    for (node, kind, result) in join_all(writes).await {
        match result {
            Ok(id) => {
                insert_link(&mut outcome.node_ids, &id);
                match kind {
                    WriteKind::Create => outcome.created.push(node.node_type.clone()),
                    WriteKind::Update => outcome.updated.push(node.node_type.clone()),
                }
            }
            Err(e) => {
                tracing::error!(workflow_id, node_type = %node.node_type, "❌ Error processing node: {}", e);
                outcome.failures.push(SyncFailure {
                    key: node.node_type.clone(),
                    message: e.to_string(),
                });
            }
        }
    }

    tracing::info!(
        workflow_id,
        linked = outcome.node_ids.len(),
        created = outcome.created.len(),
        updated = outcome.updated.len(),
        failed = outcome.failures.len(),
        "✅ Node extraction finished"
    );

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kb::NodeRecord;
    use crate::store::MemoryDocumentStore;
    use async_trait::async_trait;
    use serde_json::json;
    use tracing_test::traced_test;

    fn workflow(id: &str, nodes: Value) -> WorkflowDocument {
        WorkflowDocument {
            id: Some(id.to_string()),
            name: format!("workflow {}", id),
            workflow: json!({ "nodes": nodes }),
            ..Default::default()
        }
    }

    async fn node_by_type(store: &dyn DocumentStore, node_type: &str) -> NodeRecord {
        let docs = store
            .find(Collection::Nodes, &Filter::equals("type", node_type), None)
            .await
            .unwrap();
        assert_eq!(docs.len(), 1, "expected exactly one record for {}", node_type);
        NodeRecord::from_document(docs[0].clone()).unwrap()
    }

    /// Rejects writes for one node type, delegates everything else
    struct RejectingStore {
        inner: MemoryDocumentStore,
        rejected_type: &'static str,
    }

    #[async_trait]
    impl DocumentStore for RejectingStore {
        async fn find(
            &self,
            collection: Collection,
            filter: &Filter,
            limit: Option<usize>,
        ) -> Result<Vec<Document>, StoreError> {
            self.inner.find(collection, filter, limit).await
        }

        async fn create(&self, collection: Collection, data: Document) -> Result<Document, StoreError> {
            if data.get("type") == Some(&json!(self.rejected_type)) {
                return Err(StoreError::UniqueViolation {
                    collection,
                    field: "type".to_string(),
                    value: self.rejected_type.to_string(),
                });
            }
            self.inner.create(collection, data).await
        }

        async fn update(
            &self,
            collection: Collection,
            id: &str,
            data: Document,
        ) -> Result<Document, StoreError> {
            self.inner.update(collection, id, data).await
        }

        async fn find_by_id(&self, collection: Collection, id: &str) -> Result<Document, StoreError> {
            self.inner.find_by_id(collection, id).await
        }
    }

    #[tokio::test]
    async fn test_one_record_per_distinct_type() {
        let store = MemoryDocumentStore::new();
        let wf = workflow(
            "1",
            json!([
                {"type": "Set", "name": "Set1", "parameters": {"a": 1}},
                {"type": "Set", "name": "Set2", "parameters": {"a": 2}},
                {"type": "If", "name": "If"}
            ]),
        );

        let outcome = extract_nodes(&store, &wf, WriteOperation::Update).await.unwrap();

        assert_eq!(outcome.node_ids.len(), 2);
        assert_eq!(outcome.created, vec!["Set".to_string(), "If".to_string()]);
        assert_eq!(store.count(Collection::Nodes).await, 2);

        let set = node_by_type(&store, "Set").await;
        assert_eq!(set.name, "Set2");
        assert_eq!(set.properties.as_deref(), Some(r#"{"a":2}"#));
        assert_eq!(set.workflows, vec!["1".to_string()]);
        assert_eq!(outcome.node_ids[0], set.id);

        let if_node = node_by_type(&store, "If").await;
        assert_eq!(if_node.properties.as_deref(), Some("{}"));
        assert_eq!(if_node.description, "");
    }

    #[tokio::test]
    async fn test_resubmitting_does_not_duplicate() {
        let store = MemoryDocumentStore::new();
        let wf = workflow("7", json!([{"type": "Set", "name": "Set", "parameters": {"a": 1}}]));

        let first = extract_nodes(&store, &wf, WriteOperation::Update).await.unwrap();
        let second = extract_nodes(&store, &wf, WriteOperation::Update).await.unwrap();

        assert_eq!(first.created, vec!["Set".to_string()]);
        assert!(second.created.is_empty());
        assert_eq!(second.updated, vec!["Set".to_string()]);
        assert_eq!(first.node_ids, second.node_ids);
        assert_eq!(store.count(Collection::Nodes).await, 1);
        assert_eq!(node_by_type(&store, "Set").await.workflows, vec!["7".to_string()]);
    }

    #[tokio::test]
    async fn test_merge_keeps_parameters_and_description() {
        let store = MemoryDocumentStore::new();
        store
            .create(
                Collection::Nodes,
                json!({
                    "name": "HTTP",
                    "type": "n8n-nodes-base.httpRequest",
                    "description": "Performs HTTP requests",
                    "usageGuidelines": "Prefer GET for reads",
                    "properties": "{\"url\":\"https://a\"}",
                    "workflows": ["1"]
                })
                .as_object()
                .cloned()
                .unwrap(),
            )
            .await
            .unwrap();

        let wf = workflow("2", json!([{"type": "n8n-nodes-base.httpRequest", "name": "Fetch"}]));
        let outcome = extract_nodes(&store, &wf, WriteOperation::Update).await.unwrap();
        assert_eq!(outcome.updated.len(), 1);

        let node = node_by_type(&store, "n8n-nodes-base.httpRequest").await;
        assert_eq!(node.name, "Fetch");
        assert_eq!(node.description, "Performs HTTP requests");
        assert_eq!(node.usage_guidelines.as_deref(), Some("Prefer GET for reads"));
        assert_eq!(node.properties.as_deref(), Some("{\"url\":\"https://a\"}"));
        assert_eq!(node.workflows, vec!["1".to_string(), "2".to_string()]);
    }

    #[tokio::test]
    async fn test_create_operation_defers_backward_link() {
        let store = MemoryDocumentStore::new();
        let wf = workflow("9", json!([{"type": "Set", "name": "Set"}]));

        let outcome = extract_nodes(&store, &wf, WriteOperation::Create).await.unwrap();
        assert_eq!(outcome.node_ids.len(), 1);
        assert!(node_by_type(&store, "Set").await.workflows.is_empty());
    }

    #[tokio::test]
    async fn test_non_sequence_nodes_is_rejected() {
        let store = MemoryDocumentStore::new();
        let mut wf = workflow("3", json!([]));
        wf.workflow = json!({"nodes": "not a list"});

        let err = extract_nodes(&store, &wf, WriteOperation::Update).await.unwrap_err();
        assert!(matches!(err, ExtractError::NotASequence("string")));
        assert_eq!(store.count(Collection::Nodes).await, 0);
    }

    #[tokio::test]
    async fn test_missing_nodes_is_a_no_op() {
        let store = MemoryDocumentStore::new();
        let mut wf = workflow("3", json!([]));
        wf.workflow = json!({"connections": {}});

        let outcome = extract_nodes(&store, &wf, WriteOperation::Update).await.unwrap();
        assert_eq!(outcome, ExtractionOutcome::default());
    }

    #[tokio::test]
    async fn test_descriptors_without_type_are_skipped() {
        let store = MemoryDocumentStore::new();
        let wf = workflow(
            "4",
            json!([{"name": "no type"}, {"type": "", "name": "empty"}, 12, {"type": "Set", "name": "ok"}]),
        );

        let outcome = extract_nodes(&store, &wf, WriteOperation::Update).await.unwrap();
        assert_eq!(outcome.skipped, 3);
        assert_eq!(outcome.created, vec!["Set".to_string()]);
    }

    #[tokio::test]
    #[traced_test]
    async fn test_partial_failure_keeps_the_rest() {
        let store = RejectingStore {
            inner: MemoryDocumentStore::new(),
            rejected_type: "Broken",
        };
        let wf = workflow(
            "5",
            json!([
                {"type": "Set", "name": "Set"},
                {"type": "Broken", "name": "Broken"},
                {"type": "If", "name": "If"}
            ]),
        );

        let outcome = extract_nodes(&store, &wf, WriteOperation::Update).await.unwrap();

        assert_eq!(outcome.node_ids.len(), 2);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].key, "Broken");
        assert_eq!(store.inner.count(Collection::Nodes).await, 2);
        assert!(logs_contain("Error processing node"));
    }
}
