/// Node → workflow relationship backfill
///
/// Runs once a workflow create has committed and its id is known. Each linked node
/// record is fetched and patched independently; a failure leaves that record
/// unsynchronized and is only logged. There is no compensation on the workflow side.

use crate::store::{Collection, Document, DocumentStore};
use crate::sync::{insert_link, linked_workflows, SyncFailure};
use futures::future::join_all;
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BackfillReport {
    /// Node records that gained the workflow id
    pub linked: Vec<String>,
    /// Node records that already listed it
    pub unchanged: Vec<String>,
    pub failures: Vec<SyncFailure>,
}

enum LinkResult {
    Linked,
    Unchanged,
}

async fn link_node(
    store: &dyn DocumentStore,
    workflow_id: &str,
    node_id: &str,
) -> Result<LinkResult, crate::store::StoreError> {
    let node = store.find_by_id(Collection::Nodes, node_id).await?;

    let mut workflows = linked_workflows(&node);
    if !insert_link(&mut workflows, workflow_id) {
        return Ok(LinkResult::Unchanged);
    }

    let mut patch = Document::new();
    patch.insert(
        "workflows".to_string(),
        Value::Array(workflows.into_iter().map(Value::String).collect()),
    );
    store.update(Collection::Nodes, node_id, patch).await?;
    Ok(LinkResult::Linked)
}

/// Add `workflow_id` to the relationship field of every node record in `node_ids`
///
/// Each link is a read-then-write of the node record, not an atomic append. Two
/// backfills touching the same node at the same time can overwrite each other's
/// link; the last write wins and the lost link is not retried.
pub async fn backfill_node_links(
    store: &dyn DocumentStore,
    workflow_id: &str,
    node_ids: &[String],
) -> BackfillReport {
    let mut unique: Vec<String> = Vec::with_capacity(node_ids.len());
    for id in node_ids {
        insert_link(&mut unique, id);
    }

    tracing::info!(workflow_id, nodes = unique.len(), "🔗 Backfilling node relationships");

    let results = join_all(
        unique
            .iter()
            .map(|node_id| async move { (node_id, link_node(store, workflow_id, node_id).await) }),
    )
    .await;

    let mut report = BackfillReport::default();
    for (node_id, result) in results {
        match result {
            Ok(LinkResult::Linked) => report.linked.push(node_id.clone()),
            Ok(LinkResult::Unchanged) => report.unchanged.push(node_id.clone()),
            Err(e) => {
                tracing::error!(workflow_id, node_id = %node_id, "❌ Failed to backfill node relationship: {}", e);
                report.failures.push(SyncFailure {
                    key: node_id.clone(),
                    message: e.to_string(),
                });
            }
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kb::NodeRecord;
    use crate::store::{document_id, MemoryDocumentStore};
    use serde_json::json;
    use tracing_test::traced_test;

    async fn seed(store: &MemoryDocumentStore, node_type: &str, workflows: Value) -> String {
        let doc = store
            .create(
                Collection::Nodes,
                json!({"name": node_type, "type": node_type, "workflows": workflows})
                    .as_object()
                    .cloned()
                    .unwrap(),
            )
            .await
            .unwrap();
        document_id(&doc).unwrap()
    }

    async fn workflows_of(store: &MemoryDocumentStore, id: &str) -> Vec<String> {
        let doc = store.find_by_id(Collection::Nodes, id).await.unwrap();
        NodeRecord::from_document(doc).unwrap().workflows
    }

    #[tokio::test]
    async fn test_backfill_links_each_node_once() {
        let store = MemoryDocumentStore::new();
        let a = seed(&store, "Set", json!([])).await;
        let b = seed(&store, "If", json!(["old"])).await;

        let report =
            backfill_node_links(&store, "42", &[a.clone(), b.clone(), a.clone()]).await;

        assert_eq!(report.linked, vec![a.clone(), b.clone()]);
        assert!(report.failures.is_empty());
        assert_eq!(workflows_of(&store, &a).await, vec!["42".to_string()]);
        assert_eq!(
            workflows_of(&store, &b).await,
            vec!["old".to_string(), "42".to_string()]
        );
    }

    #[tokio::test]
    async fn test_backfill_is_idempotent() {
        let store = MemoryDocumentStore::new();
        let a = seed(&store, "Set", json!(["42"])).await;

        let report = backfill_node_links(&store, "42", &[a.clone()]).await;
        assert!(report.linked.is_empty());
        assert_eq!(report.unchanged, vec![a.clone()]);
        assert_eq!(workflows_of(&store, &a).await, vec!["42".to_string()]);
    }

    #[tokio::test]
    #[traced_test]
    async fn test_missing_node_is_reported_not_fatal() {
        let store = MemoryDocumentStore::new();
        let a = seed(&store, "Set", json!([])).await;

        let report = backfill_node_links(&store, "42", &["gone".to_string(), a.clone()]).await;

        assert_eq!(report.linked, vec![a]);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].key, "gone");
        assert!(logs_contain("Failed to backfill node relationship"));
    }
}
