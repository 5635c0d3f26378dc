/// Workflow save path
///
/// A workflow write is a two-step saga around the store commit:
/// 1. extraction resolves embedded nodes to node records and rewrites the
///    workflow's `nodes` relationship field on the incoming write
/// 2. once a create has committed, the new id is backfilled onto each linked node
///
/// Step 1 is fail-soft: any error is logged and the write proceeds unmodified.
/// Only the workflow commit itself can fail the save.

use crate::kb::{WorkflowDocument, WriteOperation};
use crate::store::{document_id, Collection, DocumentStore, StoreError};
use crate::sync::{backfill_node_links, extract_nodes, BackfillReport, ExtractionOutcome};
use serde::Serialize;
use std::sync::Arc;

/// What a save did, besides committing the workflow
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    /// The workflow as committed
    pub workflow: WorkflowDocument,
    /// `None` when extraction was aborted (malformed node list or lookup failure)
    pub extraction: Option<ExtractionOutcome>,
    /// Only present for creates that linked at least one node
    pub backfill: Option<BackfillReport>,
}

/// Saves workflow templates while keeping node records in sync
#[derive(Clone)]
pub struct WorkflowSync {
    store: Arc<dyn DocumentStore>,
}

impl WorkflowSync {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Underlying document store, for read paths
    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// Step 1: resolve node records and rewrite the relationship field in place
    async fn prepare(
        &self,
        workflow: &mut WorkflowDocument,
        operation: WriteOperation,
    ) -> Option<ExtractionOutcome> {
        match extract_nodes(self.store.as_ref(), workflow, operation).await {
            Ok(outcome) => {
                if !outcome.node_ids.is_empty() {
                    workflow.nodes = Some(outcome.node_ids.clone());
                }
                Some(outcome)
            }
            Err(e) => {
                tracing::error!(
                    workflow_id = workflow.id.as_deref().unwrap_or("<new>"),
                    "❌ Error extracting nodes from workflow: {}",
                    e
                );
                None
            }
        }
    }

    /// Create a workflow template, then backfill its id onto the linked node records
    pub async fn create_workflow(&self, mut workflow: WorkflowDocument) -> Result<SyncReport, StoreError> {
        let extraction = self.prepare(&mut workflow, WriteOperation::Create).await;

        let created = self
            .store
            .create(Collection::WorkflowTemplates, workflow.to_document()?)
            .await?;
        let workflow_id = document_id(&created)
            .ok_or_else(|| StoreError::InvalidDocument("created workflow has no id".to_string()))?;
        let workflow = WorkflowDocument::from_document(created)?;

        tracing::info!(workflow_id = %workflow_id, name = %workflow.name, "🔥 Created workflow");

        // Step 2: the id only exists now
        let backfill = match workflow.nodes.as_deref() {
            Some(node_ids) if !node_ids.is_empty() => {
                Some(backfill_node_links(self.store.as_ref(), &workflow_id, node_ids).await)
            }
            _ => None,
        };

        Ok(SyncReport { workflow, extraction, backfill })
    }

    /// Update an existing workflow template
    ///
    /// The id is already committed, so extraction links node records directly and
    /// no backfill runs. The body replaces the stored metadata; the relationship
    /// field is only rewritten when extraction linked at least one node.
    pub async fn update_workflow(
        &self,
        id: &str,
        mut workflow: WorkflowDocument,
    ) -> Result<SyncReport, StoreError> {
        // Reject before touching node records
        self.store.find_by_id(Collection::WorkflowTemplates, id).await?;

        workflow.id = Some(id.to_string());
        let extraction = self.prepare(&mut workflow, WriteOperation::Update).await;

        let updated = self
            .store
            .update(Collection::WorkflowTemplates, id, workflow.to_patch()?)
            .await?;
        let workflow = WorkflowDocument::from_document(updated)?;

        tracing::info!(workflow_id = %id, name = %workflow.name, "🔥 Updated workflow");

        Ok(SyncReport { workflow, extraction, backfill: None })
    }
}
