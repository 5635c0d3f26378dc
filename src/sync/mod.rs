/// Workflow → node synchronization
///
/// Keeps normalized node records and workflow templates linked in both directions:
/// - `extract`: resolve embedded nodes to node records (create or merge), returning the ids to link
/// - `backfill`: after a workflow create commits, add its id to each linked node record
/// - `saga`: the save path tying both steps around the workflow write
///
/// Every failure below the saga is collected and logged, never propagated: a workflow
/// write always goes through, synchronization may be partial.

// Step 1: extraction / reconciliation
pub mod extract;

// Step 2: node → workflow relationship backfill
pub mod backfill;

// Save path wiring step 1, the workflow commit and step 2
pub mod saga;

pub use backfill::{backfill_node_links, BackfillReport};
pub use extract::{extract_nodes, ExtractError, ExtractionOutcome};
pub use saga::{SyncReport, WorkflowSync};

use crate::store::Document;
use serde::Serialize;
use serde_json::Value;

/// A single node that could not be synchronized
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncFailure {
    /// Node type (extraction) or node record id (backfill)
    pub key: String,
    pub message: String,
}

/// Workflow ids listed on a node record's relationship field
///
/// Tolerates numeric ids and drops anything else.
pub(crate) fn linked_workflows(node: &Document) -> Vec<String> {
    let Some(Value::Array(items)) = node.get("workflows") else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| match item {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .collect()
}

/// Insert with set semantics; returns false when the id was already present
pub(crate) fn insert_link(links: &mut Vec<String>, id: &str) -> bool {
    if links.iter().any(|existing| existing == id) {
        return false;
    }
    links.push(id.to_string());
    true
}
