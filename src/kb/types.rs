/// Knowledge-base document types
///
/// Typed views over the two document shapes the sync routines produce and consume.
/// Stored documents are plain JSON objects; these structs are (de)serialized from them
/// with camelCase field names so that they read exactly like the stored documents.

use crate::store::Document;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// A workflow template document
///
/// `workflow` is the opaque n8n export; only its `nodes` sequence is interpreted.
/// `nodes` is the relationship field listing linked [`NodeRecord`] ids.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowDocument {
    /// Supplied by the caller (string or number); generated by the store on create when absent
    #[serde(default, deserialize_with = "de_optional_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    /// Raw n8n workflow JSON: `{ "nodes": [...], "connections": {...}, ... }`
    pub workflow: Value,
    /// Linked node record ids; `None` leaves the stored relationship untouched on update
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nodes: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Diagram text (e.g. a mermaid rendering of the workflow)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagram: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Externally managed enrichment status, never changed by sync
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<WorkflowStatus>,
}

impl WorkflowDocument {
    /// Raw embedded node list, if present
    pub fn embedded_nodes(&self) -> Option<&Value> {
        self.workflow.get("nodes")
    }

    pub fn to_document(&self) -> serde_json::Result<Document> {
        match serde_json::to_value(self)? {
            Value::Object(doc) => Ok(doc),
            _ => Err(serde::ser::Error::custom("workflow document is not an object")),
        }
    }

    /// Full-replacement patch for an update
    ///
    /// Absent metadata is sent as `null` (or `[]` for tags) so the stored values are
    /// cleared. `nodes` stays absent when `None` to keep the stored relationship.
    pub fn to_patch(&self) -> serde_json::Result<Document> {
        let mut patch = self.to_document()?;
        for field in ["description", "diagram", "status"] {
            patch.entry(field).or_insert(Value::Null);
        }
        patch.entry("tags").or_insert_with(|| Value::Array(Vec::new()));
        Ok(patch)
    }

    pub fn from_document(doc: Document) -> serde_json::Result<Self> {
        serde_json::from_value(Value::Object(doc))
    }
}

fn de_optional_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!(
            "workflow id must be a string or number, got {}",
            other
        ))),
    }
}

/// Enrichment stage of a workflow template
///
/// Inert metadata: it is carried through every write unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Basic,
    SymbolicExpansion,
    NodesEnriched,
    FullyEnriched,
}

/// One node as embedded in an n8n workflow export
///
/// Only `type` is required for reconciliation. Everything else is optional since
/// exports from different n8n versions omit different fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeDescriptor {
    /// n8n instance id; a uuid string in current exports, a number in older ones
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_version: Option<Value>,
}

/// Normalized node record, one per distinct node `type`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeRecord {
    /// Store-generated id
    pub id: String,
    pub name: String,
    /// Stable identity key, unique across the collection
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage_guidelines: Option<String>,
    /// JSON-encoded node parameters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<String>,
    /// Linked workflow template ids
    #[serde(default)]
    pub workflows: Vec<String>,
}

impl NodeRecord {
    pub fn from_document(doc: Document) -> serde_json::Result<Self> {
        serde_json::from_value(Value::Object(doc))
    }
}

/// Kind of workflow write that triggered a sync
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteOperation {
    Create,
    Update,
}

impl fmt::Display for WriteOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriteOperation::Create => f.write_str("create"),
            WriteOperation::Update => f.write_str("update"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_workflow_document_preserves_metadata() {
        let raw = json!({
            "id": "42",
            "name": "Daily digest",
            "workflow": {"nodes": []},
            "nodes": ["a"],
            "tags": ["email"],
            "status": "symbolic_expansion"
        });
        let doc = WorkflowDocument::from_document(raw.as_object().cloned().unwrap()).unwrap();
        assert_eq!(doc.status, Some(WorkflowStatus::SymbolicExpansion));
        assert_eq!(doc.tags, vec!["email".to_string()]);

        let back = Value::Object(doc.to_document().unwrap());
        assert_eq!(back["status"], json!("symbolic_expansion"));
        assert_eq!(back["nodes"], json!(["a"]));
        assert!(back.get("diagram").is_none());
    }

    #[test]
    fn test_update_patch_clears_absent_metadata() {
        let doc = WorkflowDocument {
            id: Some("7".to_string()),
            name: "n".to_string(),
            workflow: json!({}),
            ..Default::default()
        };
        let patch = Value::Object(doc.to_patch().unwrap());
        assert_eq!(patch["description"], Value::Null);
        assert_eq!(patch["diagram"], Value::Null);
        assert_eq!(patch["status"], Value::Null);
        assert_eq!(patch["tags"], json!([]));
        assert!(patch.get("nodes").is_none());
    }

    #[test]
    fn test_numeric_workflow_id() {
        let raw = json!({"id": 1, "name": "n", "workflow": {}});
        let doc: WorkflowDocument = serde_json::from_value(raw).unwrap();
        assert_eq!(doc.id.as_deref(), Some("1"));
    }

    #[test]
    fn test_node_descriptor_from_n8n_export() {
        let raw = json!({
            "id": "8a1f",
            "name": "Set values",
            "type": "n8n-nodes-base.set",
            "position": [250, 300],
            "typeVersion": 3.4,
            "parameters": {"values": {}}
        });
        let node: NodeDescriptor = serde_json::from_value(raw).unwrap();
        assert_eq!(node.node_type, "n8n-nodes-base.set");
        assert_eq!(node.type_version, Some(json!(3.4)));
        assert!(node.parameters.is_some());
    }

    #[test]
    fn test_node_descriptor_requires_type() {
        let raw = json!({"name": "nameless"});
        assert!(serde_json::from_value::<NodeDescriptor>(raw).is_err());
    }
}
