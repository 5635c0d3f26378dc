/// Knowledge-base domain layer
///
/// Document shapes for n8n workflow templates and the normalized node records
/// extracted from them.

// Typed workflow / node document definitions
pub mod types;

pub use types::{NodeDescriptor, NodeRecord, WorkflowDocument, WorkflowStatus, WriteOperation};
