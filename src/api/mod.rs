/// HTTP API Layer
///
/// REST endpoints over the knowledge base:
/// - Workflow template create/update (runs node sync) and reads
/// - Read-only node record lookups

// Workflow template endpoints (POST/GET/PUT)
pub mod workflows;

// Node record endpoints (GET)
pub mod nodes;

// Re-export router builders
pub use nodes::create_node_routes;
pub use workflows::{create_workflow_routes, AppState};
