/// nodekb: n8n workflow node knowledge base
///
/// Stores n8n workflow templates and keeps a normalized record per node type,
/// linked to every workflow that uses it (and back).

// Core configuration and setup
pub mod config;

// Document store collaborator - trait plus SQLite and in-memory implementations
pub mod store;

// Workflow template / node record document types
pub mod kb;

// Extraction, backfill and the save saga connecting them
pub mod sync;

// HTTP API layer - workflow writes and node reads
pub mod api;

// Server setup and initialization
pub mod server;

// Re-export commonly used types for external consumers
pub use kb::{NodeDescriptor, NodeRecord, WorkflowDocument, WorkflowStatus, WriteOperation};
pub use server::start_server;
pub use store::{Collection, DocumentStore, Filter, StoreError};
pub use sync::{backfill_node_links, extract_nodes, WorkflowSync};
