/// Read-only node record endpoints
///
/// Node records are only ever written by workflow sync.

use crate::{
    api::workflows::{status_for, AppState},
    store::{Collection, Filter, StoreError},
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::get,
    Router,
};
use serde_json::{json, Value};

pub fn create_node_routes() -> Router<AppState> {
    Router::new()
        .route("/api/nodes", get(list_nodes))
        .route("/api/nodes/{id}", get(get_node))
        .route("/api/nodes/by-type/{node_type}", get(get_node_by_type))
}

/// GET /api/nodes
async fn list_nodes(State(state): State<AppState>) -> Result<Json<Value>, StatusCode> {
    match state.sync.store().find(Collection::Nodes, &Filter::All, None).await {
        Ok(nodes) => Ok(Json(json!({ "nodes": nodes }))),
        Err(e) => {
            tracing::error!("Failed to list nodes: {}", e);
            Err(status_for(&e))
        }
    }
}

/// GET /api/nodes/{id}
async fn get_node(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, StatusCode> {
    match state.sync.store().find_by_id(Collection::Nodes, &id).await {
        Ok(doc) => Ok(Json(Value::Object(doc))),
        Err(e) => {
            if !matches!(e, StoreError::NotFound { .. }) {
                tracing::error!("Failed to get node {}: {}", id, e);
            }
            Err(status_for(&e))
        }
    }
}

/// GET /api/nodes/by-type/{node_type}
///
/// Node types are unique, so this returns at most one record.
async fn get_node_by_type(
    State(state): State<AppState>,
    Path(node_type): Path<String>,
) -> Result<Json<Value>, StatusCode> {
    let found = state
        .sync
        .store()
        .find(Collection::Nodes, &Filter::equals("type", node_type.as_str()), Some(1))
        .await
        .map_err(|e| {
            tracing::error!("Failed to look up node type {}: {}", node_type, e);
            status_for(&e)
        })?;

    found
        .into_iter()
        .next()
        .map(|doc| Json(Value::Object(doc)))
        .ok_or(StatusCode::NOT_FOUND)
}
