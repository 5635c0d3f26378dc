/// Workflow template REST API endpoints
///
/// Every write goes through the sync saga, so node records and relationship
/// fields are reconciled on each create/update.

use crate::{
    kb::WorkflowDocument,
    store::{Collection, Filter, StoreError},
    sync::{BackfillReport, ExtractionOutcome, WorkflowSync},
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    /// Save path with node synchronization; also exposes the store for reads
    pub sync: WorkflowSync,
}

/// Response for workflow creation/update operations
#[derive(Debug, Serialize)]
pub struct WorkflowResponse {
    pub id: String,
    pub message: String,
    pub workflow: WorkflowDocument,
    pub extraction: Option<ExtractionOutcome>,
    pub backfill: Option<BackfillReport>,
}

/// Request body for workflow creation and update
#[derive(Debug, Deserialize)]
pub struct SaveWorkflowRequest {
    pub workflow: WorkflowDocument,
}

/// Map store errors onto HTTP status codes
pub(crate) fn status_for(err: &StoreError) -> StatusCode {
    match err {
        StoreError::NotFound { .. } => StatusCode::NOT_FOUND,
        StoreError::UniqueViolation { .. } => StatusCode::CONFLICT,
        StoreError::InvalidDocument(_) => StatusCode::BAD_REQUEST,
        StoreError::Database(_) | StoreError::Serialization(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// Create workflow management routes
pub fn create_workflow_routes() -> Router<AppState> {
    Router::new()
        .route("/api/workflows", get(list_workflows).post(create_workflow))
        .route("/api/workflows/{id}", get(get_workflow).put(update_workflow))
}

/// Create a new workflow template
///
/// POST /api/workflows
/// Body: { "workflow": { "id": 1, "name": "...", "workflow": { "nodes": [...] } } }
async fn create_workflow(
    State(state): State<AppState>,
    Json(payload): Json<SaveWorkflowRequest>,
) -> Result<(StatusCode, Json<WorkflowResponse>), StatusCode> {
    let workflow = payload.workflow;

    if workflow.name.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let report = state.sync.create_workflow(workflow).await.map_err(|e| {
        tracing::error!("Failed to create workflow: {}", e);
        status_for(&e)
    })?;

    let id = report.workflow.id.clone().unwrap_or_default();
    Ok((
        StatusCode::CREATED,
        Json(WorkflowResponse {
            message: format!("Workflow '{}' created successfully", report.workflow.name),
            id,
            workflow: report.workflow,
            extraction: report.extraction,
            backfill: report.backfill,
        }),
    ))
}

/// List all workflow templates
///
/// GET /api/workflows
async fn list_workflows(State(state): State<AppState>) -> Result<Json<Value>, StatusCode> {
    match state
        .sync
        .store()
        .find(Collection::WorkflowTemplates, &Filter::All, None)
        .await
    {
        Ok(workflows) => Ok(Json(json!({ "workflows": workflows }))),
        Err(e) => {
            tracing::error!("Failed to list workflows: {}", e);
            Err(status_for(&e))
        }
    }
}

/// Get a specific workflow template by ID
///
/// GET /api/workflows/{id}
async fn get_workflow(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, StatusCode> {
    match state
        .sync
        .store()
        .find_by_id(Collection::WorkflowTemplates, &id)
        .await
    {
        Ok(doc) => Ok(Json(Value::Object(doc))),
        Err(e) => {
            if !matches!(e, StoreError::NotFound { .. }) {
                tracing::error!("Failed to get workflow {}: {}", id, e);
            }
            Err(status_for(&e))
        }
    }
}

/// Update an existing workflow template
///
/// PUT /api/workflows/{id}
/// Body: same as create; the id in the URL wins
async fn update_workflow(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<SaveWorkflowRequest>,
) -> Result<Json<WorkflowResponse>, StatusCode> {
    let workflow = payload.workflow;

    if workflow.name.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let report = state.sync.update_workflow(&id, workflow).await.map_err(|e| {
        tracing::error!("Failed to update workflow {}: {}", id, e);
        status_for(&e)
    })?;

    Ok(Json(WorkflowResponse {
        message: format!("Workflow '{}' updated successfully", report.workflow.name),
        id,
        workflow: report.workflow,
        extraction: report.extraction,
        backfill: report.backfill,
    }))
}
