// ABOUTME: Container-management endpoints backed by the configured sandbox backend
// ABOUTME: Create, inspect, list and delete sandboxes by session id

use agentrt_sandbox::{validate_session_id, ContainerDescriptor, SandboxError, SandboxType};
use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use tracing::info;
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateContainerQuery {
    pub sandbox_type: Option<String>,
    pub session_id: Option<String>,
}

/// POST /containers?sandboxType=&sessionId=
pub async fn create_container(
    State(state): State<AppState>,
    Query(query): Query<CreateContainerQuery>,
) -> Result<Json<ContainerDescriptor>, AppError> {
    let sandbox_type = match query.sandbox_type.as_deref().map(str::trim) {
        Some(raw) if !raw.is_empty() => raw.parse::<SandboxType>().map_err(AppError::Validation)?,
        _ => state.default_sandbox_type,
    };
    let session_id = match query.session_id.as_deref().map(str::trim) {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => Uuid::new_v4().to_string(),
    };
    validate_session_id(&session_id)?;

    info!("Creating {} container for session {}", sandbox_type, session_id);
    let descriptor = state.backend.create(&session_id, sandbox_type).await?;
    Ok(Json(descriptor))
}

/// GET /containers/{session_id}
pub async fn get_container(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<ContainerDescriptor>, AppError> {
    state
        .backend
        .get(&session_id)
        .await?
        .map(Json)
        .ok_or_else(|| SandboxError::NotFound(session_id).into())
}

/// DELETE /containers/{session_id}
pub async fn delete_container(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    if state.backend.get(&session_id).await?.is_none() {
        return Err(SandboxError::NotFound(session_id).into());
    }

    info!("Deleting container for session {}", session_id);
    state.backend.remove(&session_id).await;
    Ok(Json(json!({ "status": "removed", "session_id": session_id })))
}

/// GET /containers
pub async fn list_containers(
    State(state): State<AppState>,
) -> Result<Json<HashMap<String, ContainerDescriptor>>, AppError> {
    Ok(Json(state.backend.list().await?))
}
