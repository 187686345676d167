//! Worker node ingress (§6): the on-node agent calls these directly
//! against the registry, bypassing the orchestrator CLI entirely — the
//! agent already knows it is alive.

use crate::error_response::ApiErrorResponse;
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::response::Json;
use control_core::node::Node;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

pub async fn register(State(state): State<AppState>, Json(node): Json<Node>) -> Result<Json<Value>, ApiErrorResponse> {
    state.registry.register(node.clone()).await.map_err(|e| ApiErrorResponse(e.into()))?;
    Ok(Json(json!({ "id": node.id, "status": "registered" })))
}

#[derive(Debug, Deserialize)]
pub struct HeartbeatRequest {
    pub health_score: u8,
    pub endpoint: Option<String>,
}

pub async fn heartbeat(
    State(state): State<AppState>,
    Path(node_id): Path<Uuid>,
    Json(req): Json<HeartbeatRequest>,
) -> Result<Json<Value>, ApiErrorResponse> {
    state
        .registry
        .heartbeat(node_id, req.health_score, req.endpoint)
        .await
        .map_err(|e| ApiErrorResponse(e.into()))?;
    Ok(Json(json!({ "id": node_id, "status": "ok" })))
}

pub async fn drain(State(state): State<AppState>, Path(node_id): Path<Uuid>) -> Result<Json<Value>, ApiErrorResponse> {
    state.registry.drain(node_id).await.map_err(|e| ApiErrorResponse(e.into()))?;
    Ok(Json(json!({ "id": node_id, "status": "draining" })))
}

pub async fn termination_warning(
    State(state): State<AppState>,
    Path(node_id): Path<Uuid>,
) -> Result<Json<Value>, ApiErrorResponse> {
    state
        .registry
        .termination_warning(node_id)
        .await
        .map_err(|e| ApiErrorResponse(e.into()))?;
    Ok(Json(json!({ "id": node_id, "status": "draining" })))
}

pub async fn deregister(State(state): State<AppState>, Path(node_id): Path<Uuid>) -> Result<Json<Value>, ApiErrorResponse> {
    state.registry.deregister(node_id).await.map_err(|e| ApiErrorResponse(e.into()))?;
    state.active_requests.remove_node(node_id);
    state.breakers.remove_node(node_id);
    Ok(Json(json!({ "id": node_id, "status": "deregistered" })))
}
