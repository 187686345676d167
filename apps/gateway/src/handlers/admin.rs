//! Admin HTTP surface (§6): node launch/terminate, deployment
//! scale/pause/delete, and platform health. CRUD for tenants, models,
//! regions, instance-types and routing lives in an external dashboard
//! and is intentionally not exposed here — see the gateway's module docs.

use crate::error_response::ApiErrorResponse;
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::response::Json;
use control_core::deployment::DeploymentStatus;
use control_core::error::{ApiError, ErrorKind};
use control_core::node::{Node, NodeStatus};
use control_db::repositories::{DeploymentRepository, InstanceTypeRepository, ModelRepository, RegionRepository};
use control_lifecycle::manifest::{
    DEFAULT_GPU_MEMORY_UTILIZATION, DEFAULT_STREAMER_CONCURRENCY, DEFAULT_STREAMER_MEMORY_LIMIT_BYTES,
    DEFAULT_USE_RUNAI_STREAMER,
};
use control_lifecycle::NodeManifest;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct LaunchNodeRequest {
    pub model_name: String,
    pub provider: String,
    pub region_code: String,
    pub instance_typename: String,
    pub tenant_id: Option<Uuid>,
    pub spot: bool,
    pub disk_size_gib: u32,
    pub engine_version: String,
    pub accelerator_runtime_version: String,
    #[serde(default)]
    pub vllm_args: Vec<(String, String)>,
    pub streamer_concurrency: Option<u32>,
    pub streamer_memory_limit_bytes: Option<u64>,
    pub gpu_memory_utilization: Option<f64>,
    pub use_runai_streamer: Option<bool>,
}

pub async fn launch_node(
    State(state): State<AppState>,
    Json(req): Json<LaunchNodeRequest>,
) -> Result<Json<Value>, ApiErrorResponse> {
    let conn = state
        .db
        .connection()
        .map_err(|e| ApiErrorResponse(ApiError::new(ErrorKind::InternalError, e.to_string())))?;

    let model = ModelRepository::new(&conn)
        .find_by_name(&req.model_name)
        .await
        .map_err(|_| ApiErrorResponse(ApiError::new(ErrorKind::NotFound, format!("unknown model {}", req.model_name))))?;
    let region = RegionRepository::new(&conn)
        .find_by_code(&req.region_code)
        .await
        .map_err(|_| ApiErrorResponse(ApiError::new(ErrorKind::NotFound, format!("unknown region {}", req.region_code))))?;
    let instance_type = InstanceTypeRepository::new(&conn)
        .find(&req.provider, &req.instance_typename)
        .await
        .map_err(|_| {
            ApiErrorResponse(ApiError::new(
                ErrorKind::NotFound,
                format!("unknown instance type {}/{}", req.provider, req.instance_typename),
            ))
        })?;
    drop(conn);

    let cluster_name = Node::derive_cluster_name(&req.provider, &req.region_code);
    let manifest = NodeManifest {
        cluster_name: cluster_name.clone(),
        provider: req.provider.clone(),
        region_code: req.region_code.clone(),
        instance_typename: req.instance_typename.clone(),
        model_canonical_name: model.canonical_name.clone(),
        tenant_id: req.tenant_id.map(|id| id.to_string()),
        spot: req.spot,
        gpu_type: instance_type.gpu_model.clone(),
        gpu_count: instance_type.gpu_count,
        disk_size_gib: req.disk_size_gib,
        vllm_args: req.vllm_args.clone(),
        streamer_concurrency: req.streamer_concurrency.unwrap_or(DEFAULT_STREAMER_CONCURRENCY),
        streamer_memory_limit_bytes: req.streamer_memory_limit_bytes.unwrap_or(DEFAULT_STREAMER_MEMORY_LIMIT_BYTES),
        gpu_memory_utilization: req.gpu_memory_utilization.unwrap_or(DEFAULT_GPU_MEMORY_UTILIZATION),
        use_runai_streamer: req.use_runai_streamer.unwrap_or(DEFAULT_USE_RUNAI_STREAMER),
        engine_version: req.engine_version.clone(),
        accelerator_runtime_version: req.accelerator_runtime_version.clone(),
    };

    let outcome = state
        .orchestrator
        .launch_node(&manifest)
        .await
        .map_err(|e| ApiErrorResponse(e.into()))?;

    let endpoint = match outcome {
        control_lifecycle::ProvisionOutcome::Launched { endpoint } => endpoint,
        _ => None,
    };

    let node = Node {
        id: Uuid::new_v4(),
        cluster_name,
        tenant_id: req.tenant_id,
        model_id: model.id,
        region_id: region.id,
        provider: req.provider,
        instance_typename: req.instance_typename,
        endpoint,
        spot: req.spot,
        status: NodeStatus::Provisioning,
        health_score: 0,
        last_heartbeat_at: None,
    };

    state.registry.register(node.clone()).await.map_err(|e| ApiErrorResponse(e.into()))?;
    Ok(Json(json!(node)))
}

pub async fn terminate_node(
    State(state): State<AppState>,
    Path(node_id): Path<Uuid>,
) -> Result<Json<Value>, ApiErrorResponse> {
    let node = state
        .registry
        .get(node_id)
        .ok_or_else(|| ApiErrorResponse(ApiError::new(ErrorKind::NotFound, "no such node")))?;

    state
        .orchestrator
        .terminate_node(&node.cluster_name)
        .await
        .map_err(|e| ApiErrorResponse(e.into()))?;
    state.registry.deregister(node_id).await.map_err(|e| ApiErrorResponse(e.into()))?;
    state.active_requests.remove_node(node_id);
    state.breakers.remove_node(node_id);

    Ok(Json(json!({ "id": node_id, "status": "terminated" })))
}

pub async fn platform_health(State(state): State<AppState>) -> Json<Value> {
    let nodes = state.registry.all();
    let active = nodes.iter().filter(|n| n.status == NodeStatus::Active).count();
    let draining = nodes.iter().filter(|n| n.status == NodeStatus::Draining).count();
    let unhealthy = nodes.iter().filter(|n| n.status == NodeStatus::Unhealthy).count();

    Json(json!({
        "total_nodes": nodes.len(),
        "active_nodes": active,
        "draining_nodes": draining,
        "unhealthy_nodes": unhealthy,
    }))
}

#[derive(Debug, Deserialize)]
pub struct ScaleDeploymentRequest {
    pub min_replicas: Option<u32>,
    pub max_replicas: Option<u32>,
}

pub async fn scale_deployment(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(req): Json<ScaleDeploymentRequest>,
) -> Result<Json<Value>, ApiErrorResponse> {
    let conn = state
        .db
        .connection()
        .map_err(|e| ApiErrorResponse(ApiError::new(ErrorKind::InternalError, e.to_string())))?;
    let repo = DeploymentRepository::new(&conn);
    let mut deployment = repo
        .find_by_name(&name)
        .await
        .map_err(|_| ApiErrorResponse(ApiError::new(ErrorKind::NotFound, format!("no deployment named {name}"))))?;

    if let Some(min) = req.min_replicas {
        deployment.min_replicas = min;
    }
    if let Some(max) = req.max_replicas {
        deployment.max_replicas = max;
    }
    if deployment.min_replicas > deployment.max_replicas {
        return Err(ApiErrorResponse(ApiError::new(
            ErrorKind::ValidationError,
            "min_replicas cannot exceed max_replicas",
        )));
    }

    repo.update_replica_count(deployment.id, deployment.current_replicas)
        .await
        .map_err(|e| ApiErrorResponse(ApiError::new(ErrorKind::InternalError, e.to_string())))?;

    Ok(Json(json!({
        "id": deployment.id,
        "min_replicas": deployment.min_replicas,
        "max_replicas": deployment.max_replicas,
    })))
}

pub async fn set_deployment_status(
    State(state): State<AppState>,
    Path((name, status)): Path<(String, String)>,
) -> Result<Json<Value>, ApiErrorResponse> {
    let status = match status.as_str() {
        "pause" => DeploymentStatus::Paused,
        "delete" => DeploymentStatus::Deleted,
        "resume" => DeploymentStatus::Active,
        other => {
            return Err(ApiErrorResponse(ApiError::new(
                ErrorKind::InvalidRequest,
                format!("unknown deployment action {other}"),
            )))
        }
    };

    let conn = state
        .db
        .connection()
        .map_err(|e| ApiErrorResponse(ApiError::new(ErrorKind::InternalError, e.to_string())))?;
    let repo = DeploymentRepository::new(&conn);
    let deployment = repo
        .find_by_name(&name)
        .await
        .map_err(|_| ApiErrorResponse(ApiError::new(ErrorKind::NotFound, format!("no deployment named {name}"))))?;

    repo.update_status(deployment.id, status)
        .await
        .map_err(|e| ApiErrorResponse(ApiError::new(ErrorKind::InternalError, e.to_string())))?;

    Ok(Json(json!({ "id": deployment.id, "status": status })))
}
