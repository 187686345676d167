use crate::manifest::{
    NodeManifest, DEFAULT_GPU_MEMORY_UTILIZATION, DEFAULT_STREAMER_CONCURRENCY, DEFAULT_STREAMER_MEMORY_LIMIT_BYTES,
    DEFAULT_USE_RUNAI_STREAMER,
};
use crate::orchestrator_cli::OrchestratorCli;
use control_core::node::{Node, NodeId, NodeStatus};
use control_db::repositories::{DeploymentRepository, InstanceTypeRepository, ModelRepository, RegionRepository};
use control_db::DbClient;
use control_registry::NodeRegistry;
use std::time::Duration;
use tokio::time::interval;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

const POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Fleet-managed replicas carry no per-launch engine/runtime override, so
/// the controller pins them to one known-good combination. A manual
/// `launch_node` call (apps/gateway admin handler) still requires the
/// operator to state these explicitly.
const AUTO_SCALE_DISK_SIZE_GIB: u32 = 200;
const AUTO_SCALE_ENGINE_VERSION: &str = "0.6.3";
const AUTO_SCALE_ACCELERATOR_RUNTIME_VERSION: &str = "12.4";

/// Reconciles every active deployment's declared replica range against
/// the live node count for its model, launching or draining nodes to
/// close the gap (§4.10). One tick handles every deployment in sequence;
/// a failure on one deployment is logged and does not block the others.
pub fn spawn_deployment_controller(
    db: DbClient,
    registry: NodeRegistry,
    orchestrator: OrchestratorCli,
    default_provider: String,
    default_region_code: String,
) {
    tokio::spawn(async move {
        let mut ticker = interval(POLL_INTERVAL);
        info!("deployment controller started, reconciling every {:?}", POLL_INTERVAL);

        loop {
            ticker.tick().await;
            if let Err(e) = reconcile_once(&db, &registry, &orchestrator, &default_provider, &default_region_code).await {
                error!("deployment reconciliation pass failed: {e}");
            }
        }
    });
}

#[instrument(skip(db, registry, orchestrator))]
async fn reconcile_once(
    db: &DbClient,
    registry: &NodeRegistry,
    orchestrator: &OrchestratorCli,
    default_provider: &str,
    default_region_code: &str,
) -> Result<(), control_db::DbError> {
    let conn = db.connection()?;
    let deployments = DeploymentRepository::new(&conn).list_active().await?;

    for deployment in deployments {
        let model = match ModelRepository::new(&conn).find_by_name(&deployment.model_name).await {
            Ok(m) => m,
            Err(e) => {
                warn!(deployment = %deployment.name, "could not resolve model for deployment: {e}");
                continue;
            }
        };

        let region_id = match &deployment.region {
            Some(code) => RegionRepository::new(&conn).find_by_code(code).await.ok().map(|r| r.id),
            None => None,
        };
        let live_nodes = registry.live_for_deployment(model.id, deployment.provider.as_deref(), region_id);
        let live: u32 = live_nodes.len().try_into().unwrap_or(0);
        let delta = deployment.replica_delta(live);

        if delta == 0 {
            continue;
        }

        if delta > 0 {
            info!(deployment = %deployment.name, delta, "scaling up");
            let provider = deployment.provider.clone().unwrap_or_else(|| default_provider.to_string());
            let region_code = deployment.region.clone().unwrap_or_else(|| default_region_code.to_string());
            let instance_typename = deployment.gpu_type.clone().unwrap_or_else(|| "auto".to_string());

            for _ in 0..delta {
                if let Err(e) = launch_replica(db, registry, orchestrator, &model, &provider, &region_code, &instance_typename).await {
                    error!(deployment = %deployment.name, "failed to launch replica: {e}");
                }
            }
        } else {
            let excess = (-delta) as u32;
            info!(deployment = %deployment.name, excess, "scaling down, draining and terminating excess replicas");
            let mut candidates = live_nodes;
            candidates.truncate(excess as usize);
            for node in candidates {
                if let Err(e) = registry.drain(node.id).await {
                    warn!(node_id = %node.id, "failed to drain excess replica: {e}");
                    continue;
                }
                if let Err(e) = orchestrator.terminate_node(&node.cluster_name).await {
                    warn!(node_id = %node.id, "failed to terminate drained replica: {e}");
                    continue;
                }
                if let Err(e) = registry.deregister(node.id).await {
                    warn!(node_id = %node.id, "failed to deregister terminated replica: {e}");
                }
            }
        }
    }

    Ok(())
}

async fn launch_replica(
    db: &DbClient,
    registry: &NodeRegistry,
    orchestrator: &OrchestratorCli,
    model: &control_core::model::Model,
    provider: &str,
    region_code: &str,
    instance_typename: &str,
) -> Result<(), control_db::DbError> {
    let conn = db.connection()?;
    let region = RegionRepository::new(&conn).find_by_code(region_code).await?;

    let (gpu_type, gpu_count) = if instance_typename.eq_ignore_ascii_case("auto") {
        ("auto".to_string(), 0)
    } else {
        match InstanceTypeRepository::new(&conn).find(provider, instance_typename).await {
            Ok(it) => (it.gpu_model, it.gpu_count),
            Err(_) => ("auto".to_string(), 0),
        }
    };

    let node_id: NodeId = Uuid::new_v4();
    let cluster_name = Node::derive_cluster_name(provider, region_code);
    let manifest = NodeManifest {
        cluster_name: cluster_name.clone(),
        provider: provider.to_string(),
        region_code: region_code.to_string(),
        instance_typename: instance_typename.to_string(),
        model_canonical_name: model.canonical_name.clone(),
        tenant_id: None,
        spot: false,
        gpu_type,
        gpu_count,
        disk_size_gib: AUTO_SCALE_DISK_SIZE_GIB,
        vllm_args: Vec::new(),
        streamer_concurrency: DEFAULT_STREAMER_CONCURRENCY,
        streamer_memory_limit_bytes: DEFAULT_STREAMER_MEMORY_LIMIT_BYTES,
        gpu_memory_utilization: DEFAULT_GPU_MEMORY_UTILIZATION,
        use_runai_streamer: DEFAULT_USE_RUNAI_STREAMER,
        engine_version: AUTO_SCALE_ENGINE_VERSION.to_string(),
        accelerator_runtime_version: AUTO_SCALE_ACCELERATOR_RUNTIME_VERSION.to_string(),
    };

    let endpoint = match orchestrator.launch_node(&manifest).await {
        Ok(crate::orchestrator_cli::ProvisionOutcome::Launched { endpoint }) => endpoint,
        Ok(_) => None,
        Err(e) => {
            warn!("provisioning call failed for {cluster_name}: {e}");
            None
        }
    };

    let node = Node {
        id: node_id,
        cluster_name,
        tenant_id: None,
        model_id: model.id,
        region_id: region.id,
        provider: provider.to_string(),
        instance_typename: instance_typename.to_string(),
        endpoint,
        spot: false,
        status: NodeStatus::Provisioning,
        health_score: 0,
        last_heartbeat_at: None,
    };

    registry.register(node).await.map_err(|e| match e {
        control_registry::RegistryError::Store(db_err) => db_err,
        other => control_db::DbError::Transaction(other.to_string()),
    })?;

    Ok(())
}
