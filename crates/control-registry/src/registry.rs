use crate::errors::RegistryError;
use control_core::node::{Node, NodeId, NodeStatus};
use control_db::repositories::NodeRepository;
use control_db::DbClient;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Live view of every worker node the control plane currently knows
/// about. Reads and writes against a `DashMap` keyed by node id so a
/// scheduling decision on one model never serializes behind a heartbeat
/// for an unrelated node — the hot path this crate exists for (§5).
///
/// Every mutation here is also persisted through `control-db` so the
/// registry can be rebuilt from the store after a restart.
#[derive(Clone)]
pub struct NodeRegistry {
    nodes: Arc<DashMap<NodeId, Node>>,
    db: DbClient,
}

impl NodeRegistry {
    pub fn new(db: DbClient) -> Self {
        Self {
            nodes: Arc::new(DashMap::new()),
            db,
        }
    }

    /// Loads every non-terminated node from the persistent store into the
    /// in-memory map. Called once at startup before traffic is accepted.
    #[instrument(skip(self))]
    pub async fn hydrate(&self) -> Result<usize, RegistryError> {
        let conn = self.db.connection()?;
        let repo = NodeRepository::new(&conn);
        let mut loaded = 0;
        for status in [
            NodeStatus::Provisioning,
            NodeStatus::Active,
            NodeStatus::Draining,
            NodeStatus::Unhealthy,
        ] {
            for node in repo.list_by_status(status).await? {
                self.nodes.insert(node.id, node);
                loaded += 1;
            }
        }
        info!("hydrated {loaded} nodes from the persistent store");
        Ok(loaded)
    }

    #[instrument(skip(self, node))]
    pub async fn register(&self, node: Node) -> Result<(), RegistryError> {
        let conn = self.db.connection()?;
        NodeRepository::new(&conn).insert(&node).await?;
        self.nodes.insert(node.id, node);
        Ok(())
    }

    /// Applies a worker's self-reported heartbeat: refreshes health score,
    /// endpoint and timestamp, and flips `provisioning` to `active` on the
    /// first successful pulse (§4.4).
    #[instrument(skip(self))]
    pub async fn heartbeat(
        &self,
        node_id: NodeId,
        health_score: u8,
        endpoint: Option<String>,
    ) -> Result<(), RegistryError> {
        let conn = self.db.connection()?;
        NodeRepository::new(&conn)
            .record_heartbeat(node_id, health_score, endpoint.clone())
            .await?;

        let mut entry = self
            .nodes
            .get_mut(&node_id)
            .ok_or(RegistryError::UnknownNode(node_id))?;
        entry.health_score = health_score;
        if let Some(ep) = endpoint {
            entry.endpoint = Some(ep);
        }
        entry.last_heartbeat_at = Some(chrono::Utc::now());
        if entry.status == NodeStatus::Provisioning {
            entry.status = NodeStatus::Active;
        }
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn set_status(&self, node_id: NodeId, status: NodeStatus) -> Result<(), RegistryError> {
        let conn = self.db.connection()?;
        NodeRepository::new(&conn).update_status(node_id, status).await?;
        let mut entry = self
            .nodes
            .get_mut(&node_id)
            .ok_or(RegistryError::UnknownNode(node_id))?;
        entry.status = status;
        Ok(())
    }

    /// Demotes a node's status and zeroes its health score in the same
    /// update — used when the health monitor marks a node unhealthy or
    /// lost, since a stale node's last-reported score is no longer
    /// trustworthy (§4.5).
    #[instrument(skip(self))]
    pub async fn demote(&self, node_id: NodeId, status: NodeStatus) -> Result<(), RegistryError> {
        let conn = self.db.connection()?;
        NodeRepository::new(&conn).update_status_and_health_score(node_id, status, 0).await?;
        let mut entry = self
            .nodes
            .get_mut(&node_id)
            .ok_or(RegistryError::UnknownNode(node_id))?;
        entry.status = status;
        entry.health_score = 0;
        Ok(())
    }

    /// Marks a node as draining — it keeps serving in-flight requests but
    /// is no longer a scheduling candidate (§4.4, §4.9).
    pub async fn drain(&self, node_id: NodeId) -> Result<(), RegistryError> {
        self.set_status(node_id, NodeStatus::Draining).await
    }

    /// Worker-initiated warning that it is about to be reclaimed (e.g. a
    /// spot interruption notice). Treated the same as drain: stop
    /// scheduling new work, let in-flight requests finish.
    pub async fn termination_warning(&self, node_id: NodeId) -> Result<(), RegistryError> {
        warn!(%node_id, "received termination warning from worker");
        self.set_status(node_id, NodeStatus::Draining).await
    }

    #[instrument(skip(self))]
    pub async fn deregister(&self, node_id: NodeId) -> Result<(), RegistryError> {
        let conn = self.db.connection()?;
        NodeRepository::new(&conn).delete(node_id).await?;
        self.nodes.remove(&node_id);
        Ok(())
    }

    pub fn get(&self, node_id: NodeId) -> Option<Node> {
        self.nodes.get(&node_id).map(|n| n.clone())
    }

    /// Scheduling candidates for a model: active, healthy, endpoint-bearing
    /// nodes only (§4.3, §4.9 eligibility invariant). Never mutates the
    /// registry — callers must go through `heartbeat`/`set_status` for
    /// that.
    pub fn candidates_for(&self, model_id: Uuid) -> Vec<Node> {
        self.nodes
            .iter()
            .filter(|entry| entry.model_id == model_id && entry.is_eligible_for_scheduling())
            .map(|entry| entry.clone())
            .collect()
    }

    /// Live replica count for deployment reconciliation (§4.10): nodes for
    /// this model whose status is `provisioning` or `active`, optionally
    /// narrowed to a provider and/or region. Deliberately broader than
    /// `candidates_for` — a node mid-boot still counts toward the replica
    /// target even though it isn't yet a scheduling candidate.
    pub fn live_for_deployment(&self, model_id: Uuid, provider: Option<&str>, region_id: Option<Uuid>) -> Vec<Node> {
        self.nodes
            .iter()
            .filter(|entry| {
                entry.model_id == model_id
                    && matches!(entry.status, NodeStatus::Provisioning | NodeStatus::Active)
                    && provider.map_or(true, |p| entry.provider == p)
                    && region_id.map_or(true, |r| entry.region_id == r)
            })
            .map(|entry| entry.clone())
            .collect()
    }

    pub fn all(&self) -> Vec<Node> {
        self.nodes.iter().map(|entry| entry.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
