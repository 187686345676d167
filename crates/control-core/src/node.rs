use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type NodeId = Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Provisioning,
    Active,
    Draining,
    Terminated,
    Unhealthy,
    Lost,
}

impl NodeStatus {
    /// Only `Active` nodes with a positive health score and a set
    /// endpoint are eligible for scheduling — this covers the status
    /// half of that invariant (§3).
    pub fn is_schedulable(self) -> bool {
        matches!(self, NodeStatus::Active)
    }
}

/// One live (or recently live) worker process hosting an OpenAI-compatible
/// inference server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub cluster_name: String,
    pub tenant_id: Option<Uuid>,
    pub model_id: Uuid,
    pub region_id: Uuid,
    pub provider: String,
    pub instance_typename: String,
    pub endpoint: Option<String>,
    pub spot: bool,
    pub status: NodeStatus,
    pub health_score: u8,
    pub last_heartbeat_at: Option<DateTime<Utc>>,
}

impl Node {
    /// Cluster names are globally unique, lowercase, DNS-safe:
    /// `cic-{provider}-{region}-{shortid}` (§3, §4.9).
    pub fn derive_cluster_name(provider: &str, region_code: &str) -> String {
        let shortid = Uuid::new_v4().simple().to_string()[..6].to_string();
        format!(
            "cic-{}-{}-{}",
            provider.to_lowercase(),
            region_code.to_lowercase(),
            shortid
        )
    }

    pub fn is_eligible_for_scheduling(&self) -> bool {
        self.status.is_schedulable() && self.health_score > 0 && self.endpoint.is_some()
    }
}
