use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentStatus {
    Active,
    Paused,
    Deleted,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentStrategy {
    Spread,
    Packed,
}

/// Declarative replica-count intent for a model. The controller only
/// reconciles `status == Active` deployments (§3, §4.10).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deployment {
    pub id: Uuid,
    pub name: String,
    pub model_name: String,
    pub min_replicas: u32,
    pub max_replicas: u32,
    pub current_replicas: u32,
    pub strategy: DeploymentStrategy,
    pub provider: Option<String>,
    pub region: Option<String>,
    pub gpu_type: Option<String>,
    pub status: DeploymentStatus,
}

impl Deployment {
    /// A deployment either fully pins (provider, region, gpu_type) or
    /// leaves gpu_type as `auto` and may leave provider/region unset
    /// (§3's placement invariant).
    pub fn has_valid_placement(&self) -> bool {
        let gpu_is_auto = self
            .gpu_type
            .as_deref()
            .map(|g| g.eq_ignore_ascii_case("auto"))
            .unwrap_or(true);

        if gpu_is_auto {
            true
        } else {
            self.provider.is_some() && self.region.is_some()
        }
    }

    pub fn replica_delta(&self, live_replicas: u32) -> i64 {
        if live_replicas < self.min_replicas {
            self.min_replicas as i64 - live_replicas as i64
        } else if live_replicas > self.max_replicas {
            self.max_replicas as i64 - live_replicas as i64
        } else {
            0
        }
    }
}
