use crate::registry::NodeRegistry;
use chrono::Utc;
use control_core::node::NodeStatus;
use std::time::Duration;
use tokio::time::interval;
use tracing::{info, instrument, warn};

const POLL_INTERVAL: Duration = Duration::from_secs(30);
const STALE_AFTER: chrono::Duration = chrono::Duration::seconds(60);
const LOST_AFTER: chrono::Duration = chrono::Duration::seconds(300);

/// Sweeps the registry on a fixed interval and demotes nodes whose
/// heartbeat has gone stale: `active` → `unhealthy` after 60s of silence,
/// `unhealthy` → `lost` after 300s (§4.4). A node that heartbeats again
/// before it is marked `lost` recovers on the next successful heartbeat.
pub fn spawn_health_monitor(registry: NodeRegistry) {
    tokio::spawn(async move {
        let mut ticker = interval(POLL_INTERVAL);
        info!("health monitor started, polling every {:?}", POLL_INTERVAL);

        loop {
            ticker.tick().await;
            sweep(&registry).await;
        }
    });
}

#[instrument(skip(registry))]
async fn sweep(registry: &NodeRegistry) {
    let now = Utc::now();
    let mut demoted_unhealthy = 0;
    let mut demoted_lost = 0;

    for node in registry.all() {
        let age = node
            .last_heartbeat_at
            .map(|last| now - last)
            .unwrap_or(chrono::Duration::days(3650));

        let next_status = match node.status {
            NodeStatus::Active if age > STALE_AFTER => Some(NodeStatus::Unhealthy),
            NodeStatus::Unhealthy if age > LOST_AFTER => Some(NodeStatus::Lost),
            _ => None,
        };

        if let Some(status) = next_status {
            match status {
                NodeStatus::Unhealthy => demoted_unhealthy += 1,
                NodeStatus::Lost => demoted_lost += 1,
                _ => {}
            }
            if let Err(e) = registry.demote(node.id, status).await {
                warn!(node_id = %node.id, error = %e, "failed to demote stale node");
            }
        }
    }

    if demoted_unhealthy > 0 || demoted_lost > 0 {
        warn!(demoted_unhealthy, demoted_lost, "health sweep demoted stale nodes");
    }
}
