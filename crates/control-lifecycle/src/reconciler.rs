use control_core::node::NodeStatus;
use control_db::DbClient;
use control_registry::NodeRegistry;
use std::time::Duration;
use tokio::time::interval;
use tracing::{error, info, instrument, warn};

const POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Periodic sweep reconciling the in-memory registry against the
/// persistent store's view of nodes — catches two drift scenarios a
/// crash-and-restart can leave behind: a node the store thinks is
/// `terminated` but that is still sitting in the registry ("orphan"), and
/// a node long past `lost` that was never actually terminated upstream
/// ("ghost"). Neither case is common in steady state; this exists for the
/// rare restart-mid-operation window (§4.11).
pub fn spawn_reconciler(db: DbClient, registry: NodeRegistry) {
    tokio::spawn(async move {
        let mut ticker = interval(POLL_INTERVAL);
        info!("state reconciler started, sweeping every {:?}", POLL_INTERVAL);

        loop {
            ticker.tick().await;
            if let Err(e) = sweep(&db, &registry).await {
                error!("reconciliation sweep failed: {e}");
            }
        }
    });
}

#[instrument(skip(db, registry))]
async fn sweep(db: &DbClient, registry: &NodeRegistry) -> Result<(), control_db::DbError> {
    let conn = db.connection()?;
    let repo = control_db::repositories::NodeRepository::new(&conn);

    let mut orphans = 0;
    let mut ghosts_revived = 0;

    for node in registry.all() {
        match repo.find_by_id(node.id).await {
            Ok(stored) if stored.status == NodeStatus::Terminated && node.status != NodeStatus::Terminated => {
                warn!(node_id = %node.id, "orphan node in registry, removing");
                registry.deregister(node.id).await.map_err(to_db_error)?;
                orphans += 1;
            }
            Err(control_db::DbError::NotFound) => {
                warn!(node_id = %node.id, "node in registry has no backing store row, removing");
                registry.deregister(node.id).await.map_err(to_db_error)?;
                orphans += 1;
            }
            Ok(stored) if stored.status != node.status => {
                registry
                    .set_status(node.id, stored.status)
                    .await
                    .map_err(to_db_error)?;
                if stored.status == NodeStatus::Active {
                    ghosts_revived += 1;
                }
            }
            _ => {}
        }
    }

    if orphans > 0 || ghosts_revived > 0 {
        info!(orphans, ghosts_revived, "reconciliation sweep applied corrections");
    }

    Ok(())
}

fn to_db_error(e: control_registry::RegistryError) -> control_db::DbError {
    match e {
        control_registry::RegistryError::Store(db_err) => db_err,
        other => control_db::DbError::Transaction(other.to_string()),
    }
}
