use crate::errors::DbError;
use control_core::deployment::{Deployment, DeploymentStatus, DeploymentStrategy};
use libsql::{params, Connection};
use uuid::Uuid;

pub struct DeploymentRepository<'a> {
    conn: &'a Connection,
}

impl<'a> DeploymentRepository<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub async fn insert(&self, deployment: &Deployment) -> Result<(), DbError> {
        if !deployment.has_valid_placement() {
            return Err(DbError::Mapping("deployment placement is incomplete".into()));
        }
        self.conn
            .execute(
                "INSERT INTO deployments
                 (id, name, model_name, min_replicas, max_replicas, current_replicas, strategy,
                  provider, region, gpu_type, status)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    deployment.id.to_string(),
                    deployment.name.clone(),
                    deployment.model_name.clone(),
                    deployment.min_replicas,
                    deployment.max_replicas,
                    deployment.current_replicas,
                    strategy_str(deployment.strategy).to_string(),
                    deployment.provider.clone(),
                    deployment.region.clone(),
                    deployment.gpu_type.clone(),
                    status_str(deployment.status).to_string(),
                ],
            )
            .await?;
        Ok(())
    }

    pub async fn find_by_name(&self, name: &str) -> Result<Deployment, DbError> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, name, model_name, min_replicas, max_replicas, current_replicas, strategy,
                        provider, region, gpu_type, status
                 FROM deployments WHERE name = ?1",
                params![name.to_string()],
            )
            .await?;
        match rows.next().await? {
            Some(row) => row_to_deployment(&row),
            None => Err(DbError::NotFound),
        }
    }

    pub async fn list_active(&self) -> Result<Vec<Deployment>, DbError> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, name, model_name, min_replicas, max_replicas, current_replicas, strategy,
                        provider, region, gpu_type, status
                 FROM deployments WHERE status = 'active'",
                (),
            )
            .await?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await? {
            out.push(row_to_deployment(&row)?);
        }
        Ok(out)
    }

    pub async fn update_replica_count(&self, id: Uuid, current_replicas: u32) -> Result<(), DbError> {
        let changed = self
            .conn
            .execute(
                "UPDATE deployments SET current_replicas = ?1 WHERE id = ?2",
                params![current_replicas, id.to_string()],
            )
            .await?;
        if changed == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }

    pub async fn update_status(&self, id: Uuid, status: DeploymentStatus) -> Result<(), DbError> {
        let changed = self
            .conn
            .execute(
                "UPDATE deployments SET status = ?1 WHERE id = ?2",
                params![status_str(status).to_string(), id.to_string()],
            )
            .await?;
        if changed == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }
}

fn strategy_str(strategy: DeploymentStrategy) -> &'static str {
    match strategy {
        DeploymentStrategy::Spread => "spread",
        DeploymentStrategy::Packed => "packed",
    }
}

fn status_str(status: DeploymentStatus) -> &'static str {
    match status {
        DeploymentStatus::Active => "active",
        DeploymentStatus::Paused => "paused",
        DeploymentStatus::Deleted => "deleted",
    }
}

fn row_to_deployment(row: &libsql::Row) -> Result<Deployment, DbError> {
    let id: String = row.get(0)?;
    let name: String = row.get(1)?;
    let model_name: String = row.get(2)?;
    let min_replicas: i64 = row.get(3)?;
    let max_replicas: i64 = row.get(4)?;
    let current_replicas: i64 = row.get(5)?;
    let strategy_raw: String = row.get(6)?;
    let provider: Option<String> = row.get(7)?;
    let region: Option<String> = row.get(8)?;
    let gpu_type: Option<String> = row.get(9)?;
    let status_raw: String = row.get(10)?;

    let strategy = match strategy_raw.as_str() {
        "spread" => DeploymentStrategy::Spread,
        "packed" => DeploymentStrategy::Packed,
        other => return Err(DbError::Mapping(format!("unknown deployment strategy: {other}"))),
    };
    let status = match status_raw.as_str() {
        "active" => DeploymentStatus::Active,
        "paused" => DeploymentStatus::Paused,
        "deleted" => DeploymentStatus::Deleted,
        other => return Err(DbError::Mapping(format!("unknown deployment status: {other}"))),
    };

    Ok(Deployment {
        id: Uuid::parse_str(&id).map_err(|e| DbError::Mapping(e.to_string()))?,
        name,
        model_name,
        min_replicas: min_replicas as u32,
        max_replicas: max_replicas as u32,
        current_replicas: current_replicas as u32,
        strategy,
        provider,
        region,
        gpu_type,
        status,
    })
}
