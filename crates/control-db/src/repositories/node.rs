use crate::errors::DbError;
use control_core::node::{Node, NodeId, NodeStatus};
use libsql::{params, Connection};
use uuid::Uuid;

pub struct NodeRepository<'a> {
    conn: &'a Connection,
}

impl<'a> NodeRepository<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub async fn insert(&self, node: &Node) -> Result<(), DbError> {
        self.conn
            .execute(
                "INSERT INTO nodes
                 (id, cluster_name, tenant_id, model_id, region_id, provider, instance_typename,
                  endpoint, spot, status, health_score, last_heartbeat_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                params![
                    node.id.to_string(),
                    node.cluster_name.clone(),
                    node.tenant_id.map(|t| t.to_string()),
                    node.model_id.to_string(),
                    node.region_id.to_string(),
                    node.provider.clone(),
                    node.instance_typename.clone(),
                    node.endpoint.clone(),
                    node.spot,
                    status_str(node.status).to_string(),
                    node.health_score as i64,
                    node.last_heartbeat_at.map(|d| d.to_rfc3339()),
                ],
            )
            .await?;
        Ok(())
    }

    pub async fn find_by_id(&self, id: NodeId) -> Result<Node, DbError> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, cluster_name, tenant_id, model_id, region_id, provider, instance_typename,
                        endpoint, spot, status, health_score, last_heartbeat_at
                 FROM nodes WHERE id = ?1",
                params![id.to_string()],
            )
            .await?;
        match rows.next().await? {
            Some(row) => row_to_node(&row),
            None => Err(DbError::NotFound),
        }
    }

    pub async fn list_by_model(&self, model_id: Uuid) -> Result<Vec<Node>, DbError> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, cluster_name, tenant_id, model_id, region_id, provider, instance_typename,
                        endpoint, spot, status, health_score, last_heartbeat_at
                 FROM nodes WHERE model_id = ?1",
                params![model_id.to_string()],
            )
            .await?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await? {
            out.push(row_to_node(&row)?);
        }
        Ok(out)
    }

    pub async fn list_by_status(&self, status: NodeStatus) -> Result<Vec<Node>, DbError> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, cluster_name, tenant_id, model_id, region_id, provider, instance_typename,
                        endpoint, spot, status, health_score, last_heartbeat_at
                 FROM nodes WHERE status = ?1",
                params![status_str(status).to_string()],
            )
            .await?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await? {
            out.push(row_to_node(&row)?);
        }
        Ok(out)
    }

    pub async fn update_status(&self, id: NodeId, status: NodeStatus) -> Result<(), DbError> {
        let changed = self
            .conn
            .execute(
                "UPDATE nodes SET status = ?1 WHERE id = ?2",
                params![status_str(status).to_string(), id.to_string()],
            )
            .await?;
        if changed == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }

    pub async fn update_status_and_health_score(&self, id: NodeId, status: NodeStatus, health_score: u8) -> Result<(), DbError> {
        let changed = self
            .conn
            .execute(
                "UPDATE nodes SET status = ?1, health_score = ?2 WHERE id = ?3",
                params![status_str(status).to_string(), health_score as i64, id.to_string()],
            )
            .await?;
        if changed == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }

    pub async fn record_heartbeat(
        &self,
        id: NodeId,
        health_score: u8,
        endpoint: Option<String>,
    ) -> Result<(), DbError> {
        let changed = self
            .conn
            .execute(
                "UPDATE nodes SET health_score = ?1, endpoint = COALESCE(?2, endpoint),
                 last_heartbeat_at = ?3, status = CASE WHEN status = 'provisioning' THEN 'active' ELSE status END
                 WHERE id = ?4",
                params![
                    health_score as i64,
                    endpoint,
                    chrono::Utc::now().to_rfc3339(),
                    id.to_string(),
                ],
            )
            .await?;
        if changed == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }

    pub async fn delete(&self, id: NodeId) -> Result<(), DbError> {
        self.conn
            .execute("DELETE FROM nodes WHERE id = ?1", params![id.to_string()])
            .await?;
        Ok(())
    }
}

fn status_str(status: NodeStatus) -> &'static str {
    match status {
        NodeStatus::Provisioning => "provisioning",
        NodeStatus::Active => "active",
        NodeStatus::Draining => "draining",
        NodeStatus::Terminated => "terminated",
        NodeStatus::Unhealthy => "unhealthy",
        NodeStatus::Lost => "lost",
    }
}

fn row_to_node(row: &libsql::Row) -> Result<Node, DbError> {
    let id: String = row.get(0)?;
    let cluster_name: String = row.get(1)?;
    let tenant_id: Option<String> = row.get(2)?;
    let model_id: String = row.get(3)?;
    let region_id: String = row.get(4)?;
    let provider: String = row.get(5)?;
    let instance_typename: String = row.get(6)?;
    let endpoint: Option<String> = row.get(7)?;
    let spot: i64 = row.get(8)?;
    let status_raw: String = row.get(9)?;
    let health_score: i64 = row.get(10)?;
    let last_heartbeat_at: Option<String> = row.get(11)?;

    let status = match status_raw.as_str() {
        "provisioning" => NodeStatus::Provisioning,
        "active" => NodeStatus::Active,
        "draining" => NodeStatus::Draining,
        "terminated" => NodeStatus::Terminated,
        "unhealthy" => NodeStatus::Unhealthy,
        "lost" => NodeStatus::Lost,
        other => return Err(DbError::Mapping(format!("unknown node status: {other}"))),
    };

    Ok(Node {
        id: Uuid::parse_str(&id).map_err(|e| DbError::Mapping(e.to_string()))?,
        cluster_name,
        tenant_id: tenant_id
            .map(|t| Uuid::parse_str(&t).map_err(|e| DbError::Mapping(e.to_string())))
            .transpose()?,
        model_id: Uuid::parse_str(&model_id).map_err(|e| DbError::Mapping(e.to_string()))?,
        region_id: Uuid::parse_str(&region_id).map_err(|e| DbError::Mapping(e.to_string()))?,
        provider,
        instance_typename,
        endpoint,
        spot: spot != 0,
        status,
        health_score: health_score as u8,
        last_heartbeat_at: last_heartbeat_at.map(|d| super::parse_timestamp(&d)),
    })
}
