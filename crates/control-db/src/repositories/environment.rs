use crate::errors::DbError;
use control_core::environment::Environment;
use libsql::{params, Connection};
use uuid::Uuid;

pub struct EnvironmentRepository<'a> {
    conn: &'a Connection,
}

impl<'a> EnvironmentRepository<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub async fn insert(&self, env: &Environment) -> Result<(), DbError> {
        self.conn
            .execute(
                "INSERT INTO environments (id, tenant_id, name, default_region_id)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    env.id.to_string(),
                    env.tenant_id.to_string(),
                    env.name.clone(),
                    env.default_region_id.map(|r| r.to_string()),
                ],
            )
            .await?;
        Ok(())
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Environment, DbError> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, tenant_id, name, default_region_id FROM environments WHERE id = ?1",
                params![id.to_string()],
            )
            .await?;
        match rows.next().await? {
            Some(row) => row_to_environment(&row),
            None => Err(DbError::NotFound),
        }
    }

    pub async fn list_for_tenant(&self, tenant_id: Uuid) -> Result<Vec<Environment>, DbError> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, tenant_id, name, default_region_id FROM environments WHERE tenant_id = ?1",
                params![tenant_id.to_string()],
            )
            .await?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await? {
            out.push(row_to_environment(&row)?);
        }
        Ok(out)
    }
}

fn row_to_environment(row: &libsql::Row) -> Result<Environment, DbError> {
    let id: String = row.get(0)?;
    let tenant_id: String = row.get(1)?;
    let name: String = row.get(2)?;
    let default_region_id: Option<String> = row.get(3)?;

    Ok(Environment {
        id: Uuid::parse_str(&id).map_err(|e| DbError::Mapping(e.to_string()))?,
        tenant_id: Uuid::parse_str(&tenant_id).map_err(|e| DbError::Mapping(e.to_string()))?,
        name,
        default_region_id: default_region_id
            .map(|r| Uuid::parse_str(&r).map_err(|e| DbError::Mapping(e.to_string())))
            .transpose()?,
    })
}
