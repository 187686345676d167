use crate::errors::DbError;
use control_core::tenant::{Tenant, TenantStatus};
use libsql::{params, Connection};
use uuid::Uuid;

pub struct TenantRepository<'a> {
    conn: &'a Connection,
}

impl<'a> TenantRepository<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub async fn insert(&self, tenant: &Tenant) -> Result<(), DbError> {
        if !tenant.is_well_formed() {
            return Err(DbError::Mapping("tenant status/deleted_at mismatch".into()));
        }
        self.conn
            .execute(
                "INSERT INTO tenants (id, display_name, contact_email, billing_plan, status, deleted_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    tenant.id.to_string(),
                    tenant.display_name.clone(),
                    tenant.contact_email.clone(),
                    tenant.billing_plan.clone(),
                    status_str(tenant.status).to_string(),
                    tenant.deleted_at.map(|d| d.to_rfc3339()),
                ],
            )
            .await?;
        Ok(())
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Tenant, DbError> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, display_name, contact_email, billing_plan, status, deleted_at
                 FROM tenants WHERE id = ?1",
                params![id.to_string()],
            )
            .await?;

        match rows.next().await? {
            Some(row) => row_to_tenant(&row),
            None => Err(DbError::NotFound),
        }
    }

    pub async fn update_status(&self, id: Uuid, status: TenantStatus) -> Result<(), DbError> {
        let deleted_at = matches!(status, TenantStatus::Deleted).then(|| chrono::Utc::now().to_rfc3339());
        let changed = self
            .conn
            .execute(
                "UPDATE tenants SET status = ?1, deleted_at = ?2 WHERE id = ?3",
                params![status_str(status).to_string(), deleted_at, id.to_string()],
            )
            .await?;
        if changed == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }

    pub async fn list(&self) -> Result<Vec<Tenant>, DbError> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, display_name, contact_email, billing_plan, status, deleted_at FROM tenants",
                (),
            )
            .await?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await? {
            out.push(row_to_tenant(&row)?);
        }
        Ok(out)
    }
}

fn status_str(status: TenantStatus) -> &'static str {
    match status {
        TenantStatus::Active => "active",
        TenantStatus::Suspended => "suspended",
        TenantStatus::Deleted => "deleted",
    }
}

fn row_to_tenant(row: &libsql::Row) -> Result<Tenant, DbError> {
    let id: String = row.get(0)?;
    let display_name: String = row.get(1)?;
    let contact_email: String = row.get(2)?;
    let billing_plan: String = row.get(3)?;
    let status_raw: String = row.get(4)?;
    let deleted_at: Option<String> = row.get(5)?;

    let status = match status_raw.as_str() {
        "active" => TenantStatus::Active,
        "suspended" => TenantStatus::Suspended,
        "deleted" => TenantStatus::Deleted,
        other => return Err(DbError::Mapping(format!("unknown tenant status: {other}"))),
    };

    Ok(Tenant {
        id: Uuid::parse_str(&id).map_err(|e| DbError::Mapping(e.to_string()))?,
        display_name,
        contact_email,
        billing_plan,
        status,
        deleted_at: deleted_at.map(|d| super::parse_timestamp(&d)),
    })
}
