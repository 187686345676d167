use crate::errors::DbError;
use control_core::api_key::{ApiKey, KeyStatus};
use libsql::{params, Connection};
use uuid::Uuid;

pub struct ApiKeyRepository<'a> {
    conn: &'a Connection,
}

impl<'a> ApiKeyRepository<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub async fn insert(&self, key: &ApiKey) -> Result<(), DbError> {
        self.conn
            .execute(
                "INSERT INTO api_keys
                 (id, tenant_id, environment_id, secret_digest, prefix, status,
                  rate_limit_rpm_override, concurrency_override, last_used_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    key.id.to_string(),
                    key.tenant_id.to_string(),
                    key.environment_id.to_string(),
                    key.secret_digest.clone(),
                    key.prefix.clone(),
                    status_str(key.status).to_string(),
                    key.rate_limit_rpm_override,
                    key.concurrency_override,
                    key.last_used_at.map(|d| d.to_rfc3339()),
                ],
            )
            .await?;
        Ok(())
    }

    /// Looks a key up by its unindexed-friendly prefix — the lookup path
    /// authentication takes before verifying the presented secret.
    pub async fn find_by_prefix(&self, prefix: &str) -> Result<ApiKey, DbError> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, tenant_id, environment_id, secret_digest, prefix, status,
                        rate_limit_rpm_override, concurrency_override, last_used_at
                 FROM api_keys WHERE prefix = ?1",
                params![prefix.to_string()],
            )
            .await?;
        match rows.next().await? {
            Some(row) => row_to_key(&row),
            None => Err(DbError::NotFound),
        }
    }

    pub async fn touch_last_used(&self, id: Uuid) -> Result<(), DbError> {
        self.conn
            .execute(
                "UPDATE api_keys SET last_used_at = ?1 WHERE id = ?2",
                params![chrono::Utc::now().to_rfc3339(), id.to_string()],
            )
            .await?;
        Ok(())
    }

    pub async fn update_status(&self, id: Uuid, status: KeyStatus) -> Result<(), DbError> {
        let changed = self
            .conn
            .execute(
                "UPDATE api_keys SET status = ?1 WHERE id = ?2",
                params![status_str(status).to_string(), id.to_string()],
            )
            .await?;
        if changed == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }

    pub async fn list_for_environment(&self, environment_id: Uuid) -> Result<Vec<ApiKey>, DbError> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, tenant_id, environment_id, secret_digest, prefix, status,
                        rate_limit_rpm_override, concurrency_override, last_used_at
                 FROM api_keys WHERE environment_id = ?1",
                params![environment_id.to_string()],
            )
            .await?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await? {
            out.push(row_to_key(&row)?);
        }
        Ok(out)
    }
}

fn status_str(status: KeyStatus) -> &'static str {
    match status {
        KeyStatus::Active => "active",
        KeyStatus::Suspended => "suspended",
        KeyStatus::Revoked => "revoked",
    }
}

fn row_to_key(row: &libsql::Row) -> Result<ApiKey, DbError> {
    let id: String = row.get(0)?;
    let tenant_id: String = row.get(1)?;
    let environment_id: String = row.get(2)?;
    let secret_digest: String = row.get(3)?;
    let prefix: String = row.get(4)?;
    let status_raw: String = row.get(5)?;
    let rate_limit_rpm_override: Option<i64> = row.get(6)?;
    let concurrency_override: Option<i64> = row.get(7)?;
    let last_used_at: Option<String> = row.get(8)?;

    let status = match status_raw.as_str() {
        "active" => KeyStatus::Active,
        "suspended" => KeyStatus::Suspended,
        "revoked" => KeyStatus::Revoked,
        other => return Err(DbError::Mapping(format!("unknown key status: {other}"))),
    };

    Ok(ApiKey {
        id: Uuid::parse_str(&id).map_err(|e| DbError::Mapping(e.to_string()))?,
        tenant_id: Uuid::parse_str(&tenant_id).map_err(|e| DbError::Mapping(e.to_string()))?,
        environment_id: Uuid::parse_str(&environment_id).map_err(|e| DbError::Mapping(e.to_string()))?,
        secret_digest,
        prefix,
        status,
        rate_limit_rpm_override: rate_limit_rpm_override.map(|v| v as u32),
        concurrency_override: concurrency_override.map(|v| v as u32),
        last_used_at: last_used_at.map(|d| super::parse_timestamp(&d)),
    })
}
