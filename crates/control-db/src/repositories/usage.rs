use crate::errors::DbError;
use chrono::{DateTime, Duration, Utc};
use control_core::usage::{UsageHourly, UsageRecord};
use libsql::{params, Connection};
use uuid::Uuid;

pub struct UsageRepository<'a> {
    conn: &'a Connection,
}

impl<'a> UsageRepository<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Flushes a batch of buffered usage records in one transaction —
    /// mirrors the meter's ring-buffer flush cadence, not a per-request
    /// write.
    pub async fn insert_batch(&self, records: &[UsageRecord]) -> Result<(), DbError> {
        if records.is_empty() {
            return Ok(());
        }
        self.conn
            .execute("BEGIN", ())
            .await
            .map_err(|e| DbError::Transaction(e.to_string()))?;

        for record in records {
            let result = self
                .conn
                .execute(
                    "INSERT INTO usage_records
                     (id, tenant_id, environment_id, api_key_id, model_id, node_id, timestamp,
                      prompt_tokens, completion_tokens, cached_tokens, total_tokens, latency_ms,
                      cost, request_id, stream, usage_missing)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
                    params![
                        record.id.to_string(),
                        record.tenant_id.to_string(),
                        record.environment_id.to_string(),
                        record.api_key_id.to_string(),
                        record.model_id.to_string(),
                        record.node_id.to_string(),
                        record.timestamp.to_rfc3339(),
                        record.prompt_tokens as i64,
                        record.completion_tokens as i64,
                        record.cached_tokens as i64,
                        record.total_tokens as i64,
                        record.latency_ms as i64,
                        record.cost,
                        record.request_id.to_string(),
                        record.stream,
                        record.usage_missing,
                    ],
                )
                .await;

            if let Err(e) = result {
                let _ = self.conn.execute("ROLLBACK", ()).await;
                return Err(DbError::Query(e));
            }
        }

        self.conn
            .execute("COMMIT", ())
            .await
            .map_err(|e| DbError::Transaction(e.to_string()))?;
        Ok(())
    }

    pub async fn list_for_tenant_since(
        &self,
        tenant_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<Vec<UsageRecord>, DbError> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, tenant_id, environment_id, api_key_id, model_id, node_id, timestamp,
                        prompt_tokens, completion_tokens, cached_tokens, total_tokens, latency_ms,
                        cost, request_id, stream, usage_missing
                 FROM usage_records WHERE tenant_id = ?1 AND timestamp >= ?2
                 ORDER BY timestamp DESC",
                params![tenant_id.to_string(), since.to_rfc3339()],
            )
            .await?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await? {
            out.push(row_to_record(&row)?);
        }
        Ok(out)
    }

    /// Folds every not-yet-exported usage record whose hour bucket has
    /// closed into `usage_hourly`, upserting per (tenant, model,
    /// environment, hour). Idempotent: re-running after a crash mid-export
    /// re-sums the same source rows into the same bucket.
    pub async fn aggregate_hour(&self, hour_start: DateTime<Utc>) -> Result<u64, DbError> {
        let hour_end = hour_start + Duration::hours(1);

        let mut rows = self
            .conn
            .query(
                "SELECT tenant_id, model_id, environment_id,
                        SUM(prompt_tokens), SUM(completion_tokens), SUM(cached_tokens),
                        SUM(total_tokens), SUM(cost), COUNT(*)
                 FROM usage_records
                 WHERE timestamp >= ?1 AND timestamp < ?2
                 GROUP BY tenant_id, model_id, environment_id",
                params![hour_start.to_rfc3339(), hour_end.to_rfc3339()],
            )
            .await?;

        let mut buckets = 0u64;
        while let Some(row) = rows.next().await? {
            let tenant_id: String = row.get(0)?;
            let model_id: String = row.get(1)?;
            let environment_id: String = row.get(2)?;
            let prompt_tokens: i64 = row.get(3)?;
            let completion_tokens: i64 = row.get(4)?;
            let cached_tokens: i64 = row.get(5)?;
            let total_tokens: i64 = row.get(6)?;
            let cost: f64 = row.get(7)?;
            let request_count: i64 = row.get(8)?;

            self.conn
                .execute(
                    "INSERT INTO usage_hourly
                     (tenant_id, model_id, environment_id, hour, prompt_tokens, completion_tokens,
                      cached_tokens, total_tokens, cost, request_count, exported)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, 0)
                     ON CONFLICT(tenant_id, model_id, environment_id, hour) DO UPDATE SET
                       prompt_tokens = excluded.prompt_tokens,
                       completion_tokens = excluded.completion_tokens,
                       cached_tokens = excluded.cached_tokens,
                       total_tokens = excluded.total_tokens,
                       cost = excluded.cost,
                       request_count = excluded.request_count",
                    params![
                        tenant_id,
                        model_id,
                        environment_id,
                        hour_start.to_rfc3339(),
                        prompt_tokens,
                        completion_tokens,
                        cached_tokens,
                        total_tokens,
                        cost,
                        request_count,
                    ],
                )
                .await?;
            buckets += 1;
        }

        Ok(buckets)
    }

    pub async fn list_unexported_hourly(&self) -> Result<Vec<UsageHourly>, DbError> {
        let mut rows = self
            .conn
            .query(
                "SELECT tenant_id, model_id, environment_id, hour, prompt_tokens, completion_tokens,
                        cached_tokens, total_tokens, cost, request_count, exported
                 FROM usage_hourly WHERE exported = 0",
                (),
            )
            .await?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await? {
            out.push(row_to_hourly(&row)?);
        }
        Ok(out)
    }

    pub async fn mark_exported(
        &self,
        tenant_id: Uuid,
        model_id: Uuid,
        environment_id: Uuid,
        hour: DateTime<Utc>,
    ) -> Result<(), DbError> {
        self.conn
            .execute(
                "UPDATE usage_hourly SET exported = 1
                 WHERE tenant_id = ?1 AND model_id = ?2 AND environment_id = ?3 AND hour = ?4",
                params![
                    tenant_id.to_string(),
                    model_id.to_string(),
                    environment_id.to_string(),
                    hour.to_rfc3339(),
                ],
            )
            .await?;
        Ok(())
    }
}

fn row_to_record(row: &libsql::Row) -> Result<UsageRecord, DbError> {
    let id: String = row.get(0)?;
    let tenant_id: String = row.get(1)?;
    let environment_id: String = row.get(2)?;
    let api_key_id: String = row.get(3)?;
    let model_id: String = row.get(4)?;
    let node_id: String = row.get(5)?;
    let timestamp: String = row.get(6)?;
    let prompt_tokens: i64 = row.get(7)?;
    let completion_tokens: i64 = row.get(8)?;
    let cached_tokens: i64 = row.get(9)?;
    let total_tokens: i64 = row.get(10)?;
    let latency_ms: i64 = row.get(11)?;
    let cost: f64 = row.get(12)?;
    let request_id: String = row.get(13)?;
    let stream: i64 = row.get(14)?;
    let usage_missing: i64 = row.get(15)?;

    Ok(UsageRecord {
        id: Uuid::parse_str(&id).map_err(|e| DbError::Mapping(e.to_string()))?,
        tenant_id: Uuid::parse_str(&tenant_id).map_err(|e| DbError::Mapping(e.to_string()))?,
        environment_id: Uuid::parse_str(&environment_id).map_err(|e| DbError::Mapping(e.to_string()))?,
        api_key_id: Uuid::parse_str(&api_key_id).map_err(|e| DbError::Mapping(e.to_string()))?,
        model_id: Uuid::parse_str(&model_id).map_err(|e| DbError::Mapping(e.to_string()))?,
        node_id: Uuid::parse_str(&node_id).map_err(|e| DbError::Mapping(e.to_string()))?,
        timestamp: super::parse_timestamp(&timestamp),
        prompt_tokens: prompt_tokens as u64,
        completion_tokens: completion_tokens as u64,
        cached_tokens: cached_tokens as u64,
        total_tokens: total_tokens as u64,
        latency_ms: latency_ms as u64,
        cost,
        request_id: Uuid::parse_str(&request_id).map_err(|e| DbError::Mapping(e.to_string()))?,
        stream: stream != 0,
        usage_missing: usage_missing != 0,
    })
}

fn row_to_hourly(row: &libsql::Row) -> Result<UsageHourly, DbError> {
    let tenant_id: String = row.get(0)?;
    let model_id: String = row.get(1)?;
    let environment_id: String = row.get(2)?;
    let hour: String = row.get(3)?;
    let prompt_tokens: i64 = row.get(4)?;
    let completion_tokens: i64 = row.get(5)?;
    let cached_tokens: i64 = row.get(6)?;
    let total_tokens: i64 = row.get(7)?;
    let cost: f64 = row.get(8)?;
    let request_count: i64 = row.get(9)?;
    let exported: i64 = row.get(10)?;

    Ok(UsageHourly {
        tenant_id: Uuid::parse_str(&tenant_id).map_err(|e| DbError::Mapping(e.to_string()))?,
        model_id: Uuid::parse_str(&model_id).map_err(|e| DbError::Mapping(e.to_string()))?,
        environment_id: Uuid::parse_str(&environment_id).map_err(|e| DbError::Mapping(e.to_string()))?,
        hour: super::parse_timestamp(&hour),
        prompt_tokens: prompt_tokens as u64,
        completion_tokens: completion_tokens as u64,
        cached_tokens: cached_tokens as u64,
        total_tokens: total_tokens as u64,
        cost,
        request_count: request_count as u64,
        exported: exported != 0,
    })
}
