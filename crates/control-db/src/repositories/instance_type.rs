use crate::errors::DbError;
use control_core::instance_type::InstanceType;
use libsql::{params, Connection};

pub struct InstanceTypeRepository<'a> {
    conn: &'a Connection,
}

impl<'a> InstanceTypeRepository<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub async fn insert(&self, instance_type: &InstanceType) -> Result<(), DbError> {
        self.conn
            .execute(
                "INSERT INTO instance_types
                 (provider, typename, vcpu, memory_gb, gpu_model, gpu_count, gpu_memory_gb,
                  on_demand_price_per_hour, spot_price_per_hour, spot_supported)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    instance_type.provider.clone(),
                    instance_type.typename.clone(),
                    instance_type.vcpu,
                    instance_type.memory_gb,
                    instance_type.gpu_model.clone(),
                    instance_type.gpu_count,
                    instance_type.gpu_memory_gb,
                    instance_type.on_demand_price_per_hour,
                    instance_type.spot_price_per_hour,
                    instance_type.spot_supported,
                ],
            )
            .await?;
        Ok(())
    }

    pub async fn find(&self, provider: &str, typename: &str) -> Result<InstanceType, DbError> {
        let mut rows = self
            .conn
            .query(
                "SELECT provider, typename, vcpu, memory_gb, gpu_model, gpu_count, gpu_memory_gb,
                        on_demand_price_per_hour, spot_price_per_hour, spot_supported
                 FROM instance_types WHERE provider = ?1 AND typename = ?2",
                params![provider.to_string(), typename.to_string()],
            )
            .await?;
        match rows.next().await? {
            Some(row) => row_to_instance_type(&row),
            None => Err(DbError::NotFound),
        }
    }

    pub async fn list_for_provider(&self, provider: &str) -> Result<Vec<InstanceType>, DbError> {
        let mut rows = self
            .conn
            .query(
                "SELECT provider, typename, vcpu, memory_gb, gpu_model, gpu_count, gpu_memory_gb,
                        on_demand_price_per_hour, spot_price_per_hour, spot_supported
                 FROM instance_types WHERE provider = ?1",
                params![provider.to_string()],
            )
            .await?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await? {
            out.push(row_to_instance_type(&row)?);
        }
        Ok(out)
    }
}

fn row_to_instance_type(row: &libsql::Row) -> Result<InstanceType, DbError> {
    let provider: String = row.get(0)?;
    let typename: String = row.get(1)?;
    let vcpu: i64 = row.get(2)?;
    let memory_gb: i64 = row.get(3)?;
    let gpu_model: String = row.get(4)?;
    let gpu_count: i64 = row.get(5)?;
    let gpu_memory_gb: i64 = row.get(6)?;
    let on_demand_price_per_hour: f64 = row.get(7)?;
    let spot_price_per_hour: Option<f64> = row.get(8)?;
    let spot_supported: i64 = row.get(9)?;

    Ok(InstanceType {
        provider,
        typename,
        vcpu: vcpu as u32,
        memory_gb: memory_gb as u32,
        gpu_model,
        gpu_count: gpu_count as u32,
        gpu_memory_gb: gpu_memory_gb as u32,
        on_demand_price_per_hour,
        spot_price_per_hour,
        spot_supported: spot_supported != 0,
    })
}
