use crate::errors::DbError;
use control_core::region::Region;
use libsql::{params, Connection};
use uuid::Uuid;

pub struct RegionRepository<'a> {
    conn: &'a Connection,
}

impl<'a> RegionRepository<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub async fn insert(&self, region: &Region) -> Result<(), DbError> {
        self.conn
            .execute(
                "INSERT INTO regions (id, code, name, provider, available, pricing_multiplier)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    region.id.to_string(),
                    region.code.clone(),
                    region.name.clone(),
                    region.provider.clone(),
                    region.available,
                    region.pricing_multiplier,
                ],
            )
            .await?;
        Ok(())
    }

    pub async fn list_available(&self) -> Result<Vec<Region>, DbError> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, code, name, provider, available, pricing_multiplier
                 FROM regions WHERE available = 1",
                (),
            )
            .await?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await? {
            out.push(row_to_region(&row)?);
        }
        Ok(out)
    }

    pub async fn find_by_code(&self, code: &str) -> Result<Region, DbError> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, code, name, provider, available, pricing_multiplier
                 FROM regions WHERE code = ?1",
                params![code.to_string()],
            )
            .await?;
        match rows.next().await? {
            Some(row) => row_to_region(&row),
            None => Err(DbError::NotFound),
        }
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Region, DbError> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, code, name, provider, available, pricing_multiplier
                 FROM regions WHERE id = ?1",
                params![id.to_string()],
            )
            .await?;
        match rows.next().await? {
            Some(row) => row_to_region(&row),
            None => Err(DbError::NotFound),
        }
    }
}

fn row_to_region(row: &libsql::Row) -> Result<Region, DbError> {
    let id: String = row.get(0)?;
    let code: String = row.get(1)?;
    let name: String = row.get(2)?;
    let provider: String = row.get(3)?;
    let available: i64 = row.get(4)?;
    let pricing_multiplier: f64 = row.get(5)?;

    Ok(Region {
        id: Uuid::parse_str(&id).map_err(|e| DbError::Mapping(e.to_string()))?,
        code,
        name,
        provider,
        available: available != 0,
        pricing_multiplier,
    })
}
