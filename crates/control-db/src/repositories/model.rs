use crate::errors::DbError;
use control_core::model::{Model, ModelKind, ModelStatus, SchedulingStrategy};
use libsql::{params, Connection};
use uuid::Uuid;

pub struct ModelRepository<'a> {
    conn: &'a Connection,
}

impl<'a> ModelRepository<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub async fn insert(&self, model: &Model) -> Result<(), DbError> {
        self.conn
            .execute(
                "INSERT INTO models
                 (id, canonical_name, family, size_label, kind, context_window, required_memory_mb,
                  input_price_per_million, output_price_per_million, cached_input_price_per_million,
                  status, scheduling_strategy)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                params![
                    model.id.to_string(),
                    model.canonical_name.clone(),
                    model.family.clone(),
                    model.size_label.clone(),
                    kind_str(model.kind).to_string(),
                    model.context_window,
                    model.required_memory_mb,
                    model.input_price_per_million,
                    model.output_price_per_million,
                    model.cached_input_price_per_million,
                    status_str(model.status).to_string(),
                    strategy_str(model.scheduling_strategy).to_string(),
                ],
            )
            .await?;
        Ok(())
    }

    pub async fn find_by_name(&self, canonical_name: &str) -> Result<Model, DbError> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, canonical_name, family, size_label, kind, context_window, required_memory_mb,
                        input_price_per_million, output_price_per_million, cached_input_price_per_million,
                        status, scheduling_strategy
                 FROM models WHERE canonical_name = ?1",
                params![canonical_name.to_string()],
            )
            .await?;
        match rows.next().await? {
            Some(row) => row_to_model(&row),
            None => Err(DbError::NotFound),
        }
    }

    pub async fn list_active(&self) -> Result<Vec<Model>, DbError> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, canonical_name, family, size_label, kind, context_window, required_memory_mb,
                        input_price_per_million, output_price_per_million, cached_input_price_per_million,
                        status, scheduling_strategy
                 FROM models WHERE status = 'active'",
                (),
            )
            .await?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await? {
            out.push(row_to_model(&row)?);
        }
        Ok(out)
    }

    /// `kind` and `required_memory_mb` are not accepted here — immutable
    /// once a model exists (§3).
    pub async fn update_pricing_and_strategy(
        &self,
        id: Uuid,
        input_price_per_million: f64,
        output_price_per_million: f64,
        scheduling_strategy: SchedulingStrategy,
    ) -> Result<(), DbError> {
        let changed = self
            .conn
            .execute(
                "UPDATE models SET input_price_per_million = ?1, output_price_per_million = ?2,
                 scheduling_strategy = ?3 WHERE id = ?4",
                params![
                    input_price_per_million,
                    output_price_per_million,
                    strategy_str(scheduling_strategy).to_string(),
                    id.to_string(),
                ],
            )
            .await?;
        if changed == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }
}

fn kind_str(kind: ModelKind) -> &'static str {
    match kind {
        ModelKind::Chat => "chat",
        ModelKind::Completion => "completion",
        ModelKind::Embedding => "embedding",
    }
}

fn status_str(status: ModelStatus) -> &'static str {
    match status {
        ModelStatus::Active => "active",
        ModelStatus::Retired => "retired",
    }
}

fn strategy_str(strategy: SchedulingStrategy) -> &'static str {
    match strategy {
        SchedulingStrategy::LeastLoaded => "least_loaded",
        SchedulingStrategy::RoundRobin => "round_robin",
        SchedulingStrategy::Weighted => "weighted",
        SchedulingStrategy::Random => "random",
    }
}

fn row_to_model(row: &libsql::Row) -> Result<Model, DbError> {
    let id: String = row.get(0)?;
    let canonical_name: String = row.get(1)?;
    let family: String = row.get(2)?;
    let size_label: String = row.get(3)?;
    let kind_raw: String = row.get(4)?;
    let context_window: i64 = row.get(5)?;
    let required_memory_mb: i64 = row.get(6)?;
    let input_price_per_million: f64 = row.get(7)?;
    let output_price_per_million: f64 = row.get(8)?;
    let cached_input_price_per_million: Option<f64> = row.get(9)?;
    let status_raw: String = row.get(10)?;
    let strategy_raw: String = row.get(11)?;

    let kind = match kind_raw.as_str() {
        "chat" => ModelKind::Chat,
        "completion" => ModelKind::Completion,
        "embedding" => ModelKind::Embedding,
        other => return Err(DbError::Mapping(format!("unknown model kind: {other}"))),
    };
    let status = match status_raw.as_str() {
        "active" => ModelStatus::Active,
        "retired" => ModelStatus::Retired,
        other => return Err(DbError::Mapping(format!("unknown model status: {other}"))),
    };
    let scheduling_strategy = match strategy_raw.as_str() {
        "least_loaded" => SchedulingStrategy::LeastLoaded,
        "round_robin" => SchedulingStrategy::RoundRobin,
        "weighted" => SchedulingStrategy::Weighted,
        "random" => SchedulingStrategy::Random,
        other => return Err(DbError::Mapping(format!("unknown scheduling strategy: {other}"))),
    };

    Ok(Model {
        id: Uuid::parse_str(&id).map_err(|e| DbError::Mapping(e.to_string()))?,
        canonical_name,
        family,
        size_label,
        kind,
        context_window: context_window as u32,
        required_memory_mb: required_memory_mb as u32,
        input_price_per_million,
        output_price_per_million,
        cached_input_price_per_million,
        status,
        scheduling_strategy,
    })
}
