//! `GET /v1/metrics/*` — derived operational signals layered over the
//! same usage read used by `/v1/usage` (§6), plus the live registry/node
//! state `control-registry` and `control-cache` already hold in memory.

use crate::error_response::ApiErrorResponse;
use crate::middleware::AuthContext;
use crate::state::AppState;
use axum::extract::{Extension, State};
use axum::response::Json;
use chrono::{Duration, Utc};
use control_core::error::{ApiError, ErrorKind};
use control_db::repositories::UsageRepository;
use serde_json::{json, Value};
use std::collections::HashMap;

const LOOKBACK: Duration = Duration::hours(1);

pub async fn performance(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<Value>, ApiErrorResponse> {
    let conn = state
        .db
        .connection()
        .map_err(|e| ApiErrorResponse(ApiError::new(ErrorKind::InternalError, e.to_string())))?;
    let records = UsageRepository::new(&conn)
        .list_for_tenant_since(auth.tenant_id, Utc::now() - LOOKBACK)
        .await
        .map_err(|e| ApiErrorResponse(ApiError::new(ErrorKind::InternalError, e.to_string())))?;

    let request_count = records.len();
    let avg_latency_ms = if request_count == 0 {
        0.0
    } else {
        records.iter().map(|r| r.latency_ms as f64).sum::<f64>() / request_count as f64
    };
    let error_free_streams = records.iter().filter(|r| !r.usage_missing).count();

    Ok(Json(json!({
        "window_seconds": LOOKBACK.num_seconds(),
        "request_count": request_count,
        "avg_latency_ms": avg_latency_ms,
        "usage_missing_rate": if request_count == 0 { 0.0 } else { 1.0 - (error_free_streams as f64 / request_count as f64) },
    })))
}

pub async fn throughput(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<Value>, ApiErrorResponse> {
    let conn = state
        .db
        .connection()
        .map_err(|e| ApiErrorResponse(ApiError::new(ErrorKind::InternalError, e.to_string())))?;
    let records = UsageRepository::new(&conn)
        .list_for_tenant_since(auth.tenant_id, Utc::now() - LOOKBACK)
        .await
        .map_err(|e| ApiErrorResponse(ApiError::new(ErrorKind::InternalError, e.to_string())))?;

    let total_tokens: u64 = records.iter().map(|r| r.total_tokens).sum();
    let window_seconds = LOOKBACK.num_seconds().max(1) as f64;

    Ok(Json(json!({
        "window_seconds": LOOKBACK.num_seconds(),
        "requests_per_second": records.len() as f64 / window_seconds,
        "tokens_per_second": total_tokens as f64 / window_seconds,
    })))
}

pub async fn by_model(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<Value>, ApiErrorResponse> {
    let conn = state
        .db
        .connection()
        .map_err(|e| ApiErrorResponse(ApiError::new(ErrorKind::InternalError, e.to_string())))?;
    let records = UsageRepository::new(&conn)
        .list_for_tenant_since(auth.tenant_id, Utc::now() - LOOKBACK)
        .await
        .map_err(|e| ApiErrorResponse(ApiError::new(ErrorKind::InternalError, e.to_string())))?;

    let mut per_model: HashMap<String, (u64, u64)> = HashMap::new();
    for record in &records {
        let entry = per_model.entry(record.model_id.to_string()).or_insert((0, 0));
        entry.0 += 1;
        entry.1 += record.total_tokens;
    }

    let data: Vec<Value> = per_model
        .into_iter()
        .map(|(model_id, (requests, tokens))| json!({ "model_id": model_id, "requests": requests, "tokens": tokens }))
        .collect();

    Ok(Json(json!({ "object": "list", "data": data })))
}
