//! `GET /v1/usage*` — per-tenant usage aggregates (§6). The store only
//! indexes by `(tenant, timestamp)`, so every breakdown here re-shapes the
//! same `list_for_tenant_since` read rather than issuing a dedicated
//! query per view.

use crate::error_response::ApiErrorResponse;
use crate::middleware::AuthContext;
use crate::state::AppState;
use axum::extract::{Extension, Query, State};
use axum::response::Json;
use chrono::{Duration, Utc};
use control_core::error::{ApiError, ErrorKind};
use control_core::usage::UsageRecord;
use control_db::repositories::UsageRepository;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;

const MAX_LIMIT: usize = 1000;
const DEFAULT_LIMIT: usize = 100;
const DEFAULT_LOOKBACK_DAYS: i64 = 30;

#[derive(Debug, Deserialize)]
pub struct UsageQuery {
    limit: Option<usize>,
    offset: Option<usize>,
    since: Option<chrono::DateTime<Utc>>,
}

async fn fetch_records(state: &AppState, auth: &AuthContext, query: &UsageQuery) -> Result<Vec<UsageRecord>, ApiErrorResponse> {
    let since = query.since.unwrap_or_else(|| Utc::now() - Duration::days(DEFAULT_LOOKBACK_DAYS));
    let conn = state
        .db
        .connection()
        .map_err(|e| ApiErrorResponse(ApiError::new(ErrorKind::InternalError, e.to_string())))?;
    UsageRepository::new(&conn)
        .list_for_tenant_since(auth.tenant_id, since)
        .await
        .map_err(|e| ApiErrorResponse(ApiError::new(ErrorKind::InternalError, e.to_string())))
}

fn paginate(records: Vec<UsageRecord>, query: &UsageQuery) -> (Vec<UsageRecord>, usize) {
    let total = records.len();
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);
    let offset = query.offset.unwrap_or(0);
    let page = records.into_iter().skip(offset).take(limit).collect();
    (page, total)
}

pub async fn usage_detailed(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<UsageQuery>,
) -> Result<Json<Value>, ApiErrorResponse> {
    let records = fetch_records(&state, &auth, &query).await?;
    let (page, total) = paginate(records, &query);
    Ok(Json(json!({ "object": "list", "total": total, "data": page })))
}

pub async fn usage_summary(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<UsageQuery>,
) -> Result<Json<Value>, ApiErrorResponse> {
    let records = fetch_records(&state, &auth, &query).await?;
    Ok(Json(summarize(&records)))
}

pub async fn usage_by_model(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<UsageQuery>,
) -> Result<Json<Value>, ApiErrorResponse> {
    let records = fetch_records(&state, &auth, &query).await?;
    Ok(Json(group_by(&records, |r| r.model_id.to_string())))
}

pub async fn usage_by_key(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<UsageQuery>,
) -> Result<Json<Value>, ApiErrorResponse> {
    let records = fetch_records(&state, &auth, &query).await?;
    Ok(Json(group_by(&records, |r| r.api_key_id.to_string())))
}

pub async fn usage_by_hour(
    state: State<AppState>,
    auth: Extension<AuthContext>,
    query: Query<UsageQuery>,
) -> Result<Json<Value>, ApiErrorResponse> {
    usage_bucketed(state, auth, query, "%Y-%m-%dT%H:00:00Z").await
}

pub async fn usage_by_day(
    state: State<AppState>,
    auth: Extension<AuthContext>,
    query: Query<UsageQuery>,
) -> Result<Json<Value>, ApiErrorResponse> {
    usage_bucketed(state, auth, query, "%Y-%m-%d").await
}

pub async fn usage_by_week(
    state: State<AppState>,
    auth: Extension<AuthContext>,
    query: Query<UsageQuery>,
) -> Result<Json<Value>, ApiErrorResponse> {
    usage_bucketed(state, auth, query, "%G-W%V").await
}

pub async fn usage_by_month(
    state: State<AppState>,
    auth: Extension<AuthContext>,
    query: Query<UsageQuery>,
) -> Result<Json<Value>, ApiErrorResponse> {
    usage_bucketed(state, auth, query, "%Y-%m").await
}

async fn usage_bucketed(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<UsageQuery>,
    bucket_format: &str,
) -> Result<Json<Value>, ApiErrorResponse> {
    let records = fetch_records(&state, &auth, &query).await?;
    Ok(Json(group_by(&records, |r| r.timestamp.format(bucket_format).to_string())))
}

fn summarize(records: &[UsageRecord]) -> Value {
    let request_count = records.len() as u64;
    let prompt_tokens: u64 = records.iter().map(|r| r.prompt_tokens).sum();
    let completion_tokens: u64 = records.iter().map(|r| r.completion_tokens).sum();
    let total_tokens: u64 = records.iter().map(|r| r.total_tokens).sum();
    let cost: f64 = records.iter().map(|r| r.cost).sum();
    let missing: u64 = records.iter().filter(|r| r.usage_missing).count() as u64;

    json!({
        "request_count": request_count,
        "prompt_tokens": prompt_tokens,
        "completion_tokens": completion_tokens,
        "total_tokens": total_tokens,
        "cost": cost,
        "usage_missing_count": missing,
    })
}

fn group_by(records: &[UsageRecord], key_fn: impl Fn(&UsageRecord) -> String) -> Value {
    let mut groups: HashMap<String, Vec<&UsageRecord>> = HashMap::new();
    for record in records {
        groups.entry(key_fn(record)).or_default().push(record);
    }

    let mut buckets: Vec<Value> = groups
        .into_iter()
        .map(|(key, bucket)| {
            let owned: Vec<UsageRecord> = bucket.into_iter().cloned().collect();
            let mut summary = summarize(&owned);
            summary["key"] = json!(key);
            summary
        })
        .collect();
    buckets.sort_by(|a, b| a["key"].as_str().cmp(&b["key"].as_str()));

    json!({ "object": "list", "data": buckets })
}
