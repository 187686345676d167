//! `GET|POST|DELETE /v1/api-keys[/{id}]` — self-service key management
//! scoped to the authenticated tenant/environment (§6). The plaintext
//! secret is only ever visible in the create response.

use crate::error_response::ApiErrorResponse;
use crate::middleware::AuthContext;
use crate::state::AppState;
use axum::extract::{Extension, Path, State};
use axum::response::Json;
use control_core::api_key::{ApiKey, KeyStatus};
use control_core::error::{ApiError, ErrorKind};
use control_db::repositories::ApiKeyRepository;
use serde_json::{json, Value};
use uuid::Uuid;

fn to_json(key: &ApiKey) -> Value {
    json!({
        "id": key.id,
        "tenant_id": key.tenant_id,
        "environment_id": key.environment_id,
        "prefix": key.prefix,
        "status": key.status,
        "rate_limit_rpm_override": key.rate_limit_rpm_override,
        "concurrency_override": key.concurrency_override,
        "last_used_at": key.last_used_at,
    })
}

pub async fn list_keys(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<Value>, ApiErrorResponse> {
    let conn = state
        .db
        .connection()
        .map_err(|e| ApiErrorResponse(ApiError::new(ErrorKind::InternalError, e.to_string())))?;
    let keys = ApiKeyRepository::new(&conn)
        .list_for_environment(auth.environment_id)
        .await
        .map_err(|e| ApiErrorResponse(ApiError::new(ErrorKind::InternalError, e.to_string())))?;

    Ok(Json(json!({
        "object": "list",
        "data": keys.iter().map(to_json).collect::<Vec<_>>(),
    })))
}

pub async fn create_key(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<Value>, ApiErrorResponse> {
    let material = ApiKey::generate(auth.tenant_id, auth.environment_id);

    let conn = state
        .db
        .connection()
        .map_err(|e| ApiErrorResponse(ApiError::new(ErrorKind::InternalError, e.to_string())))?;
    ApiKeyRepository::new(&conn)
        .insert(&material.key)
        .await
        .map_err(|e| ApiErrorResponse(ApiError::new(ErrorKind::InternalError, e.to_string())))?;

    let mut body = to_json(&material.key);
    body["secret"] = json!(material.plaintext_secret);
    Ok(Json(body))
}

pub async fn revoke_key(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(key_id): Path<Uuid>,
) -> Result<Json<Value>, ApiErrorResponse> {
    let conn = state
        .db
        .connection()
        .map_err(|e| ApiErrorResponse(ApiError::new(ErrorKind::InternalError, e.to_string())))?;
    let repo = ApiKeyRepository::new(&conn);

    let existing = repo
        .list_for_environment(auth.environment_id)
        .await
        .map_err(|e| ApiErrorResponse(ApiError::new(ErrorKind::InternalError, e.to_string())))?;
    if !existing.iter().any(|k| k.id == key_id) {
        return Err(ApiErrorResponse(ApiError::new(ErrorKind::NotFound, "no such key in this environment")));
    }

    repo.update_status(key_id, KeyStatus::Revoked)
        .await
        .map_err(|e| ApiErrorResponse(ApiError::new(ErrorKind::InternalError, e.to_string())))?;

    Ok(Json(json!({ "id": key_id, "status": "revoked" })))
}
