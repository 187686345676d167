//! `GET /v1/models` — OpenAI-compatible model listing (§6).

use crate::error_response::ApiErrorResponse;
use crate::state::AppState;
use axum::extract::State;
use axum::response::Json;
use control_core::error::{ApiError, ErrorKind};
use control_db::repositories::ModelRepository;
use serde_json::{json, Value};

pub async fn list_models(State(state): State<AppState>) -> Result<Json<Value>, ApiErrorResponse> {
    let conn = state
        .db
        .connection()
        .map_err(|e| ApiErrorResponse(ApiError::new(ErrorKind::InternalError, e.to_string())))?;
    let models = ModelRepository::new(&conn)
        .list_active()
        .await
        .map_err(|e| ApiErrorResponse(ApiError::new(ErrorKind::InternalError, e.to_string())))?;

    let data: Vec<Value> = models
        .into_iter()
        .map(|m| {
            json!({
                "id": m.canonical_name,
                "object": "model",
                "created": 0,
                "owned_by": m.family,
            })
        })
        .collect();

    Ok(Json(json!({ "object": "list", "data": data })))
}
