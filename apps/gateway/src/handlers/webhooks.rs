//! `POST /webhooks/billing` — billing-provider event delivery (§4.13).
//! Unauthenticated at the transport level; authenticity comes entirely
//! from the HMAC signature the ingestor verifies.

use crate::error_response::ApiErrorResponse;
use crate::state::AppState;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::Json;
use control_billing::BillingError;
use control_core::error::{ApiError, ErrorKind};
use control_core::webhook::WebhookKind;
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Debug, Deserialize)]
struct WebhookEnvelope {
    event_id: String,
    #[serde(rename = "type")]
    kind: WebhookKind,
}

pub async fn billing_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<Value>), ApiErrorResponse> {
    let signature = headers
        .get("x-webhook-signature")
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| ApiErrorResponse(ApiError::new(ErrorKind::AuthError, "missing X-Webhook-Signature header")))?;

    let envelope: WebhookEnvelope = serde_json::from_slice(&body)
        .map_err(|e| ApiErrorResponse(ApiError::new(ErrorKind::InvalidRequest, format!("malformed webhook body: {e}"))))?;

    let processed = state
        .webhook_ingestor
        .ingest(&envelope.event_id, envelope.kind, &body, signature)
        .await
        .map_err(|e: BillingError| ApiErrorResponse(e.into()))?;

    Ok((StatusCode::OK, Json(json!({ "processed": processed }))))
}
