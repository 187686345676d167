//! The request-path pipeline (§4.1): authenticate (middleware, upstream of
//! this handler) → rate-limit → parse/validate → schedule → proxy →
//! meter → respond. One shared implementation serves chat completions,
//! completions, and embeddings — they differ only in the upstream path.

use crate::error_response::ApiErrorResponse;
use crate::middleware::AuthContext;
use crate::state::AppState;
use axum::body::{Body, Bytes};
use axum::extract::{Extension, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::Response;
use chrono::Utc;
use control_core::error::{ApiError, ErrorKind};
use control_core::model::ModelStatus;
use control_core::rate_limit::{RateLimitScope, RateLimitWindow};
use control_db::repositories::{ModelRepository, RegionRepository};
use control_inference::meter::{ExtractedUsage, UsageContext};
use control_inference::proxy::InferenceProxy;
use control_inference::rate_limiter::ScopeLimit;
use futures_util::StreamExt;
use serde_json::Value;
use tracing::instrument;
use uuid::Uuid;

pub async fn chat_completions(
    state: State<AppState>,
    auth: Extension<AuthContext>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiErrorResponse> {
    proxy_request(state, auth, "/v1/chat/completions", headers, body).await
}

pub async fn completions(
    state: State<AppState>,
    auth: Extension<AuthContext>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiErrorResponse> {
    proxy_request(state, auth, "/v1/completions", headers, body).await
}

pub async fn embeddings(
    state: State<AppState>,
    auth: Extension<AuthContext>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiErrorResponse> {
    proxy_request(state, auth, "/v1/embeddings", headers, body).await
}

#[instrument(skip(state, auth, headers, body))]
async fn proxy_request(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    path: &'static str,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiErrorResponse> {
    let parsed: Value = serde_json::from_slice(&body)
        .map_err(|e| ApiErrorResponse(ApiError::new(ErrorKind::InvalidRequest, format!("malformed JSON body: {e}"))))?;

    let model_name = parsed
        .get("model")
        .and_then(Value::as_str)
        .ok_or_else(|| ApiErrorResponse(ApiError::new(ErrorKind::ValidationError, "\"model\" is required")))?
        .to_string();

    check_rate_limits(&state, &auth)?;

    let conn = state
        .db
        .connection()
        .map_err(|e| ApiErrorResponse(ApiError::new(ErrorKind::InternalError, e.to_string())))?;
    let model = ModelRepository::new(&conn)
        .find_by_name(&model_name)
        .await
        .map_err(|_| ApiErrorResponse(ApiError::new(ErrorKind::NotFound, format!("unknown model {model_name}"))))?;
    drop(conn);

    if model.status != ModelStatus::Active {
        return Err(ApiErrorResponse(ApiError::new(
            ErrorKind::InvalidRequest,
            format!("model {model_name} is not active"),
        )));
    }

    let node = state
        .scheduler
        .select(model.id, auth.tenant_id, auth.preferred_region_id, model.scheduling_strategy)
        .ok_or_else(|| ApiErrorResponse(ApiError::new(ErrorKind::NoAvailableNodes, "no healthy node for this model")))?;

    let conn = state
        .db
        .connection()
        .map_err(|e| ApiErrorResponse(ApiError::new(ErrorKind::InternalError, e.to_string())))?;
    let region_pricing_multiplier = RegionRepository::new(&conn)
        .find_by_id(node.region_id)
        .await
        .map(|r| r.pricing_multiplier)
        .unwrap_or(1.0);
    drop(conn);

    if let Some(limit) = auth.concurrency_override {
        if state.active_requests.current(node.id) >= limit as i64 {
            return Err(ApiErrorResponse(ApiError::new(
                ErrorKind::RateLimitExceeded,
                "concurrency limit reached for this key",
            )));
        }
    }

    let endpoint = node
        .endpoint
        .clone()
        .ok_or_else(|| ApiErrorResponse(ApiError::new(ErrorKind::NoAvailableNodes, "node has no endpoint")))?;

    let forwarded_headers: Vec<(String, String)> = headers
        .iter()
        .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str().to_string(), v.to_string())))
        .collect();

    let guard = state.active_requests.increment(node.id);
    let wants_stream = parsed.get("stream").and_then(Value::as_bool).unwrap_or(false);
    let request_id = Uuid::new_v4();
    let started_at = Utc::now();

    let response = match state.proxy.forward(node.id, &endpoint, path, body, forwarded_headers).await {
        Ok(r) => r,
        Err(e) => {
            guard.release();
            return Err(ApiErrorResponse(e.into()));
        }
    };

    let context = UsageContext {
        tenant_id: auth.tenant_id,
        environment_id: auth.environment_id,
        api_key_id: auth.api_key_id,
        model_id: model.id,
        node_id: node.id,
        request_id,
        stream: wants_stream,
        started_at,
        input_price_per_million: model.input_price_per_million,
        output_price_per_million: model.output_price_per_million,
        cached_input_price_per_million: model.cached_input_price_per_million,
        region_pricing_multiplier,
    };

    let is_event_stream = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.starts_with("text/event-stream"))
        .unwrap_or(false);

    if wants_stream || is_event_stream {
        Ok(stream_response(response, state.meter.clone(), context, guard))
    } else {
        Ok(buffered_response(response, state.meter.clone(), context, guard).await?)
    }
}

/// Relays the upstream SSE body to the client chunk-by-chunk while tee-ing
/// it for usage extraction (§4.6, §4.7). The active-request guard lives
/// inside the generator and is dropped only once the relay finishes or is
/// abandoned, so a client disconnect mid-stream still decrements the
/// counter (§5 cancellation semantics).
fn stream_response(
    response: reqwest::Response,
    meter: control_inference::meter::UsageMeter,
    context: UsageContext,
    guard: control_cache::active_requests::ActiveRequestGuard,
) -> Response {
    let upstream_status = response.status();
    let relay = InferenceProxy::relay_stream(response, meter, context);

    let body_stream = async_stream::stream! {
        let _guard = guard;
        futures_util::pin_mut!(relay);
        while let Some(chunk) = relay.next().await {
            yield chunk;
        }
    };

    let status = StatusCode::from_u16(upstream_status.as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .body(Body::from_stream(body_stream))
        .expect("static response parts are always valid")
}

async fn buffered_response(
    response: reqwest::Response,
    meter: control_inference::meter::UsageMeter,
    context: UsageContext,
    guard: control_cache::active_requests::ActiveRequestGuard,
) -> Result<Response, ApiErrorResponse> {
    let status = StatusCode::from_u16(response.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .cloned()
        .unwrap_or_else(|| header::HeaderValue::from_static("application/json"));

    let bytes = response
        .bytes()
        .await
        .map_err(|e| ApiErrorResponse(ApiError::new(ErrorKind::UpstreamError, e.to_string())))?;

    let usage = serde_json::from_slice::<Value>(&bytes).ok().and_then(|v| ExtractedUsage::from_json_body(&v));
    match usage {
        Some(u) => meter.record_buffered(context, u).await,
        None => meter.record_missing(context).await,
    }
    guard.release();

    Ok(Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, content_type)
        .body(Body::from(bytes))
        .expect("static response parts are always valid"))
}

fn check_rate_limits(state: &AppState, auth: &AuthContext) -> Result<(), ApiErrorResponse> {
    let tenant_id = auth.tenant_id.to_string();
    let environment_id = auth.environment_id.to_string();
    let api_key_id = auth.api_key_id.to_string();
    let key_limit = auth.rate_limit_rpm_override.map(u64::from).unwrap_or(state.config.key_rpm_limit);

    let scopes = [
        ScopeLimit {
            scope: RateLimitScope::Global,
            id: "global",
            window: RateLimitWindow::PerMinute,
            limit: state.config.global_rpm_limit,
        },
        ScopeLimit {
            scope: RateLimitScope::Tenant,
            id: &tenant_id,
            window: RateLimitWindow::PerMinute,
            limit: state.config.tenant_rpm_limit,
        },
        ScopeLimit {
            scope: RateLimitScope::Environment,
            id: &environment_id,
            window: RateLimitWindow::PerMinute,
            limit: state.config.environment_rpm_limit,
        },
        ScopeLimit {
            scope: RateLimitScope::Key,
            id: &api_key_id,
            window: RateLimitWindow::PerMinute,
            limit: key_limit,
        },
    ];

    state.rate_limiter.check_all(&scopes).map_err(|e| ApiErrorResponse(e.into()))
}
