//! Perimeter guards: client API-key authentication, and the two
//! constant-time process-secret checks that gate the admin and worker
//! ingress surfaces (§4.2, §6).

use crate::state::AppState;
use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::Response,
};
use control_core::api_key::{constant_time_eq, ApiKey};
use control_db::repositories::{ApiKeyRepository, EnvironmentRepository, TenantRepository};
use control_core::tenant::TenantStatus;
use tracing::{debug, warn};
use uuid::Uuid;

/// Tenant/environment/key identity resolved from a validated bearer token,
/// threaded through request extensions for handlers to read (§4.1 step 2).
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub tenant_id: Uuid,
    pub environment_id: Uuid,
    pub api_key_id: Uuid,
    pub rate_limit_rpm_override: Option<u32>,
    pub concurrency_override: Option<u32>,
    pub preferred_region_id: Option<Uuid>,
}

/// Validates `Authorization: Bearer <prefix>.<secret>`, looks the key up by
/// prefix, and rejects anything absent, malformed, non-active, or
/// belonging to a non-active tenant (§4.2).
pub async fn auth_guard(State(state): State<AppState>, mut req: Request, next: Next) -> Result<Response, StatusCode> {
    let header_value = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let (prefix, secret) = ApiKey::split_presented_token(header_value).ok_or(StatusCode::UNAUTHORIZED)?;

    let conn = state.db.connection().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    let key = ApiKeyRepository::new(&conn)
        .find_by_prefix(prefix)
        .await
        .map_err(|_| StatusCode::UNAUTHORIZED)?;

    if !key.verify_secret(secret) || !key.is_usable() {
        warn!(prefix, "rejected bearer token: bad secret or inactive key");
        return Err(StatusCode::UNAUTHORIZED);
    }

    let tenant = TenantRepository::new(&conn)
        .find_by_id(key.tenant_id)
        .await
        .map_err(|_| StatusCode::UNAUTHORIZED)?;
    if tenant.status != TenantStatus::Active {
        warn!(tenant_id = %tenant.id, "rejected bearer token: tenant is not active");
        return Err(StatusCode::UNAUTHORIZED);
    }

    let _ = ApiKeyRepository::new(&conn).touch_last_used(key.id).await;

    let preferred_region_id = EnvironmentRepository::new(&conn)
        .find_by_id(key.environment_id)
        .await
        .ok()
        .and_then(|env| env.default_region_id);

    debug!(tenant_id = %key.tenant_id, key_id = %key.id, "authenticated request");
    req.extensions_mut().insert(AuthContext {
        tenant_id: key.tenant_id,
        environment_id: key.environment_id,
        api_key_id: key.id,
        rate_limit_rpm_override: key.rate_limit_rpm_override,
        concurrency_override: key.concurrency_override,
        preferred_region_id,
    });

    Ok(next.run(req).await)
}

/// Constant-time compare against the operator-configured admin secret —
/// no lookup, no hashing (§4.2).
pub async fn admin_guard(State(state): State<AppState>, req: Request, next: Next) -> Result<Response, StatusCode> {
    let presented = req
        .headers()
        .get("x-admin-token")
        .and_then(|h| h.to_str().ok())
        .ok_or(StatusCode::UNAUTHORIZED)?;

    if !constant_time_eq(presented, &state.config.admin_token) {
        return Err(StatusCode::UNAUTHORIZED);
    }
    Ok(next.run(req).await)
}

/// Constant-time compare against the worker-agent secret, separate from
/// the admin token so rotating one never affects the other (§6 worker
/// node ingress).
pub async fn worker_guard(State(state): State<AppState>, req: Request, next: Next) -> Result<Response, StatusCode> {
    let presented = req
        .headers()
        .get("x-worker-token")
        .and_then(|h| h.to_str().ok())
        .ok_or(StatusCode::UNAUTHORIZED)?;

    if !constant_time_eq(presented, &state.config.worker_auth_token) {
        return Err(StatusCode::UNAUTHORIZED);
    }
    Ok(next.run(req).await)
}
