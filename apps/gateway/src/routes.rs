//! Route composition: client surface (bearer auth), admin surface
//! (admin token), worker ingress (worker token), and the unauthenticated
//! billing webhook — mirroring the teacher's nested-router-group layout.

use crate::handlers::{admin, api_keys, inference, metrics, models, usage, webhooks, worker};
use crate::middleware::{admin_guard, auth_guard, worker_guard};
use crate::state::AppState;
use axum::http::{header, Method};
use axum::routing::{delete, get, post};
use axum::{middleware, Router};
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .max_age(Duration::from_secs(3600));

    let client_surface = Router::new()
        .route("/v1/chat/completions", post(inference::chat_completions))
        .route("/v1/completions", post(inference::completions))
        .route("/v1/embeddings", post(inference::embeddings))
        .route("/v1/models", get(models::list_models))
        .route("/v1/usage", get(usage::usage_summary))
        .route("/v1/usage/detailed", get(usage::usage_detailed))
        .route("/v1/usage/by-model", get(usage::usage_by_model))
        .route("/v1/usage/by-key", get(usage::usage_by_key))
        .route("/v1/usage/by-hour", get(usage::usage_by_hour))
        .route("/v1/usage/by-day", get(usage::usage_by_day))
        .route("/v1/usage/by-week", get(usage::usage_by_week))
        .route("/v1/usage/by-month", get(usage::usage_by_month))
        .route("/v1/metrics/performance", get(metrics::performance))
        .route("/v1/metrics/throughput", get(metrics::throughput))
        .route("/v1/metrics/by-model", get(metrics::by_model))
        .route("/v1/api-keys", get(api_keys::list_keys).post(api_keys::create_key))
        .route("/v1/api-keys/{id}", delete(api_keys::revoke_key))
        .layer(middleware::from_fn_with_state(state.clone(), auth_guard));

    let worker_ingress = Router::new()
        .route("/nodes/register", post(worker::register))
        .route("/nodes/{id}/heartbeat", post(worker::heartbeat))
        .route("/nodes/{id}/drain", post(worker::drain))
        .route("/nodes/{id}/termination-warning", post(worker::termination_warning))
        .route("/nodes/{id}/deregister", post(worker::deregister))
        .layer(middleware::from_fn_with_state(state.clone(), worker_guard));

    let admin_surface = Router::new()
        .route("/nodes/launch", post(admin::launch_node))
        .route("/nodes/{id}/terminate", post(admin::terminate_node))
        .route("/deployments/{name}/scale", post(admin::scale_deployment))
        .route("/deployments/{name}/{action}", post(admin::set_deployment_status))
        .route("/health", get(admin::platform_health))
        .layer(middleware::from_fn_with_state(state.clone(), admin_guard));

    let admin_prefixed = Router::new().nest("/admin", admin_surface.merge(worker_ingress));

    Router::new()
        .route("/webhooks/billing", post(webhooks::billing_webhook))
        .merge(client_surface)
        .merge(admin_prefixed)
        .layer(cors)
        .with_state(state)
}
