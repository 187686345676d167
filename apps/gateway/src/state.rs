//! Shared application state: every crate's manager, composed once at boot
//! and handed to axum as extractor state, mirroring the teacher's
//! `AppState` composition root.

use crate::config::Settings;
use control_cache::ActiveRequestCounters;
use control_billing::{HmacSha256Verifier, WebhookIngestor};
use control_db::DbClient;
use control_inference::{CircuitBreakerTable, InferenceProxy, RateLimiter, Scheduler, UsageMeter};
use control_lifecycle::OrchestratorCli;
use control_registry::NodeRegistry;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub db: DbClient,
    pub registry: NodeRegistry,
    pub scheduler: Arc<Scheduler>,
    pub proxy: Arc<InferenceProxy>,
    pub breakers: CircuitBreakerTable,
    pub meter: UsageMeter,
    pub rate_limiter: RateLimiter,
    pub active_requests: ActiveRequestCounters,
    pub orchestrator: Arc<OrchestratorCli>,
    pub webhook_ingestor: Arc<WebhookIngestor>,
    pub config: Arc<Settings>,
}

impl AppState {
    pub fn new(db: DbClient, config: Settings) -> Self {
        let registry = NodeRegistry::new(db.clone());
        let active_requests = ActiveRequestCounters::new();
        let breakers = CircuitBreakerTable::new();
        let scheduler = Arc::new(Scheduler::new(registry.clone(), active_requests.clone(), breakers.clone()));
        let proxy = Arc::new(InferenceProxy::new(breakers.clone()));
        let meter = UsageMeter::new(db.clone());
        let rate_limiter = RateLimiter::new();
        let orchestrator = Arc::new(OrchestratorCli::new(config.orchestrator_binary_path.clone()));
        let verifier = Box::new(HmacSha256Verifier::new(config.billing_webhook_secret.clone()));
        let webhook_ingestor = Arc::new(WebhookIngestor::new(db.clone(), verifier));

        Self {
            db,
            registry,
            scheduler,
            proxy,
            breakers,
            meter,
            rate_limiter,
            active_requests,
            orchestrator,
            webhook_ingestor,
            config: Arc::new(config),
        }
    }
}
