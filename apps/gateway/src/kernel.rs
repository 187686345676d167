//! Composition root: connects the store, builds `AppState`, spawns every
//! background daemon, and serves the HTTP router.

use crate::billing_sink::HttpBillingSink;
use crate::config::Settings;
use crate::routes::build_router;
use crate::state::AppState;
use control_db::DbClient;
use control_lifecycle::{spawn_deployment_controller, spawn_reconciler};
use control_registry::spawn_health_monitor;
use std::net::SocketAddr;
use tracing::{error, info, instrument};

pub struct GatewayKernel {
    port: u16,
    state: AppState,
}

impl GatewayKernel {
    #[instrument(skip(config))]
    pub async fn ignite(config: Settings) -> Self {
        let database_token = config.database_token.clone();
        let db = DbClient::connect(&config.database_url, database_token)
            .await
            .expect("FATAL: could not connect to the persistent store, aborting ignition");

        let port = config.server_port;
        let state = AppState::new(db, config);

        if let Err(e) = state.registry.hydrate().await {
            error!("failed to hydrate node registry from the persistent store: {e}");
        }

        Self { port, state }
    }

    pub async fn launch(self) {
        spawn_health_monitor(self.state.registry.clone());
        spawn_deployment_controller(
            self.state.db.clone(),
            self.state.registry.clone(),
            control_lifecycle::OrchestratorCli::new(self.state.config.orchestrator_binary_path.clone()),
            self.state.config.default_provider.clone(),
            self.state.config.default_region_code.clone(),
        );
        spawn_reconciler(self.state.db.clone(), self.state.registry.clone());
        self.state.meter.clone().spawn_flush_loop();

        let billing_client = reqwest::Client::new();
        let sink = HttpBillingSink::new(billing_client, self.state.config.billing_export_url.clone());
        control_billing::spawn_billing_exporter(self.state.db.clone(), std::sync::Arc::new(sink));

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let router = build_router(self.state);
        info!("gateway listening on {addr}");

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .expect("FATAL: could not bind the gateway's listening socket");
        axum::serve(listener, router)
            .await
            .expect("FATAL: HTTP server exited unexpectedly");
    }
}
