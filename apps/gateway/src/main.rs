use gateway::config::Settings;
use gateway::kernel::GatewayKernel;
use tracing::info;

fn main() {
    dotenvy::dotenv().ok();
    control_telemetry::init_tracing("gateway");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("FATAL: could not build the tokio runtime");

    runtime.block_on(async {
        info!("gateway ignition sequence starting");
        let settings = Settings::from_env();
        let kernel = GatewayKernel::ignite(settings).await;
        kernel.launch().await;
    });
}
