use clap::Parser;
use scanalyst::bus::StreamBus;
use scanalyst::config::WsHubConfig;
use scanalyst::ws_hub;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt::init();

    let config = WsHubConfig::parse();

    let bus = match StreamBus::connect(&config.store.redis_url).await {
        Ok(bus) => bus,
        Err(e) => {
            error!(error = %e, "failed to connect to stream bus");
            std::process::exit(1);
        }
    };

    let shutdown = CancellationToken::new();
    let run_shutdown = shutdown.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        info!("shutdown signal received");
        run_shutdown.cancel();
    });

    ws_hub::service::run(bus, config, shutdown).await;
}
