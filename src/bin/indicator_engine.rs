use clap::Parser;
use scanalyst::bus::StreamBus;
use scanalyst::config::IndicatorEngineConfig;
use scanalyst::indicators;
use scanalyst::kv::KvStore;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt::init();

    let config = IndicatorEngineConfig::parse();

    let bus = match StreamBus::connect(&config.store.redis_url).await {
        Ok(bus) => bus,
        Err(e) => {
            error!(error = %e, "failed to connect to stream bus");
            std::process::exit(1);
        }
    };
    let kv = match KvStore::connect(&config.store.redis_url).await {
        Ok(kv) => kv,
        Err(e) => {
            error!(error = %e, "failed to connect to kv store");
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

    tokio::spawn(scanalyst::health::spawn(config.health_port, shutdown.clone()));

    let partitions = config.partition_count;
    let partition_id = config.partition_id;
    indicators::service::run(bus, kv, config, partitions, partition_id, shutdown).await;
}
