// =============================================================================
// Dev-convenience binary — runs all six services in one process
// =============================================================================
//
// Not part of the production topology: each service normally runs as its
// own binary, independently scaled and restarted. This exists so local
// demo/test scenarios don't require six terminals. Each service still reads
// its config from the same env vars its standalone binary would.

use clap::Parser;
use scanalyst::bus::StreamBus;
use scanalyst::config::{
    AlertPipelineConfig, BarAggregatorConfig, IndicatorEngineConfig, ScannerWorkerConfig,
    ToplistUpdaterConfig, WsHubConfig,
};
use scanalyst::kv::KvStore;
use scanalyst::{alerts, bars, db, indicators, scanner, toplist, ws_hub};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt::init();

    let bar_config = BarAggregatorConfig::parse_from(["bar-aggregator"]);
    let indicator_config = IndicatorEngineConfig::parse_from(["indicator-engine"]);
    let scanner_config = ScannerWorkerConfig::parse_from(["scanner-worker"]);
    let alert_config = AlertPipelineConfig::parse_from(["alert-pipeline"]);
    let ws_config = WsHubConfig::parse_from(["ws-hub"]);
    let toplist_config = ToplistUpdaterConfig::parse_from(["toplist-updater"]);

    let redis_url = bar_config.store.redis_url.clone();
    let database_url = bar_config.store.database_url.clone();
    let db_max_connections = bar_config.store.db_max_connections;

    let bus = match StreamBus::connect(&redis_url).await {
        Ok(bus) => bus,
        Err(e) => {
            error!(error = %e, "failed to connect to stream bus");
            std::process::exit(1);
        }
    };
    let kv = match KvStore::connect(&redis_url).await {
        Ok(kv) => kv,
        Err(e) => {
            error!(error = %e, "failed to connect to kv store");
            std::process::exit(1);
        }
    };
    let pool = match db::connect(&database_url, db_max_connections).await {
        Ok(pool) => pool,
        Err(e) => {
            error!(error = %e, "failed to connect to database");
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

    info!("scanalyst dev-convenience process starting all six services");

    let partitions = indicator_config.partition_count;
    let partition_id = indicator_config.partition_id;

    // Each service's standalone binary runs its own health listener on its
    // own port; bundled here they'd collide if left at their shared
    // defaults, so only the first to bind wins and the rest log a warning
    // and skip it — acceptable for this dev-only convenience process.
    tokio::spawn(scanalyst::health::spawn(bar_config.health_port, shutdown.clone()));
    tokio::spawn(scanalyst::health::spawn(indicator_config.health_port, shutdown.clone()));
    tokio::spawn(scanalyst::health::spawn(scanner_config.health_port, shutdown.clone()));
    tokio::spawn(scanalyst::health::spawn(alert_config.health_port, shutdown.clone()));
    tokio::spawn(scanalyst::health::spawn(toplist_config.health_port, shutdown.clone()));

    let handles = vec![
        tokio::spawn(bars::service::run(bus.clone(), kv.clone(), pool.clone(), bar_config, shutdown.clone())),
        tokio::spawn(indicators::service::run(
            bus.clone(),
            kv.clone(),
            indicator_config,
            partitions,
            partition_id,
            shutdown.clone(),
        )),
        tokio::spawn(scanner::service::run(
            bus.clone(),
            kv.clone(),
            pool.clone(),
            scanner_config,
            shutdown.clone(),
        )),
        tokio::spawn(alerts::service::run(
            bus.clone(),
            kv.clone(),
            pool.clone(),
            alert_config,
            shutdown.clone(),
        )),
        tokio::spawn(ws_hub::service::run(bus.clone(), ws_config, shutdown.clone())),
        tokio::spawn(toplist::updater::run(bus, kv, pool, toplist_config, shutdown.clone())),
    ];

    for handle in handles {
        let _ = handle.await;
    }

    info!("scanalyst dev-convenience process shut down");
}
