// =============================================================================
// Toplist updater — batches indicator snapshots into leaderboard updates
// =============================================================================
//
// Consumes `indicators.updated` (the same stream the WS hub's cousin,
// alerts.filtered, rides), accumulates the latest value per (symbol, metric)
// in memory, and flushes every `update_interval_secs` into the sorted sets
// named by each configured toplist's `metric` column — e.g. a `top_gainers`
// config with metric `price_change_pct_5m` ranks symbols by that indicator.

use std::collections::HashMap;
use std::time::Duration;

use sqlx::PgPool;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::bus::StreamBus;
use crate::config::ToplistUpdaterConfig;
use crate::db;
use crate::kv::KvStore;
use crate::models::{IndicatorSnapshot, ToplistConfig};

use super::store::ToplistStore;

const INDICATORS_TOPIC: &str = "indicators.updated";
const CONSUMER_GROUP: &str = "toplist-updater";
const PARTITION: u32 = 0;
const CONFIG_CACHE_KEY: &str = "toplist:configs";

async fn load_configs(pool: &PgPool, kv: &KvStore, ttl: Duration) -> Vec<ToplistConfig> {
    if let Ok(Some(cached)) = kv.get_json::<Vec<ToplistConfig>>(CONFIG_CACHE_KEY).await {
        if !cached.is_empty() {
            return cached;
        }
    }
    match db::fetch_all_toplist_configs(pool).await {
        Ok(configs) => {
            if let Err(e) = kv.set_json(CONFIG_CACHE_KEY, &configs, Some(ttl)).await {
                warn!(error = %e, "failed to cache toplist configs");
            }
            configs
        }
        Err(e) => {
            warn!(error = %e, "failed to load toplist configs from db");
            Vec::new()
        }
    }
}

pub async fn run(
    bus: StreamBus,
    kv: KvStore,
    pool: PgPool,
    config: ToplistUpdaterConfig,
    shutdown: CancellationToken,
) {
    if let Err(e) = bus.ensure_group(INDICATORS_TOPIC, PARTITION, CONSUMER_GROUP).await {
        warn!(error = %e, "failed to ensure consumer group on indicators.updated");
    }

    let store = ToplistStore::new(kv.clone(), bus.clone());
    let mut latest: HashMap<String, HashMap<String, f64>> = HashMap::new();
    let mut flush_interval =
        tokio::time::interval(Duration::from_secs(config.update_interval_secs));
    let cache_ttl = Duration::from_secs(config.config_cache_ttl_secs);
    let mut backoff = crate::bus::Backoff::default();

    info!("toplist updater starting");

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = flush_interval.tick() => {
                let configs = load_configs(&pool, &kv, cache_ttl).await;
                flush(&store, &configs, &latest).await;
            }
            result = bus.consume::<IndicatorSnapshot>(
                INDICATORS_TOPIC,
                PARTITION,
                CONSUMER_GROUP,
                "toplist-updater-0",
                200,
                Duration::from_millis(500),
            ) => {
                match result {
                    Ok(deliveries) => {
                        backoff.reset();
                        if deliveries.is_empty() {
                            continue;
                        }
                        let ids: Vec<String> = deliveries.iter().map(|d| d.id.clone()).collect();
                        for delivery in deliveries {
                            latest.insert(delivery.payload.symbol, delivery.payload.values);
                        }
                        if let Err(e) = bus.ack(INDICATORS_TOPIC, PARTITION, CONSUMER_GROUP, &ids).await {
                            warn!(error = %e, "failed to ack indicators.updated");
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "failed to consume indicators.updated, backing off");
                        backoff.wait().await;
                    }
                }
            }
        }
    }

    info!("toplist updater shut down");
}

async fn flush(
    store: &ToplistStore,
    configs: &[ToplistConfig],
    latest: &HashMap<String, HashMap<String, f64>>,
) {
    for cfg in configs {
        let scores: Vec<(String, f64)> = latest
            .iter()
            .filter_map(|(symbol, values)| values.get(&cfg.metric).map(|v| (symbol.clone(), *v)))
            .collect();
        if scores.is_empty() {
            continue;
        }
        if let Err(e) = store.batch_update(&cfg.name, &scores).await {
            warn!(error = %e, toplist = %cfg.name, "failed to batch update toplist");
            continue;
        }
        match store.rankings(&cfg.name, cfg.descending, 0, cfg.limit as isize).await {
            Ok(rankings) => {
                if let Err(e) = store.publish_update(&cfg.name, &rankings).await {
                    warn!(error = %e, toplist = %cfg.name, "failed to publish toplist update");
                }
            }
            Err(e) => warn!(error = %e, toplist = %cfg.name, "failed to read back toplist rankings"),
        }
    }
}
