// =============================================================================
// Indicator engine service loop
// =============================================================================
//
// Consumes `bars.finalized`, updates the per-symbol ring buffer + calculator
// set, caches the fresh snapshot in the KV store (`ind:{symbol}`), and
// publishes it to `indicators.updated` — a stream, not a bare pub/sub
// channel, so a slow or restarting scanner worker still gets every update at
// least once via its own consumer-group cursor.

use std::time::Duration;

use tracing::{error, warn};

use crate::bus::StreamBus;
use crate::config::IndicatorEngineConfig;
use crate::kv::KvStore;
use crate::models::{Bar1m, IndicatorSnapshot};
use tokio_util::sync::CancellationToken;

use super::engine::IndicatorEngine;

const BARS_TOPIC: &str = "bars.finalized";
const INDICATORS_TOPIC: &str = "indicators.updated";

pub async fn run(
    bus: StreamBus,
    kv: KvStore,
    config: IndicatorEngineConfig,
    partitions: u32,
    partition_id: u32,
    shutdown: CancellationToken,
) {
    let engine = IndicatorEngine::new(config.ring_buffer_size);

    if let Err(e) = bus
        .ensure_group(BARS_TOPIC, partition_id, &config.consumer_group)
        .await
    {
        error!(error = %e, "failed to ensure consumer group");
    }

    let consumer_name = format!("{}-{}", config.consumer_group, partition_id);
    let mut backoff = crate::bus::Backoff::default();

    loop {
        if shutdown.is_cancelled() {
            break;
        }

        let deliveries = tokio::select! {
            _ = shutdown.cancelled() => break,
            result = bus.consume::<Bar1m>(
                BARS_TOPIC,
                partition_id,
                &config.consumer_group,
                &consumer_name,
                100,
                Duration::from_millis(500),
            ) => result,
        };

        let deliveries = match deliveries {
            Ok(d) => d,
            Err(e) => {
                warn!(error = %e, "bar consume failed, backing off");
                backoff.wait().await;
                continue;
            }
        };

        if deliveries.is_empty() {
            continue;
        }

        let mut ids = Vec::with_capacity(deliveries.len());
        for delivery in deliveries {
            ids.push(delivery.id);
            let bar = delivery.payload;
            let symbol = bar.symbol.clone();
            let values = engine.on_bar(bar);
            if values.is_empty() {
                continue;
            }

            let snapshot = IndicatorSnapshot {
                symbol: symbol.clone(),
                values,
                updated_at: Some(chrono::Utc::now()),
            };

            if let Err(e) = kv
                .set_json(&format!("ind:{symbol}"), &snapshot, Some(Duration::from_secs(120)))
                .await
            {
                warn!(error = %e, symbol = %symbol, "failed to cache indicator snapshot");
            }

            if let Err(e) = bus
                .publish(INDICATORS_TOPIC, &symbol, partitions, &snapshot)
                .await
            {
                warn!(error = %e, symbol = %symbol, "failed to publish indicator snapshot");
            }
        }

        if let Err(e) = bus
            .ack(BARS_TOPIC, partition_id, &config.consumer_group, &ids)
            .await
        {
            warn!(error = %e, "failed to ack finalized bars");
        }
    }
}
