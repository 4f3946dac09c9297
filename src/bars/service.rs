// =============================================================================
// Bar aggregator service loop
// =============================================================================

use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::bus::StreamBus;
use crate::config::BarAggregatorConfig;
use crate::db;
use crate::kv::KvStore;
use crate::models::{Bar1m, Tick};

use super::BarAggregator;

const TICKS_TOPIC: &str = "ticks";
const BARS_TOPIC: &str = "bars.finalized";
const LIVEBAR_TTL: Duration = Duration::from_secs(300);

/// Consume this partition's slice of `ticks`, fold into the aggregator, and
/// hand finalized bars to a single publisher task over a bounded channel —
/// the aggregator's lock is never held while talking to the bus. Finalized
/// bars are also fanned out (non-blocking; overflow drops with a warning,
/// per the bounded write-behind policy) to a second writer task that
/// upserts them into `bars_1m`. Every tick also refreshes the `livebar:{symbol}`
/// KV cache (5m TTL) the scanner worker reads intra-minute state from.
pub async fn run(
    bus: StreamBus,
    kv: KvStore,
    pool: PgPool,
    config: BarAggregatorConfig,
    shutdown: CancellationToken,
) {
    let aggregator = Arc::new(BarAggregator::new());
    let (tx, rx) = mpsc::channel::<Bar1m>(config.publish_batch_size * 4);
    let (db_tx, db_rx) = mpsc::channel::<Bar1m>(config.publish_batch_size * 4);

    let publisher = tokio::spawn(run_publisher(
        bus.clone(),
        config.partition_count,
        config.publish_batch_size,
        rx,
        shutdown.clone(),
    ));
    let db_writer = tokio::spawn(run_db_writer(pool, db_rx));

    if let Err(e) = bus
        .ensure_group(TICKS_TOPIC, config.partition_id, &config.consumer_group)
        .await
    {
        error!(error = %e, "failed to ensure consumer group, will retry in the read loop");
    }

    let consumer_name = format!("{}-{}", config.consumer_group, config.partition_id);
    let mut backoff = crate::bus::Backoff::default();

    loop {
        if shutdown.is_cancelled() {
            break;
        }

        let deliveries = tokio::select! {
            _ = shutdown.cancelled() => break,
            result = bus.consume::<Tick>(
                TICKS_TOPIC,
                config.partition_id,
                &config.consumer_group,
                &consumer_name,
                config.publish_batch_size,
                Duration::from_millis(500),
            ) => result,
        };

        let deliveries = match deliveries {
            Ok(d) => d,
            Err(e) => {
                warn!(error = %e, "tick consume failed, backing off");
                backoff.wait().await;
                continue;
            }
        };
        backoff.reset();

        if deliveries.is_empty() {
            continue;
        }

        let mut ids = Vec::with_capacity(deliveries.len());
        for delivery in deliveries {
            ids.push(delivery.id);
            if let Err(e) = delivery.payload.validate() {
                warn!(error = %e, symbol = %delivery.payload.symbol, "dropping invalid tick");
                continue;
            }
            let symbol = delivery.payload.symbol.clone();
            let finalized = aggregator.process(&delivery.payload);

            if let Some(live) = aggregator.get_live(&symbol) {
                if let Err(e) = kv
                    .set_json(&format!("livebar:{symbol}"), &live, Some(LIVEBAR_TTL))
                    .await
                {
                    warn!(error = %e, symbol = %symbol, "failed to cache live bar");
                }
            }

            if let Some(bar) = finalized {
                if db_tx.try_send(bar.clone()).is_err() {
                    warn!(symbol = %bar.symbol, "bar persistence queue full, dropping write");
                }
                if tx.send(bar).await.is_err() {
                    warn!("bar publisher channel closed, dropping finalized bar");
                }
            }
        }

        if let Err(e) = bus
            .ack(TICKS_TOPIC, config.partition_id, &config.consumer_group, &ids)
            .await
        {
            warn!(error = %e, "failed to ack ticks");
        }
    }

    info!("bar aggregator shutting down, flushing in-progress bars");
    for bar in aggregator.finalize_all() {
        let _ = db_tx.send(bar.clone()).await;
        let _ = tx.send(bar).await;
    }
    drop(tx);
    drop(db_tx);
    let _ = publisher.await;
    let _ = db_writer.await;
}

async fn run_db_writer(pool: PgPool, mut rx: mpsc::Receiver<Bar1m>) {
    while let Some(bar) = rx.recv().await {
        if let Err(e) = db::upsert_bar(&pool, &bar).await {
            warn!(error = %e, symbol = %bar.symbol, "failed to persist finalized bar");
        }
    }
}

async fn run_publisher(
    bus: StreamBus,
    partitions: u32,
    batch_size: usize,
    mut rx: mpsc::Receiver<Bar1m>,
    shutdown: CancellationToken,
) {
    let mut buffer = Vec::with_capacity(batch_size);
    loop {
        tokio::select! {
            _ = shutdown.cancelled(), if buffer.is_empty() => break,
            maybe_bar = rx.recv() => {
                match maybe_bar {
                    Some(bar) => {
                        buffer.push((bar.symbol.clone(), bar));
                        if buffer.len() >= batch_size {
                            flush(&bus, partitions, &mut buffer).await;
                        }
                    }
                    None => {
                        flush(&bus, partitions, &mut buffer).await;
                        break;
                    }
                }
            }
        }
    }
}

async fn flush(bus: &StreamBus, partitions: u32, buffer: &mut Vec<(String, Bar1m)>) {
    if buffer.is_empty() {
        return;
    }
    if let Err(e) = bus.publish_batch(BARS_TOPIC, partitions, buffer).await {
        error!(error = %e, count = buffer.len(), "failed to publish finalized bars batch");
    }
    buffer.clear();
}
