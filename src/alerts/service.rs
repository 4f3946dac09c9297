// =============================================================================
// Alert pipeline service loop
// =============================================================================
//
// Five stages, run in order for every alert consumed off `alerts.raised`:
// Dedup -> UserFilter -> Cooldown -> Persist -> Route. Consumption batches up
// to `config.batch_size` messages or `config.batch_flush_secs`, whichever
// comes first, but each alert still runs the full stage chain individually —
// batching here only governs how many stream entries are drained per read,
// not how alerts are evaluated.

use std::time::Duration;

use sqlx::PgPool;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::bus::StreamBus;
use crate::config::AlertPipelineConfig;
use crate::kv::KvStore;
use crate::models::Alert;

use super::cooldown::Cooldown;
use super::dedup::Dedup;
use super::filter::{PassThroughFilter, UserFilter};
use super::persistence::Persistence;
use super::routing::Router;

const ALERTS_RAISED_TOPIC: &str = "alerts.raised";
const CONSUMER_GROUP: &str = "alert-pipeline";
const PARTITION: u32 = 0;

pub async fn run(
    bus: StreamBus,
    kv: KvStore,
    pool: PgPool,
    config: AlertPipelineConfig,
    shutdown: CancellationToken,
) {
    if let Err(e) = bus.ensure_group(ALERTS_RAISED_TOPIC, PARTITION, CONSUMER_GROUP).await {
        warn!(error = %e, "failed to ensure consumer group on alerts.raised");
    }

    let dedup = Dedup::new(kv.clone(), Duration::from_secs(config.dedup_ttl_secs));
    let cooldown = Cooldown::new(kv.clone());
    let user_filter: Box<dyn UserFilter> = Box::new(PassThroughFilter);
    let (persistence, writer_handle) =
        Persistence::spawn(pool, config.persist_queue_capacity, config.persist_max_retries);
    let router = Router::new(bus.clone(), 1);
    let mut backoff = crate::bus::Backoff::default();

    info!("alert pipeline starting");

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            result = bus.consume::<Alert>(
                ALERTS_RAISED_TOPIC,
                PARTITION,
                CONSUMER_GROUP,
                "alert-pipeline-0",
                config.batch_size,
                Duration::from_secs(config.batch_flush_secs),
            ) => {
                match result {
                    Ok(deliveries) => {
                        backoff.reset();
                        if deliveries.is_empty() {
                            continue;
                        }
                        let mut ids = Vec::with_capacity(deliveries.len());
                        for delivery in &deliveries {
                            process_alert(&delivery.payload, &dedup, user_filter.as_ref(), &cooldown, &persistence, &router).await;
                            ids.push(delivery.id.clone());
                        }
                        if let Err(e) = bus.ack(ALERTS_RAISED_TOPIC, PARTITION, CONSUMER_GROUP, &ids).await {
                            warn!(error = %e, "failed to ack alerts.raised batch");
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "failed to consume alerts.raised, backing off");
                        backoff.wait().await;
                    }
                }
            }
        }
    }

    drop(persistence);
    let _ = writer_handle.await;
    info!("alert pipeline shut down");
}

async fn process_alert(
    alert: &Alert,
    dedup: &Dedup,
    user_filter: &dyn UserFilter,
    cooldown: &Cooldown,
    persistence: &Persistence,
    router: &Router,
) {
    if !dedup.admit(alert).await {
        return;
    }
    if !user_filter.allow(alert) {
        return;
    }
    // The rule's own cooldown_secs isn't carried on the wire Alert, and the
    // scanner already enforces it in-memory before emitting; this is a
    // durable backstop against that in-memory tracker resetting on worker
    // restart, so a conservative fixed window is enough rather than plumbing
    // the rule definition through a second time.
    if !cooldown.admit(alert, Duration::from_secs(60)).await {
        return;
    }
    persistence.enqueue(alert.clone()).await;
    router.route(alert).await;
}
