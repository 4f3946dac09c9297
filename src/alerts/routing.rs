// =============================================================================
// Route stage — publish surviving alerts for delivery
// =============================================================================
//
// The final stage. Anything that makes it past dedup, the user filter, and
// the cooldown gate is published to `alerts.filtered`, where the WS hub
// consumes it and fans it out to subscribed connections.

use tracing::warn;

use crate::bus::StreamBus;
use crate::models::Alert;

pub const ALERTS_FILTERED_TOPIC: &str = "alerts.filtered";

pub struct Router {
    bus: StreamBus,
    partitions: u32,
}

impl Router {
    pub fn new(bus: StreamBus, partitions: u32) -> Self {
        Self { bus, partitions }
    }

    pub async fn route(&self, alert: &Alert) {
        if let Err(e) = self
            .bus
            .publish(ALERTS_FILTERED_TOPIC, &alert.symbol, self.partitions, alert)
            .await
        {
            warn!(error = %e, alert_id = %alert.id, "failed to route alert");
        }
    }
}
