// =============================================================================
// Alert emitter — builds and publishes Alert records for a firing rule
// =============================================================================

use chrono::Utc;
use serde_json::json;
use tracing::warn;
use uuid::Uuid;

use crate::bus::StreamBus;
use crate::models::Alert;
use crate::scanner::rule::CompiledRule;

const ALERTS_TOPIC: &str = "alerts.raised";

/// Bucket the current time into the rule's cooldown window so that repeated
/// firings inside the same window collapse to one idempotency key even if
/// multiple scan cycles land in it.
pub fn cooldown_bucket(now_unix: i64, cooldown_secs: u64) -> i64 {
    let window = cooldown_secs.max(1) as i64;
    now_unix / window
}

pub struct AlertEmitter {
    bus: StreamBus,
    partitions: u32,
}

impl AlertEmitter {
    pub fn new(bus: StreamBus, partitions: u32) -> Self {
        Self { bus, partitions }
    }

    pub async fn emit(&self, compiled: &CompiledRule, symbol: &str, context: serde_json::Value) {
        let now = Utc::now();
        let bucket = cooldown_bucket(now.timestamp(), compiled.rule.cooldown_secs);
        let price = context.get("close").and_then(|v| v.as_f64()).unwrap_or(0.0);
        let alert = Alert {
            id: Uuid::new_v4().to_string(),
            rule_id: compiled.rule.id.clone(),
            rule_name: compiled.rule.name.clone(),
            symbol: symbol.to_string(),
            timestamp: now,
            price,
            message: format!("{} fired for {}", compiled.rule.name, symbol),
            metadata: json!({
                "idempotency_key": Alert::idempotency_key(&compiled.rule.id, symbol, bucket),
                "metrics": context,
            }),
            trace_id: Uuid::new_v4().to_string(),
        };

        if let Err(e) = self
            .bus
            .publish(ALERTS_TOPIC, symbol, self.partitions, &alert)
            .await
        {
            warn!(error = %e, rule_id = %compiled.rule.id, symbol = %symbol, "failed to publish alert");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cooldown_bucket_is_stable_within_the_same_window() {
        let b1 = cooldown_bucket(1_000, 60);
        let b2 = cooldown_bucket(1_030, 60);
        assert_eq!(b1, b2);
    }

    #[test]
    fn cooldown_bucket_advances_across_windows() {
        let b1 = cooldown_bucket(1_000, 60);
        let b2 = cooldown_bucket(1_100, 60);
        assert_ne!(b1, b2);
    }

    #[test]
    fn cooldown_bucket_treats_zero_as_one_second_window() {
        let b1 = cooldown_bucket(100, 0);
        let b2 = cooldown_bucket(101, 0);
        assert_ne!(b1, b2);
    }
}
