// =============================================================================
// Dedup stage — collapse repeated alerts within a cooldown window
// =============================================================================
//
// Uses the idempotency key already embedded in the alert's metadata by the
// scanner's emitter (`rule_id:symbol:bucket`). A `SET NX EX` against the KV
// store is the dedup gate: the first writer wins, everyone else in the same
// bucket is dropped. KV failure fails open — better to let a rare duplicate
// through than to drop every alert because Redis hiccuped.

use std::time::Duration;

use tracing::warn;

use crate::kv::KvStore;
use crate::models::Alert;

fn dedup_key(alert: &Alert) -> String {
    let idempotency_key = alert
        .metadata
        .get("idempotency_key")
        .and_then(|v| v.as_str())
        .map(String::from)
        .unwrap_or_else(|| {
            format!("{}:{}:{}", alert.rule_id, alert.symbol, alert.timestamp.timestamp())
        });
    format!("alert:dedupe:{idempotency_key}")
}

pub struct Dedup {
    kv: KvStore,
    ttl: Duration,
}

impl Dedup {
    pub fn new(kv: KvStore, ttl: Duration) -> Self {
        Self { kv, ttl }
    }

    /// Returns `true` if `alert` should proceed (first time seen in this
    /// window), `false` if it's a duplicate to drop.
    pub async fn admit(&self, alert: &Alert) -> bool {
        match self.kv.set_nx_ex(&dedup_key(alert), self.ttl).await {
            Ok(won) => won,
            Err(e) => {
                warn!(error = %e, alert_id = %alert.id, "dedup check failed, admitting alert");
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn alert(metadata: serde_json::Value) -> Alert {
        Alert {
            id: "a1".into(),
            rule_id: "r1".into(),
            rule_name: "test rule".into(),
            symbol: "BTCUSDT".into(),
            timestamp: chrono::DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
            price: 100.0,
            message: "test".into(),
            metadata,
            trace_id: "t1".into(),
        }
    }

    #[test]
    fn dedup_key_uses_embedded_idempotency_key() {
        let key = dedup_key(&alert(json!({ "idempotency_key": "r1:BTCUSDT:42" })));
        assert_eq!(key, "alert:dedupe:r1:BTCUSDT:42");
    }

    #[test]
    fn dedup_key_falls_back_to_rule_symbol_timestamp_without_embedded_key() {
        let key = dedup_key(&alert(json!({})));
        assert!(key.starts_with("alert:dedupe:r1:BTCUSDT:"));
    }

    #[test]
    fn dedup_key_is_stable_for_identical_alerts() {
        let a = alert(json!({ "idempotency_key": "r1:BTCUSDT:42" }));
        let b = alert(json!({ "idempotency_key": "r1:BTCUSDT:42" }));
        assert_eq!(dedup_key(&a), dedup_key(&b));
    }
}
