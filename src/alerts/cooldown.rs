// =============================================================================
// Pipeline-level cooldown gate
// =============================================================================
//
// A second, KV-backed cooldown check independent of the scanner worker's
// in-memory `CooldownTracker`. The scanner's tracker is a fast first pass
// that dies with the process; this one is the durable backstop shared by
// every scanner worker and every alert-pipeline replica, so a worker
// restart (which clears its in-memory tracker) can't bypass a rule's
// cooldown entirely.

use std::time::Duration;

use tracing::warn;

use crate::kv::KvStore;
use crate::models::Alert;

pub struct Cooldown {
    kv: KvStore,
}

impl Cooldown {
    pub fn new(kv: KvStore) -> Self {
        Self { kv }
    }

    fn key(alert: &Alert) -> String {
        format!("cooldown:{}:{}", alert.rule_id, alert.symbol)
    }

    /// Returns `true` if `alert` is allowed through (not currently cooling
    /// down). On success, starts a fresh cooldown window.
    pub async fn admit(&self, alert: &Alert, cooldown: Duration) -> bool {
        match self.kv.set_nx_ex(&Self::key(alert), cooldown).await {
            Ok(won) => won,
            Err(e) => {
                warn!(error = %e, alert_id = %alert.id, "cooldown check failed, admitting alert");
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn key_is_scoped_by_rule_and_symbol() {
        let a = Alert {
            id: "a1".into(),
            rule_id: "r1".into(),
            rule_name: "test rule".into(),
            symbol: "BTCUSDT".into(),
            timestamp: chrono::Utc::now(),
            price: 100.0,
            message: "test".into(),
            metadata: json!({}),
            trace_id: "t1".into(),
        };
        assert_eq!(Cooldown::key(&a), "cooldown:r1:BTCUSDT");
    }
}
