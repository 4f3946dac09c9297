// =============================================================================
// User filter stage
// =============================================================================
//
// Reserved hook for per-user subscription/entitlement filtering. This
// implementation passes every alert through unchanged — per-user delivery
// filtering is fully handled downstream by the WS hub's own subscription
// matching, and no additional per-user gating is required at the pipeline
// stage today. The trait exists so a future policy (e.g. muting a symbol
// for a specific account) can be dropped in without reshaping the pipeline.

use crate::models::Alert;

pub trait UserFilter: Send + Sync {
    fn allow(&self, alert: &Alert) -> bool;
}

pub struct PassThroughFilter;

impl UserFilter for PassThroughFilter {
    fn allow(&self, _alert: &Alert) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn pass_through_admits_every_alert() {
        let filter = PassThroughFilter;
        let alert = Alert {
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
        assert!(filter.allow(&alert));
    }
}
