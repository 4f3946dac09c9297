// =============================================================================
// Cooldown tracker — per (rule, symbol) suppression window
// =============================================================================
//
// Kept in-memory for fast scan-loop checks; the alert pipeline additionally
// enforces cooldown against the shared KV store so suppression still holds
// across a scanner worker restart. This tracker only needs to survive for
// the lifetime of one worker process.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::RwLock;

pub struct CooldownTracker {
    last_fired: RwLock<HashMap<(String, String), Instant>>,
}

impl Default for CooldownTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl CooldownTracker {
    pub fn new() -> Self {
        Self {
            last_fired: RwLock::new(HashMap::new()),
        }
    }

    /// Returns `true` if `(rule_id, symbol)` is still within its cooldown
    /// window and should be suppressed.
    pub fn is_cooling_down(&self, rule_id: &str, symbol: &str, cooldown: Duration) -> bool {
        let key = (rule_id.to_string(), symbol.to_string());
        match self.last_fired.read().get(&key) {
            Some(last) => last.elapsed() < cooldown,
            None => false,
        }
    }

    /// Record that `(rule_id, symbol)` just fired, starting its cooldown.
    pub fn record_fired(&self, rule_id: &str, symbol: &str) {
        let key = (rule_id.to_string(), symbol.to_string());
        self.last_fired.write().insert(key, Instant::now());
    }

    /// Drop entries whose cooldown has long since expired, bounding memory
    /// for rule/symbol pairs that stop firing. Call periodically, not on the
    /// hot scan path.
    pub fn sweep(&self, max_age: Duration) {
        let mut map = self.last_fired.write();
        map.retain(|_, last| last.elapsed() < max_age);
    }

    pub fn len(&self) -> usize {
        self.last_fired.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_pair_is_not_cooling_down() {
        let tracker = CooldownTracker::new();
        assert!(!tracker.is_cooling_down("r1", "BTCUSDT", Duration::from_secs(60)));
    }

    #[test]
    fn recorded_fire_starts_cooldown() {
        let tracker = CooldownTracker::new();
        tracker.record_fired("r1", "BTCUSDT");
        assert!(tracker.is_cooling_down("r1", "BTCUSDT", Duration::from_secs(60)));
    }

    #[test]
    fn cooldown_expires_after_duration() {
        let tracker = CooldownTracker::new();
        tracker.record_fired("r1", "BTCUSDT");
        assert!(!tracker.is_cooling_down("r1", "BTCUSDT", Duration::from_millis(1)));
    }

    #[test]
    fn cooldown_is_scoped_per_rule_and_symbol() {
        let tracker = CooldownTracker::new();
        tracker.record_fired("r1", "BTCUSDT");
        assert!(!tracker.is_cooling_down("r1", "ETHUSDT", Duration::from_secs(60)));
        assert!(!tracker.is_cooling_down("r2", "BTCUSDT", Duration::from_secs(60)));
    }

    #[test]
    fn sweep_removes_only_stale_entries() {
        let tracker = CooldownTracker::new();
        tracker.record_fired("r1", "BTCUSDT");
        std::thread::sleep(Duration::from_millis(5));
        tracker.record_fired("r2", "BTCUSDT");
        tracker.sweep(Duration::from_millis(2));
        assert_eq!(tracker.len(), 1);
    }
}
