// =============================================================================
// State manager — assembles a per-symbol metric resolver for the scan loop
// =============================================================================
//
// Reads the two KV caches the bar aggregator and indicator engine maintain
// (`livebar:{symbol}`, `ind:{symbol}`) and merges them into the current
// metric map a rule evaluates against. Keeps the previous cycle's map around
// per symbol so crosses_above/crosses_below conditions have something to
// compare against.

use std::collections::HashMap;

use parking_lot::Mutex;
use tracing::warn;

use crate::kv::KvStore;
use crate::models::{IndicatorSnapshot, LiveBar};
use crate::scanner::rule::MapResolver;

pub struct StateManager {
    kv: KvStore,
    prior: Mutex<HashMap<String, HashMap<String, f64>>>,
}

impl StateManager {
    pub fn new(kv: KvStore) -> Self {
        Self {
            kv,
            prior: Mutex::new(HashMap::new()),
        }
    }

    /// Build this cycle's resolver for `symbol`. Returns `None` if no live
    /// bar has been observed for the symbol yet (nothing to scan).
    pub async fn resolver_for(&self, symbol: &str) -> Option<MapResolver> {
        let live_bar: Option<LiveBar> = match self.kv.get_json(&format!("livebar:{symbol}")).await {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, symbol = %symbol, "failed to read livebar cache");
                None
            }
        };
        let live_bar = live_bar?;

        let indicators: Option<IndicatorSnapshot> =
            match self.kv.get_json(&format!("ind:{symbol}")).await {
                Ok(v) => v,
                Err(e) => {
                    warn!(error = %e, symbol = %symbol, "failed to read indicator cache");
                    None
                }
            };

        let mut current = HashMap::new();
        current.insert("open".to_string(), live_bar.open);
        current.insert("high".to_string(), live_bar.high);
        current.insert("low".to_string(), live_bar.low);
        current.insert("close".to_string(), live_bar.close);
        current.insert("volume".to_string(), live_bar.volume);
        current.insert("vwap".to_string(), live_bar.vwap());
        if let Some(snapshot) = indicators {
            current.extend(snapshot.values);
        }

        let prior = {
            let mut map = self.prior.lock();
            map.insert(symbol.to_string(), current.clone()).unwrap_or_default()
        };

        Some(MapResolver { current, prior })
    }
}

#[cfg(test)]
mod tests {
    // `StateManager` requires a live KV connection to exercise end to end;
    // the prior/current merge logic itself is covered by
    // `scanner::rule::tests`, which construct `MapResolver` directly.
}
