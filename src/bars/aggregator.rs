// =============================================================================
// Bar aggregator — tick-to-minute OHLCV state machine
// =============================================================================
//
// Thread-safe map of one live (mutable, in-progress) bar per symbol. Ticks
// are folded into the current minute's bar; when a tick arrives for a later
// minute the prior bar is finalized and handed to the caller so it can be
// published without the map lock held.

use std::collections::HashMap;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::RwLock;
use tracing::warn;

use crate::models::{Bar1m, LiveBar, Tick, TickType};

fn truncate_to_minute(ts: DateTime<Utc>) -> DateTime<Utc> {
    let secs = ts.timestamp();
    let minute_secs = secs - secs.rem_euclid(60);
    DateTime::from_timestamp(minute_secs, 0).unwrap_or(ts)
}

/// Thread-safe ring of one live bar per symbol.
pub struct BarAggregator {
    live: RwLock<HashMap<String, LiveBar>>,
}

impl Default for BarAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl BarAggregator {
    pub fn new() -> Self {
        Self {
            live: RwLock::new(HashMap::new()),
        }
    }

    /// Fold `tick` into the live bar for its symbol. Returns the finalized
    /// bar if the tick's minute is newer than the bar currently in progress
    /// (i.e. the prior minute just closed). Ticks whose minute is *older*
    /// than the live bar's minute are dropped — the bar for that minute has
    /// already closed and reopening it is out of scope.
    pub fn process(&self, tick: &Tick) -> Option<Bar1m> {
        let minute = truncate_to_minute(tick.timestamp);
        let mut map = self.live.write();

        match map.get_mut(&tick.symbol) {
            None => {
                map.insert(tick.symbol.clone(), new_live_bar(tick, minute));
                None
            }
            Some(bar) if minute == bar.minute => {
                fold_into(bar, tick);
                None
            }
            Some(bar) if minute > bar.minute => {
                let finalized = bar.finalize();
                *bar = new_live_bar(tick, minute);
                Some(finalized)
            }
            Some(bar) => {
                warn!(
                    symbol = %tick.symbol,
                    tick_minute = %minute,
                    live_minute = %bar.minute,
                    "dropping late tick older than the live bar's minute"
                );
                None
            }
        }
    }

    /// Force-close every live bar, e.g. on graceful shutdown so in-flight
    /// minutes are not lost.
    pub fn finalize_all(&self) -> Vec<Bar1m> {
        let mut map = self.live.write();
        let finalized: Vec<Bar1m> = map.values().map(|b| b.finalize()).collect();
        map.clear();
        finalized
    }

    pub fn get_live(&self, symbol: &str) -> Option<LiveBar> {
        self.live.read().get(symbol).cloned()
    }

    pub fn symbol_count(&self) -> usize {
        self.live.read().len()
    }
}

fn new_live_bar(tick: &Tick, minute: DateTime<Utc>) -> LiveBar {
    LiveBar {
        symbol: tick.symbol.clone(),
        open: tick.price,
        high: tick.price,
        low: tick.price,
        close: tick.price,
        volume: tick.size,
        pv_sum: tick.price * tick.size,
        tick_count: 1,
        minute,
    }
}

fn fold_into(bar: &mut LiveBar, tick: &Tick) {
    bar.high = bar.high.max(tick.price);
    bar.low = bar.low.min(tick.price);
    bar.close = tick.price;
    bar.volume += tick.size;
    bar.pv_sum += tick.price * tick.size;
    bar.tick_count += 1;
}

#[allow(dead_code)]
fn next_minute(ts: DateTime<Utc>) -> DateTime<Utc> {
    truncate_to_minute(ts) + ChronoDuration::minutes(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tick(symbol: &str, price: f64, size: f64, ts: DateTime<Utc>) -> Tick {
        Tick {
            symbol: symbol.to_string(),
            price,
            size,
            timestamp: ts,
            kind: TickType::Trade,
        }
    }

    fn at(minute: i64, secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(minute * 60 + secs, 0).unwrap()
    }

    #[test]
    fn first_tick_creates_live_bar_with_no_finalization() {
        let agg = BarAggregator::new();
        let result = agg.process(&tick("BTCUSDT", 100.0, 1.0, at(0, 0)));
        assert!(result.is_none());
        let live = agg.get_live("BTCUSDT").unwrap();
        assert_eq!(live.open, 100.0);
        assert_eq!(live.close, 100.0);
    }

    #[test]
    fn ticks_within_same_minute_update_ohlc() {
        let agg = BarAggregator::new();
        agg.process(&tick("BTCUSDT", 100.0, 1.0, at(0, 0)));
        agg.process(&tick("BTCUSDT", 105.0, 2.0, at(0, 10)));
        agg.process(&tick("BTCUSDT", 95.0, 1.0, at(0, 20)));
        agg.process(&tick("BTCUSDT", 102.0, 1.0, at(0, 59)));

        let live = agg.get_live("BTCUSDT").unwrap();
        assert_eq!(live.open, 100.0);
        assert_eq!(live.high, 105.0);
        assert_eq!(live.low, 95.0);
        assert_eq!(live.close, 102.0);
        assert_eq!(live.volume, 5.0);
    }

    #[test]
    fn tick_in_next_minute_finalizes_prior_bar() {
        let agg = BarAggregator::new();
        agg.process(&tick("BTCUSDT", 100.0, 1.0, at(0, 0)));
        agg.process(&tick("BTCUSDT", 110.0, 1.0, at(0, 30)));

        let finalized = agg.process(&tick("BTCUSDT", 120.0, 1.0, at(1, 0)));
        let bar = finalized.expect("bar should finalize at minute boundary");
        assert_eq!(bar.symbol, "BTCUSDT");
        assert_eq!(bar.open, 100.0);
        assert_eq!(bar.high, 110.0);
        assert_eq!(bar.close, 110.0);

        let live = agg.get_live("BTCUSDT").unwrap();
        assert_eq!(live.open, 120.0);
        assert_eq!(live.minute, at(1, 0));
    }

    #[test]
    fn vwap_matches_volume_weighted_average() {
        let agg = BarAggregator::new();
        agg.process(&tick("BTCUSDT", 100.0, 1.0, at(0, 0)));
        agg.process(&tick("BTCUSDT", 200.0, 3.0, at(0, 10)));
        let bar = agg.process(&tick("BTCUSDT", 50.0, 1.0, at(1, 0))).unwrap();
        // pv_sum = 100*1 + 200*3 = 700, volume = 4 -> vwap = 175
        assert!((bar.vwap - 175.0).abs() < 1e-9);
    }

    #[test]
    fn late_tick_older_than_live_minute_is_dropped() {
        let agg = BarAggregator::new();
        agg.process(&tick("BTCUSDT", 100.0, 1.0, at(5, 0)));
        let result = agg.process(&tick("BTCUSDT", 999.0, 1.0, at(4, 30)));
        assert!(result.is_none());
        let live = agg.get_live("BTCUSDT").unwrap();
        // Late tick must not have mutated the live bar.
        assert_eq!(live.close, 100.0);
        assert_eq!(live.minute, at(5, 0));
    }

    #[test]
    fn symbols_are_independent() {
        let agg = BarAggregator::new();
        agg.process(&tick("BTCUSDT", 100.0, 1.0, at(0, 0)));
        agg.process(&tick("ETHUSDT", 2000.0, 5.0, at(0, 0)));
        assert_eq!(agg.symbol_count(), 2);
        assert_eq!(agg.get_live("BTCUSDT").unwrap().open, 100.0);
        assert_eq!(agg.get_live("ETHUSDT").unwrap().open, 2000.0);
    }

    #[test]
    fn finalize_all_drains_every_live_bar() {
        let agg = BarAggregator::new();
        agg.process(&tick("BTCUSDT", 100.0, 1.0, at(0, 0)));
        agg.process(&tick("ETHUSDT", 2000.0, 5.0, at(0, 0)));
        let finalized = agg.finalize_all();
        assert_eq!(finalized.len(), 2);
        assert_eq!(agg.symbol_count(), 0);
    }

    #[test]
    fn get_live_returns_none_for_unknown_symbol() {
        let agg = BarAggregator::new();
        assert!(agg.get_live("NOPE").is_none());
    }
}
