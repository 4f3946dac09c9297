// =============================================================================
// Indicator engine — per-symbol ring buffer + calculator orchestration
// =============================================================================

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::models::Bar1m;

use super::{build_default_set, Calculator};

/// Ring buffer of the last `capacity` finalized bars for one symbol, plus the
/// full fixed calculator set driven off it. Guarded by its own mutex so the
/// engine-wide lock below is only held for the lookup/insert into the map.
pub struct SymbolState {
    capacity: usize,
    bars: VecDeque<Bar1m>,
    calculators: Vec<Box<dyn Calculator>>,
}

impl SymbolState {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            bars: VecDeque::with_capacity(capacity),
            calculators: build_default_set(),
        }
    }

    /// Push a newly finalized bar, evicting the oldest once over capacity,
    /// then recompute every calculator. Returns the resulting name->value map
    /// for whichever calculators are ready.
    pub fn push_bar(&mut self, bar: Bar1m) -> HashMap<String, f64> {
        self.bars.push_back(bar);
        while self.bars.len() > self.capacity {
            self.bars.pop_front();
        }

        let mut out = HashMap::with_capacity(self.calculators.len());
        for calc in &mut self.calculators {
            if let Some(value) = calc.update(&self.bars) {
                out.insert(calc.name().to_string(), value);
            }
        }
        out
    }

    /// Replace the bar history wholesale (rehydration) and reset every
    /// calculator so stale cached values from a previous process don't leak.
    pub fn rehydrate(&mut self, bars: Vec<Bar1m>) {
        self.bars = bars.into_iter().collect();
        while self.bars.len() > self.capacity {
            self.bars.pop_front();
        }
        for calc in &mut self.calculators {
            calc.reset();
        }
    }

    pub fn bar_count(&self) -> usize {
        self.bars.len()
    }
}

/// Engine-wide registry of per-symbol state. The `RwLock` is only held long
/// enough to look up or insert an `Arc<Mutex<SymbolState>>` — all subsequent
/// calculator work happens under the per-symbol mutex alone.
pub struct IndicatorEngine {
    ring_buffer_size: usize,
    symbols: RwLock<HashMap<String, Arc<Mutex<SymbolState>>>>,
}

impl IndicatorEngine {
    pub fn new(ring_buffer_size: usize) -> Self {
        Self {
            ring_buffer_size,
            symbols: RwLock::new(HashMap::new()),
        }
    }

    fn state_for(&self, symbol: &str) -> Arc<Mutex<SymbolState>> {
        if let Some(state) = self.symbols.read().get(symbol) {
            return state.clone();
        }
        let mut map = self.symbols.write();
        map.entry(symbol.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(SymbolState::new(self.ring_buffer_size))))
            .clone()
    }

    /// Fold a finalized bar into its symbol's state and return the fresh
    /// indicator snapshot.
    pub fn on_bar(&self, bar: Bar1m) -> HashMap<String, f64> {
        let state = self.state_for(&bar.symbol);
        let mut state = state.lock();
        state.push_bar(bar)
    }

    pub fn rehydrate_symbol(&self, symbol: &str, bars: Vec<Bar1m>) {
        let state = self.state_for(symbol);
        let mut state = state.lock();
        state.rehydrate(bars);
    }

    pub fn symbol_count(&self) -> usize {
        self.symbols.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn bar(symbol: &str, close: f64) -> Bar1m {
        Bar1m {
            symbol: symbol.to_string(),
            open: close,
            high: close,
            low: close,
            close,
            volume: 10.0,
            vwap: close,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn on_bar_creates_symbol_state_lazily() {
        let engine = IndicatorEngine::new(200);
        assert_eq!(engine.symbol_count(), 0);
        engine.on_bar(bar("BTCUSDT", 100.0));
        assert_eq!(engine.symbol_count(), 1);
    }

    #[test]
    fn on_bar_returns_empty_map_before_warmup() {
        let engine = IndicatorEngine::new(200);
        let snapshot = engine.on_bar(bar("BTCUSDT", 100.0));
        assert!(snapshot.is_empty());
    }

    #[test]
    fn on_bar_produces_values_after_warmup() {
        let engine = IndicatorEngine::new(200);
        let mut snapshot = HashMap::new();
        for i in 0..60 {
            snapshot = engine.on_bar(bar("BTCUSDT", 100.0 + i as f64));
        }
        assert!(snapshot.contains_key("sma_10"));
        assert!(snapshot.contains_key("rsi_14"));
    }

    #[test]
    fn symbols_are_tracked_independently() {
        let engine = IndicatorEngine::new(200);
        for i in 0..30 {
            engine.on_bar(bar("BTCUSDT", 100.0 + i as f64));
        }
        let eth_snapshot = engine.on_bar(bar("ETHUSDT", 2000.0));
        // ETHUSDT only has one bar so far; its indicators are independent of
        // BTCUSDT's warmed-up state.
        assert!(!eth_snapshot.contains_key("sma_10"));
    }

    #[test]
    fn ring_buffer_respects_capacity() {
        let engine = IndicatorEngine::new(5);
        for i in 0..20 {
            engine.on_bar(bar("BTCUSDT", 100.0 + i as f64));
        }
        let state = engine.state_for("BTCUSDT");
        assert_eq!(state.lock().bar_count(), 5);
    }

    #[test]
    fn rehydrate_resets_calculator_readiness() {
        let engine = IndicatorEngine::new(200);
        for i in 0..60 {
            engine.on_bar(bar("BTCUSDT", 100.0 + i as f64));
        }
        let bars: Vec<Bar1m> = (0..3).map(|i| bar("BTCUSDT", 50.0 + i as f64)).collect();
        engine.rehydrate_symbol("BTCUSDT", bars);
        let state = engine.state_for("BTCUSDT");
        assert_eq!(state.lock().bar_count(), 3);
    }
}
