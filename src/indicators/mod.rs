// =============================================================================
// Technical Indicators Module
// =============================================================================
//
// Pure, side-effect-free calculation functions (rsi, ema, sma, macd, atr,
// bollinger, stochastic, vwap_window), plus the `Calculator` trait and the
// fixed registry the indicator engine drives per symbol.

pub mod atr;
pub mod bollinger;
pub mod ema;
pub mod engine;
pub mod macd;
pub mod rsi;
pub mod service;
pub mod sma;
pub mod stochastic;
pub mod vwap_window;

use std::collections::VecDeque;

use crate::models::Bar1m;

/// Capability set every indicator implements. Calculators are symbol-local —
/// a fresh instance is created per `(symbol, kind)` pair and is never shared
/// across symbols. Each `update` call recomputes from the full bar window the
/// engine hands it rather than maintaining incremental state; window sizes
/// are small enough (at most a few hundred bars) that this costs nothing
/// worth optimizing away.
pub trait Calculator: Send {
    /// Stable name this calculator's value is published under, e.g. "rsi_14".
    fn name(&self) -> &'static str;

    /// Recompute from the full bar window (oldest first) and cache the
    /// latest value, returning it.
    fn update(&mut self, bars: &VecDeque<Bar1m>) -> Option<f64>;

    /// Whether `update` has produced a value at least once.
    fn is_ready(&self) -> bool;

    /// Clear any cached value, e.g. on rehydration from a fresh bar history.
    fn reset(&mut self);
}

macro_rules! close_series_calculator {
    ($struct_name:ident, $name:expr, $period:expr, $compute:expr) => {
        pub struct $struct_name {
            value: Option<f64>,
        }

        impl $struct_name {
            pub fn new() -> Self {
                Self { value: None }
            }
        }

        impl Calculator for $struct_name {
            fn name(&self) -> &'static str {
                $name
            }

            fn update(&mut self, bars: &VecDeque<Bar1m>) -> Option<f64> {
                let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
                self.value = $compute(&closes, $period);
                self.value
            }

            fn is_ready(&self) -> bool {
                self.value.is_some()
            }

            fn reset(&mut self) {
                self.value = None;
            }
        }
    };
}

close_series_calculator!(Rsi9, "rsi_9", 9, |c, p| rsi::current_rsi(c, p).map(|(v, _)| v));
close_series_calculator!(Rsi14, "rsi_14", 14, |c, p| rsi::current_rsi(c, p).map(|(v, _)| v));
close_series_calculator!(Rsi21, "rsi_21", 21, |c, p| rsi::current_rsi(c, p).map(|(v, _)| v));

close_series_calculator!(Ema9, "ema_9", 9, |c: &[f64], p| ema::calculate_ema(c, p).last().copied());
close_series_calculator!(Ema12, "ema_12", 12, |c: &[f64], p| ema::calculate_ema(c, p).last().copied());
close_series_calculator!(Ema20, "ema_20", 20, |c: &[f64], p| ema::calculate_ema(c, p).last().copied());
close_series_calculator!(Ema21, "ema_21", 21, |c: &[f64], p| ema::calculate_ema(c, p).last().copied());
close_series_calculator!(Ema26, "ema_26", 26, |c: &[f64], p| ema::calculate_ema(c, p).last().copied());
close_series_calculator!(Ema50, "ema_50", 50, |c: &[f64], p| ema::calculate_ema(c, p).last().copied());
close_series_calculator!(Ema200, "ema_200", 200, |c: &[f64], p| ema::calculate_ema(c, p).last().copied());

close_series_calculator!(Sma10, "sma_10", 10, sma::current_sma);
close_series_calculator!(Sma20, "sma_20", 20, sma::current_sma);
close_series_calculator!(Sma50, "sma_50", 50, sma::current_sma);
close_series_calculator!(Sma200, "sma_200", 200, sma::current_sma);

pub struct Macd;
impl Macd {
    pub fn new() -> MacdCalculator {
        MacdCalculator { value: None }
    }
}

pub struct MacdCalculator {
    value: Option<f64>,
}

impl Calculator for MacdCalculator {
    fn name(&self) -> &'static str {
        "macd_histogram"
    }

    fn update(&mut self, bars: &VecDeque<Bar1m>) -> Option<f64> {
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        self.value = macd::calculate_macd(&closes, 12, 26, 9).map(|r| r.histogram);
        self.value
    }

    fn is_ready(&self) -> bool {
        self.value.is_some()
    }

    fn reset(&mut self) {
        self.value = None;
    }
}

pub struct AtrCalculator {
    value: Option<f64>,
}

impl AtrCalculator {
    pub fn new() -> Self {
        Self { value: None }
    }
}

impl Calculator for AtrCalculator {
    fn name(&self) -> &'static str {
        "atr_14"
    }

    fn update(&mut self, bars: &VecDeque<Bar1m>) -> Option<f64> {
        let vec: Vec<Bar1m> = bars.iter().cloned().collect();
        self.value = atr::calculate_atr(&vec, 14);
        self.value
    }

    fn is_ready(&self) -> bool {
        self.value.is_some()
    }

    fn reset(&mut self) {
        self.value = None;
    }
}

pub struct BollingerCalculator {
    value: Option<f64>,
}

impl BollingerCalculator {
    pub fn new() -> Self {
        Self { value: None }
    }
}

impl Calculator for BollingerCalculator {
    fn name(&self) -> &'static str {
        "bollinger_width_20"
    }

    fn update(&mut self, bars: &VecDeque<Bar1m>) -> Option<f64> {
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        self.value = bollinger::calculate_bollinger(&closes, 20, 2.0).map(|r| r.width);
        self.value
    }

    fn is_ready(&self) -> bool {
        self.value.is_some()
    }

    fn reset(&mut self) {
        self.value = None;
    }
}

pub struct StochasticCalculator {
    value: Option<f64>,
}

impl StochasticCalculator {
    pub fn new() -> Self {
        Self { value: None }
    }
}

impl Calculator for StochasticCalculator {
    fn name(&self) -> &'static str {
        "stochastic_k_14_3_3"
    }

    fn update(&mut self, bars: &VecDeque<Bar1m>) -> Option<f64> {
        let vec: Vec<Bar1m> = bars.iter().cloned().collect();
        self.value = stochastic::calculate_stochastic(&vec, 14, 3, 3).map(|r| r.k);
        self.value
    }

    fn is_ready(&self) -> bool {
        self.value.is_some()
    }

    fn reset(&mut self) {
        self.value = None;
    }
}

macro_rules! window_calculator {
    ($struct_name:ident, $name:expr, $window:expr, $compute:path) => {
        pub struct $struct_name {
            value: Option<f64>,
        }

        impl $struct_name {
            pub fn new() -> Self {
                Self { value: None }
            }
        }

        impl Calculator for $struct_name {
            fn name(&self) -> &'static str {
                $name
            }

            fn update(&mut self, bars: &VecDeque<Bar1m>) -> Option<f64> {
                let vec: Vec<Bar1m> = bars.iter().cloned().collect();
                self.value = $compute(&vec, $window);
                self.value
            }

            fn is_ready(&self) -> bool {
                self.value.is_some()
            }

            fn reset(&mut self) {
                self.value = None;
            }
        }
    };
}

window_calculator!(Vwap1m, "vwap_1m", 1, vwap_window::rolling_vwap);
window_calculator!(Vwap5m, "vwap_5m", 5, vwap_window::rolling_vwap);
window_calculator!(Vwap15m, "vwap_15m", 15, vwap_window::rolling_vwap);
window_calculator!(Vwap1h, "vwap_1h", 60, vwap_window::rolling_vwap);

window_calculator!(VolumeAvg5m, "volume_avg_5m", 5, vwap_window::rolling_volume_avg);
window_calculator!(VolumeAvg15m, "volume_avg_15m", 15, vwap_window::rolling_volume_avg);
window_calculator!(VolumeAvg1h, "volume_avg_1h", 60, vwap_window::rolling_volume_avg);

window_calculator!(PriceChange5m, "price_change_pct_5m", 5, vwap_window::rolling_price_change_pct);
window_calculator!(PriceChange15m, "price_change_pct_15m", 15, vwap_window::rolling_price_change_pct);
window_calculator!(PriceChange1h, "price_change_pct_1h", 60, vwap_window::rolling_price_change_pct);

/// Build one instance of every calculator in the fixed indicator set. Called
/// once per symbol when its `SymbolState` is first created.
pub fn build_default_set() -> Vec<Box<dyn Calculator>> {
    vec![
        Box::new(Rsi9::new()),
        Box::new(Rsi14::new()),
        Box::new(Rsi21::new()),
        Box::new(Ema9::new()),
        Box::new(Ema12::new()),
        Box::new(Ema20::new()),
        Box::new(Ema21::new()),
        Box::new(Ema26::new()),
        Box::new(Ema50::new()),
        Box::new(Ema200::new()),
        Box::new(Sma10::new()),
        Box::new(Sma20::new()),
        Box::new(Sma50::new()),
        Box::new(Sma200::new()),
        Box::new(Macd::new()),
        Box::new(AtrCalculator::new()),
        Box::new(BollingerCalculator::new()),
        Box::new(StochasticCalculator::new()),
        Box::new(Vwap1m::new()),
        Box::new(Vwap5m::new()),
        Box::new(Vwap15m::new()),
        Box::new(Vwap1h::new()),
        Box::new(VolumeAvg5m::new()),
        Box::new(VolumeAvg15m::new()),
        Box::new(VolumeAvg1h::new()),
        Box::new(PriceChange5m::new()),
        Box::new(PriceChange15m::new()),
        Box::new(PriceChange1h::new()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn bars(n: usize) -> VecDeque<Bar1m> {
        (0..n)
            .map(|i| Bar1m {
                symbol: "BTCUSDT".into(),
                open: 100.0 + i as f64,
                high: 101.0 + i as f64,
                low: 99.0 + i as f64,
                close: 100.0 + i as f64,
                volume: 10.0,
                vwap: 100.0 + i as f64,
                timestamp: Utc::now(),
            })
            .collect()
    }

    #[test]
    fn build_default_set_has_no_duplicate_names() {
        let set = build_default_set();
        let mut names: Vec<&'static str> = set.iter().map(|c| c.name()).collect();
        let original_len = names.len();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), original_len, "calculator names must be unique");
    }

    #[test]
    fn calculators_are_not_ready_before_first_update() {
        for calc in build_default_set() {
            assert!(!calc.is_ready());
        }
    }

    #[test]
    fn rsi_calculator_becomes_ready_with_enough_bars() {
        let mut calc = Rsi14::new();
        assert!(calc.update(&bars(5)).is_none());
        assert!(!calc.is_ready());
        assert!(calc.update(&bars(30)).is_some());
        assert!(calc.is_ready());
    }

    #[test]
    fn reset_clears_readiness() {
        let mut calc = Sma10::new();
        calc.update(&bars(20));
        assert!(calc.is_ready());
        calc.reset();
        assert!(!calc.is_ready());
    }
}
