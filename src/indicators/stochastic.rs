// =============================================================================
// Stochastic Oscillator
// =============================================================================
//
// %K = 100 * (close - lowest_low(period)) / (highest_high(period) - lowest_low(period))
// %D = SMA(%K, smoothing_period)
//
// Default: period=14, %K smoothing=3, %D smoothing=3.

use super::sma::calculate_sma;
use crate::models::Bar1m;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StochasticResult {
    pub k: f64,
    pub d: f64,
}

/// Compute the most recent %K/%D reading from finalized bars (oldest first).
pub fn calculate_stochastic(
    bars: &[Bar1m],
    period: usize,
    k_smoothing: usize,
    d_smoothing: usize,
) -> Option<StochasticResult> {
    if period == 0 || k_smoothing == 0 || d_smoothing == 0 {
        return None;
    }
    if bars.len() < period {
        return None;
    }

    let raw_k: Vec<f64> = (period - 1..bars.len())
        .map(|i| {
            let window = &bars[i + 1 - period..=i];
            let highest = window.iter().map(|b| b.high).fold(f64::MIN, f64::max);
            let lowest = window.iter().map(|b| b.low).fold(f64::MAX, f64::min);
            let range = highest - lowest;
            if range == 0.0 {
                50.0
            } else {
                100.0 * (bars[i].close - lowest) / range
            }
        })
        .collect();

    let smoothed_k = calculate_sma(&raw_k, k_smoothing);
    if smoothed_k.len() < d_smoothing {
        return None;
    }
    let d = calculate_sma(&smoothed_k, d_smoothing).pop()?;
    let k = *smoothed_k.last()?;

    if !k.is_finite() || !d.is_finite() {
        return None;
    }

    Some(StochasticResult { k, d })
}
