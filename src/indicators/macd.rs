// =============================================================================
// Moving Average Convergence Divergence (MACD)
// =============================================================================
//
// MACD line   = EMA(fast) - EMA(slow)
// Signal line = EMA(signal_period) of the MACD line
// Histogram   = MACD line - Signal line
//
// Default periods: fast=12, slow=26, signal=9.

use super::ema::calculate_ema;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MacdResult {
    pub macd: f64,
    pub signal: f64,
    pub histogram: f64,
}

/// Compute the most recent MACD reading for `closes`.
///
/// Returns `None` when there is insufficient data for the slow EMA plus the
/// signal-line EMA on top of it.
pub fn calculate_macd(
    closes: &[f64],
    fast_period: usize,
    slow_period: usize,
    signal_period: usize,
) -> Option<MacdResult> {
    if fast_period == 0 || slow_period == 0 || signal_period == 0 || fast_period >= slow_period {
        return None;
    }

    let fast = calculate_ema(closes, fast_period);
    let slow = calculate_ema(closes, slow_period);
    if slow.is_empty() {
        return None;
    }

    // Align series: `fast` starts `slow_period - fast_period` entries earlier
    // than `slow`, so trim it to the same tail length.
    let offset = fast.len().checked_sub(slow.len())?;
    let aligned_fast = &fast[offset..];

    let macd_line: Vec<f64> = aligned_fast
        .iter()
        .zip(slow.iter())
        .map(|(f, s)| f - s)
        .collect();

    if macd_line.len() < signal_period {
        return None;
    }

    let signal_line = calculate_ema(&macd_line, signal_period);
    let signal = *signal_line.last()?;
    let macd = *macd_line.last()?;

    let histogram = macd - signal;
    if !histogram.is_finite() {
        return None;
    }

    Some(MacdResult {
        macd,
        signal,
        histogram,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ascending(n: usize) -> Vec<f64> {
        (1..=n).map(|i| i as f64).collect()
    }

    #[test]
    fn macd_insufficient_data_returns_none() {
        assert!(calculate_macd(&ascending(10), 12, 26, 9).is_none());
    }

    #[test]
    fn macd_rejects_fast_not_less_than_slow() {
        assert!(calculate_macd(&ascending(100), 26, 12, 9).is_none());
    }

    #[test]
    fn macd_rejects_zero_periods() {
        assert!(calculate_macd(&ascending(100), 0, 26, 9).is_none());
    }

    #[test]
    fn macd_ascending_series_is_positive() {
        // A steadily rising series: fast EMA pulls ahead of slow EMA, MACD > 0.
        let result = calculate_macd(&ascending(100), 12, 26, 9).unwrap();
        assert!(result.macd > 0.0);
    }

    #[test]
    fn macd_histogram_equals_macd_minus_signal() {
        let result = calculate_macd(&ascending(100), 12, 26, 9).unwrap();
        assert!((result.histogram - (result.macd - result.signal)).abs() < 1e-9);
    }

    #[test]
    fn macd_flat_series_is_near_zero() {
        let closes = vec![100.0; 100];
        let result = calculate_macd(&closes, 12, 26, 9).unwrap();
        assert!(result.macd.abs() < 1e-9);
        assert!(result.histogram.abs() < 1e-9);
    }
}
