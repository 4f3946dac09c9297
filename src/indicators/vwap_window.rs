// =============================================================================
// Rolling window metrics: VWAP, volume average, price change
// =============================================================================
//
// These operate over the last N 1-minute bars, where N is expressed in
// minutes for a given lookback (1m, 5m, 15m, 1h).

use crate::models::Bar1m;

/// Volume-weighted average price over the trailing `window` bars.
pub fn rolling_vwap(bars: &[Bar1m], window: usize) -> Option<f64> {
    if window == 0 || bars.len() < window {
        return None;
    }
    let slice = &bars[bars.len() - window..];
    let (pv_sum, vol_sum) = slice
        .iter()
        .fold((0.0, 0.0), |(pv, v), b| (pv + b.vwap * b.volume, v + b.volume));
    if vol_sum <= 0.0 {
        return None;
    }
    Some(pv_sum / vol_sum)
}

/// Average traded volume per bar over the trailing `window` bars.
pub fn rolling_volume_avg(bars: &[Bar1m], window: usize) -> Option<f64> {
    if window == 0 || bars.len() < window {
        return None;
    }
    let slice = &bars[bars.len() - window..];
    let sum: f64 = slice.iter().map(|b| b.volume).sum();
    Some(sum / window as f64)
}

/// Percentage change in close price from `window` bars ago to the latest
/// close.
pub fn rolling_price_change_pct(bars: &[Bar1m], window: usize) -> Option<f64> {
    if window == 0 || bars.len() <= window {
        return None;
    }
    let latest = bars.last()?.close;
    let past = bars[bars.len() - 1 - window].close;
    if past == 0.0 {
        return None;
    }
    Some((latest - past) / past * 100.0)
}
