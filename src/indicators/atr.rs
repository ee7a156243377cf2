// =============================================================================
// Average True Range (ATR) - simple moving average of True Range
// =============================================================================
//
// True Range (TR) for each bar:
//   TR = max(H - L, |H - prevClose|, |L - prevClose|)
//
// ATR is the plain mean of the most recent `period` TR values (no Wilder
// smoothing), so the value only depends on the trailing `period + 1` candles.
// =============================================================================

use crate::types::Candle;

/// True range of `candle` relative to the previous bar's close.
pub fn true_range(candle: &Candle, prev_close: f64) -> f64 {
    let hl = candle.high - candle.low;
    let hc = (candle.high - prev_close).abs();
    let lc = (candle.low - prev_close).abs();
    hl.max(hc).max(lc)
}

/// Compute the ATR of the most recent `period` bars.
///
/// Returns `0.0` when `period` is zero or there are fewer than `period + 1`
/// candles. Callers treat zero as "no measurable volatility" and must not
/// divide by it.
pub fn compute_atr(candles: &[Candle], period: usize) -> f64 {
    if period == 0 || candles.len() < period + 1 {
        return 0.0;
    }

    let window = &candles[candles.len() - (period + 1)..];
    let sum: f64 = window
        .windows(2)
        .map(|pair| true_range(&pair[1], pair[0].close))
        .sum();

    sum / period as f64
}
