// =============================================================================
// Swing Point Detector - volatility-adaptive fractals
// =============================================================================
//
// A candle is a swing high when its high is strictly above every high in the
// `lookback` candles on each side (swing low symmetric on lows).  Two twists:
//
//   1. The lookback adapts to volatility.  ratio = ATR * multiplier / close,
//      rounded to 5 decimals.  Above the timeframe's high band the window
//      narrows by one (floor 2) to react faster; below the low band it widens
//      by one to ignore noise.
//   2. Candidates must clear the average of the neighbouring extremes on both
//      sides by more than 0.4 * ATR (unscaled).
//
// The newest candle is treated as unclosed and never scanned.  Only the two
// most recent accepted highs and lows are returned.
// =============================================================================

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::indicators::compute_atr;
use crate::runtime_config::{CandleCorrection, CorrectionRule, TimeframeParams};
use crate::types::{Candle, SwingPoint, SwingPoints};

/// Fraction of the unscaled ATR a candidate must clear its neighbours by.
const SIGNIFICANCE_ATR_FACTOR: f64 = 0.4;

/// Swing points retained per side.
const MAX_POINTS_PER_SIDE: usize = 2;

/// Lookback never narrows below this under high volatility.
const MIN_ADAPTED_LOOKBACK: usize = 2;

/// Detector output plus the values it derived on the way.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SwingDetection {
    pub points: SwingPoints,
    /// Unscaled ATR of the closed candles.
    pub atr: f64,
    pub volatility_ratio: f64,
    /// Lookback actually used after adaptation.
    pub lookback: usize,
}

/// Find the two most recent swing highs and lows, returning the values the
/// detector derived on the way alongside them.
pub fn find_swing_points(
    candles: &[Candle],
    params: &TimeframeParams,
    corrections: &[CandleCorrection],
) -> SwingDetection {
    let base_lookback = params.base_lookback;

    if candles.len() < 2 * base_lookback + 2 {
        debug!(
            timeframe = %params.timeframe,
            candles = candles.len(),
            needed = 2 * base_lookback + 2,
            "swing detection: insufficient data"
        );
        return SwingDetection {
            lookback: base_lookback,
            ..Default::default()
        };
    }

    // Drop the unclosed candle, then patch known bad data.
    let closed = apply_corrections(&candles[..candles.len() - 1], corrections);

    let atr = compute_atr(&closed, params.atr_period);
    let last_close = closed.last().map_or(0.0, |c| c.close);
    let volatility_ratio = volatility_ratio(atr * params.atr_multiplier, last_close);
    let lookback = adapt_lookback(
        base_lookback,
        volatility_ratio,
        params.volatility_low,
        params.volatility_high,
    );

    let threshold = SIGNIFICANCE_ATR_FACTOR * atr;
    let mut swing_highs = Vec::new();
    let mut swing_lows = Vec::new();

    if closed.len() >= 2 * lookback + 1 {
        for i in lookback..closed.len() - lookback {
            let c = &closed[i];
            let left = &closed[i - lookback..i];
            let right = &closed[i + 1..=i + lookback];

            if is_swing_high(c.high, left, right, threshold) {
                swing_highs.push(SwingPoint {
                    index: i,
                    time: c.time,
                    value: c.high,
                });
            }
            if is_swing_low(c.low, left, right, threshold) {
                swing_lows.push(SwingPoint {
                    index: i,
                    time: c.time,
                    value: c.low,
                });
            }
        }
    }

    let points = SwingPoints {
        swing_highs: keep_latest(swing_highs),
        swing_lows: keep_latest(swing_lows),
    };

    debug!(
        timeframe = %params.timeframe,
        atr,
        volatility_ratio,
        lookback,
        highs = points.swing_highs.len(),
        lows = points.swing_lows.len(),
        "swing detection complete"
    );

    SwingDetection {
        points,
        atr,
        volatility_ratio,
        lookback,
    }
}

/// `adjusted_atr / last_close` rounded to 5 decimal places; 0 when the close
/// is not positive.
pub fn volatility_ratio(adjusted_atr: f64, last_close: f64) -> f64 {
    if last_close <= 0.0 {
        return 0.0;
    }
    ((adjusted_atr / last_close) * 100_000.0).round() / 100_000.0
}

/// Narrow the window in choppy markets, widen it in quiet ones.
pub fn adapt_lookback(base: usize, ratio: f64, low: f64, high: f64) -> usize {
    if ratio > high {
        base.saturating_sub(1).max(MIN_ADAPTED_LOOKBACK)
    } else if ratio < low {
        base + 1
    } else {
        base
    }
}

fn is_swing_high(high: f64, left: &[Candle], right: &[Candle], threshold: f64) -> bool {
    if !left.iter().chain(right).all(|n| n.high < high) {
        return false;
    }
    let left_max = left.iter().map(|n| n.high).fold(f64::NEG_INFINITY, f64::max);
    let right_max = right.iter().map(|n| n.high).fold(f64::NEG_INFINITY, f64::max);
    high - (left_max + right_max) / 2.0 > threshold
}

fn is_swing_low(low: f64, left: &[Candle], right: &[Candle], threshold: f64) -> bool {
    if !left.iter().chain(right).all(|n| n.low > low) {
        return false;
    }
    let left_min = left.iter().map(|n| n.low).fold(f64::INFINITY, f64::min);
    let right_min = right.iter().map(|n| n.low).fold(f64::INFINITY, f64::min);
    (left_min + right_min) / 2.0 - low > threshold
}

fn keep_latest(mut points: Vec<SwingPoint>) -> Vec<SwingPoint> {
    let start = points.len().saturating_sub(MAX_POINTS_PER_SIDE);
    points.drain(..start);
    points
}

fn apply_corrections(candles: &[Candle], corrections: &[CandleCorrection]) -> Vec<Candle> {
    candles
        .iter()
        .map(|c| {
            let mut c = *c;
            let time = c.time;
            for rule in corrections.iter().filter(|r| r.applies_to(time)) {
                match rule.rule {
                    CorrectionRule::LowFromClose => c.low = c.close,
                }
            }
            c
        })
        .collect()
}
