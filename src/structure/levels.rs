// =============================================================================
// Level Evaluator - close vs projected trendlines
// =============================================================================

use serde::{Deserialize, Serialize};

use crate::structure::trendline::{project_price, TrendLines};
use crate::types::Candle;

/// Touch / break flags for one reference candle.
///
/// A close inside the touch band of a line counts as a touch, not a break:
/// breakout needs the close above resistance by at least the touch ratio,
/// breakdown below support by at least the same. Touches of one line and
/// breaks of the other are independent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LevelSignal {
    pub projected_resistance: f64,
    pub projected_support: f64,
    pub touch_resistance: bool,
    pub touch_support: bool,
    pub breakout: bool,
    pub breakdown: bool,
}

/// Compare `reference.close` against both lines projected to `reference.time`.
pub fn evaluate_levels(lines: &TrendLines, reference: &Candle, touch_ratio: f64) -> LevelSignal {
    let resistance = project_price(&lines.resistance, reference.time);
    let support = project_price(&lines.support, reference.time);
    evaluate_against(resistance, support, reference.close, touch_ratio)
}

fn evaluate_against(resistance: f64, support: f64, close: f64, touch_ratio: f64) -> LevelSignal {
    let touch_resistance = touches(close, resistance, touch_ratio);
    let touch_support = touches(close, support, touch_ratio);
    LevelSignal {
        projected_resistance: resistance,
        projected_support: support,
        touch_resistance,
        touch_support,
        breakout: close > resistance && !touch_resistance,
        breakdown: close < support && !touch_support,
    }
}

fn touches(close: f64, level: f64, ratio: f64) -> bool {
    level > 0.0 && (close - level).abs() / level < ratio
}
