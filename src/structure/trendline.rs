// =============================================================================
// Trendline Fitter - two-point lines through swing points
// =============================================================================
//
// x is the candle open time in epoch milliseconds, y the swing value.
//
//   slope     = (y2 - y1) / (x2 - x1)
//   intercept = y1 - slope * x1
//
// Resistance runs through the last two swing highs, support through the last
// two swing lows.

use serde::{Deserialize, Serialize};

use crate::error::SignalError;
use crate::types::SwingPoint;

/// `price = slope * time_ms + intercept`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrendLine {
    pub slope: f64,
    pub intercept: f64,
}

impl TrendLine {
    /// Fit the line through two points with distinct timestamps.
    pub fn through(p1: &SwingPoint, p2: &SwingPoint) -> Result<Self, SignalError> {
        if p1.time == p2.time {
            return Err(SignalError::DegenerateInput { time: p1.time });
        }
        let (x1, x2) = (p1.time as f64, p2.time as f64);
        let slope = (p2.value - p1.value) / (x2 - x1);
        let intercept = p1.value - slope * x1;
        Ok(Self { slope, intercept })
    }

    /// Projected price at `time_ms`.
    pub fn project(&self, time_ms: i64) -> f64 {
        self.slope * time_ms as f64 + self.intercept
    }
}

/// Resistance (through highs) and support (through lows).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrendLines {
    pub resistance: TrendLine,
    pub support: TrendLine,
}

/// Fit resistance and support from exactly two swing highs and two swing lows.
///
/// The caller guarantees the counts; anything else is treated as degenerate.
pub fn fit_trend_lines(swing_highs: &[SwingPoint], swing_lows: &[SwingPoint]) -> Result<TrendLines, SignalError> {
    let ([h0, h1], [l0, l1]) = (swing_highs, swing_lows) else {
        let time = swing_highs
            .first()
            .or(swing_lows.first())
            .map_or(0, |p| p.time);
        return Err(SignalError::DegenerateInput { time });
    };
    Ok(TrendLines {
        resistance: TrendLine::through(h0, h1)?,
        support: TrendLine::through(l0, l1)?,
    })
}

/// Projected price of `line` at `time_ms`.
pub fn project_price(line: &TrendLine, time_ms: i64) -> f64 {
    line.project(time_ms)
}
