// =============================================================================
// Shared types used across the signal bot
// =============================================================================

use serde::{Deserialize, Serialize};

/// A single OHLC candle. `time` is the candle open time in Unix epoch
/// milliseconds and doubles as the x-axis for trendline fitting.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

/// A local extremum found by the swing detector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SwingPoint {
    /// Position within the candle slice the detector scanned.
    pub index: usize,
    pub time: i64,
    /// The swing high's `high` or the swing low's `low`.
    pub value: f64,
}

/// The most recent swing highs and lows, oldest first, at most two of each.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SwingPoints {
    pub swing_highs: Vec<SwingPoint>,
    pub swing_lows: Vec<SwingPoint>,
}

impl SwingPoints {
    /// `true` when both sides carry the two points needed for a trendline.
    pub fn is_complete(&self) -> bool {
        self.swing_highs.len() == 2 && self.swing_lows.len() == 2
    }
}

/// Candle interval a pipeline run operates on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "15m")]
    M15,
    #[serde(rename = "1h")]
    H1,
    #[serde(rename = "4h")]
    H4,
    #[serde(rename = "1d")]
    D1,
}

impl Timeframe {
    pub const ALL: [Timeframe; 4] = [Self::M15, Self::H1, Self::H4, Self::D1];

    /// Interval string as understood by the Binance klines endpoint.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::M15 => "15m",
            Self::H1 => "1h",
            Self::H4 => "4h",
            Self::D1 => "1d",
        }
    }
}

impl std::fmt::Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
