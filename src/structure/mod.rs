// =============================================================================
// Market Structure Module
// =============================================================================
//
// Swing-point based structure analysis, leaf-first:
// - Swing detection (volatility-adaptive fractals)
// - Trend classification from the last two swing highs/lows
// - Two-point trendlines through swing highs (resistance) and lows (support)
// - Touch / breakout / breakdown evaluation against those lines

pub mod levels;
pub mod swing;
pub mod trend;
pub mod trendline;

pub use levels::{evaluate_levels, LevelSignal};
pub use swing::{find_swing_points, SwingDetection};
pub use trend::{classify_trend, TrendLabel};
pub use trendline::{fit_trend_lines, TrendLines};
