// =============================================================================
// Trend Classifier
// =============================================================================
//
// Maps the latest two swing highs (H0 older, H1 newer) and lows (L0, L1) to a
// label.  "Near equal" means |new - old| / new < near_ratio.
//
// Decision order (first match wins):
//
//   1. highs ~=  & lows ~=   -> FLAT_SIDEWAY
//   2. highs ~=  & lows up   -> WAIT_BREAKOUT
//   3. highs ~=  & lows down -> WAIT_BREAKDOWN
//   4. lows ~=   & highs up  -> MAYBE_UP
//   5. lows ~=   & highs down-> MAYBE_DOWN
//   6. highs up  & lows up   -> UP
//   7. highs down& lows down -> DOWN
//   8. highs up  & lows down -> SIDEWAY_EXPANDING
//   9. highs down& lows up   -> SIDEWAY_CONTRACTING
//  10. otherwise             -> UNSPECIFIED
//
// Stateless: the label is recomputed from scratch on every call.

use serde::{Deserialize, Serialize};

use crate::types::SwingPoint;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrendLabel {
    Up,
    Down,
    SidewayExpanding,
    SidewayContracting,
    FlatSideway,
    WaitBreakout,
    WaitBreakdown,
    MaybeUp,
    MaybeDown,
    Unspecified,
}

impl std::fmt::Display for TrendLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Up => "up",
            Self::Down => "down",
            Self::SidewayExpanding => "expanding sideway",
            Self::SidewayContracting => "contracting sideway",
            Self::FlatSideway => "flat sideway",
            Self::WaitBreakout => "wait breakout",
            Self::WaitBreakdown => "wait breakdown",
            Self::MaybeUp => "maybe up",
            Self::MaybeDown => "maybe down",
            Self::Unspecified => "unspecified",
        };
        f.write_str(s)
    }
}

/// Classify the trend from exactly two swing highs and two swing lows.
///
/// Any other count yields [`TrendLabel::Unspecified`].
pub fn classify_trend(swing_highs: &[SwingPoint], swing_lows: &[SwingPoint], near_ratio: f64) -> TrendLabel {
    let ([h0, h1], [l0, l1]) = (swing_highs, swing_lows) else {
        return TrendLabel::Unspecified;
    };
    classify(h0.value, h1.value, l0.value, l1.value, near_ratio)
}

fn classify(h0: f64, h1: f64, l0: f64, l1: f64, near_ratio: f64) -> TrendLabel {
    let highs_near = near_equal(h0, h1, near_ratio);
    let lows_near = near_equal(l0, l1, near_ratio);
    let highs_up = h1 > h0;
    let highs_down = h1 < h0;
    let lows_up = l1 > l0;
    let lows_down = l1 < l0;

    if highs_near && lows_near {
        TrendLabel::FlatSideway
    } else if highs_near && lows_up {
        TrendLabel::WaitBreakout
    } else if highs_near && lows_down {
        TrendLabel::WaitBreakdown
    } else if lows_near && highs_up {
        TrendLabel::MaybeUp
    } else if lows_near && highs_down {
        TrendLabel::MaybeDown
    } else if highs_up && lows_up {
        TrendLabel::Up
    } else if highs_down && lows_down {
        TrendLabel::Down
    } else if highs_up && lows_down {
        TrendLabel::SidewayExpanding
    } else if highs_down && lows_up {
        TrendLabel::SidewayContracting
    } else {
        TrendLabel::Unspecified
    }
}

/// Relative distance measured against the newer value.
fn near_equal(older: f64, newer: f64, ratio: f64) -> bool {
    if newer == 0.0 {
        return older == 0.0;
    }
    ((newer - older) / newer).abs() < ratio
}
