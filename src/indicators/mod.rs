// =============================================================================
// Technical Indicators Module
// =============================================================================
//
// Pure, side-effect-free volatility helpers used by the swing detector.

pub mod atr;

pub use atr::compute_atr;
