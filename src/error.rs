use thiserror::Error;

/// Errors surfaced by the signal pipeline.
///
/// Short candle series are not an error: the swing detector returns empty
/// sets for them.
#[derive(Error, Debug)]
pub enum SignalError {
    /// Both trendline anchors share a timestamp, so the slope is undefined.
    #[error("degenerate trendline: both anchor points share timestamp {time}")]
    DegenerateInput { time: i64 },

    /// The market-data provider failed (network, HTTP status, rate limit,
    /// malformed payload). Retry policy belongs to the caller.
    #[error("data provider error: {0:#}")]
    DataProvider(#[from] anyhow::Error),
}
