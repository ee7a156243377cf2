// =============================================================================
// Signal Pipeline - per-timeframe orchestration
// =============================================================================
//
// For every configured timeframe:
//
//   candles -> swing detection -> trend label
//                              -> trendlines -> level flags   (4h / 1d)
//
// `evaluate_timeframe` is the synchronous, I/O-free core.  The async driver
// `run_signal_pipeline` fetches the current price, then fetches and evaluates
// all timeframes concurrently.  A timeframe that fails (fetch error or
// degenerate trendline) is reported as failed; the others still complete.
// =============================================================================

use std::future::Future;

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::error::SignalError;
use crate::runtime_config::{RuntimeConfig, TimeframeParams};
use crate::structure::{
    classify_trend, evaluate_levels, find_swing_points, fit_trend_lines, LevelSignal, SwingDetection,
    TrendLabel, TrendLines,
};
use crate::types::{Candle, Timeframe};

// =============================================================================
// Candle provider contract
// =============================================================================

/// Market-data source the pipeline pulls from.
pub trait CandleProvider {
    /// Up to `limit` candles, oldest first; the newest may still be open.
    fn get_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: u32,
    ) -> impl Future<Output = anyhow::Result<Vec<Candle>>> + Send;

    /// The most recent completed candle.
    fn get_last_candle(
        &self,
        symbol: &str,
        timeframe: Timeframe,
    ) -> impl Future<Output = anyhow::Result<Candle>> + Send;

    /// Latest traded price.
    fn get_current_price(&self, symbol: &str) -> impl Future<Output = anyhow::Result<f64>> + Send;
}

// =============================================================================
// Report types
// =============================================================================

/// Everything computed for one timeframe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeframeSignal {
    pub timeframe: Timeframe,
    pub trend: TrendLabel,
    pub detection: SwingDetection,
    pub trendlines: Option<TrendLines>,
    pub levels: Option<LevelSignal>,
    /// Candle the level flags were evaluated against.
    pub reference: Option<Candle>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TimeframeOutcome {
    Signal(TimeframeSignal),
    Failed { reason: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeframeReport {
    pub timeframe: Timeframe,
    pub outcome: TimeframeOutcome,
}

/// One pipeline run for one symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalReport {
    pub run_id: Uuid,
    pub symbol: String,
    pub price: f64,
    pub generated_at: DateTime<Utc>,
    pub timeframes: Vec<TimeframeReport>,
}

impl SignalReport {
    pub fn failures(&self) -> impl Iterator<Item = (Timeframe, &str)> {
        self.timeframes.iter().filter_map(|r| match &r.outcome {
            TimeframeOutcome::Failed { reason } => Some((r.timeframe, reason.as_str())),
            TimeframeOutcome::Signal(_) => None,
        })
    }
}

// =============================================================================
// Core
// =============================================================================

/// Run detection, classification and, where enabled, trendline evaluation on
/// one timeframe's candles.
///
/// Trendlines need two swing highs and two swing lows plus a reference
/// candle; without them `trendlines` and `levels` are `None`.
pub fn evaluate_timeframe(
    candles: &[Candle],
    reference: Option<&Candle>,
    params: &TimeframeParams,
    config: &RuntimeConfig,
) -> Result<TimeframeSignal, SignalError> {
    let detection = find_swing_points(candles, params, &config.candle_corrections);
    let points = &detection.points;
    let trend = classify_trend(&points.swing_highs, &points.swing_lows, config.near_ratio);

    let mut trendlines = None;
    let mut levels = None;
    let mut evaluated_against = None;

    if params.evaluate_trendlines && points.is_complete() {
        if let Some(reference) = reference {
            let lines = fit_trend_lines(&points.swing_highs, &points.swing_lows)?;
            levels = Some(evaluate_levels(&lines, reference, config.touch_ratio));
            trendlines = Some(lines);
            evaluated_against = Some(*reference);
        }
    }

    Ok(TimeframeSignal {
        timeframe: params.timeframe,
        trend,
        detection,
        trendlines,
        levels,
        reference: evaluated_against,
    })
}

// =============================================================================
// Async driver
// =============================================================================

async fn run_timeframe<P: CandleProvider>(
    provider: &P,
    symbol: &str,
    params: &TimeframeParams,
    config: &RuntimeConfig,
) -> Result<TimeframeSignal, SignalError> {
    let candles = provider
        .get_candles(symbol, params.timeframe, params.candle_limit)
        .await?;
    let reference = if params.evaluate_trendlines {
        Some(provider.get_last_candle(symbol, params.timeframe).await?)
    } else {
        None
    };
    evaluate_timeframe(&candles, reference.as_ref(), params, config)
}

/// Fetch and evaluate every configured timeframe for `symbol`.
///
/// Fails only when the current price cannot be fetched; per-timeframe
/// failures are recorded in the report.
#[instrument(skip(provider, config), name = "pipeline::run")]
pub async fn run_signal_pipeline<P: CandleProvider>(
    provider: &P,
    symbol: &str,
    config: &RuntimeConfig,
) -> Result<SignalReport, SignalError> {
    let run_id = Uuid::new_v4();
    let price = provider.get_current_price(symbol).await?;

    let timeframes = join_all(config.timeframes.iter().map(|params| async move {
        let outcome = match run_timeframe(provider, symbol, params, config).await {
            Ok(signal) => TimeframeOutcome::Signal(signal),
            Err(e) => {
                warn!(symbol, timeframe = %params.timeframe, error = %e, "timeframe evaluation failed");
                TimeframeOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        };
        TimeframeReport {
            timeframe: params.timeframe,
            outcome,
        }
    }))
    .await;

    let report = SignalReport {
        run_id,
        symbol: symbol.to_string(),
        price,
        generated_at: Utc::now(),
        timeframes,
    };

    info!(
        symbol,
        %run_id,
        price,
        failed = report.failures().count(),
        "signal pipeline complete"
    );

    Ok(report)
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const HOUR_MS: i64 = 3_600_000;

    /// (high, low) zigzag with highs at 2 and 7, lows at 4 and 9.
    fn zigzag() -> Vec<Candle> {
        let bars = [
            (101.0, 99.0),
            (102.0, 100.0),
            (110.0, 104.0),
            (103.0, 98.0),
            (102.0, 90.0),
            (104.0, 97.0),
            (105.0, 99.0),
            (112.0, 106.0),
            (106.0, 100.0),
            (104.0, 92.0),
            (105.0, 96.0),
            (106.0, 99.0),
            (105.0, 100.0), // unclosed
        ];
        bars.iter()
            .enumerate()
            .map(|(i, (h, l))| Candle {
                time: i as i64 * HOUR_MS,
                open: (h + l) / 2.0,
                high: *h,
                low: *l,
                close: (h + l) / 2.0,
            })
            .collect()
    }

    fn params(timeframe: Timeframe, evaluate_trendlines: bool) -> TimeframeParams {
        TimeframeParams {
            timeframe,
            base_lookback: 2,
            atr_period: 500,
            atr_multiplier: 1.0,
            volatility_low: -1.0,
            volatility_high: 1.0,
            candle_limit: 13,
            evaluate_trendlines,
        }
    }

    fn test_config() -> RuntimeConfig {
        RuntimeConfig {
            timeframes: vec![
                params(Timeframe::M15, false),
                params(Timeframe::H1, false),
                params(Timeframe::H4, true),
                params(Timeframe::D1, true),
            ],
            ..RuntimeConfig::default()
        }
    }

    fn reference(close: f64) -> Candle {
        Candle {
            time: 12 * HOUR_MS,
            open: close,
            high: close,
            low: close,
            close,
        }
    }

    fn signal(report: &SignalReport, timeframe: Timeframe) -> &TimeframeSignal {
        report
            .timeframes
            .iter()
            .find_map(|r| match &r.outcome {
                TimeframeOutcome::Signal(s) if r.timeframe == timeframe => Some(s),
                _ => None,
            })
            .expect("signal for timeframe")
    }

    struct MockProvider {
        price: Option<f64>,
        candles: HashMap<Timeframe, Vec<Candle>>,
        reference: Candle,
    }

    impl MockProvider {
        fn healthy() -> Self {
            Self {
                price: Some(105.0),
                candles: Timeframe::ALL.iter().map(|tf| (*tf, zigzag())).collect(),
                reference: reference(114.3),
            }
        }
    }

    impl CandleProvider for MockProvider {
        async fn get_candles(
            &self,
            _symbol: &str,
            timeframe: Timeframe,
            _limit: u32,
        ) -> anyhow::Result<Vec<Candle>> {
            self.candles
                .get(&timeframe)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("HTTP 429 for {timeframe}"))
        }

        async fn get_last_candle(&self, _symbol: &str, _timeframe: Timeframe) -> anyhow::Result<Candle> {
            Ok(self.reference)
        }

        async fn get_current_price(&self, _symbol: &str) -> anyhow::Result<f64> {
            self.price.ok_or_else(|| anyhow::anyhow!("connection reset"))
        }
    }

    #[test]
    fn evaluates_trend_and_levels() {
        let config = test_config();
        let sig = evaluate_timeframe(&zigzag(), Some(&reference(114.3)), &params(Timeframe::H4, true), &config)
            .unwrap();

        assert_eq!(sig.trend, TrendLabel::Up);
        let lines = sig.trendlines.expect("trendlines");
        // Resistance through (2h, 110) and (7h, 112) projects 114 at 12h.
        assert!((lines.resistance.project(12 * HOUR_MS) - 114.0).abs() < 1e-6);
        // Support through (4h, 90) and (9h, 92) projects 93.2 at 12h.
        assert!((lines.support.project(12 * HOUR_MS) - 93.2).abs() < 1e-6);

        let levels = sig.levels.expect("levels");
        assert!(levels.touch_resistance);
        assert!(!levels.breakout);
        assert!(!levels.breakdown);
        assert!(!levels.touch_support);
        assert_eq!(sig.reference.map(|c| c.close), Some(114.3));
    }

    #[test]
    fn lower_timeframes_skip_trendlines() {
        let config = test_config();
        let sig = evaluate_timeframe(&zigzag(), Some(&reference(114.3)), &params(Timeframe::M15, false), &config)
            .unwrap();
        assert_eq!(sig.trend, TrendLabel::Up);
        assert!(sig.trendlines.is_none());
        assert!(sig.levels.is_none());
    }

    #[test]
    fn incomplete_swings_skip_trendlines_without_error() {
        let config = test_config();
        let candles = &zigzag()[..6];
        let sig = evaluate_timeframe(candles, Some(&reference(100.0)), &params(Timeframe::D1, true), &config)
            .unwrap();
        assert_eq!(sig.trend, TrendLabel::Unspecified);
        assert!(sig.levels.is_none());
    }

    #[test]
    fn shared_swing_timestamp_is_an_error() {
        let config = test_config();
        let mut candles = zigzag();
        candles[7].time = candles[2].time;
        let err = evaluate_timeframe(&candles, Some(&reference(100.0)), &params(Timeframe::H4, true), &config)
            .unwrap_err();
        assert!(matches!(err, SignalError::DegenerateInput { .. }));
    }

    #[tokio::test]
    async fn report_covers_every_timeframe() {
        let provider = MockProvider::healthy();
        let report = run_signal_pipeline(&provider, "BTCUSDT", &test_config()).await.unwrap();

        assert_eq!(report.symbol, "BTCUSDT");
        assert_eq!(report.price, 105.0);
        assert_eq!(report.timeframes.len(), 4);
        assert_eq!(report.failures().count(), 0);
        assert!(signal(&report, Timeframe::M15).levels.is_none());
        assert!(signal(&report, Timeframe::D1).levels.is_some());
    }

    #[tokio::test]
    async fn one_failing_timeframe_does_not_abort_others() {
        let mut provider = MockProvider::healthy();
        provider.candles.remove(&Timeframe::H1);
        let mut degenerate = zigzag();
        degenerate[7].time = degenerate[2].time;
        provider.candles.insert(Timeframe::H4, degenerate);

        let report = run_signal_pipeline(&provider, "BTCUSDT", &test_config()).await.unwrap();

        let failures: Vec<Timeframe> = report.failures().map(|(tf, _)| tf).collect();
        assert_eq!(failures, vec![Timeframe::H1, Timeframe::H4]);
        assert!(report.failures().any(|(_, reason)| reason.contains("429")));
        assert_eq!(signal(&report, Timeframe::M15).trend, TrendLabel::Up);
        assert!(signal(&report, Timeframe::D1).levels.is_some());
    }

    #[tokio::test]
    async fn price_failure_surfaces_as_provider_error() {
        let mut provider = MockProvider::healthy();
        provider.price = None;
        let err = run_signal_pipeline(&provider, "BTCUSDT", &test_config()).await.unwrap_err();
        assert!(matches!(err, SignalError::DataProvider(_)));
    }

    #[test]
    fn outcome_serialises_with_status_tag() {
        let outcome = TimeframeOutcome::Failed {
            reason: "boom".into(),
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["reason"], "boom");
    }
}
