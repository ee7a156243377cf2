// =============================================================================
// Scheduler - periodic signal runs
// =============================================================================
//
// Every `schedule_interval_secs` the pipeline runs once per configured symbol.
// Successful reports are stored in `AppState` and forwarded to Telegram;
// failed runs land in the error log.  A slow tick is not caught up.
// =============================================================================

use std::sync::Arc;

use tokio::time::{Duration, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::app_state::AppState;
use crate::notify::TelegramNotifier;
use crate::pipeline::{run_signal_pipeline, CandleProvider};

/// Run forever, one tick per configured interval.
pub async fn run<P: CandleProvider>(state: Arc<AppState>, provider: Arc<P>, notifier: Arc<TelegramNotifier>) {
    let interval_secs = state.runtime_config.schedule_interval_secs.max(1);
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(interval_secs, "Signal scheduler started");

    loop {
        interval.tick().await;
        run_once(&state, provider.as_ref(), &notifier).await;
    }
}

/// One pass over every configured symbol.
pub async fn run_once<P: CandleProvider>(state: &AppState, provider: &P, notifier: &TelegramNotifier) {
    let config = &state.runtime_config;

    for symbol in &config.symbols {
        match run_signal_pipeline(provider, symbol, config).await {
            Ok(report) => {
                for (timeframe, reason) in report.failures() {
                    state.push_error(Some(symbol), format!("{timeframe}: {reason}"));
                }
                if let Err(e) = notifier.send_report(&report).await {
                    error!(symbol = %symbol, error = %e, "Failed to deliver Telegram notification");
                    state.push_error(Some(symbol), format!("notification failed: {e:#}"));
                }
                state.record_report(report);
            }
            Err(e) => {
                warn!(symbol = %symbol, error = %e, "Signal run failed");
                state.push_error(Some(symbol), e.to_string());
            }
        }
    }
}
