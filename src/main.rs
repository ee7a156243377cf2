// =============================================================================
// Swing Signal Bot - Main Entry Point
// =============================================================================
//
// Loads config, starts the status API and the signal scheduler, then waits
// for Ctrl+C.
// =============================================================================

// ── Module declarations ──────────────────────────────────────────────────────
mod api;
mod app_state;
mod binance;
mod error;
mod indicators;
mod notify;
mod pipeline;
mod runtime_config;
mod scheduler;
mod structure;
mod types;

use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::app_state::AppState;
use crate::binance::BinanceClient;
use crate::notify::TelegramNotifier;
use crate::runtime_config::RuntimeConfig;

const CONFIG_PATH: &str = "signal_config.json";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Swing Signal Bot starting up");

    let mut config = RuntimeConfig::load_or_init(CONFIG_PATH).unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        RuntimeConfig::default()
    });
    config.apply_env();
    config.validate()?;

    info!(symbols = ?config.symbols, interval_secs = config.schedule_interval_secs, "Configured symbols");

    let binance_config = config.binance.clone();
    let telegram_config = config.telegram.clone();
    let bind_addr = config.bind_addr.clone();

    // ── 2. Shared state ──────────────────────────────────────────────────
    let state = Arc::new(AppState::new(config));

    // ── 3. Clients ───────────────────────────────────────────────────────
    let binance_client = Arc::new(BinanceClient::new(&binance_config, state.rate_limit.clone())?);
    let notifier = Arc::new(TelegramNotifier::new(&telegram_config)?);
    if !notifier.is_configured() {
        warn!("BOT_TOKEN or CHAT_ID missing; reports will not be sent to Telegram");
    }

    // ── 4. Status API ────────────────────────────────────────────────────
    let api_state = state.clone();
    tokio::spawn(async move {
        let app = api::rest::router(api_state);
        let listener = match tokio::net::TcpListener::bind(&bind_addr).await {
            Ok(l) => l,
            Err(e) => {
                error!(addr = %bind_addr, error = %e, "Failed to bind API server");
                return;
            }
        };
        info!(addr = %bind_addr, "API server listening");
        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "API server failed");
        }
    });

    // ── 5. Signal scheduler ──────────────────────────────────────────────
    let sched_state = state.clone();
    tokio::spawn(scheduler::run(sched_state, binance_client, notifier));

    info!("All subsystems running. Press Ctrl+C to stop.");

    // ── 6. Shutdown ──────────────────────────────────────────────────────
    tokio::signal::ctrl_c().await?;
    warn!("Shutdown signal received");
    info!("Swing Signal Bot shut down complete.");
    Ok(())
}
