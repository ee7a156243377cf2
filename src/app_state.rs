// =============================================================================
// Central Application State - Swing Signal Bot
// =============================================================================
//
// Shared between the scheduler (writer) and the status API (reader) via
// `Arc<AppState>`.
//
// Thread safety:
//   - Atomic counter for lock-free version tracking.
//   - parking_lot::RwLock for the report map and error log.
//   - The config is fixed after startup and read without locking.
//   - The rate-limit tracker manages its own atomics.
// =============================================================================

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use serde::Serialize;

use crate::binance::RateLimitTracker;
use crate::pipeline::SignalReport;
use crate::runtime_config::RuntimeConfig;

// =============================================================================
// Error Record
// =============================================================================

/// A recorded failure for the status API error log.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorRecord {
    /// Symbol the failing run was for, if any.
    pub symbol: Option<String>,
    pub message: String,
    /// ISO 8601 timestamp.
    pub at: String,
}

// =============================================================================
// AppState
// =============================================================================

/// Maximum number of recent errors to retain.
const MAX_RECENT_ERRORS: usize = 50;

pub struct AppState {
    /// Incremented on every stored report or error.
    pub state_version: AtomicU64,

    pub runtime_config: RuntimeConfig,

    /// Latest report per symbol.
    pub latest_reports: RwLock<HashMap<String, SignalReport>>,

    pub recent_errors: RwLock<Vec<ErrorRecord>>,

    /// Binance request-weight usage, shared with the REST client.
    pub rate_limit: Arc<RateLimitTracker>,

    pub start_time: std::time::Instant,
}

impl AppState {
    pub fn new(config: RuntimeConfig) -> Self {
        Self {
            state_version: AtomicU64::new(1),
            runtime_config: config,
            latest_reports: RwLock::new(HashMap::new()),
            recent_errors: RwLock::new(Vec::new()),
            rate_limit: Arc::new(RateLimitTracker::new()),
            start_time: std::time::Instant::now(),
        }
    }

    // ── Version Management ──────────────────────────────────────────────

    pub fn increment_version(&self) -> u64 {
        self.state_version.fetch_add(1, Ordering::SeqCst)
    }

    pub fn current_state_version(&self) -> u64 {
        self.state_version.load(Ordering::SeqCst)
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    // ── Reports ─────────────────────────────────────────────────────────

    /// Store `report` as the latest for its symbol, replacing any older one.
    pub fn record_report(&self, report: SignalReport) {
        self.latest_reports
            .write()
            .insert(report.symbol.clone(), report);
        self.increment_version();
    }

    pub fn report(&self, symbol: &str) -> Option<SignalReport> {
        self.latest_reports.read().get(symbol).cloned()
    }

    /// All latest reports, ordered by symbol.
    pub fn reports(&self) -> Vec<SignalReport> {
        let mut reports: Vec<SignalReport> = self.latest_reports.read().values().cloned().collect();
        reports.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        reports
    }

    // ── Error Logging ───────────────────────────────────────────────────

    /// Record an error message. The ring buffer is capped at
    /// [`MAX_RECENT_ERRORS`]; oldest entries are evicted first.
    pub fn push_error(&self, symbol: Option<&str>, msg: String) {
        let record = ErrorRecord {
            symbol: symbol.map(str::to_string),
            message: msg,
            at: Utc::now().to_rfc3339(),
        };

        let mut errors = self.recent_errors.write();
        errors.push(record);
        while errors.len() > MAX_RECENT_ERRORS {
            errors.remove(0);
        }
        drop(errors);

        self.increment_version();
    }

    pub fn errors(&self) -> Vec<ErrorRecord> {
        self.recent_errors.read().clone()
    }
}
