// =============================================================================
// Rate-Limit Tracker - keeps REST usage under Binance's per-minute weight cap
// =============================================================================
//
// Binance reports the request weight used in the current minute via the
// `X-MBX-USED-WEIGHT-1M` response header.  The tracker remembers the last
// reported value together with the minute it belongs to; once the minute
// rolls over the remembered weight no longer applies.
// =============================================================================

use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Hard ceiling at which we refuse to send additional requests.
const WEIGHT_HARD_LIMIT: u32 = 1000;
/// Soft warning threshold.
const WEIGHT_WARN_THRESHOLD: u32 = 800;

const USED_WEIGHT_HEADER: &str = "x-mbx-used-weight-1m";

/// Thread-safe rate-limit tracker backed by atomic counters.
pub struct RateLimitTracker {
    used_weight_1m: AtomicU32,
    /// Unix minute the weight was reported in.
    weight_minute: AtomicI64,
}

/// Serialisable view for the status API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitSnapshot {
    pub used_weight_1m: u32,
    pub hard_limit: u32,
}

fn current_minute() -> i64 {
    chrono::Utc::now().timestamp() / 60
}

impl RateLimitTracker {
    pub fn new() -> Self {
        Self {
            used_weight_1m: AtomicU32::new(0),
            weight_minute: AtomicI64::new(0),
        }
    }

    /// Update the counter from Binance response headers.
    pub fn update_from_headers(&self, headers: &reqwest::header::HeaderMap) {
        let weight = headers
            .get(USED_WEIGHT_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u32>().ok());
        if let Some(w) = weight {
            self.record_weight(w, current_minute());
        }
    }

    fn record_weight(&self, weight: u32, minute: i64) {
        self.used_weight_1m.store(weight, Ordering::Relaxed);
        self.weight_minute.store(minute, Ordering::Relaxed);
        if weight >= WEIGHT_WARN_THRESHOLD {
            warn!(
                used_weight = weight,
                hard_limit = WEIGHT_HARD_LIMIT,
                "rate-limit weight above warning threshold"
            );
        } else {
            debug!(used_weight_1m = weight, "rate-limit weight updated from header");
        }
    }

    fn used_weight_at(&self, minute: i64) -> u32 {
        if self.weight_minute.load(Ordering::Relaxed) == minute {
            self.used_weight_1m.load(Ordering::Relaxed)
        } else {
            0
        }
    }

    /// `true` if `weight` more request weight fits in the current minute.
    pub fn can_send_request(&self, weight: u32) -> bool {
        self.can_send_at(weight, current_minute())
    }

    fn can_send_at(&self, weight: u32, minute: i64) -> bool {
        let current = self.used_weight_at(minute);
        let allowed = current.saturating_add(weight) <= WEIGHT_HARD_LIMIT;
        if !allowed {
            warn!(
                current_weight = current,
                requested_weight = weight,
                hard_limit = WEIGHT_HARD_LIMIT,
                "request blocked - would exceed rate-limit"
            );
        }
        allowed
    }

    pub fn snapshot(&self) -> RateLimitSnapshot {
        RateLimitSnapshot {
            used_weight_1m: self.used_weight_at(current_minute()),
            hard_limit: WEIGHT_HARD_LIMIT,
        }
    }
}

impl Default for RateLimitTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RateLimitTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimitTracker")
            .field("used_weight_1m", &self.used_weight_1m.load(Ordering::Relaxed))
            .field("weight_minute", &self.weight_minute.load(Ordering::Relaxed))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{HeaderMap, HeaderValue};

    #[test]
    fn fresh_tracker_allows_requests() {
        let t = RateLimitTracker::new();
        assert!(t.can_send_request(2));
    }

    #[test]
    fn blocks_when_budget_is_exhausted() {
        let t = RateLimitTracker::new();
        t.record_weight(999, 10);
        assert!(t.can_send_at(1, 10));
        assert!(!t.can_send_at(2, 10));
    }

    #[test]
    fn weight_resets_when_minute_rolls_over() {
        let t = RateLimitTracker::new();
        t.record_weight(1000, 10);
        assert!(!t.can_send_at(2, 10));
        assert!(t.can_send_at(2, 11));
    }

    #[test]
    fn huge_reported_weight_blocks_without_overflow() {
        let t = RateLimitTracker::new();
        t.record_weight(u32::MAX, 10);
        assert!(!t.can_send_at(2, 10));
        assert!(!t.can_send_at(u32::MAX, 10));
    }

    #[test]
    fn reads_used_weight_header() {
        let t = RateLimitTracker::new();
        let mut headers = HeaderMap::new();
        headers.insert(USED_WEIGHT_HEADER, HeaderValue::from_static("42"));
        t.update_from_headers(&headers);
        assert_eq!(t.used_weight_1m.load(Ordering::Relaxed), 42);

        headers.insert(USED_WEIGHT_HEADER, HeaderValue::from_static("garbage"));
        t.update_from_headers(&headers);
        assert_eq!(t.used_weight_1m.load(Ordering::Relaxed), 42);
    }
}
