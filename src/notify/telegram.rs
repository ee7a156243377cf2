// =============================================================================
// Telegram Notifier - delivers signal reports to a chat
// =============================================================================
//
// Messages are plain text sent through the Bot API `sendMessage` method.
// Candle times are rendered at a fixed display offset (UTC+7 by default) so
// the chat reads in the operator's local time.
// =============================================================================

use std::fmt::Write as _;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{FixedOffset, TimeZone, Utc};
use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::pipeline::{SignalReport, TimeframeOutcome, TimeframeSignal};
use crate::runtime_config::TelegramConfig;

#[derive(Serialize)]
struct SendMessageRequest<'a> {
    chat_id: &'a str,
    text: &'a str,
}

pub struct TelegramNotifier {
    client: reqwest::Client,
    api_base: String,
    bot_token: String,
    chat_id: Option<String>,
    display_utc_offset_hours: i32,
}

impl TelegramNotifier {
    pub fn new(config: &TelegramConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("failed to build Telegram HTTP client")?;

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            bot_token: config.bot_token.clone(),
            chat_id: config.chat_id.clone().filter(|c| !c.is_empty()),
            display_utc_offset_hours: config.display_utc_offset_hours,
        })
    }

    /// Both a bot token and a target chat are present.
    pub fn is_configured(&self) -> bool {
        !self.bot_token.is_empty() && self.chat_id.is_some()
    }

    /// Format and deliver `report`. A notifier without credentials logs and
    /// returns `Ok`.
    #[instrument(skip(self, report), fields(symbol = %report.symbol), name = "telegram::send_report")]
    pub async fn send_report(&self, report: &SignalReport) -> Result<()> {
        let Some(chat_id) = self.chat_id.as_deref().filter(|_| !self.bot_token.is_empty()) else {
            info!("Telegram not configured; skipping notification");
            return Ok(());
        };

        let text = format_report(report, self.display_utc_offset_hours);
        self.send_message(chat_id, &text).await
    }

    async fn send_message(&self, chat_id: &str, text: &str) -> Result<()> {
        let url = format!("{}/bot{}/sendMessage", self.api_base, self.bot_token);
        let resp = self
            .client
            .post(&url)
            .json(&SendMessageRequest { chat_id, text })
            .send()
            .await
            // reqwest errors carry the URL, which contains the token.
            .map_err(|e| anyhow::anyhow!("sendMessage request failed: {}", e.without_url()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Telegram sendMessage returned {status}: {body}");
        }

        debug!(chars = text.len(), "Telegram message delivered");
        Ok(())
    }
}

impl std::fmt::Debug for TelegramNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramNotifier")
            .field("api_base", &self.api_base)
            .field("chat_id", &self.chat_id)
            .field("bot_token", &"<redacted>")
            .finish()
    }
}

// =============================================================================
// Formatting
// =============================================================================

/// Render an epoch-ms timestamp as `YYYY-MM-DD HH:MM:SS` at `offset_hours`.
pub fn format_time(time_ms: i64, offset_hours: i32) -> String {
    let offset = FixedOffset::east_opt(offset_hours * 3600)
        .or_else(|| FixedOffset::east_opt(0));
    match (Utc.timestamp_millis_opt(time_ms).single(), offset) {
        (Some(t), Some(offset)) => t.with_timezone(&offset).format("%Y-%m-%d %H:%M:%S").to_string(),
        _ => time_ms.to_string(),
    }
}

pub fn format_report(report: &SignalReport, offset_hours: i32) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{} @ {:.2}", report.symbol, report.price);
    let _ = writeln!(
        out,
        "{} (UTC{:+})",
        format_time(report.generated_at.timestamp_millis(), offset_hours),
        offset_hours
    );

    for tf in &report.timeframes {
        match &tf.outcome {
            TimeframeOutcome::Signal(signal) => write_signal(&mut out, signal, offset_hours),
            TimeframeOutcome::Failed { reason } => {
                let _ = writeln!(out, "[{}] unavailable: {}", tf.timeframe, reason);
            }
        }
    }

    out.trim_end().to_string()
}

fn write_signal(out: &mut String, signal: &TimeframeSignal, offset_hours: i32) {
    let _ = writeln!(out, "[{}] trend: {}", signal.timeframe, signal.trend);

    let (Some(levels), Some(reference)) = (&signal.levels, &signal.reference) else {
        return;
    };

    let _ = writeln!(
        out,
        "  resistance {:.2} / support {:.2} at {}",
        levels.projected_resistance,
        levels.projected_support,
        format_time(reference.time, offset_hours)
    );

    let mut flags = Vec::new();
    if levels.breakout {
        flags.push("breakout");
    }
    if levels.breakdown {
        flags.push("breakdown");
    }
    if levels.touch_resistance {
        flags.push("touching resistance");
    }
    if levels.touch_support {
        flags.push("touching support");
    }
    if !flags.is_empty() {
        let _ = writeln!(out, "  close {:.2}: {}", reference.close, flags.join(", "));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::TimeframeReport;
    use crate::structure::{LevelSignal, SwingDetection, TrendLabel};
    use crate::types::{Candle, SwingPoints, Timeframe};
    use uuid::Uuid;

    // 2023-11-14 22:13:20 UTC
    const T0: i64 = 1_700_000_000_000;

    fn signal(timeframe: Timeframe, trend: TrendLabel, levels: Option<LevelSignal>) -> TimeframeOutcome {
        TimeframeOutcome::Signal(TimeframeSignal {
            timeframe,
            trend,
            detection: SwingDetection {
                points: SwingPoints::default(),
                atr: 0.0,
                volatility_ratio: 0.0,
                lookback: 3,
            },
            trendlines: None,
            reference: levels.as_ref().map(|_| Candle {
                time: T0,
                open: 100.0,
                high: 101.5,
                low: 99.0,
                close: 101.0,
            }),
            levels,
        })
    }

    fn report() -> SignalReport {
        SignalReport {
            run_id: Uuid::nil(),
            symbol: "BTCUSDT".into(),
            price: 101.25,
            generated_at: Utc.timestamp_millis_opt(T0).single().unwrap(),
            timeframes: vec![
                TimeframeReport {
                    timeframe: Timeframe::M15,
                    outcome: signal(Timeframe::M15, TrendLabel::Up, None),
                },
                TimeframeReport {
                    timeframe: Timeframe::H1,
                    outcome: TimeframeOutcome::Failed {
                        reason: "HTTP 429".into(),
                    },
                },
                TimeframeReport {
                    timeframe: Timeframe::H4,
                    outcome: signal(
                        Timeframe::H4,
                        TrendLabel::WaitBreakout,
                        Some(LevelSignal {
                            projected_resistance: 100.0,
                            projected_support: 90.0,
                            touch_resistance: false,
                            touch_support: false,
                            breakout: true,
                            breakdown: false,
                        }),
                    ),
                },
            ],
        }
    }

    #[test]
    fn formats_time_with_display_offset() {
        assert_eq!(format_time(T0, 0), "2023-11-14 22:13:20");
        assert_eq!(format_time(T0, 7), "2023-11-15 05:13:20");
    }

    #[test]
    fn report_lists_every_timeframe() {
        let text = format_report(&report(), 7);
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[0], "BTCUSDT @ 101.25");
        assert_eq!(lines[1], "2023-11-15 05:13:20 (UTC+7)");
        assert_eq!(lines[2], "[15m] trend: up");
        assert_eq!(lines[3], "[1h] unavailable: HTTP 429");
        assert_eq!(lines[4], "[4h] trend: wait breakout");
        assert_eq!(lines[5], "  resistance 100.00 / support 90.00 at 2023-11-15 05:13:20");
        assert_eq!(lines[6], "  close 101.00: breakout");
        assert_eq!(lines.len(), 7);
    }

    #[test]
    fn notifier_without_credentials_is_not_configured() {
        let notifier = TelegramNotifier::new(&TelegramConfig::default()).unwrap();
        assert!(!notifier.is_configured());

        let config = TelegramConfig {
            bot_token: "123:abc".into(),
            chat_id: Some("42".into()),
            ..TelegramConfig::default()
        };
        let notifier = TelegramNotifier::new(&config).unwrap();
        assert!(notifier.is_configured());
        assert!(!format!("{notifier:?}").contains("123:abc"));
    }

    #[tokio::test]
    async fn unconfigured_send_is_a_no_op() {
        let notifier = TelegramNotifier::new(&TelegramConfig::default()).unwrap();
        assert!(notifier.send_report(&report()).await.is_ok());
    }
}
