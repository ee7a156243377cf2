// =============================================================================
// Runtime Configuration - JSON file + environment overrides, atomic save
// =============================================================================
//
// Every tunable of the signal bot lives here: the watched symbols, the
// schedule, the per-timeframe swing parameters, the data-correction rules and
// the connection settings for Binance and Telegram.
//
// Load order: JSON file (all fields carry `#[serde(default)]` so older files
// keep loading; defaults are written on first start) -> environment
// overrides -> `validate()`.  The file is never rewritten after that, so
// overrides stay in memory.  Credentials are
// only ever read from the environment and are never written back to disk.
//
// =============================================================================

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::types::Timeframe;

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_symbols() -> Vec<String> {
    vec!["BTCUSDT".to_string()]
}

fn default_schedule_interval_secs() -> u64 {
    60
}

fn default_near_ratio() -> f64 {
    0.005
}

fn default_touch_ratio() -> f64 {
    0.005
}

fn default_timeframes() -> Vec<TimeframeParams> {
    Timeframe::ALL
        .iter()
        .map(|tf| TimeframeParams::default_for(*tf))
        .collect()
}

fn default_bind_addr() -> String {
    "0.0.0.0:3001".to_string()
}

fn default_binance_base_url() -> String {
    "https://api.binance.com/api/v3".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_telegram_api_base() -> String {
    "https://api.telegram.org".to_string()
}

fn default_display_utc_offset_hours() -> i32 {
    7
}

// =============================================================================
// TimeframeParams
// =============================================================================

/// Swing-detection parameters for one timeframe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeframeParams {
    pub timeframe: Timeframe,

    /// Fractal window before volatility adaptation. Must be >= 1.
    pub base_lookback: usize,

    /// Number of true-range values averaged into the ATR.
    pub atr_period: usize,

    /// Scale applied to the ATR before computing the volatility ratio.
    pub atr_multiplier: f64,

    /// Below this volatility ratio the lookback widens by one.
    pub volatility_low: f64,

    /// Above this volatility ratio the lookback narrows by one (floor 2).
    pub volatility_high: f64,

    /// Candles requested from the provider per run.
    pub candle_limit: u32,

    /// Fit trendlines and evaluate touch/breakout levels for this timeframe.
    #[serde(default)]
    pub evaluate_trendlines: bool,
}

impl TimeframeParams {
    /// Parameter set shipped for each supported timeframe.
    pub fn default_for(timeframe: Timeframe) -> Self {
        let (base_lookback, atr_period, atr_multiplier, volatility_low, volatility_high, candle_limit) =
            match timeframe {
                Timeframe::M15 => (3, 10, 1.3, 0.008, 0.015, 100),
                Timeframe::H1 => (3, 12, 1.2, 0.012, 0.022, 100),
                Timeframe::H4 => (4, 14, 1.15, 0.018, 0.03, 60),
                Timeframe::D1 => (5, 20, 1.1, 0.025, 0.04, 60),
            };
        Self {
            timeframe,
            base_lookback,
            atr_period,
            atr_multiplier,
            volatility_low,
            volatility_high,
            candle_limit,
            evaluate_trendlines: matches!(timeframe, Timeframe::H4 | Timeframe::D1),
        }
    }
}

// =============================================================================
// Candle corrections
// =============================================================================

/// What a correction does to a matching candle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CorrectionRule {
    /// Replace the candle's `low` with its `close`.
    LowFromClose,
}

/// A data-quality patch applied to candles whose open time falls inside
/// `[from, until)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandleCorrection {
    pub from: DateTime<Utc>,
    pub until: DateTime<Utc>,
    pub rule: CorrectionRule,
}

impl CandleCorrection {
    pub fn applies_to(&self, time_ms: i64) -> bool {
        time_ms >= self.from.timestamp_millis() && time_ms < self.until.timestamp_millis()
    }
}

// =============================================================================
// Collaborator settings
// =============================================================================

/// Connection settings handed to the Binance client at construction.
#[derive(Clone, Serialize, Deserialize)]
pub struct BinanceConfig {
    /// REST base including the version prefix, e.g. `https://api.binance.com/api/v3`.
    #[serde(default = "default_binance_base_url")]
    pub base_url: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Optional key sent as `X-MBX-APIKEY`. Environment only.
    #[serde(skip)]
    pub api_key: String,
}

impl Default for BinanceConfig {
    fn default() -> Self {
        Self {
            base_url: default_binance_base_url(),
            timeout_secs: default_timeout_secs(),
            api_key: String::new(),
        }
    }
}

impl std::fmt::Debug for BinanceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BinanceConfig")
            .field("base_url", &self.base_url)
            .field("timeout_secs", &self.timeout_secs)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

/// Delivery settings handed to the Telegram notifier at construction.
#[derive(Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    #[serde(default = "default_telegram_api_base")]
    pub api_base: String,

    /// Target chat. Notifications are skipped when unset.
    #[serde(default)]
    pub chat_id: Option<String>,

    /// Hours added to UTC when rendering candle times in messages.
    #[serde(default = "default_display_utc_offset_hours")]
    pub display_utc_offset_hours: i32,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Bot token. Environment only.
    #[serde(skip)]
    pub bot_token: String,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            api_base: default_telegram_api_base(),
            chat_id: None,
            display_utc_offset_hours: default_display_utc_offset_hours(),
            timeout_secs: default_timeout_secs(),
            bot_token: String::new(),
        }
    }
}

impl std::fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("api_base", &self.api_base)
            .field("chat_id", &self.chat_id)
            .field("display_utc_offset_hours", &self.display_utc_offset_hours)
            .field("bot_token", &"<redacted>")
            .finish()
    }
}

// =============================================================================
// RuntimeConfig
// =============================================================================

/// Top-level configuration for the signal bot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Symbols evaluated on every tick.
    #[serde(default = "default_symbols")]
    pub symbols: Vec<String>,

    /// Seconds between scheduler ticks.
    #[serde(default = "default_schedule_interval_secs")]
    pub schedule_interval_secs: u64,

    /// Relative distance under which two swing values count as equal.
    #[serde(default = "default_near_ratio")]
    pub near_ratio: f64,

    /// Relative distance under which a close counts as touching a trendline.
    #[serde(default = "default_touch_ratio")]
    pub touch_ratio: f64,

    /// One parameter set per evaluated timeframe.
    #[serde(default = "default_timeframes")]
    pub timeframes: Vec<TimeframeParams>,

    /// Candle patches applied before swing detection.
    #[serde(default)]
    pub candle_corrections: Vec<CandleCorrection>,

    /// Status API listen address.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    #[serde(default)]
    pub binance: BinanceConfig,

    #[serde(default)]
    pub telegram: TelegramConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            symbols: default_symbols(),
            schedule_interval_secs: default_schedule_interval_secs(),
            near_ratio: default_near_ratio(),
            touch_ratio: default_touch_ratio(),
            timeframes: default_timeframes(),
            candle_corrections: Vec::new(),
            bind_addr: default_bind_addr(),
            binance: BinanceConfig::default(),
            telegram: TelegramConfig::default(),
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from a JSON file at `path`.
    ///
    /// If the file does not exist, returns an error so the caller can fall
    /// back to defaults with a warning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read runtime config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse runtime config from {}", path.display()))?;

        info!(
            path = %path.display(),
            symbols = ?config.symbols,
            timeframes = config.timeframes.len(),
            "runtime config loaded"
        );

        Ok(config)
    }

    /// Load `path`, or write the defaults there when no file exists yet.
    ///
    /// An existing file is never rewritten, even when it fails to parse.
    pub fn load_or_init(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            return Self::load(path);
        }
        let config = Self::default();
        config.save(path)?;
        info!(path = %path.display(), "no runtime config found, wrote defaults");
        Ok(config)
    }

    /// Persist the current configuration to `path` using an atomic write
    /// (write to `.tmp`, then rename). Secrets are not serialised.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content = serde_json::to_string_pretty(self)
            .context("failed to serialise runtime config to JSON")?;

        let tmp_path = path.with_extension("json.tmp");

        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;

        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;

        info!(path = %path.display(), "runtime config saved (atomic)");
        Ok(())
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary key lookup. Empty values are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(syms) = get("SIGNAL_SYMBOLS") {
            self.symbols = syms
                .split(',')
                .map(|s| s.trim().to_uppercase())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Some(addr) = get("SIGNAL_BIND_ADDR") {
            self.bind_addr = addr;
        }
        if let Some(url) = get("BINANCE_API_URL").or_else(|| get("API")) {
            self.binance.base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(key) = get("BINANCE_API_KEY") {
            self.binance.api_key = key;
        }
        if let Some(token) = get("BOT_TOKEN") {
            self.telegram.bot_token = token;
        }
        if let Some(chat) = get("CHAT_ID") {
            self.telegram.chat_id = Some(chat);
        }
    }

    /// Reject parameter sets the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.symbols.is_empty() {
            anyhow::bail!("no symbols configured");
        }
        if self.schedule_interval_secs == 0 {
            anyhow::bail!("schedule_interval_secs must be positive");
        }
        if !(self.near_ratio > 0.0) || !(self.touch_ratio > 0.0) {
            anyhow::bail!("near_ratio and touch_ratio must be positive");
        }
        if self.timeframes.is_empty() {
            anyhow::bail!("no timeframes configured");
        }

        for (i, tf) in self.timeframes.iter().enumerate() {
            if self.timeframes[..i].iter().any(|other| other.timeframe == tf.timeframe) {
                anyhow::bail!("timeframe {} configured twice", tf.timeframe);
            }
            if tf.base_lookback == 0 {
                anyhow::bail!("timeframe {}: base_lookback must be >= 1", tf.timeframe);
            }
            if tf.atr_period == 0 {
                anyhow::bail!("timeframe {}: atr_period must be >= 1", tf.timeframe);
            }
            if !(tf.atr_multiplier > 0.0) {
                anyhow::bail!("timeframe {}: atr_multiplier must be positive", tf.timeframe);
            }
            if !(tf.volatility_low < tf.volatility_high) {
                anyhow::bail!(
                    "timeframe {}: volatility_low ({}) must be below volatility_high ({})",
                    tf.timeframe,
                    tf.volatility_low,
                    tf.volatility_high
                );
            }
            let needed = 2 * tf.base_lookback as u32 + 2;
            if tf.candle_limit < needed {
                anyhow::bail!(
                    "timeframe {}: candle_limit {} is below the {} candles swing detection needs",
                    tf.timeframe,
                    tf.candle_limit,
                    needed
                );
            }
        }

        for c in &self.candle_corrections {
            if c.from >= c.until {
                anyhow::bail!("candle correction range {} .. {} is empty", c.from, c.until);
            }
        }

        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn default_config_has_expected_values() {
        let cfg = RuntimeConfig::default();
        assert_eq!(cfg.symbols, vec!["BTCUSDT"]);
        assert_eq!(cfg.schedule_interval_secs, 60);
        assert_eq!(cfg.timeframes.len(), 4);
        assert!(cfg.candle_corrections.is_empty());
        assert!((cfg.near_ratio - 0.005).abs() < f64::EPSILON);
        assert!((cfg.touch_ratio - 0.005).abs() < f64::EPSILON);
        assert_eq!(cfg.telegram.display_utc_offset_hours, 7);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn default_timeframe_table() {
        let d1 = TimeframeParams::default_for(Timeframe::D1);
        assert_eq!(d1.atr_period, 20);
        assert!((d1.atr_multiplier - 1.1).abs() < f64::EPSILON);
        assert!(d1.evaluate_trendlines);

        let m15 = TimeframeParams::default_for(Timeframe::M15);
        assert_eq!(m15.atr_period, 10);
        assert!((m15.volatility_high - 0.015).abs() < f64::EPSILON);
        assert!(!m15.evaluate_trendlines);

        assert!(TimeframeParams::default_for(Timeframe::H4).evaluate_trendlines);
        assert!(!TimeframeParams::default_for(Timeframe::H1).evaluate_trendlines);
    }

    #[test]
    fn deserialise_empty_json_uses_defaults() {
        let cfg: RuntimeConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.symbols, vec!["BTCUSDT"]);
        assert_eq!(cfg.timeframes.len(), 4);
        assert_eq!(cfg.binance.base_url, "https://api.binance.com/api/v3");
        assert!(cfg.telegram.chat_id.is_none());
    }

    #[test]
    fn deserialise_partial_json_fills_defaults() {
        let json = r#"{
            "symbols": ["ETHUSDT"],
            "candle_corrections": [
                { "from": "2025-04-07T00:00:00Z", "until": "2025-04-08T00:00:00Z", "rule": "LowFromClose" }
            ],
            "telegram": { "chat_id": "-100123" }
        }"#;
        let cfg: RuntimeConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.symbols, vec!["ETHUSDT"]);
        assert_eq!(cfg.candle_corrections.len(), 1);
        assert_eq!(cfg.telegram.chat_id.as_deref(), Some("-100123"));
        assert_eq!(cfg.telegram.api_base, "https://api.telegram.org");
        assert_eq!(cfg.schedule_interval_secs, 60);
    }

    #[test]
    fn secrets_are_never_serialised() {
        let mut cfg = RuntimeConfig::default();
        cfg.binance.api_key = "binance-secret".into();
        cfg.telegram.bot_token = "bot-secret".into();
        let json = serde_json::to_string(&cfg).unwrap();
        assert!(!json.contains("binance-secret"));
        assert!(!json.contains("bot-secret"));
        let dbg = format!("{cfg:?}");
        assert!(!dbg.contains("bot-secret"));
    }

    #[test]
    fn env_overrides_apply() {
        let env: HashMap<&str, &str> = [
            ("SIGNAL_SYMBOLS", " btcusdt, ethusdt ,,"),
            ("BINANCE_API_URL", "https://testnet.binance.vision/api/v3/"),
            ("BOT_TOKEN", "123:abc"),
            ("CHAT_ID", "42"),
            ("BINANCE_API_KEY", ""),
        ]
        .into_iter()
        .collect();

        let mut cfg = RuntimeConfig::default();
        cfg.apply_overrides(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(cfg.symbols, vec!["BTCUSDT", "ETHUSDT"]);
        assert_eq!(cfg.binance.base_url, "https://testnet.binance.vision/api/v3");
        assert_eq!(cfg.telegram.bot_token, "123:abc");
        assert_eq!(cfg.telegram.chat_id.as_deref(), Some("42"));
        assert!(cfg.binance.api_key.is_empty());
    }

    #[test]
    fn validate_rejects_zero_lookback() {
        let mut cfg = RuntimeConfig::default();
        cfg.timeframes[0].base_lookback = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_inverted_volatility_band() {
        let mut cfg = RuntimeConfig::default();
        cfg.timeframes[1].volatility_low = 0.05;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_duplicate_timeframe() {
        let mut cfg = RuntimeConfig::default();
        cfg.timeframes.push(TimeframeParams::default_for(Timeframe::H1));
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn correction_range_is_half_open() {
        let c = CandleCorrection {
            from: DateTime::from_timestamp_millis(1_000).unwrap(),
            until: DateTime::from_timestamp_millis(2_000).unwrap(),
            rule: CorrectionRule::LowFromClose,
        };
        assert!(!c.applies_to(999));
        assert!(c.applies_to(1_000));
        assert!(c.applies_to(1_999));
        assert!(!c.applies_to(2_000));
    }

    #[test]
    fn save_then_load_roundtrip() {
        let dir = std::env::temp_dir().join(format!("signal-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("signal_config.json");

        let mut cfg = RuntimeConfig::default();
        cfg.symbols = vec!["SOLUSDT".into()];
        cfg.save(&path).unwrap();

        let loaded = RuntimeConfig::load(&path).unwrap();
        assert_eq!(loaded.symbols, vec!["SOLUSDT"]);
        assert_eq!(loaded.timeframes, cfg.timeframes);

        std::fs::remove_dir_all(&dir).ok();
    }

    fn scratch_dir(name: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("signal-config-{name}-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn load_or_init_writes_defaults_once() {
        let dir = scratch_dir("init");
        let path = dir.join("signal_config.json");
        std::fs::remove_file(&path).ok();

        let mut cfg = RuntimeConfig::load_or_init(&path).unwrap();
        assert!(path.exists());
        assert_eq!(cfg.symbols, vec!["BTCUSDT"]);

        // Environment overrides stay in memory only.
        cfg.apply_overrides(|k| match k {
            "SIGNAL_SYMBOLS" => Some("DOGEUSDT".into()),
            "CHAT_ID" => Some("999".into()),
            _ => None,
        });
        let reloaded = RuntimeConfig::load_or_init(&path).unwrap();
        assert_eq!(reloaded.symbols, vec!["BTCUSDT"]);
        assert!(reloaded.telegram.chat_id.is_none());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn load_or_init_leaves_a_broken_file_alone() {
        let dir = scratch_dir("broken");
        let path = dir.join("signal_config.json");
        std::fs::write(&path, "{ \"symbols\": [").unwrap();

        assert!(RuntimeConfig::load_or_init(&path).is_err());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{ \"symbols\": [");

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn legacy_api_variable_sets_base_url() {
        let mut cfg = RuntimeConfig::default();
        cfg.apply_overrides(|k| (k == "API").then(|| "http://localhost:8080/api/v3/".to_string()));
        assert_eq!(cfg.binance.base_url, "http://localhost:8080/api/v3");

        cfg.apply_overrides(|k| match k {
            "API" => Some("http://ignored".into()),
            "BINANCE_API_URL" => Some("https://api.binance.us/api/v3".into()),
            _ => None,
        });
        assert_eq!(cfg.binance.base_url, "https://api.binance.us/api/v3");
    }
}
