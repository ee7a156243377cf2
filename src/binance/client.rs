// =============================================================================
// Binance REST API Client - public market data
// =============================================================================
//
// Only unsigned endpoints are used (klines, ticker price).  The optional API
// key is sent as `X-MBX-APIKEY` and never logged.  Every response feeds the
// request-weight tracker; requests that would blow the per-minute budget are
// refused before they are sent.
// =============================================================================

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderValue};
use tracing::{debug, instrument};

use crate::binance::rate_limit::RateLimitTracker;
use crate::pipeline::CandleProvider;
use crate::runtime_config::BinanceConfig;
use crate::types::{Candle, Timeframe};

/// Request weight of `GET /klines` for limits up to 100.
const KLINES_WEIGHT: u32 = 2;
/// Request weight of `GET /ticker/price` for a single symbol.
const TICKER_PRICE_WEIGHT: u32 = 2;

/// Binance REST client for candles and spot prices.
#[derive(Clone)]
pub struct BinanceClient {
    base_url: String,
    client: reqwest::Client,
    rate_limit: Arc<RateLimitTracker>,
}

impl BinanceClient {
    // -------------------------------------------------------------------------
    // Construction
    // -------------------------------------------------------------------------

    /// Build a client from explicit connection settings. `rate_limit` is
    /// shared with the status API.
    pub fn new(config: &BinanceConfig, rate_limit: Arc<RateLimitTracker>) -> Result<Self> {
        let mut default_headers = HeaderMap::new();
        if !config.api_key.is_empty() {
            let val = HeaderValue::from_str(&config.api_key)
                .context("BINANCE_API_KEY is not a valid header value")?;
            default_headers.insert("x-mbx-apikey", val);
        }

        let client = reqwest::Client::builder()
            .default_headers(default_headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("failed to build reqwest client")?;

        let base_url = config.base_url.trim_end_matches('/').to_string();
        debug!(base_url = %base_url, "BinanceClient initialised");

        Ok(Self {
            base_url,
            client,
            rate_limit,
        })
    }

    // -------------------------------------------------------------------------
    // Public market data
    // -------------------------------------------------------------------------

    /// GET /klines - up to `limit` candles, oldest first.
    ///
    /// Array indices used: [0] openTime, [1] open, [2] high, [3] low, [4] close.
    #[instrument(skip(self), name = "binance::get_klines")]
    pub async fn get_klines(&self, symbol: &str, interval: &str, limit: u32) -> Result<Vec<Candle>> {
        let limit = limit.to_string();
        let body = self
            .get_json(
                "/klines",
                &[("symbol", symbol), ("interval", interval), ("limit", &limit)],
                KLINES_WEIGHT,
            )
            .await?;

        let candles = parse_klines(&body)?;
        debug!(symbol, interval, count = candles.len(), "klines fetched");
        Ok(candles)
    }

    /// GET /ticker/price - last traded price.
    #[instrument(skip(self), name = "binance::get_price")]
    pub async fn get_price(&self, symbol: &str) -> Result<f64> {
        let body = self
            .get_json("/ticker/price", &[("symbol", symbol)], TICKER_PRICE_WEIGHT)
            .await?;
        let price = parse_str_f64(&body["price"]).context("ticker response has no usable price")?;
        debug!(symbol, price, "price fetched");
        Ok(price)
    }

    // -------------------------------------------------------------------------
    // Internal helpers
    // -------------------------------------------------------------------------

    async fn get_json(&self, path: &str, query: &[(&str, &str)], weight: u32) -> Result<serde_json::Value> {
        if !self.rate_limit.can_send_request(weight) {
            anyhow::bail!("Binance request weight budget exhausted; refusing GET {path}");
        }

        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .client
            .get(&url)
            .query(query)
            .send()
            .await
            .with_context(|| format!("GET {path} request failed"))?;

        self.rate_limit.update_from_headers(resp.headers());

        let status = resp.status();
        let body: serde_json::Value = resp
            .json()
            .await
            .with_context(|| format!("failed to parse {path} response"))?;

        if !status.is_success() {
            anyhow::bail!("Binance GET {} returned {}: {}", path, status, body);
        }

        Ok(body)
    }
}

impl CandleProvider for BinanceClient {
    async fn get_candles(&self, symbol: &str, timeframe: Timeframe, limit: u32) -> Result<Vec<Candle>> {
        self.get_klines(symbol, timeframe.as_str(), limit).await
    }

    async fn get_last_candle(&self, symbol: &str, timeframe: Timeframe) -> Result<Candle> {
        // With limit=2 the first row is the last closed candle, the second
        // the one still forming.
        let candles = self.get_klines(symbol, timeframe.as_str(), 2).await?;
        last_closed_candle(&candles)
            .with_context(|| format!("no closed {timeframe} candle for {symbol}"))
    }

    async fn get_current_price(&self, symbol: &str) -> Result<f64> {
        self.get_price(symbol).await
    }
}

impl std::fmt::Debug for BinanceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BinanceClient")
            .field("base_url", &self.base_url)
            .field("rate_limit", &self.rate_limit)
            .finish()
    }
}

/// Parse a klines response. One bad row fails the whole response, so the
/// series keeps one candle per period.
pub(crate) fn parse_klines(body: &serde_json::Value) -> Result<Vec<Candle>> {
    let raw = body.as_array().context("klines response is not an array")?;
    raw.iter()
        .enumerate()
        .map(|(i, entry)| parse_kline_row(entry).with_context(|| format!("malformed kline row {i}")))
        .collect()
}

/// The older of the two newest rows of a `limit=2` response.
pub(crate) fn last_closed_candle(candles: &[Candle]) -> Result<Candle> {
    match candles {
        [.., closed, _forming] => Ok(*closed),
        _ => anyhow::bail!("expected 2 klines, got {}", candles.len()),
    }
}

/// Parse one kline row `[openTime, "open", "high", "low", "close", ...]`.
pub(crate) fn parse_kline_row(entry: &serde_json::Value) -> Result<Candle> {
    let arr = entry.as_array().context("kline entry is not an array")?;
    if arr.len() < 5 {
        anyhow::bail!("kline entry has {} elements, expected at least 5", arr.len());
    }

    Ok(Candle {
        time: arr[0].as_i64().context("kline open time is not an integer")?,
        open: parse_str_f64(&arr[1]).context("kline open")?,
        high: parse_str_f64(&arr[2]).context("kline high")?,
        low: parse_str_f64(&arr[3]).context("kline low")?,
        close: parse_str_f64(&arr[4]).context("kline close")?,
    })
}

/// Parse a JSON value that may be either a string or a number into `f64`.
fn parse_str_f64(val: &serde_json::Value) -> Result<f64> {
    if let Some(s) = val.as_str() {
        s.parse::<f64>()
            .with_context(|| format!("failed to parse '{s}' as f64"))
    } else if let Some(n) = val.as_f64() {
        Ok(n)
    } else {
        anyhow::bail!("expected string or number, got: {val}")
    }
}
