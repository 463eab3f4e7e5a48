use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use governor::{Quota, RateLimiter};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use super::MarketData;
use crate::models::{Candle, CandlePeriod, Ticker};
use crate::{Error, Result};

pub const BINANCE_API_BASE: &str = "https://api.binance.com";
const DEFAULT_RATE_LIMIT_RPM: u32 = 600;
const MAX_RETRIES: u32 = 3;
const KLINE_LIMIT: i64 = 1000;

type BinanceRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Binance public REST market data (klines + book ticker)
///
/// Cloneable; clones share the rate limiter.
#[derive(Clone)]
pub struct BinanceClient {
    client: Client,
    base_url: String,
    rate_limiter: Arc<BinanceRateLimiter>,
    backoff_base: Duration,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BookTicker {
    bid_price: String,
    ask_price: String,
}

impl BinanceClient {
    pub fn new() -> Result<Self> {
        Self::with_base_url(BINANCE_API_BASE, DEFAULT_RATE_LIMIT_RPM)
    }

    pub fn with_base_url(base_url: impl Into<String>, requests_per_minute: u32) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;

        let rpm = NonZeroU32::new(requests_per_minute)
            .ok_or_else(|| Error::Config("rate limit must be positive".to_string()))?;
        let rate_limiter = Arc::new(RateLimiter::direct(Quota::per_minute(rpm)));

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            rate_limiter,
            backoff_base: Duration::from_secs(1),
        })
    }

    /// Base delay for exponential backoff between retries
    pub fn with_backoff(mut self, backoff_base: Duration) -> Self {
        self.backoff_base = backoff_base;
        self
    }

    /// Rate-limited GET with retry on 429 and 5xx
    async fn make_request(&self, path: &str, query: &[(&str, String)]) -> Result<reqwest::Response> {
        let url = format!("{}{}", self.base_url, path);

        for attempt in 1..=MAX_RETRIES {
            self.rate_limiter.until_ready().await;

            match self.client.get(&url).query(query).send().await {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        return Ok(response);
                    }

                    if (status.as_u16() == 429 || status.is_server_error()) && attempt < MAX_RETRIES {
                        let backoff = self.backoff_base * 2u32.pow(attempt - 1);
                        tracing::warn!(
                            "Binance returned {}, backing off for {:?} (attempt {}/{})",
                            status,
                            backoff,
                            attempt,
                            MAX_RETRIES
                        );
                        tokio::time::sleep(backoff).await;
                        continue;
                    }

                    let error_text = response
                        .text()
                        .await
                        .unwrap_or_else(|_| "Unknown error".to_string());
                    return Err(Error::Exchange(format!(
                        "Binance API error ({}): {}",
                        status, error_text
                    )));
                }
                Err(e) if attempt < MAX_RETRIES => {
                    let backoff = self.backoff_base * 2u32.pow(attempt - 1);
                    tracing::warn!(
                        "Network error: {}, retrying in {:?} (attempt {}/{})",
                        e,
                        backoff,
                        attempt,
                        MAX_RETRIES
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(Error::Exchange(format!(
            "Binance request failed after {} retries",
            MAX_RETRIES
        )))
    }
}

/// Parse one kline row: `[open_time, open, high, low, close, volume, ...]`
fn parse_kline(pair: &str, row: &[Value]) -> Result<Candle> {
    let open_time = row
        .first()
        .and_then(Value::as_i64)
        .ok_or_else(|| Error::Exchange("kline missing open time".to_string()))?;
    let timestamp = Utc
        .timestamp_millis_opt(open_time)
        .single()
        .ok_or_else(|| Error::Exchange(format!("invalid kline open time {open_time}")))?;

    let field = |idx: usize, name: &str| -> Result<f64> {
        row.get(idx)
            .and_then(Value::as_str)
            .and_then(|s| s.parse::<f64>().ok())
            .ok_or_else(|| Error::Exchange(format!("kline field '{name}' missing or malformed")))
    };

    Ok(Candle::new(pair, timestamp, field(4, "close")?).with_ohlcv(
        field(1, "open")?,
        field(2, "high")?,
        field(3, "low")?,
        field(5, "volume")?,
    ))
}

fn parse_price(raw: &str, name: &str) -> Result<f64> {
    raw.parse::<f64>()
        .map_err(|_| Error::Exchange(format!("invalid {name}: '{raw}'")))
}

#[async_trait]
impl MarketData for BinanceClient {
    async fn get_candles(
        &self,
        pair: &str,
        period: CandlePeriod,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<Candle>> {
        let since_ms = since.timestamp_millis();
        let until_ms = until.timestamp_millis();
        if until_ms <= since_ms {
            return Ok(Vec::new());
        }

        // endTime is inclusive on Binance
        let query = [
            ("symbol", pair.to_string()),
            ("interval", period.interval_label().to_string()),
            ("startTime", since_ms.to_string()),
            ("endTime", (until_ms - 1).to_string()),
            ("limit", KLINE_LIMIT.to_string()),
        ];

        let rows: Vec<Vec<Value>> = self.make_request("/api/v3/klines", &query).await?.json().await?;

        let mut candles = Vec::with_capacity(rows.len());
        for row in &rows {
            let candle = parse_kline(pair, row)?;
            let ts = candle.timestamp.timestamp_millis();
            if ts >= since_ms && ts < until_ms {
                candles.push(candle);
            }
        }

        tracing::debug!(
            pair = %pair,
            period = %period,
            count = candles.len(),
            "Fetched klines from Binance"
        );

        Ok(candles)
    }

    async fn get_ticker(&self, pair: &str) -> Result<Ticker> {
        let query = [("symbol", pair.to_string())];
        let ticker: BookTicker = self
            .make_request("/api/v3/ticker/bookTicker", &query)
            .await?
            .json()
            .await?;

        Ok(Ticker {
            best_ask: parse_price(&ticker.ask_price, "ask price")?,
            best_bid: parse_price(&ticker.bid_price, "bid price")?,
        })
    }
}
