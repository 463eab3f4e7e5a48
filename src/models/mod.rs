use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// OHLCV candle for one fixed period of a single pair
///
/// Only `close` is guaranteed; the other fields depend on the source.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Candle {
    pub pair: String,
    /// Start of the period this candle covers
    pub timestamp: DateTime<Utc>,
    pub close: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub open: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub high: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub low: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<f64>,
}

impl Candle {
    /// Close-only candle
    pub fn new(pair: impl Into<String>, timestamp: DateTime<Utc>, close: f64) -> Self {
        Self {
            pair: pair.into(),
            timestamp,
            close,
            open: None,
            high: None,
            low: None,
            volume: None,
        }
    }

    pub fn with_ohlcv(mut self, open: f64, high: f64, low: f64, volume: f64) -> Self {
        self.open = Some(open);
        self.high = Some(high);
        self.low = Some(low);
        self.volume = Some(volume);
        self
    }
}

/// Supported candle durations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum CandlePeriod {
    OneMinute,
    ThreeMinutes,
    FiveMinutes,
    FifteenMinutes,
    ThirtyMinutes,
    OneHour,
    TwoHours,
    FourHours,
    SixHours,
    EightHours,
    TwelveHours,
    OneDay,
}

impl CandlePeriod {
    pub const ALL: [CandlePeriod; 12] = [
        CandlePeriod::OneMinute,
        CandlePeriod::ThreeMinutes,
        CandlePeriod::FiveMinutes,
        CandlePeriod::FifteenMinutes,
        CandlePeriod::ThirtyMinutes,
        CandlePeriod::OneHour,
        CandlePeriod::TwoHours,
        CandlePeriod::FourHours,
        CandlePeriod::SixHours,
        CandlePeriod::EightHours,
        CandlePeriod::TwelveHours,
        CandlePeriod::OneDay,
    ];

    pub fn minutes(self) -> u32 {
        match self {
            CandlePeriod::OneMinute => 1,
            CandlePeriod::ThreeMinutes => 3,
            CandlePeriod::FiveMinutes => 5,
            CandlePeriod::FifteenMinutes => 15,
            CandlePeriod::ThirtyMinutes => 30,
            CandlePeriod::OneHour => 60,
            CandlePeriod::TwoHours => 120,
            CandlePeriod::FourHours => 240,
            CandlePeriod::SixHours => 360,
            CandlePeriod::EightHours => 480,
            CandlePeriod::TwelveHours => 720,
            CandlePeriod::OneDay => 1440,
        }
    }

    /// Fetch window size and polling cadence
    pub fn seconds(self) -> i64 {
        self.minutes() as i64 * 60
    }

    /// Kline interval label used by most exchange REST APIs
    pub fn interval_label(self) -> &'static str {
        match self {
            CandlePeriod::OneMinute => "1m",
            CandlePeriod::ThreeMinutes => "3m",
            CandlePeriod::FiveMinutes => "5m",
            CandlePeriod::FifteenMinutes => "15m",
            CandlePeriod::ThirtyMinutes => "30m",
            CandlePeriod::OneHour => "1h",
            CandlePeriod::TwoHours => "2h",
            CandlePeriod::FourHours => "4h",
            CandlePeriod::SixHours => "6h",
            CandlePeriod::EightHours => "8h",
            CandlePeriod::TwelveHours => "12h",
            CandlePeriod::OneDay => "1d",
        }
    }
}

impl TryFrom<u32> for CandlePeriod {
    type Error = Error;

    fn try_from(minutes: u32) -> Result<Self> {
        CandlePeriod::ALL
            .into_iter()
            .find(|p| p.minutes() == minutes)
            .ok_or_else(|| Error::Config(format!("unsupported candle period: {minutes} minutes")))
    }
}

impl From<CandlePeriod> for u32 {
    fn from(period: CandlePeriod) -> Self {
        period.minutes()
    }
}

impl std::fmt::Display for CandlePeriod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.interval_label())
    }
}

/// Strategy verdict for one candle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TrendDirection {
    /// No action
    #[default]
    None,
    /// Enter or stay long
    Long,
    /// Exit the long position
    Short,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "BUY"),
            OrderSide::Sell => write!(f, "SELL"),
        }
    }
}

/// Best bid/ask snapshot
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Ticker {
    pub best_ask: f64,
    pub best_bid: f64,
}

/// Execution report for a filled order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderDetail {
    /// Rate as reported by the exchange
    pub rate: f64,
    pub fee: f64,
    #[serde(default)]
    pub quantity: Option<f64>,
}
