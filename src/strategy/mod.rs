// Trend detection strategies
pub mod ma_cross;
pub mod rsi_threshold;

use async_trait::async_trait;
use serde::Deserialize;

use crate::models::{Candle, TrendDirection};
use crate::Result;

pub use ma_cross::MovingAverageCross;
pub use rsi_threshold::RsiThreshold;

/// Pluggable trend detector fed one closed candle at a time
///
/// Implementations may keep internal state across calls, which is why the
/// trading loop replays `lookback_candles()` historical candles first.
#[async_trait]
pub trait TrendStrategy: Send {
    async fn check_trend(&mut self, pair: &str, candle: &Candle) -> Result<TrendDirection>;

    /// Number of candles needed before signals are meaningful
    fn lookback_candles(&self) -> usize;

    fn name(&self) -> &str;
}

/// Strategy selection as it appears in configuration
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StrategySettings {
    MaCross {
        #[serde(default = "default_short")]
        short_period: usize,
        #[serde(default = "default_long")]
        long_period: usize,
    },
    Rsi {
        #[serde(default = "default_rsi_period")]
        period: usize,
        #[serde(default = "default_oversold")]
        oversold: f64,
        #[serde(default = "default_overbought")]
        overbought: f64,
    },
}

fn default_short() -> usize {
    10
}

fn default_long() -> usize {
    20
}

fn default_rsi_period() -> usize {
    14
}

fn default_oversold() -> f64 {
    30.0
}

fn default_overbought() -> f64 {
    70.0
}

impl Default for StrategySettings {
    fn default() -> Self {
        StrategySettings::MaCross {
            short_period: default_short(),
            long_period: default_long(),
        }
    }
}

impl StrategySettings {
    pub fn build(&self) -> Result<Box<dyn TrendStrategy>> {
        match *self {
            StrategySettings::MaCross {
                short_period,
                long_period,
            } => Ok(Box::new(MovingAverageCross::new(short_period, long_period)?)),
            StrategySettings::Rsi {
                period,
                oversold,
                overbought,
            } => Ok(Box::new(RsiThreshold::new(period, oversold, overbought)?)),
        }
    }
}
