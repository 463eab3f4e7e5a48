use async_trait::async_trait;

use super::TrendStrategy;
use crate::indicators::RelativeStrength;
use crate::models::{Candle, TrendDirection};
use crate::{Error, Result};

/// Oversold/overbought RSI detector
///
/// Oversold reads as Long (expect a rebound), overbought as Short.
#[derive(Debug, Clone)]
pub struct RsiThreshold {
    rsi: RelativeStrength,
    oversold: f64,
    overbought: f64,
}

impl RsiThreshold {
    pub fn new(period: usize, oversold: f64, overbought: f64) -> Result<Self> {
        if period == 0 || !(0.0..=100.0).contains(&oversold) || oversold >= overbought {
            return Err(Error::Strategy(format!(
                "invalid RSI thresholds: period={period}, oversold={oversold}, overbought={overbought}"
            )));
        }

        Ok(Self {
            rsi: RelativeStrength::new(period),
            oversold,
            overbought,
        })
    }
}

#[async_trait]
impl TrendStrategy for RsiThreshold {
    async fn check_trend(&mut self, pair: &str, candle: &Candle) -> Result<TrendDirection> {
        let Some(rsi) = self.rsi.update(candle.close) else {
            return Ok(TrendDirection::None);
        };

        tracing::debug!(pair = %pair, rsi = format!("{:.2}", rsi), "RSI evaluated");

        if rsi < self.oversold {
            Ok(TrendDirection::Long)
        } else if rsi > self.overbought {
            Ok(TrendDirection::Short)
        } else {
            Ok(TrendDirection::None)
        }
    }

    fn lookback_candles(&self) -> usize {
        self.rsi.warmup()
    }

    fn name(&self) -> &str {
        "RsiThreshold"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    async fn last_trend(strategy: &mut RsiThreshold, closes: &[f64]) -> TrendDirection {
        let mut trend = TrendDirection::None;
        for &close in closes {
            let candle = Candle::new("ETHUSDT", Utc::now(), close);
            trend = strategy.check_trend("ETHUSDT", &candle).await.unwrap();
        }
        trend
    }

    #[tokio::test]
    async fn test_oversold_is_long() {
        let mut strategy = RsiThreshold::new(3, 30.0, 70.0).unwrap();
        let trend = last_trend(&mut strategy, &[10.0, 9.0, 8.0, 7.0]).await;
        assert_eq!(trend, TrendDirection::Long);
    }

    #[tokio::test]
    async fn test_overbought_is_short() {
        let mut strategy = RsiThreshold::new(3, 30.0, 70.0).unwrap();
        let trend = last_trend(&mut strategy, &[7.0, 8.0, 9.0, 10.0]).await;
        assert_eq!(trend, TrendDirection::Short);
    }

    #[tokio::test]
    async fn test_warmup_returns_none() {
        let mut strategy = RsiThreshold::new(14, 30.0, 70.0).unwrap();
        let trend = last_trend(&mut strategy, &[1.0, 0.5, 0.25]).await;
        assert_eq!(trend, TrendDirection::None);
    }

    #[test]
    fn test_rejects_inverted_thresholds() {
        assert!(RsiThreshold::new(14, 80.0, 20.0).is_err());
    }
}
