use async_trait::async_trait;

use super::TrendStrategy;
use crate::indicators::SimpleMovingAverage;
use crate::models::{Candle, TrendDirection};
use crate::{Error, Result};

/// Moving average crossover trend detector
///
/// - Short SMA above long SMA: Long
/// - Short SMA below long SMA: Short
/// - Equal, or not enough history yet: None
#[derive(Debug, Clone)]
pub struct MovingAverageCross {
    short: SimpleMovingAverage,
    long: SimpleMovingAverage,
}

impl MovingAverageCross {
    pub fn new(short_period: usize, long_period: usize) -> Result<Self> {
        if short_period == 0 || short_period >= long_period {
            return Err(Error::Strategy(format!(
                "short period ({short_period}) must be positive and below long period ({long_period})"
            )));
        }

        Ok(Self {
            short: SimpleMovingAverage::new(short_period),
            long: SimpleMovingAverage::new(long_period),
        })
    }
}

#[async_trait]
impl TrendStrategy for MovingAverageCross {
    async fn check_trend(&mut self, pair: &str, candle: &Candle) -> Result<TrendDirection> {
        let short = self.short.update(candle.close);
        let long = self.long.update(candle.close);

        let (Some(short), Some(long)) = (short, long) else {
            return Ok(TrendDirection::None);
        };

        let trend = if short > long {
            TrendDirection::Long
        } else if short < long {
            TrendDirection::Short
        } else {
            TrendDirection::None
        };

        tracing::debug!(
            pair = %pair,
            short_sma = short,
            long_sma = long,
            ?trend,
            "MA cross evaluated"
        );

        Ok(trend)
    }

    fn lookback_candles(&self) -> usize {
        self.long.period()
    }

    fn name(&self) -> &str {
        "MovingAverageCross"
    }
}
