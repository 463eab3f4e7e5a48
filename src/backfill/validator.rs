use chrono::{DateTime, Utc};

use crate::models::{Candle, CandlePeriod};
use crate::{Error, Result};

/// Sanity checks for candles replayed from history
pub struct CandleValidator {
    period: CandlePeriod,
    since: DateTime<Utc>,
    until: DateTime<Utc>,
}

impl CandleValidator {
    /// Accept candles of `period` starting in `[since, until)`
    pub fn new(period: CandlePeriod, since: DateTime<Utc>, until: DateTime<Utc>) -> Self {
        Self {
            period,
            since,
            until,
        }
    }

    pub fn validate(&self, candle: &Candle) -> Result<()> {
        self.validate_prices(candle)?;
        self.validate_timestamp(candle)?;
        self.validate_ohlc_relationship(candle)?;
        Ok(())
    }

    /// Prices must be positive; volume may be zero
    fn validate_prices(&self, candle: &Candle) -> Result<()> {
        if !(candle.close.is_finite() && candle.close > 0.0) {
            return Err(invalid(format!("Invalid close price: {}", candle.close)));
        }
        for (name, value) in [("open", candle.open), ("high", candle.high), ("low", candle.low)] {
            if let Some(v) = value {
                if !(v.is_finite() && v > 0.0) {
                    return Err(invalid(format!("Invalid {} price: {}", name, v)));
                }
            }
        }
        if let Some(volume) = candle.volume {
            if volume < 0.0 {
                return Err(invalid(format!("Invalid volume: {}", volume)));
            }
        }
        Ok(())
    }

    /// Timestamp must sit on a period boundary inside the window
    fn validate_timestamp(&self, candle: &Candle) -> Result<()> {
        if candle.timestamp < self.since || candle.timestamp >= self.until {
            return Err(invalid(format!(
                "Candle at {} outside window [{}, {})",
                candle.timestamp, self.since, self.until
            )));
        }
        if candle.timestamp.timestamp_millis() % (self.period.seconds() * 1_000) != 0 {
            return Err(invalid(format!(
                "Candle at {} not aligned to a {} boundary",
                candle.timestamp, self.period
            )));
        }
        Ok(())
    }

    fn validate_ohlc_relationship(&self, candle: &Candle) -> Result<()> {
        if let (Some(high), Some(low)) = (candle.high, candle.low) {
            if high < low {
                return Err(invalid(format!("High ({}) is less than low ({})", high, low)));
            }
            if candle.close > high || candle.close < low {
                return Err(invalid(format!(
                    "Close ({}) outside range [{}, {}]",
                    candle.close, low, high
                )));
            }
        }
        Ok(())
    }
}

fn invalid(message: String) -> Error {
    Error::Exchange(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn validator() -> CandleValidator {
        CandleValidator::new(
            CandlePeriod::FiveMinutes,
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 1, 1, 0, 0).unwrap(),
        )
    }

    fn at(minute: u32, second: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, minute, second).unwrap()
    }

    #[test]
    fn test_valid_candle() {
        let candle = Candle::new("BTCUSDT", at(5, 0), 100.0).with_ohlcv(99.0, 101.0, 98.0, 0.0);
        assert!(validator().validate(&candle).is_ok());
    }

    #[test]
    fn test_close_only_candle_is_valid() {
        assert!(validator().validate(&Candle::new("BTCUSDT", at(10, 0), 1.0)).is_ok());
    }

    #[test]
    fn test_rejects_non_positive_close() {
        assert!(validator().validate(&Candle::new("BTCUSDT", at(5, 0), 0.0)).is_err());
        assert!(validator()
            .validate(&Candle::new("BTCUSDT", at(5, 0), f64::NAN))
            .is_err());
    }

    #[test]
    fn test_rejects_unaligned_or_outside_window() {
        assert!(validator().validate(&Candle::new("BTCUSDT", at(5, 30), 1.0)).is_err());
        let late = Utc.with_ymd_and_hms(2024, 1, 1, 1, 0, 0).unwrap();
        assert!(validator().validate(&Candle::new("BTCUSDT", late, 1.0)).is_err());
    }

    #[test]
    fn test_rejects_inverted_range() {
        let candle = Candle::new("BTCUSDT", at(5, 0), 100.0).with_ohlcv(99.0, 98.0, 101.0, 1.0);
        assert!(validator().validate(&candle).is_err());
    }
}
