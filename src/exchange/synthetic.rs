use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;

use super::MarketData;
use crate::clock::{Clock, SystemClock};
use crate::models::{Candle, CandlePeriod, Ticker};
use crate::{Error, Result};

/// Deterministic offline market for dry runs
///
/// Prices follow a sine cycle with seeded noise, so the same timestamp always
/// yields the same candle regardless of fetch order. Only periods already
/// closed by `clock` are served.
#[derive(Clone)]
pub struct SyntheticMarket {
    seed: u64,
    base_price: f64,
    /// Relative swing of the cycle (0.05 = ±5%)
    amplitude: f64,
    cycle_minutes: i64,
    /// Relative noise per sample (0.002 = ±0.2%)
    noise: f64,
    spread: f64,
    base_volume: f64,
    clock: Arc<dyn Clock>,
}

impl Default for SyntheticMarket {
    fn default() -> Self {
        Self::new(42)
    }
}

impl SyntheticMarket {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            base_price: 150.0,
            amplitude: 0.05,
            cycle_minutes: 6 * 60,
            noise: 0.002,
            spread: 0.0005,
            base_volume: 1_000.0,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_base_price(mut self, base_price: f64) -> Self {
        self.base_price = base_price;
        self
    }

    pub fn with_cycle(mut self, amplitude: f64, cycle_minutes: i64) -> Self {
        self.amplitude = amplitude;
        self.cycle_minutes = cycle_minutes.max(1);
        self
    }

    /// Share the trading loop's clock for the closed-period cutoff and ticker
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    fn rng_at(&self, unix_secs: i64) -> StdRng {
        StdRng::seed_from_u64(self.seed ^ (unix_secs as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15))
    }

    /// Price at an instant
    pub fn price_at(&self, unix_secs: i64) -> f64 {
        let cycle_secs = (self.cycle_minutes * 60) as f64;
        let phase = (unix_secs as f64 / cycle_secs) * std::f64::consts::TAU;
        let noise = self.rng_at(unix_secs).gen_range(-self.noise..=self.noise);
        self.base_price * (1.0 + self.amplitude * phase.sin()) * (1.0 + noise)
    }

    fn candle_at(&self, pair: &str, start: i64, period_secs: i64) -> Result<Candle> {
        let timestamp = Utc
            .timestamp_opt(start, 0)
            .single()
            .ok_or_else(|| Error::Exchange(format!("invalid synthetic timestamp {start}")))?;

        let open = self.price_at(start);
        let close = self.price_at(start + period_secs);
        let mut rng = self.rng_at(start + 1);
        let wick = 1.0 + rng.gen_range(0.0..=self.noise);
        let volume = self.base_volume * rng.gen_range(0.5..1.5);

        Ok(Candle::new(pair, timestamp, close).with_ohlcv(
            open,
            open.max(close) * wick,
            open.min(close) / wick,
            volume,
        ))
    }
}

#[async_trait]
impl MarketData for SyntheticMarket {
    async fn get_candles(
        &self,
        pair: &str,
        period: CandlePeriod,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<Candle>> {
        let period_secs = period.seconds();
        let since = since.timestamp();
        let until = until.timestamp();

        // First period start at or after `since`
        let mut start = since.div_euclid(period_secs) * period_secs;
        if start < since {
            start += period_secs;
        }

        let mut candles = Vec::new();
        // Only closed periods exist
        let now = self.clock.now().timestamp();
        while start < until && start + period_secs <= now {
            candles.push(self.candle_at(pair, start, period_secs)?);
            start += period_secs;
        }

        Ok(candles)
    }

    async fn get_ticker(&self, _pair: &str) -> Result<Ticker> {
        let mid = self.price_at(self.clock.now().timestamp());
        Ok(Ticker {
            best_ask: mid * (1.0 + self.spread),
            best_bid: mid * (1.0 - self.spread),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[tokio::test]
    async fn test_candles_are_aligned_and_deterministic() {
        let market = SyntheticMarket::new(7);
        let since = ts(1_704_067_200);
        let until = ts(1_704_067_200 + 3_600);

        let first = market
            .get_candles("SYNTH", CandlePeriod::FiveMinutes, since, until)
            .await
            .unwrap();
        let second = market
            .get_candles("SYNTH", CandlePeriod::FiveMinutes, since, until)
            .await
            .unwrap();

        assert_eq!(first.len(), 12);
        assert_eq!(first, second);
        assert!(first.iter().all(|c| c.timestamp.timestamp() % 300 == 0));
    }

    #[tokio::test]
    async fn test_unaligned_since_skips_partial_period() {
        let market = SyntheticMarket::default();
        let candles = market
            .get_candles(
                "SYNTH",
                CandlePeriod::FiveMinutes,
                ts(1_704_067_201),
                ts(1_704_067_800),
            )
            .await
            .unwrap();

        assert_eq!(candles.len(), 1);
        assert_eq!(candles[0].timestamp, ts(1_704_067_500));
    }

    #[tokio::test]
    async fn test_future_periods_are_not_served() {
        let market = SyntheticMarket::default();
        let now = Utc::now();
        let candles = market
            .get_candles(
                "SYNTH",
                CandlePeriod::OneMinute,
                now,
                now + chrono::Duration::hours(1),
            )
            .await
            .unwrap();

        assert!(candles.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_period_cutoff_follows_injected_clock() {
        use crate::clock::TokioClock;

        let start = Utc.with_ymd_and_hms(2024, 1, 1, 10, 7, 30).unwrap();
        let market = SyntheticMarket::default().with_clock(Arc::new(TokioClock::starting_at(start)));
        let since = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap();
        let until = Utc.with_ymd_and_hms(2024, 1, 1, 10, 10, 0).unwrap();

        let candles = market
            .get_candles("SYNTH", CandlePeriod::FiveMinutes, since, until)
            .await
            .unwrap();
        assert_eq!(candles.len(), 1);

        tokio::time::sleep(std::time::Duration::from_secs(150)).await;
        let candles = market
            .get_candles("SYNTH", CandlePeriod::FiveMinutes, since, until)
            .await
            .unwrap();
        assert_eq!(candles.len(), 2);
    }

    #[tokio::test]
    async fn test_ticker_brackets_mid_price() {
        let ticker = SyntheticMarket::default().get_ticker("SYNTH").await.unwrap();
        assert!(ticker.best_ask > ticker.best_bid);
    }

    #[test]
    fn test_price_stays_within_cycle_band() {
        let market = SyntheticMarket::new(1).with_base_price(100.0).with_cycle(0.1, 60);
        for t in (0..86_400).step_by(600) {
            let price = market.price_at(1_704_067_200 + t);
            assert!(price > 89.0 && price < 111.0, "price {price} out of band");
        }
    }
}
