pub mod validator;

use chrono::{DateTime, Utc};

use crate::clock::Clock;
use crate::exchange::MarketData;
use crate::models::{CandlePeriod, TrendDirection};
use crate::persistence::{CandleStore, ScanId};
use crate::strategy::TrendStrategy;
use crate::trading::schedule;
use crate::Result;

pub use validator::CandleValidator;

/// Statistics from a backfill pass
#[derive(Debug, Clone, PartialEq)]
pub struct BackfillStats {
    pub since: DateTime<Utc>,
    pub until: DateTime<Utc>,
    pub fetched: usize,
    pub replayed: usize,
    pub validation_failures: usize,
    /// Start of the newest replayed candle
    pub last_timestamp: Option<DateTime<Utc>>,
    /// Strategy verdict on the newest replayed candle
    pub last_trend: TrendDirection,
}

/// Replays recent history through the strategy before live trading
///
/// Candles are persisted under the run's scan id. No orders are placed: the
/// runner has no access to the executor.
pub struct BackfillRunner<'a, M: MarketData + ?Sized> {
    market: &'a M,
    store: &'a dyn CandleStore,
    strategy: &'a mut dyn TrendStrategy,
    clock: &'a dyn Clock,
}

impl<'a, M: MarketData + ?Sized> BackfillRunner<'a, M> {
    pub fn new(
        market: &'a M,
        store: &'a dyn CandleStore,
        strategy: &'a mut dyn TrendStrategy,
        clock: &'a dyn Clock,
    ) -> Self {
        Self {
            market,
            store,
            strategy,
            clock,
        }
    }

    pub async fn run(
        &mut self,
        pair: &str,
        period: CandlePeriod,
        scan_id: ScanId,
    ) -> Result<BackfillStats> {
        let lookback = self.strategy.lookback_candles();
        let (since, until) = schedule::backfill_window(self.clock.now(), period, lookback);

        tracing::info!(
            pair = %pair,
            %period,
            lookback,
            strategy = self.strategy.name(),
            "Backfilling {} → {}",
            since,
            until
        );

        let candles = self.market.get_candles(pair, period, since, until).await?;
        let validator = CandleValidator::new(period, since, until);

        let mut stats = BackfillStats {
            since,
            until,
            fetched: candles.len(),
            replayed: 0,
            validation_failures: 0,
            last_timestamp: None,
            last_trend: TrendDirection::None,
        };

        for candle in &candles {
            if let Err(e) = validator.validate(candle) {
                tracing::warn!("Skipping invalid candle during backfill: {}", e);
                stats.validation_failures += 1;
                continue;
            }

            stats.last_trend = self.strategy.check_trend(pair, candle).await?;
            self.store.save_candle(pair, candle, scan_id).await?;
            stats.replayed += 1;
            stats.last_timestamp = Some(candle.timestamp);
        }

        if stats.replayed < lookback {
            tracing::warn!(
                "⚠️  Backfill replayed {}/{} candles for {}, strategy may still be warming up",
                stats.replayed,
                lookback,
                pair
            );
        } else {
            tracing::info!(
                "✓ Backfill replayed {} candles for {} (last trend: {:?})",
                stats.replayed,
                pair,
                stats.last_trend
            );
        }

        Ok(stats)
    }
}
