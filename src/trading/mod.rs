// Time-aligned trading loop
pub mod schedule;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;

use crate::accounting::{self, SharedBook};
use crate::backfill::{BackfillRunner, BackfillStats};
use crate::clock::Clock;
use crate::exchange::Exchange;
use crate::execution::{ExecutorConfig, MonitorState, OrderExecutor, TradeOutcome};
use crate::models::{Candle, CandlePeriod, TrendDirection};
use crate::notify::Notifier;
use crate::persistence::{CandleStore, ScanId};
use crate::shutdown::ShutdownSignal;
use crate::strategy::TrendStrategy;
use crate::Result;

/// Mutable state of one `TradingLoop::run`
#[derive(Debug, Clone)]
pub struct RunState {
    /// Start of the next window to fetch
    pub last_since: DateTime<Utc>,
    /// Most recent non-None signal, read once at shutdown
    pub last_trend: TrendDirection,
    pub first_candle: Option<Candle>,
    pub last_candle: Option<Candle>,
    pub iterations: u64,
    pub processed: u64,
    pub gap_windows: u64,
}

impl RunState {
    pub fn new(last_since: DateTime<Utc>) -> Self {
        Self {
            last_since,
            last_trend: TrendDirection::None,
            first_candle: None,
            last_candle: None,
            iterations: 0,
            processed: 0,
            gap_windows: 0,
        }
    }
}

/// What a finished run did
#[derive(Debug, Clone)]
pub struct RunReport {
    pub scan_id: ScanId,
    pub iterations: u64,
    pub processed: u64,
    /// Windows that returned zero or several candles
    pub gap_windows: u64,
    pub first_price: Option<f64>,
    pub last_price: Option<f64>,
    pub last_trend: TrendDirection,
    pub backfill: Option<BackfillStats>,
    /// Forced sell issued at shutdown
    pub liquidation: Option<TradeOutcome>,
    pub monitor: Option<MonitorState>,
    pub trading_count: u32,
    pub summary: String,
}

/// Drives one pair: fetch the just-closed candle, ask the strategy, trade,
/// persist, sleep to the next boundary. Repeats until shutdown.
pub struct TradingLoop {
    exchange: Arc<dyn Exchange>,
    strategy: Box<dyn TrendStrategy>,
    store: Arc<dyn CandleStore>,
    notifier: Arc<dyn Notifier>,
    book: SharedBook,
    config: ExecutorConfig,
    clock: Arc<dyn Clock>,
    settle_delay: Duration,
}

impl TradingLoop {
    pub fn new(
        exchange: Arc<dyn Exchange>,
        strategy: Box<dyn TrendStrategy>,
        store: Arc<dyn CandleStore>,
        notifier: Arc<dyn Notifier>,
        book: SharedBook,
        config: ExecutorConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            exchange,
            strategy,
            store,
            notifier,
            book,
            config,
            clock,
            settle_delay: Duration::ZERO,
        }
    }

    /// Extra wait after each boundary so the exchange has closed the candle
    pub fn with_settle_delay(mut self, settle_delay: Duration) -> Self {
        self.settle_delay = settle_delay;
        self
    }

    pub fn book(&self) -> &SharedBook {
        &self.book
    }

    /// Run until `shutdown` fires
    ///
    /// Exchange and storage errors end the run and are returned as is.
    pub async fn run(
        &mut self,
        pair: &str,
        period: CandlePeriod,
        mut shutdown: ShutdownSignal,
    ) -> Result<RunReport> {
        let scan_id = self.store.start_scan(pair, period).await?;
        let mut executor = OrderExecutor::new(
            self.exchange.clone(),
            self.notifier.clone(),
            self.book.clone(),
            self.config.clone(),
            pair,
            shutdown.clone(),
        );
        let mut state = RunState::new(schedule::initial_since(self.clock.now(), period));

        tracing::info!(
            "🚀 Trading {} on {} candles (strategy: {}, realtime: {}, scan: {})",
            pair,
            period,
            self.strategy.name(),
            self.config.realtime_trading,
            scan_id
        );

        let backfill = if self.strategy.lookback_candles() > 1 && !shutdown.is_triggered() {
            let mut runner = BackfillRunner::new(
                self.exchange.as_ref(),
                self.store.as_ref(),
                self.strategy.as_mut(),
                self.clock.as_ref(),
            );
            Some(runner.run(pair, period, scan_id).await?)
        } else {
            None
        };

        while !shutdown.is_triggered() {
            state.iterations += 1;
            let until = state.last_since + ChronoDuration::seconds(period.seconds());

            let candles = self
                .exchange
                .get_candles(pair, period, state.last_since, until)
                .await?;

            match <[Candle; 1]>::try_from(candles) {
                Ok([candle]) => {
                    self.process_candle(pair, candle, scan_id, backfill.as_ref(), &mut state, &mut executor)
                        .await?
                }
                Err(candles) => {
                    state.gap_windows += 1;
                    tracing::info!(
                        "No trades for {} in [{}, {}): got {} candles",
                        pair,
                        state.last_since,
                        until,
                        candles.len()
                    );
                }
            }

            if let Some(monitor) = executor.check_monitor().await? {
                tracing::debug!(?monitor, "Fill monitor finished");
            }

            let delay = schedule::delay_until_next_boundary(self.clock.now(), period, self.settle_delay);
            tracing::debug!("Sleeping {:?} until next {} boundary", delay, period);

            let cancelled = tokio::select! {
                _ = tokio::time::sleep(delay) => false,
                _ = shutdown.triggered() => true,
            };

            state.last_since = until;
            if cancelled {
                break;
            }
        }

        self.finish(scan_id, state, backfill, executor).await
    }

    async fn process_candle(
        &mut self,
        pair: &str,
        candle: Candle,
        scan_id: ScanId,
        backfill: Option<&BackfillStats>,
        state: &mut RunState,
        executor: &mut OrderExecutor,
    ) -> Result<()> {
        if state.first_candle.is_none() {
            accounting::lock(&self.book)?.set_first_price(candle.close);
            state.first_candle = Some(candle.clone());
        }

        // The newest backfilled candle may be the first live one; reuse its verdict
        let replayed = backfill
            .filter(|b| b.last_timestamp == Some(candle.timestamp))
            .map(|b| b.last_trend);
        let trend = match replayed {
            Some(trend) => trend,
            None => self.strategy.check_trend(pair, &candle).await?,
        };

        self.store.save_candle(pair, &candle, scan_id).await?;

        if trend != TrendDirection::None {
            state.last_trend = trend;
        }

        tracing::info!(
            pair = %pair,
            close = candle.close,
            ?trend,
            "📊 Candle {}",
            candle.timestamp
        );

        let outcome = match trend {
            TrendDirection::Long => Some(executor.buy(Some(&candle)).await?),
            TrendDirection::Short => Some(executor.sell(Some(&candle)).await?),
            TrendDirection::None => None,
        };
        if let Some(outcome) = outcome {
            tracing::debug!(?outcome, "Trade decision executed");
        }

        state.processed += 1;
        state.last_candle = Some(candle);
        Ok(())
    }

    async fn finish(
        &mut self,
        scan_id: ScanId,
        state: RunState,
        backfill: Option<BackfillStats>,
        mut executor: OrderExecutor,
    ) -> Result<RunReport> {
        tracing::info!("🛑 Shutdown requested, stopping trading loop");

        if let Some(candle) = &state.last_candle {
            accounting::lock(&self.book)?.set_last_price(candle.close);
        }

        let liquidation = if state.last_trend == TrendDirection::Long {
            tracing::info!("Last trend was Long, closing position before exit");
            Some(executor.sell(state.last_candle.as_ref()).await?)
        } else {
            None
        };

        let monitor = executor.shutdown().await?;

        let (first_price, last_price, trading_count, summary) = {
            let book = accounting::lock(&self.book)?;
            (
                book.first_price(),
                book.last_price(),
                book.trading_count(),
                book.trading_summary(),
            )
        };

        tracing::info!("📈 {}", summary);

        Ok(RunReport {
            scan_id,
            iterations: state.iterations,
            processed: state.processed,
            gap_windows: state.gap_windows,
            first_price,
            last_price,
            last_trend: state.last_trend,
            backfill,
            liquidation,
            monitor,
            trading_count,
            summary,
        })
    }
}
