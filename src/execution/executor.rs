use std::sync::Arc;
use tokio::task::JoinHandle;

use super::{ExecutorConfig, MonitorState, OrderFillMonitor, PricingMode};
use crate::accounting::{self, OpenOrder, ProfitReport, SharedBook};
use crate::exchange::{Exchange, OrderId};
use crate::models::{Candle, OrderSide};
use crate::notify::{self, Notifier};
use crate::shutdown::ShutdownSignal;
use crate::{Error, Result};

/// Result of one buy or sell request
#[derive(Debug, Clone, PartialEq)]
pub enum TradeOutcome {
    NoCandle,
    /// Buy refused: an order is outstanding or the position is already held
    PositionOpen,
    /// Sell refused: nothing held
    NothingToSell,
    InsufficientBalance,
    Bought {
        price: f64,
        quantity: f64,
        order_id: Option<OrderId>,
    },
    Sold {
        price: f64,
        quantity: f64,
        order_id: Option<OrderId>,
        profit: Option<ProfitReport>,
    },
    /// Sell found a dangling order and cancelled it instead of trading
    StaleOrderCancelled { order_id: OrderId },
}

/// Issues buy/sell actions for one pair and owns the fill monitor task
///
/// At most one order is outstanding at a time. The monitor's handle is
/// reaped on every call and joined by `shutdown`, so its failures surface
/// here instead of being lost.
pub struct OrderExecutor {
    exchange: Arc<dyn Exchange>,
    notifier: Arc<dyn Notifier>,
    book: SharedBook,
    config: ExecutorConfig,
    pair: String,
    shutdown: ShutdownSignal,
    monitor: Option<JoinHandle<Result<MonitorState>>>,
}

impl OrderExecutor {
    pub fn new(
        exchange: Arc<dyn Exchange>,
        notifier: Arc<dyn Notifier>,
        book: SharedBook,
        config: ExecutorConfig,
        pair: impl Into<String>,
        shutdown: ShutdownSignal,
    ) -> Self {
        Self {
            exchange,
            notifier,
            book,
            config,
            pair: pair.into(),
            shutdown,
            monitor: None,
        }
    }

    pub fn book(&self) -> &SharedBook {
        &self.book
    }

    /// `Some(Watching)` while a monitor task is running
    pub fn monitor_state(&self) -> Option<MonitorState> {
        self.monitor
            .as_ref()
            .filter(|handle| !handle.is_finished())
            .map(|_| MonitorState::Watching)
    }

    // ========================================================================
    // Buy / Sell
    // ========================================================================

    pub async fn buy(&mut self, candle: Option<&Candle>) -> Result<TradeOutcome> {
        let Some(candle) = candle else {
            return Ok(TradeOutcome::NoCandle);
        };
        self.check_monitor().await?;

        let position_open = {
            let book = accounting::lock(&self.book)?;
            book.has_open_order() || book.is_long()
        };
        if position_open {
            tracing::debug!(pair = %self.pair, "Buy skipped, position already open");
            return Ok(TradeOutcome::PositionOpen);
        }

        let price = self.quote(candle, OrderSide::Buy).await?;
        let quantity = accounting::lock(&self.book)?.buy_quantity(price, self.config.stake_fraction);
        if !(quantity > 0.0) {
            tracing::warn!(pair = %self.pair, price, "✗ Buy skipped, no balance available");
            return Ok(TradeOutcome::InsufficientBalance);
        }

        let order_id = if self.config.realtime_trading {
            Some(
                self.exchange
                    .create_order(OrderSide::Buy, &self.pair, price, quantity)
                    .await?,
            )
        } else {
            None
        };

        {
            let mut book = accounting::lock(&self.book)?;
            book.record_buy(price, candle.timestamp);
            match &order_id {
                Some(id) => book.mark_order_open(id.clone(), OrderSide::Buy, quantity),
                None => book.apply_fill(OrderSide::Buy, price, quantity),
            }
        }

        if let Some(id) = &order_id {
            self.start_monitor(OpenOrder {
                id: id.clone(),
                side: OrderSide::Buy,
                quantity,
            });
        }

        tracing::info!(
            pair = %self.pair,
            price,
            quantity,
            order_id = order_id.as_deref().unwrap_or("simulated"),
            "🟢 BUY"
        );

        let body = format!(
            "Bought {} at {:.8} | close: {:.8} | rate: {:.8} | quantity: {:.8} | order: {}",
            self.pair,
            price,
            candle.close,
            price,
            quantity,
            order_id.as_deref().unwrap_or("simulated")
        );
        notify::deliver(
            self.notifier.as_ref(),
            &self.config.subject(&self.pair, "BUY"),
            &body,
        )
        .await;

        Ok(TradeOutcome::Bought {
            price,
            quantity,
            order_id,
        })
    }

    pub async fn sell(&mut self, candle: Option<&Candle>) -> Result<TradeOutcome> {
        let Some(candle) = candle else {
            return Ok(TradeOutcome::NoCandle);
        };
        self.check_monitor().await?;

        let has_open_order = accounting::lock(&self.book)?.has_open_order();
        if has_open_order {
            self.stop_monitor().await?;

            // The fill may have landed while the monitor was stopping
            let stale = accounting::lock(&self.book)?.state().open_order.clone();
            if let Some(order) = stale {
                return self.cancel_stale(order).await;
            }
        }

        let quantity = {
            let book = accounting::lock(&self.book)?;
            if !book.is_long() {
                None
            } else {
                Some(book.holding())
            }
        };
        let Some(quantity) = quantity else {
            tracing::info!(pair = %self.pair, "Sell skipped, nothing held");
            return Ok(TradeOutcome::NothingToSell);
        };

        let price = self.quote(candle, OrderSide::Sell).await?;

        let order_id = if self.config.realtime_trading {
            Some(
                self.exchange
                    .create_order(OrderSide::Sell, &self.pair, price, quantity)
                    .await?,
            )
        } else {
            None
        };

        let (profit, summary) = {
            let mut book = accounting::lock(&self.book)?;
            book.increment_trading_count();
            let profit = book.get_profit(price, candle.timestamp);
            match &order_id {
                Some(id) => book.mark_order_open(id.clone(), OrderSide::Sell, quantity),
                None => book.apply_fill(OrderSide::Sell, price, quantity),
            }
            (profit, book.trading_summary())
        };

        if let Some(id) = &order_id {
            self.start_monitor(OpenOrder {
                id: id.clone(),
                side: OrderSide::Sell,
                quantity,
            });
        }

        let profit_text = match profit {
            Some(p) => format!(
                "profit: {:+.2}% ({:+.8}) over {} min",
                p.profit_pct, p.profit_amount, p.trading_minutes
            ),
            None => "profit: n/a".to_string(),
        };

        tracing::info!(
            pair = %self.pair,
            price,
            quantity,
            order_id = order_id.as_deref().unwrap_or("simulated"),
            "🔴 SELL | {}",
            profit_text
        );

        let body = format!(
            "Sold {} at {:.8} | quantity: {:.8} | order: {} | {}\n{}",
            self.pair,
            price,
            quantity,
            order_id.as_deref().unwrap_or("simulated"),
            profit_text,
            summary
        );
        notify::deliver(
            self.notifier.as_ref(),
            &self.config.subject(&self.pair, "SELL"),
            &body,
        )
        .await;

        Ok(TradeOutcome::Sold {
            price,
            quantity,
            order_id,
            profit,
        })
    }

    async fn cancel_stale(&mut self, order: OpenOrder) -> Result<TradeOutcome> {
        tracing::warn!(
            pair = %self.pair,
            order_id = %order.id,
            side = %order.side,
            "Order still open on sell signal, cancelling"
        );

        self.exchange.cancel_order(&self.pair, &order.id).await?;
        accounting::lock(&self.book)?.abandon_open_order();

        tracing::info!(pair = %self.pair, order_id = %order.id, "✓ Stale order cancelled");
        Ok(TradeOutcome::StaleOrderCancelled { order_id: order.id })
    }

    async fn quote(&self, candle: &Candle, side: OrderSide) -> Result<f64> {
        match self.config.pricing {
            PricingMode::CandleClose => Ok(candle.close),
            PricingMode::Ticker => {
                let ticker = self.exchange.get_ticker(&self.pair).await?;
                Ok(match side {
                    OrderSide::Buy => ticker.best_ask,
                    OrderSide::Sell => ticker.best_bid,
                })
            }
        }
    }

    // ========================================================================
    // Monitor ownership
    // ========================================================================

    fn start_monitor(&mut self, order: OpenOrder) {
        if let Some(previous) = self.monitor.take() {
            tracing::warn!("Replacing a running fill monitor");
            previous.abort();
        }

        let subject = self.config.subject(&self.pair, "FILLED");
        let monitor = OrderFillMonitor::new(
            self.exchange.clone(),
            self.notifier.clone(),
            self.book.clone(),
            self.pair.clone(),
            order,
            subject,
            self.config.poll_interval,
            self.shutdown.clone(),
        );
        self.monitor = Some(monitor.spawn());
    }

    /// Reap a finished monitor, surfacing its error
    pub async fn check_monitor(&mut self) -> Result<Option<MonitorState>> {
        let finished = self.monitor.as_ref().is_some_and(|h| h.is_finished());
        if !finished {
            return Ok(None);
        }
        match self.monitor.take() {
            Some(handle) => join_monitor(handle).await.map(Some),
            None => Ok(None),
        }
    }

    async fn stop_monitor(&mut self) -> Result<Option<MonitorState>> {
        let Some(handle) = self.monitor.take() else {
            return Ok(None);
        };
        handle.abort();
        join_monitor(handle).await.map(Some)
    }

    /// Wait for the monitor to finish; call after the shutdown signal fired
    pub async fn shutdown(&mut self) -> Result<Option<MonitorState>> {
        match self.monitor.take() {
            Some(handle) => join_monitor(handle).await.map(Some),
            None => Ok(None),
        }
    }
}

impl Drop for OrderExecutor {
    fn drop(&mut self) {
        if let Some(handle) = self.monitor.take() {
            handle.abort();
        }
    }
}

async fn join_monitor(handle: JoinHandle<Result<MonitorState>>) -> Result<MonitorState> {
    match handle.await {
        Ok(result) => result,
        Err(e) if e.is_cancelled() => Ok(MonitorState::Aborted),
        Err(e) => Err(Error::Monitor(format!("monitor task panicked: {e}"))),
    }
}
