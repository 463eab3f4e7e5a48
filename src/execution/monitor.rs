use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::accounting::{self, OpenOrder, SharedBook};
use crate::exchange::Exchange;
use crate::models::{OrderDetail, OrderSide};
use crate::notify::{self, Notifier};
use crate::shutdown::ShutdownSignal;
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Watching,
    Filled,
    /// Shutdown requested or the order was dropped from the book
    Aborted,
}

/// Watches one submitted order until it fills or the run is cancelled
///
/// Polls `get_order` every `poll_interval`; `None` means still pending and
/// is never treated as an error. On a fill the effective rate is
/// reconciled through the exchange's fee policy, the book is updated and the
/// open-order flag cleared. On cancellation the flag is left as is.
pub struct OrderFillMonitor {
    exchange: Arc<dyn Exchange>,
    notifier: Arc<dyn Notifier>,
    book: SharedBook,
    pair: String,
    order: OpenOrder,
    subject: String,
    poll_interval: Duration,
    shutdown: ShutdownSignal,
    state: MonitorState,
}

impl OrderFillMonitor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        exchange: Arc<dyn Exchange>,
        notifier: Arc<dyn Notifier>,
        book: SharedBook,
        pair: impl Into<String>,
        order: OpenOrder,
        subject: impl Into<String>,
        poll_interval: Duration,
        shutdown: ShutdownSignal,
    ) -> Self {
        Self {
            exchange,
            notifier,
            book,
            pair: pair.into(),
            order,
            subject: subject.into(),
            poll_interval,
            shutdown,
            state: MonitorState::Watching,
        }
    }

    pub fn state(&self) -> MonitorState {
        self.state
    }

    pub fn spawn(self) -> JoinHandle<Result<MonitorState>> {
        tokio::spawn(self.run())
    }

    pub async fn run(mut self) -> Result<MonitorState> {
        tracing::info!(
            pair = %self.pair,
            order_id = %self.order.id,
            side = %self.order.side,
            "👀 Watching order for fill"
        );

        while self.state == MonitorState::Watching {
            if !self.still_open()? {
                tracing::debug!(order_id = %self.order.id, "Order no longer open, monitor exiting");
                self.state = MonitorState::Aborted;
                break;
            }

            if let Some(detail) = self.exchange.get_order(&self.pair, &self.order.id).await? {
                self.reconcile(detail).await?;
                self.state = MonitorState::Filled;
                break;
            }

            tracing::debug!(order_id = %self.order.id, "Order still pending");

            let cancelled = self.shutdown.is_triggered()
                || tokio::select! {
                    _ = tokio::time::sleep(self.poll_interval) => false,
                    _ = self.shutdown.triggered() => true,
                };

            if cancelled {
                tracing::info!(order_id = %self.order.id, "Shutdown requested, order left open");
                self.state = MonitorState::Aborted;
            }
        }

        Ok(self.state)
    }

    fn still_open(&self) -> Result<bool> {
        let book = accounting::lock(&self.book)?;
        Ok(book.state().open_order_id() == Some(self.order.id.as_str()))
    }

    async fn reconcile(&self, detail: OrderDetail) -> Result<()> {
        let effective_rate = match self.order.side {
            OrderSide::Buy => self.exchange.fee_policy().adjust_rate(detail.rate, detail.fee),
            OrderSide::Sell => detail.rate,
        };
        let quantity = detail.quantity.unwrap_or(self.order.quantity);

        accounting::lock(&self.book)?.apply_fill(self.order.side, effective_rate, quantity);

        tracing::info!(
            pair = %self.pair,
            order_id = %self.order.id,
            side = %self.order.side,
            rate = detail.rate,
            fee = detail.fee,
            effective_rate,
            "✓ Order filled"
        );

        let body = format!(
            "{} order {} for {} filled | rate: {:.8} | fee: {:.8} | effective rate: {:.8} | quantity: {:.8}",
            self.order.side, self.order.id, self.pair, detail.rate, detail.fee, effective_rate, quantity
        );
        notify::deliver(self.notifier.as_ref(), &self.subject, &body).await;

        Ok(())
    }
}
