use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::exchange::OrderId;
use crate::models::OrderSide;
use crate::{Error, Result};

/// Position book shared between the trading loop and the fill monitor
///
/// Never hold the guard across an `.await`.
pub type SharedBook = Arc<Mutex<PositionBook>>;

pub fn shared(book: PositionBook) -> SharedBook {
    Arc::new(Mutex::new(book))
}

pub fn lock(book: &SharedBook) -> Result<MutexGuard<'_, PositionBook>> {
    book.lock()
        .map_err(|e| Error::Accounting(format!("position book poisoned: {e}")))
}

/// The single order currently outstanding on the exchange
#[derive(Debug, Clone, PartialEq)]
pub struct OpenOrder {
    pub id: OrderId,
    pub side: OrderSide,
    pub quantity: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PositionState {
    pub open_order: Option<OpenOrder>,
    /// Price recorded when the current position was entered
    pub buy_price: Option<f64>,
    pub buy_time: Option<DateTime<Utc>>,
    /// Fee-adjusted fill rate, set once the buy is confirmed
    pub effective_rate: Option<f64>,
    pub trading_count: u32,
    pub realtime_trading: bool,
}

impl PositionState {
    pub fn has_open_order(&self) -> bool {
        self.open_order.is_some()
    }

    pub fn open_order_id(&self) -> Option<&str> {
        self.open_order.as_ref().map(|o| o.id.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProfitReport {
    pub profit_pct: f64,
    pub profit_amount: f64,
    pub trading_minutes: i64,
}

/// Balance and position bookkeeping for one pair
#[derive(Debug, Clone)]
pub struct PositionBook {
    state: PositionState,
    initial_balance: f64,
    /// Quote currency available
    balance: f64,
    /// Base currency held
    holding: f64,
    realized_pnl: f64,
    first_price: Option<f64>,
    last_price: Option<f64>,
}

impl PositionBook {
    pub fn new(initial_balance: f64, realtime_trading: bool) -> Self {
        Self {
            state: PositionState {
                realtime_trading,
                ..PositionState::default()
            },
            initial_balance,
            balance: initial_balance,
            holding: 0.0,
            realized_pnl: 0.0,
            first_price: None,
            last_price: None,
        }
    }

    pub fn state(&self) -> &PositionState {
        &self.state
    }

    pub fn has_open_order(&self) -> bool {
        self.state.has_open_order()
    }

    /// True when base currency is held
    pub fn is_long(&self) -> bool {
        self.holding > 0.0
    }

    pub fn balance(&self) -> f64 {
        self.balance
    }

    pub fn holding(&self) -> f64 {
        self.holding
    }

    pub fn realized_pnl(&self) -> f64 {
        self.realized_pnl
    }

    pub fn trading_count(&self) -> u32 {
        self.state.trading_count
    }

    pub fn first_price(&self) -> Option<f64> {
        self.first_price
    }

    pub fn last_price(&self) -> Option<f64> {
        self.last_price
    }

    pub fn set_first_price(&mut self, price: f64) {
        self.first_price = Some(price);
    }

    pub fn set_last_price(&mut self, price: f64) {
        self.last_price = Some(price);
    }

    /// Quantity affordable with `stake_fraction` of the balance at `price`
    pub fn buy_quantity(&self, price: f64, stake_fraction: f64) -> f64 {
        if price <= 0.0 {
            return 0.0;
        }
        self.balance * stake_fraction / price
    }

    pub fn record_buy(&mut self, price: f64, time: DateTime<Utc>) {
        self.state.buy_price = Some(price);
        self.state.buy_time = Some(time);
        self.state.effective_rate = None;
    }

    pub fn mark_order_open(&mut self, id: OrderId, side: OrderSide, quantity: f64) {
        self.state.open_order = Some(OpenOrder { id, side, quantity });
    }

    pub fn increment_trading_count(&mut self) {
        self.state.trading_count += 1;
    }

    /// Book an executed order and clear the open order, if any
    ///
    /// `rate` is the effective per-unit rate after fees.
    pub fn apply_fill(&mut self, side: OrderSide, rate: f64, quantity: f64) {
        match side {
            OrderSide::Buy => {
                self.balance -= rate * quantity;
                self.holding += quantity;
                self.state.effective_rate = Some(rate);
            }
            OrderSide::Sell => {
                let quantity = quantity.min(self.holding);
                let cost = self.cost_basis().unwrap_or(rate);
                self.balance += rate * quantity;
                self.holding -= quantity;
                self.realized_pnl += (rate - cost) * quantity;

                if self.holding <= f64::EPSILON {
                    self.holding = 0.0;
                    self.state.buy_price = None;
                    self.state.buy_time = None;
                    self.state.effective_rate = None;
                }
            }
        }
        self.state.open_order = None;
    }

    /// Drop the open order after a cancellation
    ///
    /// A cancelled buy never filled, so its recorded entry is discarded too.
    pub fn abandon_open_order(&mut self) -> Option<OpenOrder> {
        let order = self.state.open_order.take()?;
        if order.side == OrderSide::Buy && !self.is_long() {
            self.state.buy_price = None;
            self.state.buy_time = None;
            self.state.effective_rate = None;
        }
        Some(order)
    }

    fn cost_basis(&self) -> Option<f64> {
        self.state.effective_rate.or(self.state.buy_price)
    }

    /// Realized result of selling the current holding at `sell_price`
    ///
    /// `None` when no entry was recorded.
    pub fn get_profit(&self, sell_price: f64, sell_time: DateTime<Utc>) -> Option<ProfitReport> {
        let cost = self.cost_basis().filter(|c| *c > 0.0)?;
        let trading_minutes = self
            .state
            .buy_time
            .map(|t| (sell_time - t).num_minutes())
            .unwrap_or(0);

        Some(ProfitReport {
            profit_pct: (sell_price - cost) / cost * 100.0,
            profit_amount: (sell_price - cost) * self.holding,
            trading_minutes,
        })
    }

    /// Equity marked at the last known price
    pub fn equity(&self) -> f64 {
        let mark = self
            .last_price
            .or(self.state.buy_price)
            .unwrap_or_default();
        self.balance + self.holding * mark
    }

    pub fn trading_summary(&self) -> String {
        let equity = self.equity();
        let total_return = if self.initial_balance > 0.0 {
            (equity - self.initial_balance) / self.initial_balance * 100.0
        } else {
            0.0
        };

        let mut summary = format!(
            "Trades: {} | Balance: {:.2} | Holding: {:.8} | Equity: {:.2} | Realized P&L: {:.2} | Return: {:+.2}%",
            self.state.trading_count,
            self.balance,
            self.holding,
            equity,
            self.realized_pnl,
            total_return
        );

        if let (Some(first), Some(last)) = (self.first_price, self.last_price) {
            if first > 0.0 {
                let buy_and_hold = (last - first) / first * 100.0;
                summary.push_str(&format!(
                    " | Buy & hold: {:+.2}% ({:.8} -> {:.8})",
                    buy_and_hold, first, last
                ));
            }
        }

        summary
    }
}
