use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use super::{Exchange, FeePolicy, MarketData, OrderId};
use crate::models::{Candle, CandlePeriod, OrderDetail, OrderSide, Ticker};
use crate::{Error, Result};

#[derive(Debug, Clone)]
struct PaperOrder {
    side: OrderSide,
    price: f64,
    quantity: f64,
    polls_left: u32,
}

/// Simulated order venue on top of any market data source
///
/// Orders fill at their limit price after `fill_after_polls` status checks.
/// Only pending orders are kept: an order is removed once its fill has been
/// reported or it is cancelled, and later queries for it fail as unknown.
/// Fees are reported per unit, so the venue uses `FeePolicy::DeductFee`.
pub struct PaperExchange {
    market: Arc<dyn MarketData>,
    fee_rate: f64,
    fill_after_polls: u32,
    orders: Mutex<HashMap<OrderId, PaperOrder>>,
}

impl PaperExchange {
    pub fn new(market: Arc<dyn MarketData>, fee_rate: f64) -> Self {
        Self {
            market,
            fee_rate,
            fill_after_polls: 0,
            orders: Mutex::new(HashMap::new()),
        }
    }

    /// Number of `get_order` calls answered with "pending" before the fill
    pub fn with_fill_delay(mut self, polls: u32) -> Self {
        self.fill_after_polls = polls;
        self
    }

    /// Orders still waiting for a fill
    pub fn pending_orders(&self) -> Result<usize> {
        Ok(self.lock_orders()?.len())
    }

    fn lock_orders(&self) -> Result<std::sync::MutexGuard<'_, HashMap<OrderId, PaperOrder>>> {
        self.orders
            .lock()
            .map_err(|e| Error::Exchange(format!("paper order book poisoned: {e}")))
    }
}

#[async_trait]
impl MarketData for PaperExchange {
    async fn get_candles(
        &self,
        pair: &str,
        period: CandlePeriod,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<Candle>> {
        self.market.get_candles(pair, period, since, until).await
    }

    async fn get_ticker(&self, pair: &str) -> Result<Ticker> {
        self.market.get_ticker(pair).await
    }
}

#[async_trait]
impl Exchange for PaperExchange {
    async fn create_order(
        &self,
        side: OrderSide,
        pair: &str,
        price: f64,
        quantity: f64,
    ) -> Result<OrderId> {
        if price <= 0.0 || quantity <= 0.0 {
            return Err(Error::Exchange(format!(
                "invalid paper order: price={price}, quantity={quantity}"
            )));
        }

        let id = Uuid::new_v4().to_string();
        let order = PaperOrder {
            side,
            price,
            quantity,
            polls_left: self.fill_after_polls,
        };
        self.lock_orders()?.insert(id.clone(), order);

        tracing::info!(
            pair = %pair,
            %side,
            price,
            quantity,
            order_id = %id,
            "Paper order placed"
        );

        Ok(id)
    }

    async fn cancel_order(&self, pair: &str, order_id: &str) -> Result<()> {
        self.lock_orders()?
            .remove(order_id)
            .ok_or_else(|| Error::Exchange(format!("unknown order {order_id}")))?;

        tracing::info!(pair = %pair, order_id = %order_id, "Paper order cancelled");
        Ok(())
    }

    async fn get_order(&self, _pair: &str, order_id: &str) -> Result<Option<OrderDetail>> {
        let mut orders = self.lock_orders()?;
        let order = orders
            .get_mut(order_id)
            .ok_or_else(|| Error::Exchange(format!("unknown order {order_id}")))?;

        if order.polls_left > 0 {
            order.polls_left -= 1;
            return Ok(None);
        }

        let detail = OrderDetail {
            rate: order.price,
            fee: order.price * self.fee_rate,
            quantity: Some(order.quantity),
        };
        tracing::debug!(order_id = %order_id, side = %order.side, "Paper order filled");
        orders.remove(order_id);
        Ok(Some(detail))
    }

    fn fee_policy(&self) -> FeePolicy {
        FeePolicy::DeductFee
    }

    fn name(&self) -> &str {
        "paper"
    }
}
