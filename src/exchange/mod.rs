// Exchange and market data capabilities
pub mod binance;
pub mod paper;
pub mod synthetic;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Candle, CandlePeriod, OrderDetail, OrderSide, Ticker};
use crate::Result;

pub use binance::BinanceClient;
pub use paper::PaperExchange;
pub use synthetic::SyntheticMarket;

pub type OrderId = String;

/// Read-only market data source
#[async_trait]
pub trait MarketData: Send + Sync {
    /// Candles whose period starts in `[since, until)`, oldest first
    async fn get_candles(
        &self,
        pair: &str,
        period: CandlePeriod,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<Candle>>;

    async fn get_ticker(&self, pair: &str) -> Result<Ticker>;
}

/// Order-capable exchange connection
#[async_trait]
pub trait Exchange: MarketData {
    async fn create_order(
        &self,
        side: OrderSide,
        pair: &str,
        price: f64,
        quantity: f64,
    ) -> Result<OrderId>;

    async fn cancel_order(&self, pair: &str, order_id: &str) -> Result<()>;

    /// `Ok(None)` while the order is still pending
    async fn get_order(&self, pair: &str, order_id: &str) -> Result<Option<OrderDetail>>;

    /// How this venue reports fees on fills
    fn fee_policy(&self) -> FeePolicy;

    fn name(&self) -> &str;
}

/// Fee-adjustment rule for reconciling the effective fill rate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeePolicy {
    /// Reported rate is gross; the per-unit fee is subtracted
    DeductFee,
    /// Reported rate is already the realized rate
    NetRate,
}

impl FeePolicy {
    pub fn adjust_rate(self, nominal_rate: f64, fee: f64) -> f64 {
        match self {
            FeePolicy::DeductFee => nominal_rate - fee,
            FeePolicy::NetRate => nominal_rate,
        }
    }
}
