#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use trendbot::accounting::{self, PositionBook, SharedBook};
use trendbot::clock::TokioClock;
use trendbot::exchange::{Exchange, FeePolicy, MarketData, OrderId};
use trendbot::execution::{ExecutorConfig, PricingMode};
use trendbot::notify::Notifier;
use trendbot::persistence::MemoryCandleStore;
use trendbot::strategy::TrendStrategy;
use trendbot::{Candle, CandlePeriod, Error, OrderDetail, OrderSide, Result, Ticker, TradingLoop, TrendDirection};

pub const PAIR: &str = "BTCUSDT";
pub const PERIOD: CandlePeriod = CandlePeriod::FiveMinutes;

/// 10:07:30, so the first live window is [10:00, 10:05)
pub fn anchor() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 10, 7, 30).unwrap()
}

pub fn at(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, hour, minute, 0).unwrap()
}

/// Virtual seconds from the anchor until just after the fetch of iteration
/// `n` (1-based), while the loop sleeps
pub fn after_iteration(n: u64) -> Duration {
    match n {
        0 => Duration::ZERO,
        1 => Duration::from_secs(10),
        _ => Duration::from_secs(150 + 300 * (n - 2) + 10),
    }
}

// ============================================================================
// Exchange
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct PlacedOrder {
    pub id: OrderId,
    pub side: OrderSide,
    pub price: f64,
    pub quantity: f64,
}

#[derive(Default)]
struct ExchangeLog {
    candles: Vec<Candle>,
    requests: Vec<(DateTime<Utc>, DateTime<Utc>)>,
    orders: Vec<PlacedOrder>,
    cancels: Vec<OrderId>,
    polls: HashMap<OrderId, u32>,
}

/// Exchange fake serving scripted candles and deterministic fills
pub struct ScriptedExchange {
    log: Mutex<ExchangeLog>,
    ticker: Ticker,
    fee: f64,
    fee_policy: FeePolicy,
    /// Pending answers before a fill; `u32::MAX` never fills
    fill_after_polls: u32,
    fail_candles_from: Option<DateTime<Utc>>,
    fail_get_order: bool,
}

impl ScriptedExchange {
    pub fn new() -> Self {
        Self {
            log: Mutex::new(ExchangeLog::default()),
            ticker: Ticker {
                best_ask: 101.0,
                best_bid: 99.0,
            },
            fee: 0.0,
            fee_policy: FeePolicy::NetRate,
            fill_after_polls: 0,
            fail_candles_from: None,
            fail_get_order: false,
        }
    }

    pub fn with_candle(self, ts: DateTime<Utc>, close: f64) -> Self {
        self.log.lock().unwrap().candles.push(Candle::new(PAIR, ts, close));
        self
    }

    pub fn with_fills(mut self, fill_after_polls: u32, fee: f64, fee_policy: FeePolicy) -> Self {
        self.fill_after_polls = fill_after_polls;
        self.fee = fee;
        self.fee_policy = fee_policy;
        self
    }

    pub fn never_fill(mut self) -> Self {
        self.fill_after_polls = u32::MAX;
        self
    }

    pub fn failing_candles_from(mut self, since: DateTime<Utc>) -> Self {
        self.fail_candles_from = Some(since);
        self
    }

    pub fn failing_order_status(mut self) -> Self {
        self.fail_get_order = true;
        self
    }

    pub fn requests(&self) -> Vec<(DateTime<Utc>, DateTime<Utc>)> {
        self.log.lock().unwrap().requests.clone()
    }

    pub fn orders(&self) -> Vec<PlacedOrder> {
        self.log.lock().unwrap().orders.clone()
    }

    pub fn cancels(&self) -> Vec<OrderId> {
        self.log.lock().unwrap().cancels.clone()
    }
}

#[async_trait]
impl MarketData for ScriptedExchange {
    async fn get_candles(
        &self,
        _pair: &str,
        _period: CandlePeriod,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<Candle>> {
        if self.fail_candles_from.is_some_and(|from| since >= from) {
            return Err(Error::Exchange("scripted candle failure".to_string()));
        }

        let mut log = self.log.lock().unwrap();
        log.requests.push((since, until));
        let mut candles: Vec<Candle> = log
            .candles
            .iter()
            .filter(|c| c.timestamp >= since && c.timestamp < until)
            .cloned()
            .collect();
        candles.sort_by_key(|c| c.timestamp);
        Ok(candles)
    }

    async fn get_ticker(&self, _pair: &str) -> Result<Ticker> {
        Ok(self.ticker)
    }
}

#[async_trait]
impl Exchange for ScriptedExchange {
    async fn create_order(
        &self,
        side: OrderSide,
        _pair: &str,
        price: f64,
        quantity: f64,
    ) -> Result<OrderId> {
        let mut log = self.log.lock().unwrap();
        let id = format!("order-{}", log.orders.len() + 1);
        log.orders.push(PlacedOrder {
            id: id.clone(),
            side,
            price,
            quantity,
        });
        Ok(id)
    }

    async fn cancel_order(&self, _pair: &str, order_id: &str) -> Result<()> {
        self.log.lock().unwrap().cancels.push(order_id.to_string());
        Ok(())
    }

    async fn get_order(&self, _pair: &str, order_id: &str) -> Result<Option<OrderDetail>> {
        if self.fail_get_order {
            return Err(Error::Exchange("scripted order status failure".to_string()));
        }

        let mut log = self.log.lock().unwrap();
        let price = log
            .orders
            .iter()
            .find(|o| o.id == order_id)
            .map(|o| o.price)
            .ok_or_else(|| Error::Exchange(format!("unknown order {order_id}")))?;

        let polls = log.polls.entry(order_id.to_string()).or_insert(0);
        if *polls < self.fill_after_polls {
            *polls += 1;
            return Ok(None);
        }

        Ok(Some(OrderDetail {
            rate: price,
            fee: self.fee,
            quantity: None,
        }))
    }

    fn fee_policy(&self) -> FeePolicy {
        self.fee_policy
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

// ============================================================================
// Strategy and notifier
// ============================================================================

/// Returns a fixed verdict per candle timestamp, None otherwise
pub struct ScriptedStrategy {
    verdicts: HashMap<DateTime<Utc>, TrendDirection>,
    lookback: usize,
    pub seen: Arc<Mutex<Vec<DateTime<Utc>>>>,
}

impl ScriptedStrategy {
    pub fn new(lookback: usize) -> Self {
        Self {
            verdicts: HashMap::new(),
            lookback,
            seen: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn on(mut self, ts: DateTime<Utc>, trend: TrendDirection) -> Self {
        self.verdicts.insert(ts, trend);
        self
    }
}

#[async_trait]
impl TrendStrategy for ScriptedStrategy {
    async fn check_trend(&mut self, _pair: &str, candle: &Candle) -> Result<TrendDirection> {
        self.seen.lock().unwrap().push(candle.timestamp);
        Ok(self
            .verdicts
            .get(&candle.timestamp)
            .copied()
            .unwrap_or_default())
    }

    fn lookback_candles(&self) -> usize {
        self.lookback
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(String, String)>>,
}

impl RecordingNotifier {
    pub fn subjects(&self) -> Vec<String> {
        self.sent.lock().unwrap().iter().map(|(s, _)| s.clone()).collect()
    }

    pub fn bodies(&self) -> Vec<String> {
        self.sent.lock().unwrap().iter().map(|(_, b)| b.clone()).collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_notification(&self, subject: &str, body: &str) -> Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push((subject.to_string(), body.to_string()));
        Ok(())
    }
}

// ============================================================================
// Wiring
// ============================================================================

pub struct Fixture {
    pub exchange: Arc<ScriptedExchange>,
    pub store: Arc<MemoryCandleStore>,
    pub notifier: Arc<RecordingNotifier>,
    pub book: SharedBook,
    pub trading_loop: TradingLoop,
}

pub fn executor_config(realtime: bool) -> ExecutorConfig {
    ExecutorConfig {
        realtime_trading: realtime,
        pricing: PricingMode::CandleClose,
        subject_template: "{pair} {action}".to_string(),
        stake_fraction: 1.0,
        poll_interval: Duration::from_secs(20),
    }
}

/// Build a loop over the fakes; call inside a paused runtime
pub fn fixture(exchange: ScriptedExchange, strategy: ScriptedStrategy, config: ExecutorConfig) -> Fixture {
    fixture_at(anchor(), exchange, strategy, config)
}

/// Same as `fixture`, with the loop's clock starting at `start`
pub fn fixture_at(
    start: DateTime<Utc>,
    exchange: ScriptedExchange,
    strategy: ScriptedStrategy,
    config: ExecutorConfig,
) -> Fixture {
    let exchange = Arc::new(exchange);
    let store = Arc::new(MemoryCandleStore::new());
    let notifier = Arc::new(RecordingNotifier::default());
    let book = accounting::shared(PositionBook::new(1_000.0, config.realtime_trading));

    let trading_loop = TradingLoop::new(
        exchange.clone(),
        Box::new(strategy),
        store.clone(),
        notifier.clone(),
        book.clone(),
        config,
        Arc::new(TokioClock::starting_at(start)),
    );

    Fixture {
        exchange,
        store,
        notifier,
        book,
        trading_loop,
    }
}

pub fn open_order(book: &SharedBook) -> bool {
    accounting::lock(book).unwrap().has_open_order()
}
