// Order execution and fill monitoring
pub mod executor;
pub mod monitor;

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::Settings;

pub use executor::{OrderExecutor, TradeOutcome};
pub use monitor::{MonitorState, OrderFillMonitor};

/// Where buy/sell prices come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PricingMode {
    /// Close of the candle that triggered the signal
    CandleClose,
    /// Live best ask for buys, best bid for sells
    Ticker,
}

#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub realtime_trading: bool,
    pub pricing: PricingMode,
    pub subject_template: String,
    pub stake_fraction: f64,
    pub poll_interval: Duration,
}

impl ExecutorConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            realtime_trading: settings.realtime_trading,
            pricing: settings.pricing_mode(),
            subject_template: settings.subject_template.clone(),
            stake_fraction: settings.stake_fraction,
            poll_interval: settings.poll_interval(),
        }
    }

    /// Simulated fills at candle close, full stake
    pub fn simulated() -> Self {
        Self {
            realtime_trading: false,
            pricing: PricingMode::CandleClose,
            subject_template: "{pair} {action}".to_string(),
            stake_fraction: 1.0,
            poll_interval: Duration::from_secs(20),
        }
    }

    pub fn subject(&self, pair: &str, action: &str) -> String {
        render_subject(&self.subject_template, pair, action)
    }
}

/// Fill `{pair}` and `{action}` placeholders
pub fn render_subject(template: &str, pair: &str, action: &str) -> String {
    template.replace("{pair}", pair).replace("{action}", action)
}
