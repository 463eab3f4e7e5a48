use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::execution::PricingMode;
use crate::exchange::binance::BINANCE_API_BASE;
use crate::models::CandlePeriod;
use crate::strategy::StrategySettings;
use crate::{Error, Result};

pub const DEFAULT_CONFIG_FILE: &str = "config/trendbot";
pub const ENV_PREFIX: &str = "TRENDBOT";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StorageSettings {
    Memory,
    Redis { url: String },
    Postgres { url: String },
}

impl Default for StorageSettings {
    fn default() -> Self {
        StorageSettings::Memory
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MarketSettings {
    Binance {
        #[serde(default = "default_binance_url")]
        base_url: String,
        #[serde(default = "default_requests_per_minute")]
        requests_per_minute: u32,
    },
    Synthetic {
        #[serde(default = "default_seed")]
        seed: u64,
    },
}

impl Default for MarketSettings {
    fn default() -> Self {
        MarketSettings::Binance {
            base_url: default_binance_url(),
            requests_per_minute: default_requests_per_minute(),
        }
    }
}

fn default_binance_url() -> String {
    BINANCE_API_BASE.to_string()
}

fn default_requests_per_minute() -> u32 {
    600
}

fn default_seed() -> u64 {
    42
}

/// Simulated venue parameters
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PaperSettings {
    /// Fee as a fraction of the fill rate (0.001 = 0.1%)
    pub fee_rate: f64,
    /// Status polls answered "pending" before an order fills
    pub fill_delay_polls: u32,
}

impl Default for PaperSettings {
    fn default() -> Self {
        Self {
            fee_rate: 0.001,
            fill_delay_polls: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NotifierSettings {
    Log,
    Webhook { url: String },
}

impl Default for NotifierSettings {
    fn default() -> Self {
        NotifierSettings::Log
    }
}

/// Host configuration
///
/// Sources, later wins: defaults, `config/trendbot.toml` (or `--config`),
/// `TRENDBOT__*` environment variables (`TRENDBOT__STORAGE__URL=...`).
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub pair: String,
    pub period_minutes: u32,
    /// Submit real orders and watch fills; otherwise positions fill on the spot
    pub realtime_trading: bool,
    /// Defaults to `ticker` with real-time trading, `candle_close` without
    pub pricing: Option<PricingMode>,
    /// Notification subject, `{pair}` and `{action}` are substituted
    pub subject_template: String,
    pub initial_balance: f64,
    /// Share of the balance committed per buy, in (0, 1]
    pub stake_fraction: f64,
    pub poll_interval_secs: u64,
    /// Extra wait after each boundary so the exchange closes the candle
    pub settle_delay_secs: u64,
    pub strategy: StrategySettings,
    pub storage: StorageSettings,
    pub market: MarketSettings,
    pub paper: PaperSettings,
    pub notifier: NotifierSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            pair: "BTCUSDT".to_string(),
            period_minutes: 5,
            realtime_trading: false,
            pricing: None,
            subject_template: "[trendbot] {pair} {action}".to_string(),
            initial_balance: 1_000.0,
            stake_fraction: 1.0,
            poll_interval_secs: 20,
            settle_delay_secs: 2,
            strategy: StrategySettings::default(),
            storage: StorageSettings::default(),
            market: MarketSettings::default(),
            paper: PaperSettings::default(),
            notifier: NotifierSettings::default(),
        }
    }
}

fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .separator("__")
        .try_parsing(true)
}

impl Settings {
    /// Load from the optional file and the environment
    ///
    /// An explicit `path` must exist; the default file is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(path) => File::from(path).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        Self::load_from(Config::builder().add_source(file).add_source(environment()))
    }

    fn load_from(builder: config::ConfigBuilder<config::builder::DefaultState>) -> Result<Self> {
        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Parse a TOML document without touching the environment
    pub fn from_toml(toml: &str) -> Result<Self> {
        Self::load_from(Config::builder().add_source(File::from_str(toml, FileFormat::Toml)))
    }

    pub fn validate(&self) -> Result<()> {
        if self.pair.trim().is_empty() {
            return Err(Error::Config("pair must not be empty".to_string()));
        }

        self.period()?;

        if !(self.stake_fraction > 0.0 && self.stake_fraction <= 1.0) {
            return Err(Error::Config(format!(
                "stake_fraction must be in (0, 1], got {}",
                self.stake_fraction
            )));
        }

        if self.initial_balance <= 0.0 {
            return Err(Error::Config(format!(
                "initial_balance must be positive, got {}",
                self.initial_balance
            )));
        }

        if self.poll_interval_secs == 0 {
            return Err(Error::Config("poll_interval_secs must be positive".to_string()));
        }

        if self.paper.fee_rate < 0.0 || self.paper.fee_rate >= 1.0 {
            return Err(Error::Config(format!(
                "paper.fee_rate must be in [0, 1), got {}",
                self.paper.fee_rate
            )));
        }

        match &self.storage {
            StorageSettings::Redis { url } | StorageSettings::Postgres { url } if url.trim().is_empty() => {
                return Err(Error::Config("storage.url is required for this backend".to_string()));
            }
            _ => {}
        }

        if let NotifierSettings::Webhook { url } = &self.notifier {
            if url.trim().is_empty() {
                return Err(Error::Config("notifier.url is required for webhooks".to_string()));
            }
        }

        Ok(())
    }

    pub fn period(&self) -> Result<CandlePeriod> {
        CandlePeriod::try_from(self.period_minutes)
    }

    pub fn pricing_mode(&self) -> PricingMode {
        self.pricing.unwrap_or(if self.realtime_trading {
            PricingMode::Ticker
        } else {
            PricingMode::CandleClose
        })
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_secs(self.settle_delay_secs)
    }
}
