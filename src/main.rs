use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use trendbot::accounting::{self, PositionBook};
use trendbot::clock::{Clock, SystemClock};
use trendbot::config::{MarketSettings, Settings};
use trendbot::exchange::{BinanceClient, MarketData, PaperExchange, SyntheticMarket};
use trendbot::execution::ExecutorConfig;
use trendbot::{notify, persistence, shutdown, TradingLoop};

/// Time-aligned single-pair trend trader
#[derive(Debug, Parser)]
#[command(name = "trendbot", version, about)]
struct Cli {
    /// Configuration file (default: config/trendbot.toml if present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Trading pair, e.g. BTCUSDT
    #[arg(long)]
    pair: Option<String>,

    /// Candle period in minutes
    #[arg(long)]
    period: Option<u32>,

    /// Submit orders and watch fills instead of filling immediately
    #[arg(long)]
    realtime: bool,
}

fn setup_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("trendbot=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn load_settings(cli: &Cli) -> anyhow::Result<Settings> {
    let mut settings =
        Settings::load(cli.config.as_deref()).context("Failed to load configuration")?;

    if let Some(pair) = &cli.pair {
        settings.pair = pair.clone();
    }
    if let Some(period) = cli.period {
        settings.period_minutes = period;
    }
    if cli.realtime {
        settings.realtime_trading = true;
    }

    settings.validate().context("Invalid configuration")?;
    Ok(settings)
}

fn build_market(
    settings: &MarketSettings,
    clock: Arc<dyn Clock>,
) -> anyhow::Result<Arc<dyn MarketData>> {
    match settings {
        MarketSettings::Binance {
            base_url,
            requests_per_minute,
        } => {
            let client = BinanceClient::with_base_url(base_url.clone(), *requests_per_minute)
                .context("Failed to create Binance client")?;
            tracing::info!("✓ Market data: Binance ({})", base_url);
            Ok(Arc::new(client))
        }
        MarketSettings::Synthetic { seed } => {
            tracing::info!("✓ Market data: synthetic (seed {})", seed);
            Ok(Arc::new(SyntheticMarket::new(*seed).with_clock(clock)))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();

    let cli = Cli::parse();
    let settings = load_settings(&cli)?;
    let period = settings.period()?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let market = build_market(&settings.market, clock.clone())?;
    let exchange = Arc::new(
        PaperExchange::new(market, settings.paper.fee_rate)
            .with_fill_delay(settings.paper.fill_delay_polls),
    );
    let store = persistence::connect(&settings.storage)
        .await
        .context("Failed to open candle store")?;
    let notifier = notify::build(&settings.notifier)?;
    let strategy = settings.strategy.build().context("Invalid strategy settings")?;
    let book = accounting::shared(PositionBook::new(
        settings.initial_balance,
        settings.realtime_trading,
    ));

    let mut trading_loop = TradingLoop::new(
        exchange,
        strategy,
        store,
        notifier,
        book,
        ExecutorConfig::from_settings(&settings),
        clock,
    )
    .with_settle_delay(settings.settle_delay());

    let (trigger, signal) = shutdown::channel();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            // Dropping the trigger would stop the loop
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
        tracing::info!("⚠️  Received Ctrl+C, shutting down...");
        trigger.trigger();
    });

    let report = trading_loop
        .run(&settings.pair, period, signal)
        .await
        .context("Trading loop failed")?;

    tracing::info!(
        "✓ Stopped after {} iterations ({} candles processed, {} gaps, {} trades)",
        report.iterations,
        report.processed,
        report.gap_windows,
        report.trading_count
    );

    Ok(())
}
