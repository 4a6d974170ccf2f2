use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use oi_trading_bot::broker::{Broker, DhanClient};
use oi_trading_bot::config::Config;
use oi_trading_bot::data::{DataFetcher, MarketData, NseClient};
use oi_trading_bot::runner::StrategyRunner;
use oi_trading_bot::strategies::evaluator::PercentileTable;
use oi_trading_bot::trading::OrderManager;

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = Config::from_env();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&cfg.log_level));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .init();

    let scrape = Arc::new(NseClient::new());

    let (broker, broker_feed): (Option<Arc<dyn Broker>>, Option<Arc<dyn MarketData>>) =
        if cfg.has_broker_credentials() {
            let dhan = Arc::new(DhanClient::new(&cfg));
            (
                Some(dhan.clone() as Arc<dyn Broker>),
                Some(dhan as Arc<dyn MarketData>),
            )
        } else {
            info!("Broker credentials not configured; scrape data only, paper entries");
            (None, None)
        };

    let fetcher = DataFetcher::new(broker_feed, scrape.clone() as Arc<dyn MarketData>, &cfg);
    let orders = Arc::new(OrderManager::new(
        &cfg,
        broker,
        scrape as Arc<dyn MarketData>,
    ));
    let table = PercentileTable::load(&cfg.params_table_file);

    let runner = StrategyRunner::new(cfg.shared(), fetcher, orders, table);
    if !runner.start() {
        return Ok(());
    }

    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");
    runner.stop();
    while runner.is_running() {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    info!("Runner stopped.");

    Ok(())
}
