use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use crate::broker::Broker;
use crate::config::{Config, RunMode};
use crate::data::{DataFetcher, LiveIndexSnapshot, MarketData};
use crate::models::{
    BarSeries, OptionChainSnapshot, OptionSide, PriceBar, StrikeRow, Trade, TradeMode,
};
use crate::trading::OrderManager;

/// Bars from closing prices with auto-incrementing 1-minute timestamps.
pub fn make_bars(closes: &[f64]) -> BarSeries {
    let base = DateTime::parse_from_rfc3339("2024-03-12T04:00:00Z")
        .unwrap()
        .with_timezone(&Utc);

    let bars: Vec<PriceBar> = closes
        .iter()
        .enumerate()
        .map(|(i, &close)| PriceBar {
            timestamp: base + Duration::minutes(i as i64),
            open: close - 0.5,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 100.0,
        })
        .collect();

    BarSeries::new(bars)
}

/// Chain from (strike, call_oi, put_oi, call_oi_change, put_oi_change)
/// tuples, with fixed bids and synthetic instrument ids per side.
pub fn make_chain(rows: &[(i64, f64, f64, f64, f64)]) -> OptionChainSnapshot {
    let mut snapshot = OptionChainSnapshot {
        timestamp: "2024-03-12 10:30:00".to_string(),
        underlying: 24480.0,
        ..Default::default()
    };
    for &(strike, call_oi, put_oi, call_chg, put_chg) in rows {
        snapshot.strikes.insert(
            strike,
            StrikeRow {
                call_oi,
                put_oi,
                call_oi_change: call_chg,
                put_oi_change: put_chg,
                call_bid: 12.0,
                put_bid: 11.0,
                call_id: Some(format!("CE{}", strike)),
                put_id: Some(format!("PE{}", strike)),
            },
        );
    }
    snapshot
}

pub fn make_trade(identifier: &str, side: OptionSide, entry_price: f64, qty: u32) -> Trade {
    Trade {
        mode: TradeMode::Paper,
        date: "2024-03-12".to_string(),
        entry_time: "2024-03-12 11:30:00".to_string(),
        exit_time: None,
        strike: 24500,
        side,
        qty,
        entry_price,
        exit_price: None,
        pnl: None,
        identifier: identifier.to_string(),
        order_id: None,
    }
}

/// Unique-per-process temp path so parallel test runs never collide.
pub fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("oi_bot_test_{}_{}", std::process::id(), name))
}

/// Paper mode, no credentials, fast cadences, day-wide windows.
pub fn default_test_config() -> Config {
    Config {
        dhan_client_id: String::new(),
        dhan_access_token: String::new(),
        dhan_access_key: String::new(),
        mode: RunMode::Paper,
        lot_qty: 2,
        market_open: (0, 0),
        tick_window_end: (23, 59),
        market_close: (23, 59),
        entry_start: (0, 0),
        entry_end: (23, 59),
        eod_close: (23, 59),
        take_profit_pct: 13.0,
        stop_loss_pct: -6.0,
        monitor_poll: StdDuration::from_millis(20),
        tick_interval: StdDuration::from_millis(50),
        idle_interval: StdDuration::from_millis(20),
        oi_fetch_retries: 2,
        oi_retry_backoff: StdDuration::from_millis(0),
        history_seed_len: 18,
        trend_window: 5,
        assets_dir: temp_path("assets").to_string_lossy().to_string(),
        params_table_file: temp_path("params_table.csv")
            .to_string_lossy()
            .to_string(),
        log_level: "ERROR".to_string(),
    }
}

/// Market data source with nothing to say; exercises fallback paths.
pub struct EmptyFeed;

#[async_trait]
impl MarketData for EmptyFeed {
    async fn get_live_index_snapshot(&self) -> Result<Option<LiveIndexSnapshot>> {
        Ok(None)
    }

    async fn get_option_chain_snapshot(&self) -> Result<OptionChainSnapshot> {
        Ok(OptionChainSnapshot::default())
    }

    async fn get_historical_index_series(&self) -> Result<BarSeries> {
        Ok(BarSeries::default())
    }
}

/// Broker that rejects every order.
pub struct RejectingBroker;

#[async_trait]
impl Broker for RejectingBroker {
    async fn place_order(&self, _: &str, _: u32, _: OptionSide, _: f64) -> Result<String> {
        bail!("order rejected")
    }

    async fn cancel_order(&self, _: &str) -> Result<()> {
        Ok(())
    }

    async fn get_quote(&self, _: &str) -> Result<Option<f64>> {
        Ok(None)
    }
}

pub fn test_manager(tag: &str) -> Arc<OrderManager> {
    let mut cfg = default_test_config();
    let dir = temp_path(tag);
    let _ = std::fs::remove_dir_all(&dir);
    cfg.assets_dir = dir.to_string_lossy().to_string();
    Arc::new(OrderManager::new(&cfg, None, Arc::new(EmptyFeed)))
}

pub fn test_manager_with_broker<B: Broker + 'static>(tag: &str, broker: B) -> Arc<OrderManager> {
    let mut cfg = default_test_config();
    let dir = temp_path(tag);
    let _ = std::fs::remove_dir_all(&dir);
    cfg.assets_dir = dir.to_string_lossy().to_string();
    Arc::new(OrderManager::new(&cfg, Some(Arc::new(broker)), Arc::new(EmptyFeed)))
}

pub fn test_fetcher() -> DataFetcher {
    DataFetcher::new(None, Arc::new(EmptyFeed), &default_test_config())
}
