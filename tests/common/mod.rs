use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use oi_trading_bot::broker::Broker;
use oi_trading_bot::config::{Config, RunMode};
use oi_trading_bot::data::{LiveIndexSnapshot, MarketData};
use oi_trading_bot::models::{BarSeries, OptionChainSnapshot, OptionSide, StrikeRow};

/// Paper-mode config with fast cadences, day-wide windows and an isolated
/// assets dir per test.
pub fn test_config(tag: &str) -> Config {
    let assets_dir = std::env::temp_dir()
        .join(format!("oi_bot_itest_{}_{}", std::process::id(), tag))
        .to_string_lossy()
        .to_string();
    let _ = std::fs::remove_dir_all(&assets_dir);

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
        oi_fetch_retries: 0,
        oi_retry_backoff: StdDuration::from_millis(0),
        history_seed_len: 18,
        trend_window: 5,
        params_table_file: format!("{}/params_table.csv", assets_dir),
        assets_dir,
        log_level: "ERROR".to_string(),
    }
}

/// Broker returning a scripted quote sequence; the last quote repeats.
pub struct ScriptedBroker {
    quotes: Vec<f64>,
    next: AtomicUsize,
    pub placed: AtomicUsize,
    pub cancelled: AtomicUsize,
}

impl ScriptedBroker {
    pub fn new(quotes: &[f64]) -> Self {
        Self {
            quotes: quotes.to_vec(),
            next: AtomicUsize::new(0),
            placed: AtomicUsize::new(0),
            cancelled: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Broker for ScriptedBroker {
    async fn place_order(&self, _: &str, _: u32, _: OptionSide, _: f64) -> Result<String> {
        self.placed.fetch_add(1, Ordering::SeqCst);
        Ok("ORD-100".to_string())
    }

    async fn cancel_order(&self, _: &str) -> Result<()> {
        self.cancelled.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn get_quote(&self, _: &str) -> Result<Option<f64>> {
        let i = self.next.fetch_add(1, Ordering::SeqCst);
        let i = i.min(self.quotes.len().saturating_sub(1));
        Ok(self.quotes.get(i).copied())
    }
}

/// Feed with a fixed option chain and a flat live quote.
pub struct StaticFeed {
    pub chain: OptionChainSnapshot,
}

impl StaticFeed {
    pub fn empty() -> Self {
        Self {
            chain: OptionChainSnapshot::default(),
        }
    }

    pub fn with_strike(strike: i64, call_bid: f64, put_bid: f64) -> Self {
        let mut chain = OptionChainSnapshot {
            timestamp: "2024-03-12 10:30:00".to_string(),
            underlying: 24480.0,
            ..Default::default()
        };
        chain.strikes.insert(
            strike,
            StrikeRow {
                call_oi: 10.0,
                put_oi: 50.0,
                call_oi_change: 10.0,
                put_oi_change: 50.0,
                call_bid,
                put_bid,
                call_id: Some(format!("CE{}", strike)),
                put_id: Some(format!("PE{}", strike)),
            },
        );
        Self { chain }
    }
}

#[async_trait]
impl MarketData for StaticFeed {
    async fn get_live_index_snapshot(&self) -> Result<Option<LiveIndexSnapshot>> {
        Ok(Some(LiveIndexSnapshot {
            open: 24450.0,
            high: 24500.0,
            low: 24400.0,
            last: 24480.0,
            volume: 1000.0,
            timestamp: Utc::now(),
        }))
    }

    async fn get_option_chain_snapshot(&self) -> Result<OptionChainSnapshot> {
        Ok(self.chain.clone())
    }

    async fn get_historical_index_series(&self) -> Result<BarSeries> {
        Ok(BarSeries::default())
    }
}

/// Feed whose index price and put OI build monotonically call over call, so
/// the CALL confluence (decision, trend, momentum) lines up after two ticks.
pub struct TrendingFeed {
    live_calls: AtomicUsize,
    chain_calls: AtomicUsize,
}

impl TrendingFeed {
    pub fn new() -> Self {
        Self {
            live_calls: AtomicUsize::new(0),
            chain_calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl MarketData for TrendingFeed {
    async fn get_live_index_snapshot(&self) -> Result<Option<LiveIndexSnapshot>> {
        let i = self.live_calls.fetch_add(1, Ordering::SeqCst) as f64;
        Ok(Some(LiveIndexSnapshot {
            open: 24450.0,
            high: 24500.0 + i,
            low: 24400.0,
            last: 24480.0 + i * 5.0,
            volume: 1000.0,
            timestamp: Utc::now(),
        }))
    }

    async fn get_option_chain_snapshot(&self) -> Result<OptionChainSnapshot> {
        let i = self.chain_calls.fetch_add(1, Ordering::SeqCst) as f64;
        let mut chain = OptionChainSnapshot {
            timestamp: "2024-03-12 10:30:00".to_string(),
            underlying: 24480.0,
            ..Default::default()
        };
        // Put side dominates and its change sum grows every cycle: the
        // decision stays CALL and the running diff slopes upward
        chain.strikes.insert(
            24500,
            StrikeRow {
                call_oi: 10.0,
                put_oi: 50.0,
                call_oi_change: 10.0,
                put_oi_change: 50.0 + i * 10.0,
                call_bid: 12.0,
                put_bid: 11.0,
                call_id: Some("CE24500".to_string()),
                put_id: Some("PE24500".to_string()),
            },
        );
        Ok(chain)
    }

    async fn get_historical_index_series(&self) -> Result<BarSeries> {
        Ok(BarSeries::default())
    }
}
