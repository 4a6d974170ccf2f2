use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

pub type SharedConfig = Arc<Config>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunMode {
    Paper,
    Live,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // Broker credentials — all three must be present before any broker call
    pub dhan_client_id: String,
    pub dhan_access_token: String,
    pub dhan_access_key: String,

    pub mode: RunMode,
    pub lot_qty: u32,

    // Time-of-day thresholds, stored as (hour, minute) IST
    pub market_open: (u32, u32),
    pub tick_window_end: (u32, u32),
    pub market_close: (u32, u32),
    pub entry_start: (u32, u32),
    pub entry_end: (u32, u32),
    pub eod_close: (u32, u32),

    // Exit thresholds as percent change from entry price
    pub take_profit_pct: f64,
    pub stop_loss_pct: f64,

    // Cadences
    pub monitor_poll: Duration,
    pub tick_interval: Duration,
    pub idle_interval: Duration,

    // OI fetch retry policy
    pub oi_fetch_retries: u32,
    pub oi_retry_backoff: Duration,

    // Retained history
    pub history_seed_len: usize,
    pub trend_window: usize,

    pub assets_dir: String,
    pub params_table_file: String,
    pub log_level: String,
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let env = |key: &str, default: &str| -> String {
            std::env::var(key).unwrap_or_else(|_| default.to_string())
        };

        let mode = if env("TRADING_MODE", "paper").to_lowercase() == "live" {
            RunMode::Live
        } else {
            RunMode::Paper
        };

        let assets_dir = env("ASSETS_DIR", "assets");

        Config {
            dhan_client_id: env("DHAN_CLIENT_ID", ""),
            dhan_access_token: env("DHAN_ACCESS_TOKEN", ""),
            dhan_access_key: env("DHAN_ACCESS_KEY", ""),
            mode,
            lot_qty: env("LOT_QTY", "2").parse().unwrap_or(2),
            market_open: (9, 26),
            tick_window_end: (15, 25),
            market_close: (15, 30),
            entry_start: (11, 26),
            entry_end: (14, 25),
            eod_close: (15, 0),
            take_profit_pct: env("TAKE_PROFIT_PCT", "13").parse().unwrap_or(13.0),
            stop_loss_pct: env("STOP_LOSS_PCT", "-6").parse().unwrap_or(-6.0),
            monitor_poll: Duration::from_secs(
                env("MONITOR_POLL_SECS", "60").parse().unwrap_or(60),
            ),
            tick_interval: Duration::from_secs(
                env("TICK_INTERVAL_SECS", "300").parse().unwrap_or(300),
            ),
            idle_interval: Duration::from_secs(
                env("IDLE_INTERVAL_SECS", "60").parse().unwrap_or(60),
            ),
            oi_fetch_retries: env("OI_FETCH_RETRIES", "2").parse().unwrap_or(2),
            oi_retry_backoff: Duration::from_secs(
                env("OI_RETRY_BACKOFF_SECS", "120").parse().unwrap_or(120),
            ),
            history_seed_len: 18,
            trend_window: 5,
            params_table_file: format!("{}/params_table.csv", assets_dir),
            assets_dir,
            log_level: env("LOG_LEVEL", "INFO").to_string(),
        }
    }

    pub fn has_broker_credentials(&self) -> bool {
        !self.dhan_client_id.is_empty()
            && !self.dhan_access_token.is_empty()
            && !self.dhan_access_key.is_empty()
    }

    pub fn shared(self) -> SharedConfig {
        Arc::new(self)
    }
}
