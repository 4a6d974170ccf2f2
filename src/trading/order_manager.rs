use chrono::Utc;
use chrono_tz::Asia::Kolkata;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use crate::broker::Broker;
use crate::config::Config;
use crate::data::MarketData;
use crate::error::StrategyError;
use crate::models::{OptionSide, Trade, TradeMode};
use crate::trading::monitor;
use crate::trading::registry::TradeRegistry;
use crate::trading::trade_log::TradeLog;

/// Sole mutator of trade state. Opens register a trade and start its
/// monitor; closes are exactly-once (the registry removal decides the
/// winner) and idempotent for everyone else.
pub struct OrderManager {
    registry: Arc<TradeRegistry>,
    log: TradeLog,
    broker: Option<Arc<dyn Broker>>,
    market_data: Arc<dyn MarketData>,
    take_profit_pct: f64,
    stop_loss_pct: f64,
    monitor_poll: Duration,
}

impl OrderManager {
    pub fn new(
        cfg: &Config,
        broker: Option<Arc<dyn Broker>>,
        market_data: Arc<dyn MarketData>,
    ) -> Self {
        Self {
            registry: Arc::new(TradeRegistry::new()),
            log: TradeLog::new(format!("{}/trade_log.csv", cfg.assets_dir)),
            broker,
            market_data,
            take_profit_pct: cfg.take_profit_pct,
            stop_loss_pct: cfg.stop_loss_pct,
            monitor_poll: cfg.monitor_poll,
        }
    }

    pub fn registry(&self) -> &Arc<TradeRegistry> {
        &self.registry
    }

    pub fn has_broker(&self) -> bool {
        self.broker.is_some()
    }

    pub(crate) fn broker(&self) -> Option<&Arc<dyn Broker>> {
        self.broker.as_ref()
    }

    pub(crate) fn market_data(&self) -> &Arc<dyn MarketData> {
        &self.market_data
    }

    pub(crate) fn take_profit_pct(&self) -> f64 {
        self.take_profit_pct
    }

    pub(crate) fn stop_loss_pct(&self) -> f64 {
        self.stop_loss_pct
    }

    pub(crate) fn monitor_poll(&self) -> Duration {
        self.monitor_poll
    }

    pub async fn open_paper_trade(
        self: &Arc<Self>,
        identifier: &str,
        qty: u32,
        side: OptionSide,
        strike: i64,
        entry_price: f64,
    ) -> Result<Trade, StrategyError> {
        let trade = new_trade(
            TradeMode::Paper,
            identifier,
            qty,
            side,
            strike,
            entry_price,
            None,
        );
        info!(
            "Paper trade entered: {} x{} @ {:.2} ({})",
            trade.option_descriptor(),
            qty,
            entry_price,
            identifier
        );
        self.register_and_monitor(trade).await
    }

    pub async fn open_live_trade(
        self: &Arc<Self>,
        identifier: &str,
        qty: u32,
        side: OptionSide,
        strike: i64,
        entry_price: f64,
    ) -> Result<Trade, StrategyError> {
        let broker = self.broker.as_ref().ok_or_else(|| {
            StrategyError::BrokerUnavailable("no broker configured".into())
        })?;

        let order_id = broker
            .place_order(identifier, qty, side, entry_price)
            .await
            .map_err(|e| StrategyError::BrokerUnavailable(format!("place order: {e}")))?;

        let trade = new_trade(
            TradeMode::Live,
            identifier,
            qty,
            side,
            strike,
            entry_price,
            Some(order_id),
        );
        info!(
            "Live trade entered: {} x{} @ {:.2} order {}",
            trade.option_descriptor(),
            qty,
            entry_price,
            trade.order_id.as_deref().unwrap_or("?")
        );
        self.register_and_monitor(trade).await
    }

    async fn register_and_monitor(self: &Arc<Self>, trade: Trade) -> Result<Trade, StrategyError> {
        self.registry.insert(trade.clone()).await?;
        let manager = Arc::clone(self);
        let identifier = trade.identifier.clone();
        tokio::spawn(async move {
            monitor::watch_trade(manager, identifier).await;
        });
        Ok(trade)
    }

    /// Close an open trade. No-op when the identifier is not open. The
    /// caller that wins the registry removal finalizes exit fields, squares
    /// off the live order and appends the single trade-log row.
    pub async fn close_trade(&self, identifier: &str, exit_price: Option<f64>) -> Option<Trade> {
        let mut trade = self.registry.remove_and_return(identifier).await?;

        trade.exit_time = Some(ist_timestamp());
        trade.exit_price = exit_price;
        trade.pnl = exit_price.map(|p| trade.pnl_for_exit(p));

        if trade.mode == TradeMode::Live {
            if let (Some(broker), Some(order_id)) = (self.broker.as_ref(), trade.order_id.as_deref())
            {
                if let Err(e) = broker.cancel_order(order_id).await {
                    // The position is still marked closed locally
                    error!("Broker exit for {} failed: {}", identifier, e);
                }
            }
        }

        if let Err(e) = self.log.append(&trade) {
            error!("Trade log append for {} failed: {}", identifier, e);
        }

        match (trade.exit_price, trade.pnl) {
            (Some(exit), Some(pnl)) => info!(
                "Trade closed: {} @ {:.2} P/L {:+.2}",
                trade.option_descriptor(),
                exit,
                pnl
            ),
            _ => info!(
                "Trade closed: {} at unknown price",
                trade.option_descriptor()
            ),
        }

        Some(trade)
    }

    pub async fn open_trades(&self) -> Vec<Trade> {
        self.registry.snapshot_all().await
    }

    #[cfg(test)]
    pub(crate) fn log_row_count(&self) -> usize {
        self.log.row_count()
    }
}

fn new_trade(
    mode: TradeMode,
    identifier: &str,
    qty: u32,
    side: OptionSide,
    strike: i64,
    entry_price: f64,
    order_id: Option<String>,
) -> Trade {
    let now = Utc::now().with_timezone(&Kolkata);
    Trade {
        mode,
        date: now.format("%Y-%m-%d").to_string(),
        entry_time: now.format("%Y-%m-%d %H:%M:%S").to_string(),
        exit_time: None,
        strike,
        side,
        qty,
        entry_price,
        exit_price: None,
        pnl: None,
        identifier: identifier.to_string(),
        order_id,
    }
}

fn ist_timestamp() -> String {
    Utc::now()
        .with_timezone(&Kolkata)
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}
