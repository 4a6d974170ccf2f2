use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::models::Trade;
use crate::trading::order_manager::OrderManager;

/// One-shot watcher for a single open trade. Polls the live price against
/// the entry price and closes through the order manager on a threshold
/// breach. Exits when the trade disappears from the registry (someone else
/// closed it) or after its own close; it never restarts.
pub(crate) async fn watch_trade(manager: Arc<OrderManager>, identifier: String) {
    let poll = manager.monitor_poll();

    loop {
        let Some(trade) = manager.registry().get(&identifier).await else {
            debug!("Monitor exiting, {} closed elsewhere", identifier);
            return;
        };

        if let Some(ltp) = latest_price(&manager, &trade).await {
            if trade.entry_price > 0.0 {
                let change_pct = (ltp - trade.entry_price) / trade.entry_price * 100.0;
                if change_pct >= manager.take_profit_pct()
                    || change_pct <= manager.stop_loss_pct()
                {
                    info!(
                        "Exit threshold hit for {}: {:.2} ({:+.2}%)",
                        trade.option_descriptor(),
                        ltp,
                        change_pct
                    );
                    manager.close_trade(&identifier, Some(ltp)).await;
                    return;
                }
            }
        } else {
            // Missing data is never a reason to close; retry next poll
            debug!("No price for {} this poll", identifier);
        }

        tokio::time::sleep(poll).await;
    }
}

/// Latest traded price for the monitored instrument: broker quote when one
/// is configured, otherwise the option-chain bid at the trade's strike and
/// side.
async fn latest_price(manager: &OrderManager, trade: &Trade) -> Option<f64> {
    if let Some(broker) = manager.broker() {
        match broker.get_quote(&trade.identifier).await {
            Ok(Some(ltp)) if ltp > 0.0 => return Some(ltp),
            Ok(_) => {}
            Err(e) => warn!("Quote for {} failed: {}", trade.identifier, e),
        }
    }

    match manager.market_data().get_option_chain_snapshot().await {
        Ok(chain) => chain.bid_for(trade.strike, trade.side),
        Err(e) => {
            warn!("Chain fallback for {} failed: {}", trade.identifier, e);
            None
        }
    }
}
