use std::collections::HashMap;
use tokio::sync::Mutex;

use crate::error::StrategyError;
use crate::models::Trade;

#[derive(Default)]
struct RegistryState {
    trades: HashMap<String, Trade>,
    entry_gate: bool,
}

/// The set of currently open trades plus the entry gate, guarded by a single
/// lock. The gate shares the lock so gate updates can never race registry
/// mutations. Removal is the single point of truth for closing: whichever
/// caller wins `remove_and_return` owns the close.
#[derive(Default)]
pub struct TradeRegistry {
    state: Mutex<RegistryState>,
}

impl TradeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an open trade and raise the entry gate in the same critical
    /// section. Fails if the identifier already has an open trade.
    pub async fn insert(&self, trade: Trade) -> Result<(), StrategyError> {
        let mut state = self.state.lock().await;
        if state.trades.contains_key(&trade.identifier) {
            return Err(StrategyError::DuplicateTrade(trade.identifier.clone()));
        }
        state.entry_gate = true;
        state.trades.insert(trade.identifier.clone(), trade);
        Ok(())
    }

    pub async fn get(&self, identifier: &str) -> Option<Trade> {
        self.state.lock().await.trades.get(identifier).cloned()
    }

    /// Remove and return the trade. The winner of a close race gets
    /// `Some`; every other caller observes absence and no-ops. The gate
    /// drops when the last open trade goes.
    pub async fn remove_and_return(&self, identifier: &str) -> Option<Trade> {
        let mut state = self.state.lock().await;
        let trade = state.trades.remove(identifier);
        if trade.is_some() && state.trades.is_empty() {
            state.entry_gate = false;
        }
        trade
    }

    /// Consistent copy of all open trades, for iteration without holding
    /// the lock during I/O.
    pub async fn snapshot_all(&self) -> Vec<Trade> {
        self.state.lock().await.trades.values().cloned().collect()
    }

    pub async fn open_count(&self) -> usize {
        self.state.lock().await.trades.len()
    }

    pub async fn entry_gate(&self) -> bool {
        self.state.lock().await.entry_gate
    }

    pub async fn clear_entry_gate(&self) {
        self.state.lock().await.entry_gate = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OptionSide;
    use crate::test_helpers::make_trade;

    #[tokio::test]
    async fn insert_raises_gate_and_rejects_duplicates() {
        let registry = TradeRegistry::new();
        assert!(!registry.entry_gate().await);

        registry
            .insert(make_trade("id-1", OptionSide::Call, 100.0, 2))
            .await
            .unwrap();
        assert!(registry.entry_gate().await);

        let dup = registry
            .insert(make_trade("id-1", OptionSide::Call, 100.0, 2))
            .await;
        assert!(matches!(dup, Err(StrategyError::DuplicateTrade(_))));
        assert_eq!(registry.open_count().await, 1);
    }

    #[tokio::test]
    async fn remove_clears_gate_only_when_last() {
        let registry = TradeRegistry::new();
        registry
            .insert(make_trade("id-1", OptionSide::Call, 100.0, 2))
            .await
            .unwrap();
        registry
            .insert(make_trade("id-2", OptionSide::Put, 90.0, 2))
            .await
            .unwrap();

        assert!(registry.remove_and_return("id-1").await.is_some());
        assert!(registry.entry_gate().await);

        assert!(registry.remove_and_return("id-2").await.is_some());
        assert!(!registry.entry_gate().await);

        assert!(registry.remove_and_return("id-2").await.is_none());
    }

    #[tokio::test]
    async fn snapshot_is_a_copy() {
        let registry = TradeRegistry::new();
        registry
            .insert(make_trade("id-1", OptionSide::Call, 100.0, 2))
            .await
            .unwrap();
        let snap = registry.snapshot_all().await;
        assert_eq!(snap.len(), 1);
        registry.remove_and_return("id-1").await;
        // The snapshot is unaffected by later removal
        assert_eq!(snap.len(), 1);
        assert_eq!(registry.open_count().await, 0);
    }
}
