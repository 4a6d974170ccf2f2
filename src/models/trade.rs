use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeMode {
    Paper,
    Live,
}

impl fmt::Display for TradeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeMode::Paper => write!(f, "PAPER"),
            TradeMode::Live => write!(f, "LIVE"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OptionSide {
    Call,
    Put,
}

impl fmt::Display for OptionSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionSide::Call => write!(f, "CALL"),
            OptionSide::Put => write!(f, "PUT"),
        }
    }
}

/// One option position. Exclusively owned by the order manager while open;
/// exit fields are filled together with removal from the registry, after
/// which the record is append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub mode: TradeMode,
    pub date: String,
    pub entry_time: String,
    pub exit_time: Option<String>,
    pub strike: i64,
    pub side: OptionSide,
    pub qty: u32,
    pub entry_price: f64,
    pub exit_price: Option<f64>,
    pub pnl: Option<f64>,
    pub identifier: String,
    pub order_id: Option<String>,
}

impl Trade {
    /// "24500 CALL" style descriptor used in the trade log.
    pub fn option_descriptor(&self) -> String {
        format!("{} {}", self.strike, self.side)
    }

    /// Realized P&L: (exit - entry) x qty for a CALL, mirrored for a PUT.
    pub fn pnl_for_exit(&self, exit_price: f64) -> f64 {
        let qty = f64::from(self.qty);
        match self.side {
            OptionSide::Call => (exit_price - self.entry_price) * qty,
            OptionSide::Put => (self.entry_price - exit_price) * qty,
        }
    }
}
