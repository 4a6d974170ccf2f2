pub mod monitor;
pub mod order_manager;
pub mod registry;
pub mod trade_log;

pub use order_manager::OrderManager;
pub use registry::TradeRegistry;
pub use trade_log::TradeLog;
