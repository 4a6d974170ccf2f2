pub mod bar;
pub mod oi;
pub mod signal;
pub mod trade;

pub use bar::{BarSeries, EnrichedBar, PriceBar};
pub use oi::{OiAggregates, OptionChainSnapshot, StrikeRow};
pub use signal::{DayBias, Decision, SignalRow, Trend};
pub use trade::{OptionSide, Trade, TradeMode};
