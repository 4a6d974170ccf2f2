use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::models::OptionSide;

/// Per-strike row of the option chain. Bid prices are quoted per contract;
/// instrument ids are absent for strikes the venue does not list both sides
/// for.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StrikeRow {
    pub call_oi: f64,
    pub put_oi: f64,
    pub call_oi_change: f64,
    pub put_oi_change: f64,
    pub call_bid: f64,
    pub put_bid: f64,
    pub call_id: Option<String>,
    pub put_id: Option<String>,
}

/// One open-interest snapshot, produced fresh each cycle. Never mutated;
/// only aggregated and reduced.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OptionChainSnapshot {
    pub strikes: BTreeMap<i64, StrikeRow>,
    pub timestamp: String,
    pub underlying: f64,
}

impl OptionChainSnapshot {
    pub fn is_empty(&self) -> bool {
        self.strikes.is_empty()
    }

    pub fn bid_for(&self, strike: i64, side: OptionSide) -> Option<f64> {
        let row = self.strikes.get(&strike)?;
        let bid = match side {
            OptionSide::Call => row.call_bid,
            OptionSide::Put => row.put_bid,
        };
        (bid > 0.0).then_some(bid)
    }

    pub fn instrument_for(&self, strike: i64, side: OptionSide) -> Option<&str> {
        let row = self.strikes.get(&strike)?;
        match side {
            OptionSide::Call => row.call_id.as_deref(),
            OptionSide::Put => row.put_id.as_deref(),
        }
    }

    /// Sum OI changes across strikes and pick the max-OI strike per side.
    pub fn aggregate(&self) -> OiAggregates {
        let mut agg = OiAggregates::default();
        for (&strike, row) in &self.strikes {
            agg.call_sum += row.call_oi_change;
            agg.put_sum += row.put_oi_change;
            if row.call_oi > agg.call_max_oi {
                agg.call_max_oi = row.call_oi;
                agg.call_max_strike = strike;
            }
            if row.put_oi > agg.put_max_oi {
                agg.put_max_oi = row.put_oi;
                agg.put_max_strike = strike;
            }
        }
        agg
    }
}

/// Reduction of a chain snapshot: aggregate OI-change sums and the
/// per-side arg-max strikes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OiAggregates {
    pub call_sum: f64,
    pub put_sum: f64,
    pub call_max_strike: i64,
    pub call_max_oi: f64,
    pub put_max_strike: i64,
    pub put_max_oi: f64,
}

impl OiAggregates {
    pub fn diff(&self) -> f64 {
        self.put_sum - self.call_sum
    }

    /// Put/call ratio of the OI-change sums. A zero call sum yields +inf,
    /// which satisfies the CALL ratio test and fails the PUT one.
    pub fn pcr(&self) -> f64 {
        if self.call_sum == 0.0 {
            f64::INFINITY
        } else {
            self.put_sum / self.call_sum
        }
    }
}
