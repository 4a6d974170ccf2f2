use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::warn;

use crate::models::{DayBias, Decision, EnrichedBar, OiAggregates, Trend};

const PCR_CALL_THRESHOLD: f64 = 1.25;
const PCR_PUT_THRESHOLD: f64 = 0.75;

/// Historical percentile table: five-letter YES/NO key to
/// (bearish %, bullish %).
#[derive(Debug, Clone, Default)]
pub struct PercentileTable {
    rows: HashMap<String, (f64, f64)>,
}

#[derive(Debug, Deserialize)]
struct TableRow {
    params: String,
    bear_pct: f64,
    bull_pct: f64,
}

impl PercentileTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from CSV with columns `params,bear_pct,bull_pct`. A missing or
    /// unreadable file yields an empty table (classification then defaults
    /// to Bullish 50).
    pub fn load<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        let mut table = Self::new();
        let mut reader = match csv::Reader::from_path(path) {
            Ok(r) => r,
            Err(e) => {
                warn!("Percentile table {} not loaded: {}", path.display(), e);
                return table;
            }
        };
        for record in reader.deserialize::<TableRow>() {
            match record {
                Ok(row) => {
                    table.rows.insert(row.params, (row.bear_pct, row.bull_pct));
                }
                Err(e) => warn!("Skipping bad percentile row: {}", e),
            }
        }
        table
    }

    pub fn insert(&mut self, key: &str, bear_pct: f64, bull_pct: f64) {
        self.rows.insert(key.to_string(), (bear_pct, bull_pct));
    }

    pub fn get(&self, key: &str) -> Option<(f64, f64)> {
        self.rows.get(key).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Pure signal judgments. Day classification and the per-cycle decision are
/// combined at the runner level, not here.
pub struct SignalEvaluator;

fn yes_no(cond: bool) -> &'static str {
    if cond {
        "YES"
    } else {
        "NO"
    }
}

impl SignalEvaluator {
    /// Classify the day from today's open against yesterday's rolling
    /// statistics. Unknown keys and empty tables default to Bullish 50.
    pub fn classify_day(
        reference: &EnrichedBar,
        today_open: f64,
        table: &PercentileTable,
    ) -> DayBias {
        let key = format!(
            "{}{}{}{}{}",
            yes_no(today_open > reference.short_ma),
            yes_no(today_open > reference.long_ma),
            yes_no(today_open > reference.upper_band),
            yes_no(today_open < reference.lower_band),
            yes_no(today_open > reference.ma7),
        );

        match table.get(&key) {
            Some((bear, bull)) => {
                if bear > 50.0 {
                    DayBias::bearish(bear)
                } else {
                    DayBias::bullish(bull)
                }
            }
            None => DayBias::default(),
        }
    }

    /// Per-cycle decision from the aggregated OI snapshot.
    pub fn decide(agg: &OiAggregates) -> Decision {
        let max_diff = agg.put_max_oi - agg.call_max_oi;
        let sum_diff = agg.diff();
        let pcr = agg.pcr();

        if max_diff > 0.0 && sum_diff > 0.0 && pcr > PCR_CALL_THRESHOLD {
            Decision::Call
        } else if max_diff < 0.0 && sum_diff < 0.0 && pcr < PCR_PUT_THRESHOLD {
            Decision::Put
        } else {
            Decision::Neutral
        }
    }

    /// Least-squares slope label over the given series (callers pass the
    /// last 5 running diffs).
    pub fn trend(values: &[f64]) -> Trend {
        if values.len() < 2 {
            return Trend::InsufficientData;
        }
        let n = values.len() as f64;
        let sum_x: f64 = (0..values.len()).map(|i| i as f64).sum();
        let sum_y: f64 = values.iter().sum();
        let sum_xy: f64 = values.iter().enumerate().map(|(i, y)| i as f64 * y).sum();
        let sum_x2: f64 = (0..values.len()).map(|i| (i as f64).powi(2)).sum();

        let slope = (n * sum_xy - sum_x * sum_y) / (n * sum_x2 - sum_x * sum_x);
        if slope > 0.0 {
            Trend::Up
        } else {
            Trend::Down
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategies::indicators::enrich;
    use crate::test_helpers::make_bars;

    fn reference_bar() -> EnrichedBar {
        let closes: Vec<f64> = (0..20).map(|i| 100.0 + i as f64).collect();
        let bars = make_bars(&closes);
        enrich(bars.as_slice()).unwrap().pop().unwrap()
    }

    #[test]
    fn classify_day_reads_table() {
        let reference = reference_bar();
        // Open far above everything: YES YES YES NO YES
        let mut table = PercentileTable::new();
        table.insert("YESYESYESNOYES", 60.0, 40.0);
        let bias = SignalEvaluator::classify_day(&reference, 500.0, &table);
        assert_eq!(bias.to_string(), "Bearish 60.00");
    }

    #[test]
    fn classify_day_prefers_bull_pct_at_or_below_50() {
        let reference = reference_bar();
        let mut table = PercentileTable::new();
        table.insert("YESYESYESNOYES", 45.0, 55.0);
        let bias = SignalEvaluator::classify_day(&reference, 500.0, &table);
        assert_eq!(bias.to_string(), "Bullish 55.00");
    }

    #[test]
    fn classify_day_defaults_on_missing_key() {
        let reference = reference_bar();
        let table = PercentileTable::new();
        let bias = SignalEvaluator::classify_day(&reference, 500.0, &table);
        assert!(bias.bullish);
        assert!((bias.pct - 50.0).abs() < 1e-9);
    }

    #[test]
    fn decision_call_vector() {
        let agg = OiAggregates {
            call_sum: 50.0,
            put_sum: 100.0,
            call_max_strike: 24500,
            call_max_oi: 5.0,
            put_max_strike: 24400,
            put_max_oi: 20.0,
        };
        // ratio 2.0 > 1.25, put_max - call_max = 15 > 0, diff = 50 > 0
        assert_eq!(SignalEvaluator::decide(&agg), Decision::Call);
    }

    #[test]
    fn decision_put_mirror() {
        let agg = OiAggregates {
            call_sum: 100.0,
            put_sum: 50.0,
            call_max_strike: 24500,
            call_max_oi: 20.0,
            put_max_strike: 24400,
            put_max_oi: 5.0,
        };
        assert_eq!(SignalEvaluator::decide(&agg), Decision::Put);
    }

    #[test]
    fn decision_neutral_on_zero_sums() {
        let agg = OiAggregates::default();
        assert_eq!(SignalEvaluator::decide(&agg), Decision::Neutral);
    }

    #[test]
    fn decision_zero_call_sum_is_call_side_only() {
        // Infinite ratio satisfies the CALL test but the PUT ratio test
        // can never pass alongside it.
        let agg = OiAggregates {
            call_sum: 0.0,
            put_sum: 10.0,
            call_max_oi: 1.0,
            put_max_oi: 5.0,
            ..Default::default()
        };
        assert_eq!(SignalEvaluator::decide(&agg), Decision::Call);
    }

    #[test]
    fn trend_labels() {
        assert_eq!(SignalEvaluator::trend(&[]), Trend::InsufficientData);
        assert_eq!(SignalEvaluator::trend(&[1.0]), Trend::InsufficientData);
        assert_eq!(
            SignalEvaluator::trend(&[1.0, 2.0, 3.0, 4.0, 5.0]),
            Trend::Up
        );
        assert_eq!(
            SignalEvaluator::trend(&[5.0, 4.0, 3.0, 2.0, 1.0]),
            Trend::Down
        );
        // Flat series has zero slope, labeled down
        assert_eq!(SignalEvaluator::trend(&[2.0, 2.0, 2.0]), Trend::Down);
    }
}
