use serde::{Deserialize, Serialize};
use std::fmt;

/// Per-cycle trading decision derived from the OI snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Decision {
    Call,
    Put,
    Neutral,
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::Call => write!(f, "CALL"),
            Decision::Put => write!(f, "PUT"),
            Decision::Neutral => write!(f, "NEUTRAL"),
        }
    }
}

/// Slope label of the running OI-difference series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Trend {
    Up,
    Down,
    InsufficientData,
}

impl fmt::Display for Trend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trend::Up => write!(f, "up"),
            Trend::Down => write!(f, "down"),
            Trend::InsufficientData => write!(f, "insufficient data"),
        }
    }
}

/// Day classification from the historical percentile table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DayBias {
    pub bullish: bool,
    pub pct: f64,
}

impl DayBias {
    pub fn bullish(pct: f64) -> Self {
        Self { bullish: true, pct }
    }

    pub fn bearish(pct: f64) -> Self {
        Self {
            bullish: false,
            pct,
        }
    }
}

impl Default for DayBias {
    fn default() -> Self {
        DayBias::bullish(50.0)
    }
}

impl fmt::Display for DayBias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = if self.bullish { "Bullish" } else { "Bearish" };
        write!(f, "{} {:.2}", label, self.pct)
    }
}

/// One row of the running signal history; the latest row gates trade entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalRow {
    pub timestamp: String,
    pub underlying: f64,
    pub call_oi_change_sum: f64,
    pub put_oi_change_sum: f64,
    pub oi_diff: f64,
    pub pcr: f64,
    pub call_max_strike: i64,
    pub call_max_oi: f64,
    pub put_max_strike: i64,
    pub put_max_oi: f64,
    pub decision: Decision,
    pub day_bias: DayBias,
    pub trend: Trend,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_labels() {
        assert_eq!(Decision::Call.to_string(), "CALL");
        assert_eq!(Trend::InsufficientData.to_string(), "insufficient data");
        assert_eq!(DayBias::bearish(60.0).to_string(), "Bearish 60.00");
        assert_eq!(DayBias::default().to_string(), "Bullish 50.00");
    }
}
