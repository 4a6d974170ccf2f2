use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceBar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// A bar plus the rolling statistics derived from the sequence prefix ending
/// at it. Recomputed each cycle over the retained window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichedBar {
    #[serde(flatten)]
    pub bar: PriceBar,
    pub short_ma: f64,
    pub long_ma: f64,
    pub std_dev: f64,
    pub upper_band: f64,
    pub lower_band: f64,
    pub ma7: f64,
    /// Sign of the close-to-close delta: -1, 0 or +1.
    pub momentum: i8,
    pub rsi: f64,
}

/// Wraps Vec<PriceBar>; ordered, append-only within a trading session.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BarSeries {
    bars: Vec<PriceBar>,
}

impl BarSeries {
    pub fn new(bars: Vec<PriceBar>) -> Self {
        Self { bars }
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn last(&self) -> Option<&PriceBar> {
        self.bars.last()
    }

    pub fn tail(&self, n: usize) -> BarSeries {
        let start = self.bars.len().saturating_sub(n);
        BarSeries::new(self.bars[start..].to_vec())
    }

    pub fn push(&mut self, bar: PriceBar) {
        self.bars.push(bar);
    }

    pub fn as_slice(&self) -> &[PriceBar] {
        &self.bars
    }

    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close).collect()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PriceBar> {
        self.bars.iter()
    }
}

impl std::ops::Index<usize> for BarSeries {
    type Output = PriceBar;
    fn index(&self, index: usize) -> &Self::Output {
        &self.bars[index]
    }
}

impl<'a> IntoIterator for &'a BarSeries {
    type Item = &'a PriceBar;
    type IntoIter = std::slice::Iter<'a, PriceBar>;
    fn into_iter(self) -> Self::IntoIter {
        self.bars.iter()
    }
}

#[cfg(test)]
mod tests {
    use crate::test_helpers::make_bars;

    #[test]
    fn series_tail_and_push() {
        let mut s = make_bars(&[100.0, 101.0, 102.0, 103.0]);
        let tail = s.tail(2);
        assert_eq!(tail.len(), 2);
        assert!((tail[0].close - 102.0).abs() < 1e-9);

        let next = s[3].clone();
        s.push(next);
        assert_eq!(s.len(), 5);
    }

    #[test]
    fn series_tail_larger_than_len() {
        let s = make_bars(&[100.0, 101.0]);
        assert_eq!(s.tail(18).len(), 2);
    }
}
