use crate::error::StrategyError;
use crate::models::{EnrichedBar, PriceBar};

const SHORT_WINDOW: usize = 10;
const LONG_WINDOW: usize = 20;
const MVA_WINDOW: usize = 7;
const RSI_WINDOW: usize = 14;
const BAND_WIDTH: f64 = 2.0;
const RSI_EPSILON: f64 = 1e-6;

/// Enrich an ordered bar sequence with rolling statistics. Same-length
/// output; windows shorter than their nominal size compute over the
/// available prefix (min-period-1).
pub fn enrich(bars: &[PriceBar]) -> Result<Vec<EnrichedBar>, StrategyError> {
    if bars.is_empty() {
        return Err(StrategyError::InvalidInput("empty bar sequence".into()));
    }
    if bars.iter().any(|b| !b.close.is_finite()) {
        return Err(StrategyError::InvalidInput(
            "non-finite closing price".into(),
        ));
    }

    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();

    let short_ma = rolling_mean(&closes, SHORT_WINDOW);
    let long_ma = rolling_mean(&closes, LONG_WINDOW);
    let std_dev = rolling_std(&closes, LONG_WINDOW);
    let ma7 = rolling_mean(&closes, MVA_WINDOW);

    let deltas: Vec<f64> = std::iter::once(0.0)
        .chain(closes.windows(2).map(|w| w[1] - w[0]))
        .collect();
    let gains: Vec<f64> = deltas.iter().map(|d| d.max(0.0)).collect();
    let losses: Vec<f64> = deltas.iter().map(|d| (-d).max(0.0)).collect();
    let avg_gain = rolling_mean(&gains, RSI_WINDOW);
    let avg_loss = rolling_mean(&losses, RSI_WINDOW);

    let enriched = bars
        .iter()
        .enumerate()
        .map(|(i, bar)| {
            // Zero average loss degenerates the ratio; substitute a small
            // epsilon so RSI tends to 100 instead of dividing by zero.
            let rd = if avg_loss[i] == 0.0 {
                RSI_EPSILON
            } else {
                avg_loss[i]
            };
            let rs = avg_gain[i] / rd;
            let rsi = 100.0 - (100.0 / (1.0 + rs));

            let momentum = if deltas[i] > 0.0 {
                1
            } else if deltas[i] < 0.0 {
                -1
            } else {
                0
            };

            EnrichedBar {
                bar: bar.clone(),
                short_ma: short_ma[i],
                long_ma: long_ma[i],
                std_dev: std_dev[i],
                upper_band: long_ma[i] + BAND_WIDTH * std_dev[i],
                lower_band: long_ma[i] - BAND_WIDTH * std_dev[i],
                ma7: ma7[i],
                momentum,
                rsi,
            }
        })
        .collect();

    Ok(enriched)
}

fn rolling_mean(values: &[f64], window: usize) -> Vec<f64> {
    values
        .iter()
        .enumerate()
        .map(|(i, _)| {
            let start = (i + 1).saturating_sub(window);
            let slice = &values[start..=i];
            slice.iter().sum::<f64>() / slice.len() as f64
        })
        .collect()
}

/// Sample standard deviation per rolling window; 0 for fewer than 2 samples.
fn rolling_std(values: &[f64], window: usize) -> Vec<f64> {
    values
        .iter()
        .enumerate()
        .map(|(i, _)| {
            let start = (i + 1).saturating_sub(window);
            let slice = &values[start..=i];
            if slice.len() < 2 {
                return 0.0;
            }
            let mean = slice.iter().sum::<f64>() / slice.len() as f64;
            let var = slice.iter().map(|v| (v - mean).powi(2)).sum::<f64>()
                / (slice.len() - 1) as f64;
            var.sqrt()
        })
        .collect()
}
