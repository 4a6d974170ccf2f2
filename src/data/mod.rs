pub mod nse;

pub use nse::NseClient;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::StrategyError;
use crate::models::{BarSeries, OptionChainSnapshot, PriceBar};

/// Live index quote as served by the feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveIndexSnapshot {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub last: f64,
    pub volume: f64,
    pub timestamp: DateTime<Utc>,
}

impl LiveIndexSnapshot {
    pub fn to_bar(&self) -> PriceBar {
        PriceBar {
            timestamp: self.timestamp,
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.last,
            volume: self.volume,
        }
    }
}

/// Market-data capability: live index, option chain, historical series.
#[async_trait]
pub trait MarketData: Send + Sync {
    async fn get_live_index_snapshot(&self) -> Result<Option<LiveIndexSnapshot>>;

    /// Empty snapshot when the venue has nothing to say.
    async fn get_option_chain_snapshot(&self) -> Result<OptionChainSnapshot>;

    async fn get_historical_index_series(&self) -> Result<BarSeries>;
}

/// Composes the broker-backed feed (preferred) with the scrape feed
/// (fallback) and owns the bounded retry policy for the option chain.
/// Failures come back as explicit results; callers skip the cycle, they
/// never unwind.
pub struct DataFetcher {
    primary: Option<Arc<dyn MarketData>>,
    fallback: Arc<dyn MarketData>,
    retries: u32,
    backoff: Duration,
}

impl DataFetcher {
    pub fn new(
        primary: Option<Arc<dyn MarketData>>,
        fallback: Arc<dyn MarketData>,
        cfg: &Config,
    ) -> Self {
        Self {
            primary,
            fallback,
            retries: cfg.oi_fetch_retries,
            backoff: cfg.oi_retry_backoff,
        }
    }

    fn sources(&self) -> impl Iterator<Item = &Arc<dyn MarketData>> {
        self.primary.iter().chain(std::iter::once(&self.fallback))
    }

    /// Current live index bar, broker feed first.
    pub async fn fetch_live_bar(&self) -> Result<PriceBar, StrategyError> {
        for source in self.sources() {
            match source.get_live_index_snapshot().await {
                Ok(Some(snap)) => return Ok(snap.to_bar()),
                Ok(None) => {}
                Err(e) => warn!("Live index fetch failed: {}", e),
            }
        }
        Err(StrategyError::DataUnavailable(
            "no live index snapshot from any source".into(),
        ))
    }

    /// Option chain with bounded retry. Each attempt tries the broker feed
    /// then the scrape feed; after all attempts the result is an empty
    /// snapshot, never an error.
    pub async fn fetch_option_chain(&self) -> OptionChainSnapshot {
        for attempt in 0..=self.retries {
            for source in self.sources() {
                match source.get_option_chain_snapshot().await {
                    Ok(chain) if !chain.is_empty() => {
                        info!("Option chain fetched on attempt {}", attempt + 1);
                        return chain;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!("Option chain attempt {} failed: {}", attempt + 1, e)
                    }
                }
            }
            if attempt < self.retries {
                warn!("Retrying option chain fetch in {:?}", self.backoff);
                tokio::time::sleep(self.backoff).await;
            }
        }
        warn!("All option chain attempts failed, returning empty snapshot");
        OptionChainSnapshot::default()
    }

    /// Historical index series; empty when no source can supply one.
    pub async fn fetch_history(&self) -> BarSeries {
        for source in self.sources() {
            match source.get_historical_index_series().await {
                Ok(series) if !series.is_empty() => return series,
                Ok(_) => {}
                Err(e) => warn!("Historical series fetch failed: {}", e),
            }
        }
        BarSeries::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Default)]
    struct FailingFeed {
        calls: AtomicU32,
    }

    #[async_trait]
    impl MarketData for FailingFeed {
        async fn get_live_index_snapshot(&self) -> Result<Option<LiveIndexSnapshot>> {
            Ok(None)
        }

        async fn get_option_chain_snapshot(&self) -> Result<OptionChainSnapshot> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            bail!("venue down")
        }

        async fn get_historical_index_series(&self) -> Result<BarSeries> {
            Ok(BarSeries::default())
        }
    }

    fn fast_retry_config() -> Config {
        let mut cfg = crate::test_helpers::default_test_config();
        cfg.oi_fetch_retries = 2;
        cfg.oi_retry_backoff = Duration::from_millis(0);
        cfg
    }

    #[tokio::test]
    async fn chain_fetch_exhausts_attempts_then_returns_empty() {
        let feed = Arc::new(FailingFeed::default());
        let fetcher = DataFetcher::new(None, feed.clone(), &fast_retry_config());

        let chain = fetcher.fetch_option_chain().await;
        assert!(chain.is_empty());
        // 1 initial attempt + 2 retries
        assert_eq!(feed.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn live_bar_unavailable_from_all_sources() {
        let feed = Arc::new(FailingFeed::default());
        let fetcher = DataFetcher::new(None, feed, &fast_retry_config());
        assert!(matches!(
            fetcher.fetch_live_bar().await,
            Err(StrategyError::DataUnavailable(_))
        ));
    }
}
