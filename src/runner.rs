use chrono::Utc;
use chrono_tz::Asia::Kolkata;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{info, warn};

use crate::config::{RunMode, SharedConfig};
use crate::core::hours::MarketHours;
use crate::data::DataFetcher;
use crate::error::StrategyError;
use crate::models::{
    BarSeries, Decision, EnrichedBar, OptionChainSnapshot, OptionSide, SignalRow, Trend,
};
use crate::persist::Persister;
use crate::strategies::evaluator::{PercentileTable, SignalEvaluator};
use crate::strategies::indicators;
use crate::trading::OrderManager;

/// Cooperative stop flag. Sleeps check it in small increments so every
/// suspension point in the loop, including the pre-open wait, reacts within
/// about a second.
#[derive(Clone, Default)]
pub struct StopSignal {
    flag: Arc<AtomicBool>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }

    /// Sleep for `dur`, waking early on stop. Returns true when stopped.
    pub async fn sleep(&self, dur: Duration) -> bool {
        let mut remaining = dur;
        while remaining > Duration::ZERO {
            if self.is_stopped() {
                return true;
            }
            let step = remaining.min(Duration::from_secs(1));
            tokio::time::sleep(step).await;
            remaining -= step;
        }
        self.is_stopped()
    }
}

/// Top-level control loop. Owns every collaborator it needs; lifecycle
/// belongs to whoever calls `start`.
pub struct StrategyRunner {
    cfg: SharedConfig,
    hours: MarketHours,
    fetcher: DataFetcher,
    orders: Arc<OrderManager>,
    table: PercentileTable,
    persister: Persister,
    stop: StopSignal,
    running: AtomicBool,
    last_tick: Mutex<Option<String>>,
}

impl StrategyRunner {
    pub fn new(
        cfg: SharedConfig,
        fetcher: DataFetcher,
        orders: Arc<OrderManager>,
        table: PercentileTable,
    ) -> Arc<Self> {
        let hours = MarketHours::new(&cfg);
        let persister = Persister::new(&cfg.assets_dir);
        Arc::new(Self {
            cfg,
            hours,
            fetcher,
            orders,
            table,
            persister,
            stop: StopSignal::new(),
            running: AtomicBool::new(false),
            last_tick: Mutex::new(None),
        })
    }

    /// Start the control loop on the runtime. No-op when one is already
    /// active; refuses outright after market close; before market open the
    /// spawned loop waits (cancellably) until the open.
    pub fn start(self: &Arc<Self>) -> bool {
        if self.running.swap(true, Ordering::SeqCst) {
            info!("Runner already active");
            return false;
        }
        if self.hours.past_close(Utc::now()) {
            info!("Markets are closed. Runner will not start.");
            self.running.store(false, Ordering::SeqCst);
            return false;
        }

        self.stop.reset();
        let runner = Arc::clone(self);
        tokio::spawn(async move {
            runner.run().await;
            runner.running.store(false, Ordering::SeqCst);
        });
        true
    }

    /// Signal the loop to exit. It leaves within one idle interval; open
    /// monitors are not waited for and drain on their own.
    pub fn stop(&self) {
        self.stop.stop();
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn last_tick_time(&self) -> Option<String> {
        self.last_tick.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    async fn run(self: &Arc<Self>) {
        let now = Utc::now();
        if self.hours.before_open(now) {
            let wait = self.hours.secs_until_open(now);
            info!("Waiting {} minute(s) until market open", wait / 60);
            if self.stop.sleep(Duration::from_secs(wait)).await {
                return;
            }
        }

        // Seed the retained window and the day-classification reference
        // from the historical series
        let hist = self.fetcher.fetch_history().await;
        let day_ref = indicators::enrich(hist.as_slice())
            .ok()
            .and_then(|mut rows| rows.pop());
        let mut today = hist.tail(self.cfg.history_seed_len);
        let mut signal_rows: Vec<SignalRow> = Vec::new();

        info!("Strategy loop started ({:?} mode)", self.cfg.mode);

        while !self.stop.is_stopped() {
            let now = Utc::now();
            if self.hours.in_tick_window(now) {
                if let Err(e) = self
                    .tick(&day_ref, &mut today, &mut signal_rows)
                    .await
                {
                    warn!("Cycle skipped: {}", e);
                }
                if self.stop.sleep(self.cfg.tick_interval).await {
                    break;
                }
            } else if self.stop.sleep(self.cfg.idle_interval).await {
                break;
            }
        }

        info!("Strategy loop stopped");
    }

    /// One strategy cycle. Failures surface as errors and cost only this
    /// cycle; nothing unwinds past here.
    async fn tick(
        &self,
        day_ref: &Option<EnrichedBar>,
        today: &mut BarSeries,
        signal_rows: &mut Vec<SignalRow>,
    ) -> Result<(), StrategyError> {
        // 1. Live bar into the retained window
        let bar = self.fetcher.fetch_live_bar().await?;
        let tick_time = Utc::now()
            .with_timezone(&Kolkata)
            .format("%H:%M:%S")
            .to_string();
        *self
            .last_tick
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some(tick_time.clone());

        let today_open = bar.open;
        today.push(bar);
        let enriched = indicators::enrich(today.as_slice())?;
        let momentum = enriched.last().map_or(0, |r| r.momentum);

        // 2. OI snapshot, bounded retry inside the fetcher
        let chain = self.fetcher.fetch_option_chain().await;

        // 3. Signal row; an empty chain skips the OI-dependent steps
        if chain.is_empty() {
            warn!("Empty option chain; no signal row this cycle");
        } else {
            let agg = chain.aggregate();
            let decision = SignalEvaluator::decide(&agg);
            let day_bias = day_ref
                .as_ref()
                .map(|r| SignalEvaluator::classify_day(r, today_open, &self.table))
                .unwrap_or_default();

            signal_rows.push(SignalRow {
                timestamp: chain.timestamp.clone(),
                underlying: chain.underlying,
                call_oi_change_sum: agg.call_sum,
                put_oi_change_sum: agg.put_sum,
                oi_diff: agg.diff(),
                pcr: agg.pcr(),
                call_max_strike: agg.call_max_strike,
                call_max_oi: agg.call_max_oi,
                put_max_strike: agg.put_max_strike,
                put_max_oi: agg.put_max_oi,
                decision,
                day_bias,
                trend: Trend::InsufficientData,
            });

            let diffs: Vec<f64> = signal_rows.iter().map(|r| r.oi_diff).collect();
            let start = diffs.len().saturating_sub(self.cfg.trend_window);
            let trend = SignalEvaluator::trend(&diffs[start..]);
            if let Some(last) = signal_rows.last_mut() {
                last.trend = trend;
            }

            info!(
                "Cycle {}: decision={} trend={} bias={} pcr={:.2}",
                tick_time, decision, trend, day_bias, agg.pcr()
            );
        }

        // 4. Persist working datasets and the liveness marker
        self.persister.write_enriched_history(&enriched);
        if !chain.is_empty() {
            self.persister.write_option_chain(&chain);
        }
        self.persister.write_signal_history(signal_rows);
        self.persister.touch_liveness(&tick_time);

        // 5. Entry window, gated to a single open position
        let now = Utc::now();
        if self.hours.in_entry_window(now) && !self.orders.registry().entry_gate().await {
            if let Some(row) = signal_rows.last() {
                self.try_enter(row, momentum, &chain).await;
            }
        }

        // 6. End-of-day sweep
        if self.hours.past_eod(now) {
            self.close_all(&chain).await;
        }

        Ok(())
    }

    /// The confluence gate: decision, trend and day classification must
    /// agree directionally, and the latest momentum sign with them.
    async fn try_enter(&self, row: &SignalRow, momentum: i8, chain: &OptionChainSnapshot) {
        let side = if row.decision == Decision::Call
            && row.trend == Trend::Up
            && row.day_bias.bullish
            && momentum == 1
        {
            Some(OptionSide::Call)
        } else if row.decision == Decision::Put
            && row.trend == Trend::Down
            && !row.day_bias.bullish
            && momentum == -1
        {
            Some(OptionSide::Put)
        } else {
            None
        };

        let Some(side) = side else { return };

        let strike = match side {
            OptionSide::Call => row.call_max_strike,
            OptionSide::Put => row.put_max_strike,
        };
        let Some(identifier) = chain.instrument_for(strike, side).map(str::to_string) else {
            warn!("No instrument id at strike {} for {}", strike, side);
            return;
        };
        let Some(bid) = chain.bid_for(strike, side) else {
            warn!("No bid at strike {} for {}", strike, side);
            return;
        };

        let want_live = self.cfg.mode == RunMode::Live;
        let result = if want_live && self.orders.has_broker() {
            self.orders
                .open_live_trade(&identifier, self.cfg.lot_qty, side, strike, bid)
                .await
        } else {
            if want_live {
                warn!("Live mode without broker; entering paper trade instead");
            }
            self.orders
                .open_paper_trade(&identifier, self.cfg.lot_qty, side, strike, bid)
                .await
        };

        match result {
            Ok(trade) => info!("Order placed: {} @ {:.2}", trade.option_descriptor(), bid),
            Err(e) => warn!("Order entry failed: {}", e),
        }
    }

    /// Force-close everything still open at the chain's best bid, unknown
    /// price when the strike is absent, then drop the entry gate.
    async fn close_all(&self, chain: &OptionChainSnapshot) {
        let open = self.orders.open_trades().await;
        if !open.is_empty() {
            info!("End of day: closing {} open trade(s)", open.len());
            for trade in open {
                let price = chain.bid_for(trade.strike, trade.side);
                if price.is_none() {
                    warn!(
                        "No end-of-day price for {}; closing at unknown",
                        trade.option_descriptor()
                    );
                }
                self.orders.close_trade(&trade.identifier, price).await;
            }
        }
        self.orders.registry().clear_entry_gate().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{default_test_config, test_fetcher, test_manager};

    #[tokio::test]
    async fn stop_signal_interrupts_sleep() {
        let stop = StopSignal::new();
        let stopper = stop.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            stopper.stop();
        });
        let started = std::time::Instant::now();
        assert!(stop.sleep(Duration::from_secs(30)).await);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    fn runner_for(cfg: crate::config::Config, tag: &str) -> Arc<StrategyRunner> {
        StrategyRunner::new(
            cfg.shared(),
            test_fetcher(),
            test_manager(tag),
            PercentileTable::new(),
        )
    }

    #[tokio::test]
    async fn start_refuses_after_market_close() {
        let mut cfg = default_test_config();
        cfg.market_close = (0, 0); // any instant is past close
        let runner = runner_for(cfg, "runner_refuse");
        assert!(!runner.start());
        assert!(!runner.is_running());
    }

    #[tokio::test]
    async fn start_twice_is_a_noop_then_stop_exits() {
        let cfg = default_test_config(); // windows span the whole day
        let runner = runner_for(cfg, "runner_noop");

        assert!(runner.start());
        assert!(!runner.start());
        assert!(runner.is_running());

        runner.stop();
        for _ in 0..100 {
            if !runner.is_running() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(!runner.is_running());
    }
}
