use chrono::{DateTime, NaiveTime, Timelike, Utc};
use chrono_tz::Asia::Kolkata;

use crate::config::Config;

/// Answers the session-window questions for the NSE trading day. All checks
/// take an explicit instant so the windows are testable without a wall clock.
#[derive(Debug, Clone)]
pub struct MarketHours {
    open: NaiveTime,
    tick_end: NaiveTime,
    close: NaiveTime,
    entry_start: NaiveTime,
    entry_end: NaiveTime,
    eod: NaiveTime,
}

fn hm(t: (u32, u32)) -> NaiveTime {
    NaiveTime::from_hms_opt(t.0, t.1, 0).unwrap_or(NaiveTime::MIN)
}

impl MarketHours {
    pub fn new(cfg: &Config) -> Self {
        Self {
            open: hm(cfg.market_open),
            tick_end: hm(cfg.tick_window_end),
            close: hm(cfg.market_close),
            entry_start: hm(cfg.entry_start),
            entry_end: hm(cfg.entry_end),
            eod: hm(cfg.eod_close),
        }
    }

    fn ist(now: DateTime<Utc>) -> NaiveTime {
        now.with_timezone(&Kolkata).time()
    }

    /// Inside the active tick window (market open through last tick).
    pub fn in_tick_window(&self, now: DateTime<Utc>) -> bool {
        let t = Self::ist(now);
        t >= self.open && t <= self.tick_end
    }

    pub fn in_entry_window(&self, now: DateTime<Utc>) -> bool {
        let t = Self::ist(now);
        t >= self.entry_start && t <= self.entry_end
    }

    pub fn past_eod(&self, now: DateTime<Utc>) -> bool {
        Self::ist(now) >= self.eod
    }

    pub fn before_open(&self, now: DateTime<Utc>) -> bool {
        Self::ist(now) < self.open
    }

    pub fn past_close(&self, now: DateTime<Utc>) -> bool {
        Self::ist(now) >= self.close
    }

    /// Seconds remaining until market open today. Zero once open.
    pub fn secs_until_open(&self, now: DateTime<Utc>) -> u64 {
        let t = Self::ist(now);
        if t >= self.open {
            return 0;
        }
        let open_secs = u64::from(self.open.num_seconds_from_midnight());
        let now_secs = u64::from(t.num_seconds_from_midnight());
        open_secs - now_secs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::default_test_config;
    use chrono::TimeZone;

    fn utc_for_ist(hour: u32, minute: u32) -> DateTime<Utc> {
        // IST is UTC+5:30 year-round
        let total = i64::from(hour) * 60 + i64::from(minute) - 330;
        Utc.with_ymd_and_hms(2024, 3, 12, 0, 0, 0).unwrap() + chrono::Duration::minutes(total)
    }

    fn default_hours() -> MarketHours {
        let mut cfg = default_test_config();
        cfg.market_open = (9, 26);
        cfg.tick_window_end = (15, 25);
        cfg.market_close = (15, 30);
        cfg.entry_start = (11, 26);
        cfg.entry_end = (14, 25);
        cfg.eod_close = (15, 0);
        MarketHours::new(&cfg)
    }

    #[test]
    fn tick_window_bounds() {
        let h = default_hours();
        assert!(!h.in_tick_window(utc_for_ist(9, 25)));
        assert!(h.in_tick_window(utc_for_ist(9, 26)));
        assert!(h.in_tick_window(utc_for_ist(15, 25)));
        assert!(!h.in_tick_window(utc_for_ist(15, 26)));
    }

    #[test]
    fn entry_window_bounds() {
        let h = default_hours();
        assert!(!h.in_entry_window(utc_for_ist(11, 25)));
        assert!(h.in_entry_window(utc_for_ist(11, 26)));
        assert!(h.in_entry_window(utc_for_ist(14, 25)));
        assert!(!h.in_entry_window(utc_for_ist(14, 26)));
    }

    #[test]
    fn eod_and_close() {
        let h = default_hours();
        assert!(!h.past_eod(utc_for_ist(14, 59)));
        assert!(h.past_eod(utc_for_ist(15, 0)));
        assert!(!h.past_close(utc_for_ist(15, 29)));
        assert!(h.past_close(utc_for_ist(15, 30)));
    }

    #[test]
    fn until_open() {
        let h = default_hours();
        assert_eq!(h.secs_until_open(utc_for_ist(9, 20)), 360);
        assert_eq!(h.secs_until_open(utc_for_ist(10, 0)), 0);
        assert!(h.before_open(utc_for_ist(9, 0)));
        assert!(!h.before_open(utc_for_ist(9, 26)));
    }
}
