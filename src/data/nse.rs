use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::data::{LiveIndexSnapshot, MarketData};
use crate::models::{BarSeries, OptionChainSnapshot, PriceBar, StrikeRow};

const BASE_URL: &str = "https://www.nseindia.com";
const HIST_MOUNT: &str = "https://www.nseindia.com/reports-indices-historical-index-data";
const INDEX_NAME: &str = "NIFTY 50";
const CHAIN_SYMBOL: &str = "NIFTY";
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64)";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const HIST_CUTOFF: (i32, u32, u32) = (2013, 1, 1);

#[derive(Debug, Deserialize)]
struct AllIndicesResponse {
    data: Vec<IndexQuote>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IndexQuote {
    index: String,
    open: f64,
    high: f64,
    low: f64,
    last: f64,
    #[serde(default)]
    total_traded_volume: f64,
}

#[derive(Debug, Deserialize)]
struct ChainResponse {
    records: ChainRecords,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChainRecords {
    #[serde(default)]
    expiry_dates: Vec<String>,
    #[serde(default)]
    data: Vec<ChainEntry>,
    #[serde(default)]
    timestamp: String,
    #[serde(default)]
    underlying_value: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChainEntry {
    strike_price: f64,
    expiry_date: String,
    #[serde(rename = "CE")]
    ce: Option<ChainLeg>,
    #[serde(rename = "PE")]
    pe: Option<ChainLeg>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct ChainLeg {
    #[serde(default)]
    open_interest: f64,
    #[serde(default)]
    changein_open_interest: f64,
    #[serde(default, rename = "bidprice")]
    bid_price: f64,
    identifier: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HistResponse {
    data: HistData,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HistData {
    #[serde(default)]
    index_close_online_records: Vec<HistRecord>,
}

#[derive(Debug, Deserialize)]
struct HistRecord {
    #[serde(rename = "EOD_TIMESTAMP")]
    timestamp: String,
    #[serde(rename = "EOD_OPEN_INDEX_VAL")]
    open: f64,
    #[serde(rename = "EOD_HIGH_INDEX_VAL")]
    high: f64,
    #[serde(rename = "EOD_LOW_INDEX_VAL")]
    low: f64,
    #[serde(rename = "EOD_CLOSE_INDEX_VAL")]
    close: f64,
    #[serde(rename = "HIT_TRADED_QTY", default)]
    volume: f64,
}

/// Scrape client for the public NSE endpoints. The site requires a cookie
/// bootstrap against a report page before the JSON APIs answer; cookies are
/// cached and refreshed on demand.
pub struct NseClient {
    client: Client,
    cookies: Mutex<Option<String>>,
}

impl NseClient {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            cookies: Mutex::new(None),
        }
    }

    async fn ensure_cookies(&self) -> Result<String> {
        let mut cached = self.cookies.lock().await;
        if let Some(c) = cached.as_ref() {
            return Ok(c.clone());
        }

        let resp = self
            .client
            .get(HIST_MOUNT)
            .timeout(REQUEST_TIMEOUT)
            .header("user-agent", USER_AGENT)
            .header("accept", "application/json,text/html,*/*")
            .send()
            .await
            .context("cookie bootstrap request")?;

        let jar: Vec<String> = resp
            .headers()
            .get_all(reqwest::header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .filter_map(|v| v.split(';').next())
            .map(str::to_string)
            .collect();

        if jar.is_empty() {
            return Err(anyhow!("no cookies issued"));
        }

        let joined = jar.join("; ");
        *cached = Some(joined.clone());
        Ok(joined)
    }

    async fn invalidate_cookies(&self) {
        *self.cookies.lock().await = None;
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T> {
        let cookies = self.ensure_cookies().await?;
        let resp = self
            .client
            .get(url)
            .timeout(REQUEST_TIMEOUT)
            .header("user-agent", USER_AGENT)
            .header("referer", HIST_MOUNT)
            .header("accept", "application/json,text/html,*/*")
            .header("cookie", cookies)
            .send()
            .await
            .with_context(|| format!("request {url}"))?;

        if !resp.status().is_success() {
            // Stale cookies are the usual cause; force a refresh next call
            self.invalidate_cookies().await;
            return Err(anyhow!("HTTP {} from {}", resp.status(), url));
        }

        resp.json::<T>().await.with_context(|| format!("parse {url}"))
    }

    async fn fetch_hist_chunk(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<HistRecord>> {
        let url = format!(
            "{}/api/historical/indicesHistory?indexType=NIFTY%2050&from={}&to={}",
            BASE_URL,
            from.format("%d-%m-%Y"),
            to.format("%d-%m-%Y"),
        );
        let parsed: HistResponse = self.get_json(&url).await?;
        Ok(parsed.data.index_close_online_records)
    }
}

impl Default for NseClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MarketData for NseClient {
    async fn get_live_index_snapshot(&self) -> Result<Option<LiveIndexSnapshot>> {
        let url = format!("{}/api/allIndices", BASE_URL);
        let parsed: AllIndicesResponse = self.get_json(&url).await?;

        let snapshot = parsed
            .data
            .into_iter()
            .find(|q| q.index == INDEX_NAME)
            .map(|q| LiveIndexSnapshot {
                open: q.open,
                high: q.high,
                low: q.low,
                last: q.last,
                volume: q.total_traded_volume,
                timestamp: Utc::now(),
            })
            .filter(|s| s.last > 0.0);
        Ok(snapshot)
    }

    async fn get_option_chain_snapshot(&self) -> Result<OptionChainSnapshot> {
        let url = format!(
            "{}/api/option-chain-indices?symbol={}",
            BASE_URL, CHAIN_SYMBOL
        );
        let parsed: ChainResponse = self.get_json(&url).await?;

        let Some(nearest_expiry) = parsed.records.expiry_dates.first().cloned() else {
            return Ok(OptionChainSnapshot::default());
        };

        let mut snapshot = OptionChainSnapshot {
            timestamp: parsed.records.timestamp,
            underlying: parsed.records.underlying_value,
            ..Default::default()
        };

        for entry in parsed.records.data {
            if entry.expiry_date != nearest_expiry {
                continue;
            }
            let ce = entry.ce.unwrap_or_default();
            let pe = entry.pe.unwrap_or_default();
            snapshot.strikes.insert(
                entry.strike_price.round() as i64,
                StrikeRow {
                    call_oi: ce.open_interest,
                    put_oi: pe.open_interest,
                    call_oi_change: ce.changein_open_interest,
                    put_oi_change: pe.changein_open_interest,
                    call_bid: ce.bid_price,
                    put_bid: pe.bid_price,
                    call_id: ce.identifier,
                    put_id: pe.identifier,
                },
            );
        }

        Ok(snapshot)
    }

    /// Daily index history back to the cutoff, fetched in one-year chunks
    /// the way the reports API expects, oldest first. Zero volumes are
    /// carried forward from the previous session.
    async fn get_historical_index_series(&self) -> Result<BarSeries> {
        let cutoff =
            NaiveDate::from_ymd_opt(HIST_CUTOFF.0, HIST_CUTOFF.1, HIST_CUTOFF.2).unwrap();
        let mut to = Utc::now().date_naive();
        let mut records: Vec<(DateTime<Utc>, HistRecord)> = Vec::new();

        while to > cutoff {
            let from = (to - ChronoDuration::days(365)).max(cutoff);
            match self.fetch_hist_chunk(from, to).await {
                Ok(chunk) => {
                    for rec in chunk {
                        match parse_eod_timestamp(&rec.timestamp) {
                            Some(ts) => records.push((ts, rec)),
                            None => debug!("Unparseable EOD timestamp: {}", rec.timestamp),
                        }
                    }
                }
                Err(e) => warn!("History chunk {}..{} failed: {}", from, to, e),
            }
            to = from;
        }

        records.sort_by_key(|(ts, _)| *ts);

        let mut last_volume = 0.0;
        let bars: Vec<PriceBar> = records
            .into_iter()
            .map(|(ts, rec)| {
                let volume = if rec.volume > 0.0 {
                    last_volume = rec.volume;
                    rec.volume
                } else {
                    last_volume
                };
                PriceBar {
                    timestamp: ts,
                    open: rec.open,
                    high: rec.high,
                    low: rec.low,
                    close: rec.close,
                    volume,
                }
            })
            .collect();

        Ok(BarSeries::new(bars))
    }
}

fn parse_eod_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    // The reports API serves "12-Mar-2024"; some records carry a full
    // datetime
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%d-%b-%Y") {
        return date
            .and_hms_opt(0, 0, 0)
            .map(|naive| Utc.from_utc_datetime(&naive));
    }
    NaiveDateTime::parse_from_str(raw, "%d-%b-%Y %H:%M:%S")
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive))
}
