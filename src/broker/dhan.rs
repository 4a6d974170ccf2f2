use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{Datelike, DateTime, Duration as ChronoDuration, NaiveDate, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::time::Duration;

use crate::broker::Broker;
use crate::config::Config;
use crate::data::{LiveIndexSnapshot, MarketData};
use crate::models::{BarSeries, OptionChainSnapshot, OptionSide, StrikeRow};

const BASE_URL: &str = "https://api.dhan.co/v2";
const NIFTY_SECURITY_ID: i64 = 13;
const UNDERLYING_SEGMENT: &str = "IDX_I";
const OPTION_SEGMENT: &str = "NSE_FNO";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderResponse {
    order_id: String,
}

#[derive(Debug, Deserialize)]
struct LtpResponse {
    data: HashMap<String, HashMap<String, LtpEntry>>,
}

#[derive(Debug, Deserialize)]
struct LtpEntry {
    last_price: f64,
}

#[derive(Debug, Deserialize)]
struct QuoteResponse {
    data: HashMap<String, HashMap<String, QuoteEntry>>,
}

#[derive(Debug, Deserialize)]
struct QuoteEntry {
    last_price: f64,
    volume: f64,
    ohlc: Ohlc,
}

#[derive(Debug, Deserialize)]
struct Ohlc {
    open: f64,
    high: f64,
    low: f64,
}

#[derive(Debug, Deserialize)]
struct ChainResponse {
    status: Option<String>,
    data: Option<ChainData>,
}

#[derive(Debug, Deserialize)]
struct ChainData {
    #[serde(default)]
    last_price: f64,
    #[serde(default)]
    oc: HashMap<String, ChainStrike>,
}

#[derive(Debug, Deserialize, Default)]
struct ChainStrike {
    ce: Option<ChainLeg>,
    pe: Option<ChainLeg>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct ChainLeg {
    #[serde(default)]
    oi: f64,
    #[serde(default)]
    change_in_oi: f64,
    #[serde(default)]
    bid_price: f64,
    security_id: Option<serde_json::Value>,
}

impl ChainLeg {
    fn security_id_string(&self) -> Option<String> {
        match &self.security_id {
            Some(serde_json::Value::String(s)) if !s.is_empty() => Some(s.clone()),
            Some(serde_json::Value::Number(n)) => Some(n.to_string()),
            _ => None,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PlaceOrderRequest<'a> {
    dhan_client_id: &'a str,
    transaction_type: &'a str,
    exchange_segment: &'a str,
    product_type: &'a str,
    order_type: &'a str,
    security_id: &'a str,
    quantity: u32,
    price: f64,
}

/// REST client for the Dhan trading API. Constructed only when all three
/// credentials are configured; serves both the order capability and the
/// broker-side market data feed.
pub struct DhanClient {
    client: Client,
    client_id: String,
    access_token: String,
}

impl DhanClient {
    pub fn new(cfg: &Config) -> Self {
        Self {
            client: Client::new(),
            client_id: cfg.dhan_client_id.clone(),
            access_token: cfg.dhan_access_token.clone(),
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, format!("{}{}", BASE_URL, path))
            .timeout(REQUEST_TIMEOUT)
            .header("access-token", &self.access_token)
            .header("client-id", &self.client_id)
            .header("Content-Type", "application/json")
            .header("Accept", "application/json")
    }

    /// Nearest weekly expiry: the next Thursday, or today when today is one.
    pub fn nearest_weekly_expiry(today: NaiveDate) -> NaiveDate {
        let days_ahead =
            (3 + 7 - today.weekday().num_days_from_monday() as i64) % 7;
        today + ChronoDuration::days(days_ahead)
    }
}

#[async_trait]
impl Broker for DhanClient {
    async fn place_order(
        &self,
        identifier: &str,
        qty: u32,
        side: OptionSide,
        price: f64,
    ) -> Result<String> {
        let transaction_type = match side {
            OptionSide::Call => "BUY",
            OptionSide::Put => "SELL",
        };

        let resp = self
            .request(reqwest::Method::POST, "/orders")
            .json(&PlaceOrderRequest {
                dhan_client_id: &self.client_id,
                transaction_type,
                exchange_segment: OPTION_SEGMENT,
                product_type: "INTRADAY",
                order_type: "LIMIT",
                security_id: identifier,
                quantity: qty,
                price,
            })
            .send()
            .await
            .context("send place-order request")?;

        if !resp.status().is_success() {
            return Err(anyhow!("order rejected: HTTP {}", resp.status()));
        }

        let order: OrderResponse = resp.json().await.context("parse place-order response")?;
        Ok(order.order_id)
    }

    async fn cancel_order(&self, order_id: &str) -> Result<()> {
        let resp = self
            .request(reqwest::Method::DELETE, &format!("/orders/{}", order_id))
            .send()
            .await
            .context("send cancel-order request")?;

        if !resp.status().is_success() {
            return Err(anyhow!("cancel failed: HTTP {}", resp.status()));
        }
        Ok(())
    }

    async fn get_quote(&self, identifier: &str) -> Result<Option<f64>> {
        let resp = self
            .request(reqwest::Method::POST, "/marketfeed/ltp")
            .json(&json!({ OPTION_SEGMENT: [identifier] }))
            .send()
            .await
            .context("send ltp request")?;

        if !resp.status().is_success() {
            return Err(anyhow!("ltp failed: HTTP {}", resp.status()));
        }

        let parsed: LtpResponse = resp.json().await.context("parse ltp response")?;
        let ltp = parsed
            .data
            .get(OPTION_SEGMENT)
            .and_then(|seg| seg.get(identifier))
            .map(|e| e.last_price)
            .filter(|p| *p > 0.0);
        Ok(ltp)
    }
}

#[async_trait]
impl MarketData for DhanClient {
    async fn get_live_index_snapshot(&self) -> Result<Option<LiveIndexSnapshot>> {
        let resp = self
            .request(reqwest::Method::POST, "/marketfeed/quote")
            .json(&json!({ UNDERLYING_SEGMENT: [NIFTY_SECURITY_ID] }))
            .send()
            .await
            .context("send index quote request")?;

        if !resp.status().is_success() {
            return Err(anyhow!("index quote failed: HTTP {}", resp.status()));
        }

        let parsed: QuoteResponse = resp.json().await.context("parse index quote")?;
        let snapshot = parsed
            .data
            .get(UNDERLYING_SEGMENT)
            .and_then(|seg| seg.get(&NIFTY_SECURITY_ID.to_string()))
            .map(|q| LiveIndexSnapshot {
                open: q.ohlc.open,
                high: q.ohlc.high,
                low: q.ohlc.low,
                last: q.last_price,
                volume: q.volume,
                timestamp: Utc::now(),
            })
            .filter(|s| s.last > 0.0);
        Ok(snapshot)
    }

    async fn get_option_chain_snapshot(&self) -> Result<OptionChainSnapshot> {
        let expiry = Self::nearest_weekly_expiry(Utc::now().date_naive());

        let resp = self
            .request(reqwest::Method::POST, "/optionchain")
            .json(&json!({
                "UnderlyingScrip": NIFTY_SECURITY_ID,
                "UnderlyingSeg": UNDERLYING_SEGMENT,
                "Expiry": expiry.format("%Y-%m-%d").to_string(),
            }))
            .send()
            .await
            .context("send option chain request")?;

        if !resp.status().is_success() {
            return Err(anyhow!("option chain failed: HTTP {}", resp.status()));
        }

        let parsed: ChainResponse = resp.json().await.context("parse option chain")?;
        if parsed.status.as_deref() != Some("success") {
            return Ok(OptionChainSnapshot::default());
        }

        let Some(data) = parsed.data else {
            return Ok(OptionChainSnapshot::default());
        };

        let mut snapshot = OptionChainSnapshot {
            timestamp: timestamp_string(Utc::now()),
            underlying: data.last_price,
            ..Default::default()
        };

        for (strike_str, legs) in data.oc {
            let Ok(strike) = strike_str.parse::<f64>() else {
                continue;
            };
            let ce = legs.ce.unwrap_or_default();
            let pe = legs.pe.unwrap_or_default();
            snapshot.strikes.insert(
                strike.round() as i64,
                StrikeRow {
                    call_oi: ce.oi,
                    put_oi: pe.oi,
                    call_oi_change: ce.change_in_oi,
                    put_oi_change: pe.change_in_oi,
                    call_bid: ce.bid_price,
                    put_bid: pe.bid_price,
                    call_id: ce.security_id_string(),
                    put_id: pe.security_id_string(),
                },
            );
        }

        Ok(snapshot)
    }

    async fn get_historical_index_series(&self) -> Result<BarSeries> {
        // History comes from the scrape feed; the broker feed does not
        // serve a long index series.
        Ok(BarSeries::default())
    }
}

fn timestamp_string(now: DateTime<Utc>) -> String {
    now.format("%Y-%m-%d %H:%M:%S").to_string()
}
