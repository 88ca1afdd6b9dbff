//! Bybit connector: spot tickers plus linear perps (funding and open
//! interest come with the same bulk tickers call).

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::models::{PerpMarket, Ticker, Venue, VenueKind};
use crate::snapshot::MarketSnapshot;

use super::{get_json, http_client, normalize_symbol, Connector, ConnectorError, SymbolUniverse};

const BASE_URL: &str = "https://api.bybit.com";

pub struct Bybit {
    client: reqwest::Client,
    universe: SymbolUniverse,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(rename = "retCode")]
    ret_code: i64,
    result: Option<TickersResult>,
}

#[derive(Debug, Deserialize)]
struct TickersResult {
    list: Vec<TickerRow>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct TickerRow {
    symbol: String,
    #[serde(rename = "lastPrice")]
    last_price: String,
    #[serde(rename = "bid1Price")]
    bid1_price: String,
    #[serde(rename = "ask1Price")]
    ask1_price: String,
    #[serde(rename = "fundingRate")]
    funding_rate: String,
    #[serde(rename = "nextFundingTime")]
    next_funding_time: String,
    #[serde(rename = "openInterestValue")]
    open_interest_value: String,
}

impl Bybit {
    pub fn new(timeout: Duration, universe: SymbolUniverse) -> Self {
        Self { client: http_client(timeout), universe }
    }

    async fn fetch_category(&self, category: &str) -> Result<Vec<TickerRow>, ConnectorError> {
        let url = format!("{BASE_URL}/v5/market/tickers?category={category}");
        let response: ApiResponse = get_json(&self.client, &url).await?;
        if response.ret_code != 0 {
            return Err(ConnectorError::decode(
                "/v5/market/tickers",
                format!("retCode {}", response.ret_code),
            ));
        }
        response
            .result
            .map(|r| r.list)
            .ok_or_else(|| ConnectorError::decode("/v5/market/tickers", "missing result"))
    }
}

#[async_trait]
impl Connector for Bybit {
    fn venue(&self) -> Venue {
        Venue::Bybit
    }

    async fn refresh(&self, snapshot: &MarketSnapshot) -> Result<(), ConnectorError> {
        let now = Utc::now();

        let spot_rows = self.fetch_category("spot").await?;
        let mut tickers = Vec::new();
        for row in &spot_rows {
            let Some((base, quote)) = normalize_symbol(&row.symbol) else {
                continue;
            };
            if !self.universe.allows(&base, &quote) {
                continue;
            }
            let Some(last) = parse_positive(&row.last_price) else {
                continue;
            };
            tickers.push(Ticker {
                venue: Venue::Bybit,
                kind: VenueKind::Spot,
                base,
                quote,
                last,
                bid: parse_positive(&row.bid1_price),
                ask: parse_positive(&row.ask1_price),
                timestamp: now,
            });
        }

        let perp_rows = self.fetch_category("linear").await?;
        let mut perps = Vec::new();
        for row in &perp_rows {
            let Some((base, quote)) = normalize_symbol(&row.symbol) else {
                continue;
            };
            if !self.universe.allows(&base, &quote) {
                continue;
            }
            let Some(last) = parse_positive(&row.last_price) else {
                continue;
            };
            perps.push(PerpMarket {
                venue: Venue::Bybit,
                base,
                quote,
                last,
                bid: parse_positive(&row.bid1_price),
                ask: parse_positive(&row.ask1_price),
                funding_rate: row.funding_rate.parse().unwrap_or(0.0),
                funding_interval_hours: 8.0,
                next_funding_time: parse_ms(&row.next_funding_time),
                open_interest_usd: row.open_interest_value.parse().unwrap_or(0.0),
                timestamp: now,
            });
        }

        if tickers.is_empty() && perps.is_empty() {
            return Err(ConnectorError::decode("/v5/market/tickers", "empty ticker lists"));
        }
        snapshot.publish_tickers(Venue::Bybit, tickers);
        snapshot.publish_perps(Venue::Bybit, perps);
        Ok(())
    }
}

fn parse_positive(raw: &str) -> Option<f64> {
    raw.parse::<f64>().ok().filter(|p| *p > 0.0)
}

fn parse_ms(raw: &str) -> Option<DateTime<Utc>> {
    let ms = raw.parse::<i64>().ok()?;
    DateTime::from_timestamp_millis(ms)
}
