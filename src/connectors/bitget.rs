//! Bitget connector: spot tickers and USDT-futures perps, one bulk call
//! each.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;

use crate::models::{PerpMarket, Ticker, Venue, VenueKind};
use crate::snapshot::MarketSnapshot;

use super::{get_json, http_client, normalize_symbol, Connector, ConnectorError, SymbolUniverse};

const BASE_URL: &str = "https://api.bitget.com";

pub struct Bitget {
    client: reqwest::Client,
    universe: SymbolUniverse,
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    code: String,
    data: Option<Vec<T>>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct TickerRow {
    symbol: String,
    #[serde(rename = "lastPr")]
    last_pr: String,
    #[serde(rename = "bidPr")]
    bid_pr: String,
    #[serde(rename = "askPr")]
    ask_pr: String,
    #[serde(rename = "fundingRate")]
    funding_rate: String,
    #[serde(rename = "holdingAmount")]
    holding_amount: String,
}

impl Bitget {
    pub fn new(timeout: Duration, universe: SymbolUniverse) -> Self {
        Self { client: http_client(timeout), universe }
    }

    async fn fetch_rows(&self, path: &str) -> Result<Vec<TickerRow>, ConnectorError> {
        let response: ApiResponse<TickerRow> =
            get_json(&self.client, &format!("{BASE_URL}{path}")).await?;
        if response.code != "00000" {
            return Err(ConnectorError::decode(path, format!("code {}", response.code)));
        }
        response
            .data
            .ok_or_else(|| ConnectorError::decode(path, "missing data"))
    }
}

#[async_trait]
impl Connector for Bitget {
    fn venue(&self) -> Venue {
        Venue::Bitget
    }

    async fn refresh(&self, snapshot: &MarketSnapshot) -> Result<(), ConnectorError> {
        let now = Utc::now();

        let spot_rows = self.fetch_rows("/api/v2/spot/market/tickers").await?;
        let mut tickers = Vec::new();
        for row in &spot_rows {
            let Some((base, quote)) = normalize_symbol(&row.symbol) else {
                continue;
            };
            if !self.universe.allows(&base, &quote) {
                continue;
            }
            let Some(last) = parse_positive(&row.last_pr) else {
                continue;
            };
            tickers.push(Ticker {
                venue: Venue::Bitget,
                kind: VenueKind::Spot,
                base,
                quote,
                last,
                bid: parse_positive(&row.bid_pr),
                ask: parse_positive(&row.ask_pr),
                timestamp: now,
            });
        }

        let perp_rows = self
            .fetch_rows("/api/v2/mix/market/tickers?productType=USDT-FUTURES")
            .await?;
        let mut perps = Vec::new();
        for row in &perp_rows {
            let Some((base, quote)) = normalize_symbol(&row.symbol) else {
                continue;
            };
            if !self.universe.allows(&base, &quote) {
                continue;
            }
            let Some(last) = parse_positive(&row.last_pr) else {
                continue;
            };
            let holding = row.holding_amount.parse::<f64>().unwrap_or(0.0);
            perps.push(PerpMarket {
                venue: Venue::Bitget,
                base,
                quote,
                last,
                bid: parse_positive(&row.bid_pr),
                ask: parse_positive(&row.ask_pr),
                funding_rate: row.funding_rate.parse().unwrap_or(0.0),
                funding_interval_hours: 8.0,
                next_funding_time: None,
                open_interest_usd: holding * last,
                timestamp: now,
            });
        }

        if tickers.is_empty() && perps.is_empty() {
            return Err(ConnectorError::decode("/api/v2/spot/market/tickers", "empty ticker lists"));
        }
        snapshot.publish_tickers(Venue::Bitget, tickers);
        snapshot.publish_perps(Venue::Bitget, perps);
        Ok(())
    }
}

fn parse_positive(raw: &str) -> Option<f64> {
    raw.parse::<f64>().ok().filter(|p| *p > 0.0)
}
