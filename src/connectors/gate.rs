//! Gate connector: spot tickers plus USDT-settled perps.
//!
//! Perp prices come from the futures tickers endpoint; the contracts
//! endpoint supplies funding interval and the quanto multiplier used to
//! express open interest in USD.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;

use crate::models::{PerpMarket, Ticker, Venue, VenueKind};
use crate::snapshot::MarketSnapshot;

use super::{get_json, http_client, normalize_symbol, Connector, ConnectorError, SymbolUniverse};

const BASE_URL: &str = "https://api.gateio.ws";

pub struct Gate {
    client: reqwest::Client,
    universe: SymbolUniverse,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct SpotRow {
    currency_pair: String,
    last: String,
    highest_bid: String,
    lowest_ask: String,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct FuturesTickerRow {
    contract: String,
    last: String,
    funding_rate: String,
    total_size: String,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct ContractRow {
    name: String,
    funding_interval: i64,
    quanto_multiplier: String,
}

impl Gate {
    pub fn new(timeout: Duration, universe: SymbolUniverse) -> Self {
        Self { client: http_client(timeout), universe }
    }
}

#[async_trait]
impl Connector for Gate {
    fn venue(&self) -> Venue {
        Venue::Gate
    }

    async fn refresh(&self, snapshot: &MarketSnapshot) -> Result<(), ConnectorError> {
        let now = Utc::now();

        let spot_rows: Vec<SpotRow> =
            get_json(&self.client, &format!("{BASE_URL}/api/v4/spot/tickers")).await?;
        let mut tickers = Vec::new();
        for row in &spot_rows {
            let Some((base, quote)) = normalize_symbol(&row.currency_pair) else {
                continue;
            };
            if !self.universe.allows(&base, &quote) {
                continue;
            }
            let Some(last) = parse_positive(&row.last) else {
                continue;
            };
            tickers.push(Ticker {
                venue: Venue::Gate,
                kind: VenueKind::Spot,
                base,
                quote,
                last,
                bid: parse_positive(&row.highest_bid),
                ask: parse_positive(&row.lowest_ask),
                timestamp: now,
            });
        }

        let contract_rows: Vec<ContractRow> =
            get_json(&self.client, &format!("{BASE_URL}/api/v4/futures/usdt/contracts")).await?;
        let contracts: HashMap<&str, &ContractRow> =
            contract_rows.iter().map(|c| (c.name.as_str(), c)).collect();

        let perp_rows: Vec<FuturesTickerRow> =
            get_json(&self.client, &format!("{BASE_URL}/api/v4/futures/usdt/tickers")).await?;
        let mut perps = Vec::new();
        for row in &perp_rows {
            let Some((base, quote)) = normalize_symbol(&row.contract) else {
                continue;
            };
            if !self.universe.allows(&base, &quote) {
                continue;
            }
            let Some(last) = parse_positive(&row.last) else {
                continue;
            };
            let contract = contracts.get(row.contract.as_str());
            let funding_interval_hours = contract
                .map(|c| c.funding_interval as f64 / 3600.0)
                .filter(|h| *h > 0.0)
                .unwrap_or(8.0);
            let multiplier = contract
                .and_then(|c| c.quanto_multiplier.parse::<f64>().ok())
                .filter(|m| *m > 0.0)
                .unwrap_or(1.0);
            let total_size = row.total_size.parse::<f64>().unwrap_or(0.0);
            perps.push(PerpMarket {
                venue: Venue::Gate,
                base,
                quote,
                last,
                bid: None,
                ask: None,
                funding_rate: row.funding_rate.parse().unwrap_or(0.0),
                funding_interval_hours,
                next_funding_time: None,
                open_interest_usd: total_size * multiplier * last,
                timestamp: now,
            });
        }

        if tickers.is_empty() && perps.is_empty() {
            return Err(ConnectorError::decode("/api/v4/spot/tickers", "empty ticker lists"));
        }
        snapshot.publish_tickers(Venue::Gate, tickers);
        snapshot.publish_perps(Venue::Gate, perps);
        Ok(())
    }
}

fn parse_positive(raw: &str) -> Option<f64> {
    raw.parse::<f64>().ok().filter(|p| *p > 0.0)
}
