//! Synthetix v3 perps (Base) connector.
//!
//! Same shape as the Hyperliquid adapter: one markets call covering price,
//! funding and open interest. Synthetix reports funding per day, carried in
//! the interval field for central 8h normalization.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;

use crate::models::{PerpMarket, Venue};
use crate::snapshot::MarketSnapshot;

use super::{get_json, http_client, Connector, ConnectorError, SymbolUniverse};

const BASE_URL: &str = "https://perps-api-mainnet.synthetix.io";

pub struct Synthetix {
    client: reqwest::Client,
    universe: SymbolUniverse,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct MarketRow {
    symbol: String,
    #[serde(rename = "indexPrice")]
    index_price: f64,
    #[serde(rename = "currentFundingRate")]
    current_funding_rate: f64,
    #[serde(rename = "openInterestUsd")]
    open_interest_usd: f64,
}

impl Synthetix {
    pub fn new(timeout: Duration, universe: SymbolUniverse) -> Self {
        Self { client: http_client(timeout), universe }
    }
}

#[async_trait]
impl Connector for Synthetix {
    fn venue(&self) -> Venue {
        Venue::Synthetix
    }

    async fn refresh(&self, snapshot: &MarketSnapshot) -> Result<(), ConnectorError> {
        let rows: Vec<MarketRow> =
            get_json(&self.client, &format!("{BASE_URL}/base/markets")).await?;

        let now = Utc::now();
        let mut perps = Vec::new();
        for row in &rows {
            let base = row.symbol.to_uppercase();
            if base.is_empty() || !self.universe.allows_base(&base) {
                continue;
            }
            if row.index_price <= 0.0 {
                continue;
            }
            perps.push(PerpMarket {
                venue: Venue::Synthetix,
                base,
                quote: "USD".to_string(),
                last: row.index_price,
                bid: None,
                ask: None,
                funding_rate: row.current_funding_rate,
                funding_interval_hours: 24.0,
                next_funding_time: None,
                open_interest_usd: row.open_interest_usd,
                timestamp: now,
            });
        }

        if perps.is_empty() {
            return Err(ConnectorError::decode("/base/markets", "no usable perps in payload"));
        }
        snapshot.publish_perps(Venue::Synthetix, perps);
        Ok(())
    }
}
