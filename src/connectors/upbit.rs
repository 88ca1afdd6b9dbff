//! Upbit KRW spot connector.
//!
//! Market list comes from `/v1/market/all`; last trades arrive in one
//! `/v1/ticker` call for every tracked KRW market.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;

use crate::models::{Ticker, Venue, VenueKind};
use crate::snapshot::MarketSnapshot;

use super::{get_json, http_client, normalize_symbol, Connector, ConnectorError, SymbolUniverse};

const BASE_URL: &str = "https://api.upbit.com";

pub struct Upbit {
    client: reqwest::Client,
    universe: SymbolUniverse,
}

#[derive(Debug, Deserialize)]
struct MarketRow {
    market: String,
}

#[derive(Debug, Deserialize)]
struct TickerRow {
    market: String,
    trade_price: f64,
}

impl Upbit {
    pub fn new(timeout: Duration, universe: SymbolUniverse) -> Self {
        Self { client: http_client(timeout), universe }
    }
}

#[async_trait]
impl Connector for Upbit {
    fn venue(&self) -> Venue {
        Venue::Upbit
    }

    async fn refresh(&self, snapshot: &MarketSnapshot) -> Result<(), ConnectorError> {
        let markets: Vec<MarketRow> =
            get_json(&self.client, &format!("{BASE_URL}/v1/market/all")).await?;

        let wanted: Vec<String> = markets
            .iter()
            .filter(|m| m.market.starts_with("KRW-"))
            .filter(|m| {
                normalize_symbol(&m.market)
                    .map(|(base, _)| self.universe.allows_base(&base))
                    .unwrap_or(false)
            })
            .map(|m| m.market.clone())
            .collect();
        if wanted.is_empty() {
            return Err(ConnectorError::decode("/v1/market/all", "no KRW markets matched"));
        }

        let url = format!("{BASE_URL}/v1/ticker?markets={}", wanted.join(","));
        let rows: Vec<TickerRow> = get_json(&self.client, &url).await?;

        let now = Utc::now();
        let mut tickers = Vec::new();
        for row in &rows {
            let Some((base, quote)) = normalize_symbol(&row.market) else {
                continue;
            };
            if row.trade_price <= 0.0 {
                continue;
            }
            tickers.push(Ticker {
                venue: Venue::Upbit,
                kind: VenueKind::Spot,
                base,
                quote,
                last: row.trade_price,
                bid: None,
                ask: None,
                timestamp: now,
            });
        }

        if tickers.is_empty() {
            return Err(ConnectorError::decode("/v1/ticker", "no usable tickers in payload"));
        }
        snapshot.publish_tickers(Venue::Upbit, tickers);
        Ok(())
    }
}
