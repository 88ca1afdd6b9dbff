//! Bithumb KRW spot connector. One `ticker/ALL_KRW` call per refresh.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;

use crate::models::{Ticker, Venue, VenueKind};
use crate::snapshot::MarketSnapshot;

use super::{get_json, http_client, Connector, ConnectorError, SymbolUniverse};

const BASE_URL: &str = "https://api.bithumb.com";

pub struct Bithumb {
    client: reqwest::Client,
    universe: SymbolUniverse,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    status: String,
    data: HashMap<String, Value>,
}

impl Bithumb {
    pub fn new(timeout: Duration, universe: SymbolUniverse) -> Self {
        Self { client: http_client(timeout), universe }
    }
}

#[async_trait]
impl Connector for Bithumb {
    fn venue(&self) -> Venue {
        Venue::Bithumb
    }

    async fn refresh(&self, snapshot: &MarketSnapshot) -> Result<(), ConnectorError> {
        let response: ApiResponse =
            get_json(&self.client, &format!("{BASE_URL}/public/ticker/ALL_KRW")).await?;
        if response.status != "0000" {
            return Err(ConnectorError::decode(
                "/public/ticker/ALL_KRW",
                format!("status {}", response.status),
            ));
        }

        let now = Utc::now();
        let mut tickers = Vec::new();
        for (symbol, entry) in &response.data {
            // The payload mixes per-coin objects with a scalar "date" field.
            let Some(closing) = entry.get("closing_price") else {
                continue;
            };
            let base = symbol.to_uppercase();
            if !self.universe.allows_base(&base) {
                continue;
            }
            let Some(last) = value_to_price(closing) else {
                continue;
            };
            tickers.push(Ticker {
                venue: Venue::Bithumb,
                kind: VenueKind::Spot,
                base,
                quote: "KRW".to_string(),
                last,
                bid: entry.get("buy_price").and_then(value_to_price),
                ask: entry.get("sell_price").and_then(value_to_price),
                timestamp: now,
            });
        }

        if tickers.is_empty() {
            return Err(ConnectorError::decode(
                "/public/ticker/ALL_KRW",
                "no usable tickers in payload",
            ));
        }
        snapshot.publish_tickers(Venue::Bithumb, tickers);
        Ok(())
    }
}

fn value_to_price(value: &Value) -> Option<f64> {
    match value {
        Value::String(s) => s.parse::<f64>().ok(),
        Value::Number(n) => n.as_f64(),
        _ => None,
    }
    .filter(|p| *p > 0.0)
}
