//! BingX connector: spot tickers, swap tickers and funding via the
//! premium-index endpoint. Open interest needs one call per contract, so it
//! is bounded to the configured universe.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::models::{PerpMarket, Ticker, Venue, VenueKind};
use crate::snapshot::MarketSnapshot;

use super::{get_json, http_client, normalize_symbol, Connector, ConnectorError, SymbolUniverse};

const BASE_URL: &str = "https://open-api.bingx.com";

/// Cap on per-contract open-interest calls when no universe is configured.
const MAX_OI_QUERIES: usize = 40;

pub struct Bingx {
    client: reqwest::Client,
    universe: SymbolUniverse,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    code: i64,
    data: Option<Value>,
}

impl Bingx {
    pub fn new(timeout: Duration, universe: SymbolUniverse) -> Self {
        Self { client: http_client(timeout), universe }
    }

    async fn fetch_rows(&self, path: &str) -> Result<Vec<Value>, ConnectorError> {
        let response: ApiResponse = get_json(&self.client, &format!("{BASE_URL}{path}")).await?;
        if response.code != 0 {
            return Err(ConnectorError::decode(path, format!("code {}", response.code)));
        }
        match response.data {
            Some(Value::Array(rows)) => Ok(rows),
            Some(other) => Ok(vec![other]),
            None => Err(ConnectorError::decode(path, "missing data")),
        }
    }
}

#[async_trait]
impl Connector for Bingx {
    fn venue(&self) -> Venue {
        Venue::Bingx
    }

    async fn refresh(&self, snapshot: &MarketSnapshot) -> Result<(), ConnectorError> {
        let now = Utc::now();

        let spot_rows = self.fetch_rows("/openApi/spot/v1/ticker/24hr").await?;
        let mut tickers = Vec::new();
        for row in &spot_rows {
            let Some(symbol) = row.get("symbol").and_then(Value::as_str) else {
                continue;
            };
            let Some((base, quote)) = normalize_symbol(symbol) else {
                continue;
            };
            if !self.universe.allows(&base, &quote) {
                continue;
            }
            let Some(last) = field(row, "lastPrice") else {
                continue;
            };
            tickers.push(Ticker {
                venue: Venue::Bingx,
                kind: VenueKind::Spot,
                base,
                quote,
                last,
                bid: field(row, "bidPrice"),
                ask: field(row, "askPrice"),
                timestamp: now,
            });
        }

        let perp_rows = self.fetch_rows("/openApi/swap/v2/quote/ticker").await?;
        let premium_rows = self.fetch_rows("/openApi/swap/v2/quote/premiumIndex").await?;
        let premium_by_symbol: HashMap<String, &Value> = premium_rows
            .iter()
            .filter_map(|r| Some((r.get("symbol")?.as_str()?.to_string(), r)))
            .collect();

        let mut perps = Vec::new();
        for row in &perp_rows {
            if perps.len() >= MAX_OI_QUERIES {
                break;
            }
            let Some(symbol) = row.get("symbol").and_then(Value::as_str) else {
                continue;
            };
            let Some((base, quote)) = normalize_symbol(symbol) else {
                continue;
            };
            if !self.universe.allows(&base, &quote) {
                continue;
            }
            let Some(last) = field(row, "lastPrice") else {
                continue;
            };
            let premium = premium_by_symbol.get(symbol);
            let funding_rate = premium
                .and_then(|p| signed_field(p, "lastFundingRate"))
                .unwrap_or(0.0);
            let next_funding_time = premium
                .and_then(|p| p.get("nextFundingTime"))
                .and_then(Value::as_i64)
                .and_then(DateTime::from_timestamp_millis);

            let oi_path = format!("/openApi/swap/v2/quote/openInterest?symbol={symbol}");
            let oi_contracts = match self.fetch_rows(&oi_path).await {
                Ok(rows) => rows.first().and_then(|r| field(r, "openInterest")).unwrap_or(0.0),
                Err(err) => {
                    debug!(symbol, error = %err, "bingx open interest fetch failed");
                    0.0
                }
            };

            perps.push(PerpMarket {
                venue: Venue::Bingx,
                base,
                quote,
                last,
                bid: field(row, "bidPrice"),
                ask: field(row, "askPrice"),
                funding_rate,
                funding_interval_hours: 8.0,
                next_funding_time,
                open_interest_usd: oi_contracts * last,
                timestamp: now,
            });
        }

        if tickers.is_empty() && perps.is_empty() {
            return Err(ConnectorError::decode("/openApi/spot/v1/ticker/24hr", "empty ticker lists"));
        }
        snapshot.publish_tickers(Venue::Bingx, tickers);
        snapshot.publish_perps(Venue::Bingx, perps);
        Ok(())
    }
}

/// BingX mixes stringified and raw numbers across endpoints.
fn field(row: &Value, key: &str) -> Option<f64> {
    signed_field(row, key).filter(|p| *p > 0.0)
}

/// Funding rates may legitimately be negative.
fn signed_field(row: &Value, key: &str) -> Option<f64> {
    match row.get(key)? {
        Value::String(s) => s.parse::<f64>().ok(),
        Value::Number(n) => n.as_f64(),
        _ => None,
    }
}
