//! Binance USDⓈ-M perpetuals connector.
//!
//! Funding and mark prices come from the bulk premium-index endpoint, tops
//! of book from the futures bookTicker. Open interest is a per-symbol
//! endpoint, so it is fetched in small batches with spacing (Binance is
//! strict about bursts) and bounded to the configured universe.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::debug;

use crate::models::{PerpMarket, Venue};
use crate::snapshot::MarketSnapshot;

use super::{get_json, http_client, normalize_symbol, Connector, ConnectorError, SymbolUniverse};

const BASE_URL: &str = "https://fapi.binance.com";

const OI_BATCH_SIZE: usize = 5;
const OI_BATCH_SPACING: Duration = Duration::from_millis(200);

/// Cap on per-symbol open-interest calls when no universe is configured.
const MAX_OI_QUERIES: usize = 40;

pub struct BinanceFutures {
    client: reqwest::Client,
    universe: SymbolUniverse,
}

#[derive(Debug, Deserialize)]
struct PremiumIndexRow {
    symbol: String,
    #[serde(rename = "markPrice")]
    mark_price: String,
    #[serde(rename = "lastFundingRate")]
    last_funding_rate: String,
    #[serde(rename = "nextFundingTime")]
    next_funding_time: i64,
}

#[derive(Debug, Deserialize)]
struct BookTickerRow {
    symbol: String,
    #[serde(rename = "bidPrice")]
    bid_price: String,
    #[serde(rename = "askPrice")]
    ask_price: String,
}

#[derive(Debug, Deserialize)]
struct OpenInterestRow {
    #[serde(rename = "openInterest")]
    open_interest: String,
}

impl BinanceFutures {
    pub fn new(timeout: Duration, universe: SymbolUniverse) -> Self {
        Self { client: http_client(timeout), universe }
    }

    async fn fetch_open_interest(&self, symbols: &[&str]) -> HashMap<String, f64> {
        let mut oi_by_symbol = HashMap::with_capacity(symbols.len());
        for batch in symbols.chunks(OI_BATCH_SIZE) {
            for symbol in batch {
                let url = format!("{BASE_URL}/fapi/v1/openInterest?symbol={symbol}");
                match get_json::<OpenInterestRow>(&self.client, &url).await {
                    Ok(row) => {
                        if let Ok(contracts) = row.open_interest.parse::<f64>() {
                            oi_by_symbol.insert(symbol.to_string(), contracts);
                        }
                    }
                    Err(err) => {
                        debug!(symbol, error = %err, "binance futures OI fetch failed");
                    }
                }
            }
            if symbols.len() > OI_BATCH_SIZE {
                tokio::time::sleep(OI_BATCH_SPACING).await;
            }
        }
        oi_by_symbol
    }
}

#[async_trait]
impl Connector for BinanceFutures {
    fn venue(&self) -> Venue {
        Venue::BinanceFutures
    }

    async fn refresh(&self, snapshot: &MarketSnapshot) -> Result<(), ConnectorError> {
        let premium_rows: Vec<PremiumIndexRow> =
            get_json(&self.client, &format!("{BASE_URL}/fapi/v1/premiumIndex")).await?;
        let book_rows: Vec<BookTickerRow> =
            get_json(&self.client, &format!("{BASE_URL}/fapi/v1/ticker/bookTicker")).await?;
        let books: HashMap<&str, &BookTickerRow> =
            book_rows.iter().map(|b| (b.symbol.as_str(), b)).collect();

        let mut wanted: Vec<&PremiumIndexRow> = premium_rows
            .iter()
            .filter(|row| {
                normalize_symbol(&row.symbol)
                    .map(|(b, q)| self.universe.allows(&b, &q))
                    .unwrap_or(false)
            })
            .collect();
        wanted.truncate(MAX_OI_QUERIES);

        let symbols: Vec<&str> = wanted.iter().map(|r| r.symbol.as_str()).collect();
        let oi_by_symbol = self.fetch_open_interest(&symbols).await;

        let now = Utc::now();
        let mut perps = Vec::new();
        for row in wanted {
            let Some((base, quote)) = normalize_symbol(&row.symbol) else {
                continue;
            };
            let Some(mark) = row.mark_price.parse::<f64>().ok().filter(|p| *p > 0.0) else {
                continue;
            };
            let book = books.get(row.symbol.as_str());
            let oi_contracts = oi_by_symbol.get(&row.symbol).copied().unwrap_or(0.0);
            perps.push(PerpMarket {
                venue: Venue::BinanceFutures,
                base,
                quote,
                last: mark,
                bid: book.and_then(|b| b.bid_price.parse::<f64>().ok()).filter(|p| *p > 0.0),
                ask: book.and_then(|b| b.ask_price.parse::<f64>().ok()).filter(|p| *p > 0.0),
                funding_rate: row.last_funding_rate.parse().unwrap_or(0.0),
                funding_interval_hours: 8.0,
                next_funding_time: DateTime::from_timestamp_millis(row.next_funding_time),
                open_interest_usd: oi_contracts * mark,
                timestamp: now,
            });
        }

        if perps.is_empty() {
            return Err(ConnectorError::decode("/fapi/v1/premiumIndex", "no usable perps in payload"));
        }
        snapshot.publish_perps(Venue::BinanceFutures, perps);
        Ok(())
    }
}
