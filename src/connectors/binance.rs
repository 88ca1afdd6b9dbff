//! Binance spot connector.
//!
//! Two bulk endpoints per refresh: `ticker/bookTicker` for tops of book and
//! `ticker/price` for last trades, joined on the venue symbol.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;

use crate::models::{Ticker, Venue, VenueKind};
use crate::snapshot::MarketSnapshot;

use super::{get_json, http_client, normalize_symbol, Connector, ConnectorError, SymbolUniverse};

const BASE_URL: &str = "https://api.binance.com";

pub struct BinanceSpot {
    client: reqwest::Client,
    universe: SymbolUniverse,
}

#[derive(Debug, Deserialize)]
struct BookTicker {
    symbol: String,
    #[serde(rename = "bidPrice")]
    bid_price: String,
    #[serde(rename = "askPrice")]
    ask_price: String,
}

#[derive(Debug, Deserialize)]
struct LastPrice {
    symbol: String,
    price: String,
}

impl BinanceSpot {
    pub fn new(timeout: Duration, universe: SymbolUniverse) -> Self {
        Self { client: http_client(timeout), universe }
    }
}

#[async_trait]
impl Connector for BinanceSpot {
    fn venue(&self) -> Venue {
        Venue::Binance
    }

    async fn refresh(&self, snapshot: &MarketSnapshot) -> Result<(), ConnectorError> {
        let books: Vec<BookTicker> =
            get_json(&self.client, &format!("{BASE_URL}/api/v3/ticker/bookTicker")).await?;
        let lasts: Vec<LastPrice> =
            get_json(&self.client, &format!("{BASE_URL}/api/v3/ticker/price")).await?;

        let last_by_symbol: HashMap<&str, f64> = lasts
            .iter()
            .filter_map(|l| Some((l.symbol.as_str(), l.price.parse::<f64>().ok()?)))
            .collect();

        let now = Utc::now();
        let mut tickers = Vec::new();
        for book in &books {
            let Some((base, quote)) = normalize_symbol(&book.symbol) else {
                continue;
            };
            if !self.universe.allows(&base, &quote) {
                continue;
            }
            let Some(last) = last_by_symbol.get(book.symbol.as_str()).copied().filter(|p| *p > 0.0)
            else {
                continue;
            };
            tickers.push(Ticker {
                venue: Venue::Binance,
                kind: VenueKind::Spot,
                base,
                quote,
                last,
                bid: book.bid_price.parse::<f64>().ok().filter(|p| *p > 0.0),
                ask: book.ask_price.parse::<f64>().ok().filter(|p| *p > 0.0),
                timestamp: now,
            });
        }

        if tickers.is_empty() {
            return Err(ConnectorError::decode(
                "/api/v3/ticker/bookTicker",
                "no usable tickers in payload",
            ));
        }
        snapshot.publish_tickers(Venue::Binance, tickers);
        Ok(())
    }
}
