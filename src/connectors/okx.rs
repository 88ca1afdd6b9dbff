//! OKX connector: spot tickers, swap tickers, bulk open interest and
//! per-instrument funding rates.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::debug;

use crate::models::{PerpMarket, Ticker, Venue, VenueKind};
use crate::snapshot::MarketSnapshot;

use super::{get_json, http_client, normalize_symbol, Connector, ConnectorError, SymbolUniverse};

const BASE_URL: &str = "https://www.okx.com";

/// Cap on per-instrument funding calls when no symbol universe is set.
const MAX_FUNDING_QUERIES: usize = 40;

pub struct Okx {
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
    #[serde(rename = "instId")]
    inst_id: String,
    last: String,
    #[serde(rename = "bidPx")]
    bid_px: String,
    #[serde(rename = "askPx")]
    ask_px: String,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct OpenInterestRow {
    #[serde(rename = "instId")]
    inst_id: String,
    #[serde(rename = "oiCcy")]
    oi_ccy: String,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct FundingRow {
    #[serde(rename = "fundingRate")]
    funding_rate: String,
    #[serde(rename = "nextFundingTime")]
    next_funding_time: String,
}

impl Okx {
    pub fn new(timeout: Duration, universe: SymbolUniverse) -> Self {
        Self { client: http_client(timeout), universe }
    }

    async fn fetch_rows<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
    ) -> Result<Vec<T>, ConnectorError> {
        let response: ApiResponse<T> = get_json(&self.client, &format!("{BASE_URL}{path}")).await?;
        if response.code != "0" {
            return Err(ConnectorError::decode(path, format!("code {}", response.code)));
        }
        response
            .data
            .ok_or_else(|| ConnectorError::decode(path, "missing data"))
    }
}

#[async_trait]
impl Connector for Okx {
    fn venue(&self) -> Venue {
        Venue::Okx
    }

    async fn refresh(&self, snapshot: &MarketSnapshot) -> Result<(), ConnectorError> {
        let now = Utc::now();

        let spot_rows: Vec<TickerRow> =
            self.fetch_rows("/api/v5/market/tickers?instType=SPOT").await?;
        let mut tickers = Vec::new();
        for row in &spot_rows {
            let Some((base, quote)) = normalize_symbol(&row.inst_id) else {
                continue;
            };
            if !self.universe.allows(&base, &quote) {
                continue;
            }
            let Some(last) = parse_positive(&row.last) else {
                continue;
            };
            tickers.push(Ticker {
                venue: Venue::Okx,
                kind: VenueKind::Spot,
                base,
                quote,
                last,
                bid: parse_positive(&row.bid_px),
                ask: parse_positive(&row.ask_px),
                timestamp: now,
            });
        }

        let swap_rows: Vec<TickerRow> =
            self.fetch_rows("/api/v5/market/tickers?instType=SWAP").await?;
        let oi_rows: Vec<OpenInterestRow> =
            self.fetch_rows("/api/v5/public/open-interest?instType=SWAP").await?;
        let oi_by_inst: HashMap<&str, f64> = oi_rows
            .iter()
            .filter_map(|r| Some((r.inst_id.as_str(), r.oi_ccy.parse::<f64>().ok()?)))
            .collect();

        // Funding needs one call per instrument; keep it to the configured
        // universe (or a bounded head of the swap list).
        let mut candidates: Vec<&TickerRow> = swap_rows
            .iter()
            .filter(|row| {
                normalize_symbol(&row.inst_id)
                    .map(|(b, q)| self.universe.allows(&b, &q))
                    .unwrap_or(false)
            })
            .collect();
        candidates.truncate(MAX_FUNDING_QUERIES);

        let mut perps = Vec::new();
        for row in candidates {
            let Some((base, quote)) = normalize_symbol(&row.inst_id) else {
                continue;
            };
            let Some(last) = parse_positive(&row.last) else {
                continue;
            };
            let path = format!("/api/v5/public/funding-rate?instId={}", row.inst_id);
            let funding: Vec<FundingRow> = match self.fetch_rows(&path).await {
                Ok(rows) => rows,
                Err(err) => {
                    debug!(inst = %row.inst_id, error = %err, "okx funding fetch failed");
                    continue;
                }
            };
            let Some(funding) = funding.first() else {
                continue;
            };
            let oi_usd = oi_by_inst.get(row.inst_id.as_str()).copied().unwrap_or(0.0) * last;
            perps.push(PerpMarket {
                venue: Venue::Okx,
                base,
                quote,
                last,
                bid: parse_positive(&row.bid_px),
                ask: parse_positive(&row.ask_px),
                funding_rate: funding.funding_rate.parse().unwrap_or(0.0),
                funding_interval_hours: 8.0,
                next_funding_time: parse_ms(&funding.next_funding_time),
                open_interest_usd: oi_usd,
                timestamp: now,
            });
        }

        if tickers.is_empty() && perps.is_empty() {
            return Err(ConnectorError::decode("/api/v5/market/tickers", "empty ticker lists"));
        }
        snapshot.publish_tickers(Venue::Okx, tickers);
        snapshot.publish_perps(Venue::Okx, perps);
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
