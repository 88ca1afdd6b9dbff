//! Hyperliquid DEX perp connector.
//!
//! One `metaAndAssetCtxs` POST covers mark price, hourly funding and open
//! interest for every listed asset. Funding is reported per hour; the
//! interval field carries that through so the engine can normalize to 8h.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::models::{PerpMarket, Venue};
use crate::snapshot::MarketSnapshot;

use super::{http_client, post_json, Connector, ConnectorError, SymbolUniverse};

const INFO_URL: &str = "https://api.hyperliquid.xyz/info";

pub struct Hyperliquid {
    client: reqwest::Client,
    universe: SymbolUniverse,
}

#[derive(Debug, Deserialize)]
struct Meta {
    universe: Vec<MetaAsset>,
}

#[derive(Debug, Deserialize)]
struct MetaAsset {
    name: String,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct AssetCtx {
    funding: String,
    #[serde(rename = "markPx")]
    mark_px: String,
    #[serde(rename = "midPx")]
    mid_px: Option<String>,
    #[serde(rename = "openInterest")]
    open_interest: String,
}

impl Hyperliquid {
    pub fn new(timeout: Duration, universe: SymbolUniverse) -> Self {
        Self { client: http_client(timeout), universe }
    }
}

#[async_trait]
impl Connector for Hyperliquid {
    fn venue(&self) -> Venue {
        Venue::Hyperliquid
    }

    async fn refresh(&self, snapshot: &MarketSnapshot) -> Result<(), ConnectorError> {
        let body = json!({"type": "metaAndAssetCtxs"});
        let payload: Vec<Value> = post_json(&self.client, INFO_URL, &body).await?;
        // Payload is a two-element array: [meta, assetCtxs].
        if payload.len() < 2 {
            return Err(ConnectorError::decode("/info", "expected [meta, assetCtxs]"));
        }
        let meta: Meta = serde_json::from_value(payload[0].clone())
            .map_err(|e| ConnectorError::decode("/info", e.to_string()))?;
        let ctxs: Vec<AssetCtx> = serde_json::from_value(payload[1].clone())
            .map_err(|e| ConnectorError::decode("/info", e.to_string()))?;

        let now = Utc::now();
        let mut perps = Vec::new();
        for (asset, ctx) in meta.universe.iter().zip(ctxs.iter()) {
            let base = asset.name.to_uppercase();
            if !self.universe.allows_base(&base) {
                continue;
            }
            let Some(mark) = ctx.mark_px.parse::<f64>().ok().filter(|p| *p > 0.0) else {
                continue;
            };
            let mid = ctx.mid_px.as_deref().and_then(|p| p.parse::<f64>().ok());
            let oi_base = ctx.open_interest.parse::<f64>().unwrap_or(0.0);
            perps.push(PerpMarket {
                venue: Venue::Hyperliquid,
                base,
                quote: "USD".to_string(),
                last: mid.filter(|p| *p > 0.0).unwrap_or(mark),
                bid: None,
                ask: None,
                funding_rate: ctx.funding.parse().unwrap_or(0.0),
                funding_interval_hours: 1.0,
                next_funding_time: None,
                open_interest_usd: oi_base * mark,
                timestamp: now,
            });
        }

        if perps.is_empty() {
            return Err(ConnectorError::decode("/info", "no usable perps in payload"));
        }
        snapshot.publish_perps(Venue::Hyperliquid, perps);
        Ok(())
    }
}
