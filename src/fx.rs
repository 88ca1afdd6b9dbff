//! USD/KRW rate resolver.
//!
//! Sources are consulted in fixed priority order — Dunamu forex, the open
//! exchange-rate API, then the rate implied by Upbit KRW-BTC against Binance
//! BTCUSDT — and the first value inside the sanity band wins. When every
//! source fails the last good value is kept; before any source has ever
//! succeeded the configured fixed fallback is exposed with its flag set.
//! Refreshes on its own cadence, independent of the detection scheduler.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::RwLock;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::models::{FxRate, Venue, VenueKind};
use crate::snapshot::MarketSnapshot;

const DUNAMU_URL: &str =
    "https://quotation-api-cdn.dunamu.com/v1/forex/recent?codes=FRX.KRWUSD";
const EXCHANGERATE_URL: &str = "https://api.exchangerate-api.com/v4/latest/USD";

/// Hard sanity band for KRW per USD; anything outside is a broken source.
pub const BAND_LOW: f64 = 1000.0;
pub const BAND_HIGH: f64 = 2000.0;

pub fn in_band(rate: f64) -> bool {
    (BAND_LOW..=BAND_HIGH).contains(&rate)
}

/// First candidate inside the sanity band, in priority order.
pub fn first_in_band(candidates: &[(Option<f64>, &'static str)]) -> Option<(f64, &'static str)> {
    candidates
        .iter()
        .find_map(|(rate, source)| rate.filter(|r| in_band(*r)).map(|r| (r, *source)))
}

pub struct FxResolver {
    client: reqwest::Client,
    snapshot: Arc<MarketSnapshot>,
    stale_ttl: chrono::Duration,
    current: RwLock<FxRate>,
}

#[derive(Debug, Deserialize)]
struct DunamuRow {
    #[serde(rename = "basePrice")]
    base_price: f64,
}

#[derive(Debug, Deserialize)]
struct ExchangeRatePayload {
    rates: std::collections::HashMap<String, f64>,
}

impl FxResolver {
    pub fn new(cfg: &Config, snapshot: Arc<MarketSnapshot>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(cfg.connector_timeout)
            .user_agent(crate::connectors::USER_AGENT)
            .build()
            .unwrap_or_default();
        Self {
            client,
            snapshot,
            stale_ttl: chrono::Duration::from_std(cfg.stale_ttl)
                .unwrap_or_else(|_| chrono::Duration::seconds(30)),
            current: RwLock::new(FxRate {
                krw_per_usd: cfg.fx_fallback_krw_per_usd,
                source: "fallback".to_string(),
                is_fallback: true,
                fetched_at: Utc::now(),
            }),
        }
    }

    pub fn current(&self) -> FxRate {
        self.current.read().clone()
    }

    pub async fn refresh(&self) {
        let candidates = [
            (self.fetch_dunamu().await, "dunamu"),
            (self.fetch_exchangerate().await, "exchangerate_api"),
            (self.implied_from_snapshot(), "implied_btc"),
        ];

        match first_in_band(&candidates) {
            Some((rate, source)) => {
                debug!(rate, source, "fx rate resolved");
                *self.current.write() = FxRate {
                    krw_per_usd: rate,
                    source: source.to_string(),
                    is_fallback: false,
                    fetched_at: Utc::now(),
                };
            }
            None => {
                let current = self.current.read().clone();
                if current.is_fallback {
                    warn!(
                        fallback = current.krw_per_usd,
                        "all fx sources failed; fixed fallback remains in effect"
                    );
                } else {
                    warn!(
                        last_good = current.krw_per_usd,
                        source = %current.source,
                        "all fx sources failed; keeping last good rate"
                    );
                }
            }
        }
    }

    async fn fetch_dunamu(&self) -> Option<f64> {
        match crate::connectors::get_json::<Vec<DunamuRow>>(&self.client, DUNAMU_URL).await {
            Ok(rows) => rows.first().map(|r| r.base_price),
            Err(err) => {
                debug!(error = %err, "dunamu fx fetch failed");
                None
            }
        }
    }

    async fn fetch_exchangerate(&self) -> Option<f64> {
        match crate::connectors::get_json::<ExchangeRatePayload>(&self.client, EXCHANGERATE_URL)
            .await
        {
            Ok(payload) => payload.rates.get("KRW").copied(),
            Err(err) => {
                debug!(error = %err, "exchangerate fx fetch failed");
                None
            }
        }
    }

    /// KRW/USD implied by the BTC cross: Upbit KRW-BTC over Binance BTCUSDT.
    fn implied_from_snapshot(&self) -> Option<f64> {
        let view = self.snapshot.view(Utc::now(), self.stale_ttl);
        let krw_btc = view.ticker(Venue::Upbit, VenueKind::Spot, "BTC", "KRW")?;
        let usdt_btc = view.ticker(Venue::Binance, VenueKind::Spot, "BTC", "USDT")?;
        if usdt_btc.last <= 0.0 {
            return None;
        }
        Some(krw_btc.last / usdt_btc.last)
    }
}

/// Independent refresher task; the first refresh runs immediately so the
/// detectors rarely see the fallback after startup.
pub fn spawn_fx_refresher(resolver: Arc<FxResolver>, interval: Duration) {
    tokio::spawn(async move {
        info!(interval_secs = interval.as_secs(), "fx refresher started");
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            resolver.refresh().await;
        }
    });
}
