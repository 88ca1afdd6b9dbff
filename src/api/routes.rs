//! HTTP pull endpoints.

use std::collections::BTreeMap;

use axum::extract::{Query, State};
use axum::http::header::HeaderName;
use axum::http::{HeaderMap, HeaderValue};
use axum::response::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::models::{Opportunity, OpportunityKind};

use super::AppState;

static X_DATA_STALE: HeaderName = HeaderName::from_static("x-data-stale");

pub async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    limit: Option<usize>,
}

#[derive(Serialize)]
pub struct OpportunitiesResponse {
    pub opportunities: Vec<Opportunity>,
}

/// `GET /api/opportunities` — most recent detection list (last-good within
/// its TTL), with an `X-Data-Stale` hint once that window has passed.
pub async fn list_opportunities(
    State(state): State<AppState>,
    Query(params): Query<ListQuery>,
) -> (HeaderMap, Json<OpportunitiesResponse>) {
    let (list, stale) = state.hub.snapshot();
    let limit = params.limit.unwrap_or(100).min(state.cfg.max_opportunities);
    let opportunities = list.iter().take(limit).cloned().collect();
    (stale_headers(stale), Json(OpportunitiesResponse { opportunities }))
}

/// `GET /api/signals/tether-bot` — kimchi premium subset with the
/// allocation metadata the tether bot consumes.
pub async fn tether_bot_signals(
    State(state): State<AppState>,
    Query(params): Query<ListQuery>,
) -> (HeaderMap, Json<OpportunitiesResponse>) {
    let (list, stale) = state.hub.snapshot();
    let limit = params.limit.unwrap_or(25);
    let opportunities = list
        .iter()
        .filter(|o| o.kind == OpportunityKind::KimchiPremium)
        .take(limit)
        .cloned()
        .collect();
    (stale_headers(stale), Json(OpportunitiesResponse { opportunities }))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorQuery {
    /// Minimum |spread_bps| for basis and perp-perp gaps.
    min_gap: Option<f64>,
    /// Minimum |premium %| for kimchi entries.
    min_kimchi: Option<f64>,
    /// Minimum funding differential (%/8h) for funding entries.
    min_funding: Option<f64>,
    /// Minimum |spread_bps| for cross-CEX spot spreads.
    min_cex: Option<f64>,
    /// Comma-separated kind filter (wire names).
    types: Option<String>,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct KindStats {
    pub count: usize,
    pub max: f64,
    pub avg: f64,
}

#[derive(Serialize)]
pub struct MonitorResponse {
    pub total: usize,
    pub by_kind: BTreeMap<&'static str, KindStats>,
    pub usd_krw: f64,
    pub fx_source: String,
    pub exchange_counts: BTreeMap<&'static str, usize>,
    pub spreads: Vec<Opportunity>,
}

/// `GET /api/monitor/spreads` — unified spread list with per-type filters
/// and summary stats.
pub async fn monitor_spreads(
    State(state): State<AppState>,
    Query(params): Query<MonitorQuery>,
) -> (HeaderMap, Json<MonitorResponse>) {
    let (list, stale) = state.hub.snapshot();
    let fx = state.fx.current();
    let response = summarize(&list, &params, fx.krw_per_usd, fx.source.clone());
    (stale_headers(stale), Json(response))
}

fn stale_headers(stale: bool) -> HeaderMap {
    let mut headers = HeaderMap::new();
    if stale {
        headers.insert(X_DATA_STALE.clone(), HeaderValue::from_static("1"));
    }
    headers
}

fn kind_allowed(kind: OpportunityKind, types: &Option<Vec<String>>) -> bool {
    match types {
        None => true,
        Some(list) => list.iter().any(|t| t == kind.as_str()),
    }
}

fn passes_filters(opp: &Opportunity, params: &MonitorQuery) -> bool {
    match opp.kind {
        OpportunityKind::SpotCross => {
            params.min_cex.map_or(true, |min| opp.spread_bps.abs() >= min)
        }
        OpportunityKind::KimchiPremium => {
            let premium_pct = opp.spread_bps / 100.0;
            params.min_kimchi.map_or(true, |min| premium_pct.abs() >= min)
        }
        OpportunityKind::FundingArb => {
            let diff = opp
                .metadata
                .as_ref()
                .and_then(|m| m.get("funding_diff_8h_pct"))
                .and_then(|v| v.as_f64())
                .unwrap_or(0.0);
            params.min_funding.map_or(true, |min| diff.abs() >= min)
        }
        OpportunityKind::SpotVsPerp | OpportunityKind::PerpPerpSpread => {
            params.min_gap.map_or(true, |min| opp.spread_bps.abs() >= min)
        }
    }
}

pub(super) fn summarize(
    list: &[Opportunity],
    params: &MonitorQuery,
    usd_krw: f64,
    fx_source: String,
) -> MonitorResponse {
    let types = params
        .types
        .as_ref()
        .map(|raw| raw.split(',').map(|t| t.trim().to_lowercase()).collect::<Vec<_>>());

    let spreads: Vec<Opportunity> = list
        .iter()
        .filter(|o| kind_allowed(o.kind, &types))
        .filter(|o| passes_filters(o, params))
        .cloned()
        .collect();

    let mut by_kind: BTreeMap<&'static str, KindStats> = BTreeMap::new();
    for opp in &spreads {
        let stats = by_kind
            .entry(opp.kind.as_str())
            .or_insert(KindStats { count: 0, max: 0.0, avg: 0.0 });
        stats.count += 1;
        stats.max = stats.max.max(opp.spread_bps.abs());
        // `avg` accumulates here and divides below.
        stats.avg += opp.spread_bps.abs();
    }
    for stats in by_kind.values_mut() {
        if stats.count > 0 {
            stats.avg /= stats.count as f64;
        }
    }

    let mut exchange_counts: BTreeMap<&'static str, usize> = BTreeMap::new();
    for opp in &spreads {
        for leg in &opp.legs {
            *exchange_counts.entry(leg.exchange.as_str()).or_insert(0) += 1;
        }
    }

    MonitorResponse {
        total: spreads.len(),
        by_kind,
        usd_krw,
        fx_source,
        exchange_counts,
        spreads,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{OpportunityLeg, Side, Venue, VenueKind};
    use chrono::Utc;
    use serde_json::Map;

    fn opp(kind: OpportunityKind, symbol: &str, spread_bps: f64) -> Opportunity {
        let legs = vec![
            OpportunityLeg {
                exchange: Venue::Binance,
                venue_type: VenueKind::Spot,
                side: Side::Buy,
                symbol: symbol.to_string(),
                price: 100.0,
                quantity: 1.0,
            },
            OpportunityLeg {
                exchange: Venue::Okx,
                venue_type: VenueKind::Spot,
                side: Side::Sell,
                symbol: symbol.to_string(),
                price: 100.0,
                quantity: 1.0,
            },
        ];
        Opportunity {
            id: Opportunity::content_id(kind, symbol, &legs),
            kind,
            symbol: symbol.to_string(),
            spread_bps,
            expected_pnl_pct: 0.1,
            notional: 1000.0,
            timestamp: Utc::now(),
            description: String::new(),
            legs,
            metadata: None,
            tradeable: None,
            deposit_status: None,
        }
    }

    fn funding_opp(diff_pct: f64) -> Opportunity {
        let mut o = opp(OpportunityKind::FundingArb, "BTC/USDT:USDT", 2.0);
        let mut meta = Map::new();
        meta.insert("funding_diff_8h_pct".into(), serde_json::json!(diff_pct));
        o.metadata = Some(meta);
        o
    }

    #[test]
    fn type_filter_restricts_kinds() {
        let list = vec![
            opp(OpportunityKind::SpotCross, "BTC/USDT", 25.0),
            opp(OpportunityKind::KimchiPremium, "BTC/KRW vs BTC/USDT", 172.0),
        ];
        let params = MonitorQuery {
            types: Some("kimchi_premium".to_string()),
            ..Default::default()
        };
        let response = summarize(&list, &params, 1450.0, "dunamu".into());
        assert_eq!(response.total, 1);
        assert!(response.by_kind.contains_key("kimchi_premium"));
        assert!(!response.by_kind.contains_key("spot_cross"));
    }

    #[test]
    fn per_kind_minimums_apply_independently() {
        let list = vec![
            opp(OpportunityKind::SpotCross, "BTC/USDT", 8.0),
            opp(OpportunityKind::SpotCross, "ETH/USDT", 30.0),
            opp(OpportunityKind::KimchiPremium, "BTC/KRW vs BTC/USDT", 172.0), // 1.72%
            funding_opp(0.02),
            funding_opp(0.25),
        ];
        let params = MonitorQuery {
            min_cex: Some(10.0),
            min_kimchi: Some(2.0),
            min_funding: Some(0.1),
            ..Default::default()
        };
        let response = summarize(&list, &params, 1450.0, "dunamu".into());
        // ETH cross survives minCex, kimchi 1.72% < 2% dies, one funding survives.
        assert_eq!(response.total, 2);
        assert_eq!(response.by_kind["spot_cross"].count, 1);
        assert_eq!(response.by_kind["funding_arb"].count, 1);
    }

    #[test]
    fn summary_stats_cover_max_avg_and_exchanges() {
        let list = vec![
            opp(OpportunityKind::SpotCross, "BTC/USDT", 10.0),
            opp(OpportunityKind::SpotCross, "ETH/USDT", 30.0),
        ];
        let response = summarize(&list, &MonitorQuery::default(), 1450.0, "dunamu".into());
        let stats = &response.by_kind["spot_cross"];
        assert_eq!(stats.count, 2);
        assert_eq!(stats.max, 30.0);
        assert_eq!(stats.avg, 20.0);
        assert_eq!(response.exchange_counts["binance"], 2);
        assert_eq!(response.exchange_counts["okx"], 2);
        assert_eq!(response.usd_krw, 1450.0);
    }
}
