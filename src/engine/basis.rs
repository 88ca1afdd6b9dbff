//! Spot vs perp basis detector.
//!
//! Pairs every fresh USD(T)-quoted spot ticker with every liquid perp on
//! the same base. Buys the cheap side and sells the rich one once the gap
//! survives the round-trip fee gate; expected PnL nets fees and the funding
//! the perp leg is going to pay or receive over the holding interval.

use std::collections::HashMap;

use serde_json::{json, Map};

use crate::models::{
    format_price, Opportunity, OpportunityKind, OpportunityLeg, PerpMarket, Side, Ticker,
    VenueKind,
};

use super::spot_cross::round3;
use super::DetectCtx;

pub(super) fn detect(ctx: &DetectCtx) -> Vec<Opportunity> {
    let now = ctx.view.taken_at;
    let max_age = ctx.max_age();

    let mut spot_by_base: HashMap<&str, Vec<&Ticker>> = HashMap::new();
    for ticker in &ctx.view.tickers {
        if ticker.kind == VenueKind::Spot
            && matches!(ticker.quote.as_str(), "USDT" | "USD")
            && ticker.last > 0.0
            && ticker.is_fresh(now, max_age)
        {
            spot_by_base.entry(ticker.base.as_str()).or_default().push(ticker);
        }
    }

    let mut perp_by_base: HashMap<&str, Vec<&PerpMarket>> = HashMap::new();
    for perp in &ctx.view.perps {
        if perp.last > 0.0
            && perp.is_fresh(now, max_age)
            && perp.open_interest_usd >= ctx.cfg.min_oi_usd
        {
            perp_by_base.entry(perp.base.as_str()).or_default().push(perp);
        }
    }

    let mut opportunities = Vec::new();
    for (base, spots) in spot_by_base {
        let Some(perps) = perp_by_base.get(base) else {
            continue;
        };
        for spot in spots {
            for perp in perps {
                let basis_bps = (perp.last - spot.last) / spot.last * 10_000.0;
                if basis_bps.abs() < ctx.cfg.min_basis_bps {
                    continue;
                }
                let net_bps = basis_bps.abs() - ctx.round_trip_cost_bps();
                if net_bps <= 0.0 {
                    continue;
                }

                // Positive basis: perp rich, so buy spot / sell perp. The
                // short perp then *receives* positive funding.
                let perp_is_short = basis_bps > 0.0;
                let funding_8h_bps = perp.funding_rate_8h() * 10_000.0;
                let expected_funding_cost_bps =
                    if perp_is_short { -funding_8h_bps } else { funding_8h_bps };
                let expected_pnl_pct = (net_bps - expected_funding_cost_bps) / 100.0;

                let notional = ctx.cfg.base_notional_usd;
                let symbol = format!("{base}/{}", spot.quote);
                let (buy_leg, sell_leg) = if perp_is_short {
                    (
                        OpportunityLeg {
                            exchange: spot.venue,
                            venue_type: VenueKind::Spot,
                            side: Side::Buy,
                            symbol: symbol.clone(),
                            price: spot.buy_price(),
                            quantity: notional / spot.buy_price(),
                        },
                        OpportunityLeg {
                            exchange: perp.venue,
                            venue_type: VenueKind::Perp,
                            side: Side::Sell,
                            symbol: symbol.clone(),
                            price: perp.sell_price(),
                            quantity: notional / perp.sell_price(),
                        },
                    )
                } else {
                    (
                        OpportunityLeg {
                            exchange: perp.venue,
                            venue_type: VenueKind::Perp,
                            side: Side::Buy,
                            symbol: symbol.clone(),
                            price: perp.buy_price(),
                            quantity: notional / perp.buy_price(),
                        },
                        OpportunityLeg {
                            exchange: spot.venue,
                            venue_type: VenueKind::Spot,
                            side: Side::Sell,
                            symbol: symbol.clone(),
                            price: spot.sell_price(),
                            quantity: notional / spot.sell_price(),
                        },
                    )
                };
                let legs = vec![buy_leg, sell_leg];

                let mut metadata = Map::new();
                metadata.insert("basis_bps".into(), json!(round3(basis_bps)));
                metadata.insert("spot_exchange".into(), json!(spot.venue.as_str()));
                metadata.insert("perp_exchange".into(), json!(perp.venue.as_str()));
                metadata.insert(
                    "perp_funding_8h_pct".into(),
                    json!(round3(perp.funding_rate_8h() * 100.0)),
                );
                metadata.insert("perp_oi_usd".into(), json!(perp.open_interest_usd.round()));
                metadata.insert(
                    "expected_funding_cost_bps".into(),
                    json!(round3(expected_funding_cost_bps)),
                );

                opportunities.push(Opportunity {
                    id: Opportunity::content_id(OpportunityKind::SpotVsPerp, &symbol, &legs),
                    kind: OpportunityKind::SpotVsPerp,
                    symbol: symbol.clone(),
                    spread_bps: round3(basis_bps),
                    expected_pnl_pct: round3(expected_pnl_pct),
                    notional,
                    timestamp: now,
                    description: format!(
                        "Basis arb: {base} spot {} @{} vs perp {} @{} ({:.1} bps)",
                        spot.venue,
                        format_price(spot.last),
                        perp.venue,
                        format_price(perp.last),
                        basis_bps,
                    ),
                    legs,
                    metadata: Some(metadata),
                    tradeable: None,
                    deposit_status: None,
                });
            }
        }
    }
    opportunities
}
