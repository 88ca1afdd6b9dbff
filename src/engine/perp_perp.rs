//! Perp vs perp spread detector.
//!
//! Same shape as the spot cross but on perp books, with the open-interest
//! gate on both sides. No funding adjustment: the position is assumed flat
//! over the execution horizon.

use std::collections::HashMap;

use serde_json::{json, Map};

use crate::models::{
    format_price, Opportunity, OpportunityKind, OpportunityLeg, PerpMarket, Side, VenueKind,
};

use super::spot_cross::round3;
use super::DetectCtx;

pub(super) fn detect(ctx: &DetectCtx) -> Vec<Opportunity> {
    let now = ctx.view.taken_at;
    let max_age = ctx.max_age();

    let mut grouped: HashMap<&str, Vec<&PerpMarket>> = HashMap::new();
    for perp in &ctx.view.perps {
        if perp.last <= 0.0 || !perp.is_fresh(now, max_age) {
            continue;
        }
        if perp.open_interest_usd < ctx.cfg.min_oi_usd {
            continue;
        }
        grouped.entry(perp.base.as_str()).or_default().push(perp);
    }

    let mut opportunities = Vec::new();
    for (base, perps) in grouped {
        if perps.len() < 2 {
            continue;
        }
        let Some(buy) = perps.iter().min_by(|a, b| a.buy_price().total_cmp(&b.buy_price()))
        else {
            continue;
        };
        let Some(sell) = perps.iter().max_by(|a, b| a.sell_price().total_cmp(&b.sell_price()))
        else {
            continue;
        };
        if buy.venue == sell.venue {
            continue;
        }

        let buy_px = buy.buy_price();
        let sell_px = sell.sell_price();
        if buy_px <= 0.0 {
            continue;
        }
        let spread_bps = (sell_px - buy_px) / buy_px * 10_000.0;
        if spread_bps < ctx.cfg.min_spread_bps {
            continue;
        }
        let net_bps = spread_bps - ctx.round_trip_cost_bps();
        if net_bps <= 0.0 {
            continue;
        }

        let notional = ctx.cfg.base_notional_usd;
        let symbol = format!("{base}/USDT:USDT");
        let legs = vec![
            OpportunityLeg {
                exchange: buy.venue,
                venue_type: VenueKind::Perp,
                side: Side::Buy,
                symbol: symbol.clone(),
                price: buy_px,
                quantity: notional / buy_px,
            },
            OpportunityLeg {
                exchange: sell.venue,
                venue_type: VenueKind::Perp,
                side: Side::Sell,
                symbol: symbol.clone(),
                price: sell_px,
                quantity: notional / sell_px,
            },
        ];

        let mut metadata = Map::new();
        metadata.insert(
            "funding_diff_8h_pct".into(),
            json!(round3((buy.funding_rate_8h() - sell.funding_rate_8h()).abs() * 100.0)),
        );
        metadata.insert("buy_oi_usd".into(), json!(buy.open_interest_usd.round()));
        metadata.insert("sell_oi_usd".into(), json!(sell.open_interest_usd.round()));

        opportunities.push(Opportunity {
            id: Opportunity::content_id(OpportunityKind::PerpPerpSpread, &symbol, &legs),
            kind: OpportunityKind::PerpPerpSpread,
            symbol: symbol.clone(),
            spread_bps: round3(spread_bps),
            expected_pnl_pct: round3(net_bps / 100.0),
            notional,
            timestamp: now,
            description: format!(
                "Perp spread: Buy {} @{}, Sell {} @{}",
                buy.venue,
                format_price(buy_px),
                sell.venue,
                format_price(sell_px),
            ),
            legs,
            metadata: Some(metadata),
            tradeable: None,
            deposit_status: None,
        });
    }
    opportunities
}

#[cfg(test)]
mod tests {
    use crate::config::Config;
    use crate::engine::testutil::*;
    use crate::engine::DetectCtx;
    use crate::models::Venue;
    use crate::wallet::WalletOracle;

    fn detect(view: &crate::snapshot::SnapshotView) -> Vec<crate::models::Opportunity> {
        let config = Config::default();
        let wallet = WalletOracle::new(&config);
        let rate = fx(1450.0);
        let ctx = DetectCtx { cfg: &config, view, fx: &rate, wallet: &wallet };
        super::detect(&ctx)
    }

    #[test]
    fn wide_perp_gap_is_emitted() {
        let view = view(
            vec![],
            vec![
                perp(Venue::BinanceFutures, "BTC", 60_000.0, 0.0001, 50_000_000.0),
                perp(Venue::Bitget, "BTC", 60_200.0, 0.0001, 20_000_000.0),
            ],
        );
        let opps = detect(&view);
        assert_eq!(opps.len(), 1);
        assert_eq!(opps[0].legs[0].exchange, Venue::BinanceFutures);
        assert_eq!(opps[0].legs[1].exchange, Venue::Bitget);
        assert!(opps[0].spread_bps > 20.0);
    }

    #[test]
    fn oi_gate_applies_to_both_sides() {
        let view = view(
            vec![],
            vec![
                perp(Venue::BinanceFutures, "BTC", 60_000.0, 0.0001, 50_000.0), // thin
                perp(Venue::Bitget, "BTC", 60_200.0, 0.0001, 20_000_000.0),
            ],
        );
        assert!(detect(&view).is_empty());
    }

    #[test]
    fn spread_below_fees_is_rejected() {
        let view = view(
            vec![],
            vec![
                perp(Venue::BinanceFutures, "BTC", 60_000.0, 0.0001, 50_000_000.0),
                perp(Venue::Bitget, "BTC", 60_060.0, 0.0001, 20_000_000.0), // ~10 bps
            ],
        );
        assert!(detect(&view).is_empty());
    }
}
