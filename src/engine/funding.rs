//! Funding-rate differential detector.
//!
//! For every base asset listed on two or more perp venues, goes long where
//! funding is most negative (the receiver) and short where it is most
//! positive (the payer). The emitted spread is the executable price
//! cross-spread; the funding differential rides in metadata.

use std::collections::HashMap;

use serde_json::{json, Map};

use crate::models::{Opportunity, OpportunityKind, OpportunityLeg, PerpMarket, Side, VenueKind};

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

    let min_funding = ctx.cfg.min_funding_8h_pct / 100.0;
    let mut opportunities = Vec::new();
    for (base, perps) in grouped {
        if perps.len() < 2 {
            continue;
        }
        // Long the most negative funding, short the most positive.
        let Some(long) = perps
            .iter()
            .min_by(|a, b| a.funding_rate_8h().total_cmp(&b.funding_rate_8h()))
        else {
            continue;
        };
        let Some(short) = perps
            .iter()
            .max_by(|a, b| a.funding_rate_8h().total_cmp(&b.funding_rate_8h()))
        else {
            continue;
        };
        if long.venue == short.venue {
            continue;
        }

        let long_funding = long.funding_rate_8h();
        let short_funding = short.funding_rate_8h();
        let best = long_funding.abs().max(short_funding.abs());
        if best < min_funding {
            continue;
        }
        let funding_diff_8h = short_funding - long_funding;

        // Two wide books eat the funding edge before it accrues.
        let combined_spread_bps = long.book_spread_bps() + short.book_spread_bps();
        if combined_spread_bps > ctx.cfg.max_combined_spread_bps {
            continue;
        }

        let buy_px = long.buy_price();
        let sell_px = short.sell_price();
        if buy_px <= 0.0 {
            continue;
        }
        let spread_bps = (sell_px - buy_px) / buy_px * 10_000.0;
        let expected_pnl_pct = funding_diff_8h * 100.0 - combined_spread_bps / 100.0;

        let notional = ctx.cfg.base_notional_usd;
        let symbol = format!("{base}/USDT:USDT");
        let legs = vec![
            OpportunityLeg {
                exchange: long.venue,
                venue_type: VenueKind::Perp,
                side: Side::Buy,
                symbol: symbol.clone(),
                price: buy_px,
                quantity: notional / buy_px,
            },
            OpportunityLeg {
                exchange: short.venue,
                venue_type: VenueKind::Perp,
                side: Side::Sell,
                symbol: symbol.clone(),
                price: sell_px,
                quantity: notional / sell_px,
            },
        ];

        let mut metadata = Map::new();
        metadata.insert("funding_diff_8h_pct".into(), json!(round4(funding_diff_8h * 100.0)));
        metadata.insert("long_exchange".into(), json!(long.venue.as_str()));
        metadata.insert("long_funding_8h_pct".into(), json!(round4(long_funding * 100.0)));
        metadata.insert("long_oi_usd".into(), json!(round2(long.open_interest_usd)));
        metadata.insert("short_exchange".into(), json!(short.venue.as_str()));
        metadata.insert("short_funding_8h_pct".into(), json!(round4(short_funding * 100.0)));
        metadata.insert("short_oi_usd".into(), json!(round2(short.open_interest_usd)));
        metadata.insert("total_spread_bps".into(), json!(round2(combined_spread_bps)));

        opportunities.push(Opportunity {
            id: Opportunity::content_id(OpportunityKind::FundingArb, &symbol, &legs),
            kind: OpportunityKind::FundingArb,
            symbol: symbol.clone(),
            spread_bps: round3(spread_bps),
            expected_pnl_pct: round3(expected_pnl_pct),
            notional,
            timestamp: now,
            description: format!(
                "Funding arb: Long {} @{:.4}%/8H, Short {} @{:.4}%/8H",
                long.venue,
                long_funding * 100.0,
                short.venue,
                short_funding * 100.0,
            ),
            legs,
            metadata: Some(metadata),
            tradeable: None,
            deposit_status: None,
        });
    }
    opportunities
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

#[cfg(test)]
mod tests {
    use crate::config::Config;
    use crate::engine::testutil::*;
    use crate::engine::DetectCtx;
    use crate::models::{PerpMarket, Venue};
    use crate::wallet::WalletOracle;

    fn detect(view: &crate::snapshot::SnapshotView) -> Vec<crate::models::Opportunity> {
        let config = Config::default();
        let wallet = WalletOracle::new(&config);
        let rate = fx(1450.0);
        let ctx = DetectCtx { cfg: &config, view, fx: &rate, wallet: &wallet };
        super::detect(&ctx)
    }

    fn hourly(mut p: PerpMarket, rate_per_hour: f64) -> PerpMarket {
        p.funding_rate = rate_per_hour;
        p.funding_interval_hours = 1.0;
        p
    }

    #[test]
    fn long_receiver_short_payer() {
        // Binance 0.01%/8h vs Hyperliquid 0.02%/1h (0.16%/8h-equivalent).
        let view = view(
            vec![],
            vec![
                perp(Venue::BinanceFutures, "BTC", 60_000.0, 0.0001, 50_000_000.0),
                hourly(
                    perp(Venue::Hyperliquid, "BTC", 60_010.0, 0.0, 50_000_000.0),
                    0.0002,
                ),
            ],
        );
        let opps = detect(&view);
        assert_eq!(opps.len(), 1);
        let opp = &opps[0];
        let meta = opp.metadata.as_ref().unwrap();

        assert_eq!(meta["long_exchange"].as_str().unwrap(), "binance_futures");
        assert_eq!(meta["short_exchange"].as_str().unwrap(), "hyperliquid");
        assert!((meta["funding_diff_8h_pct"].as_f64().unwrap() - 0.15).abs() < 1e-6);
        // Cross-spread between two books a few ticks apart stays inside the gate.
        assert!(opp.spread_bps.abs() <= 20.0);
    }

    #[test]
    fn oi_gate_suppresses_thin_legs() {
        let view = view(
            vec![],
            vec![
                perp(Venue::BinanceFutures, "BTC", 60_000.0, 0.0001, 50_000_000.0),
                perp(Venue::Hyperliquid, "BTC", 60_010.0, 0.0016, 50_000.0), // below $100k
            ],
        );
        assert!(detect(&view).is_empty());
    }

    #[test]
    fn negligible_funding_is_ignored() {
        let view = view(
            vec![],
            vec![
                perp(Venue::BinanceFutures, "BTC", 60_000.0, 0.00005, 50_000_000.0),
                perp(Venue::Bybit, "BTC", 60_010.0, 0.00002, 50_000_000.0),
            ],
        );
        assert!(detect(&view).is_empty());
    }

    #[test]
    fn wide_combined_book_kills_the_edge() {
        let mut a = perp(Venue::BinanceFutures, "BTC", 60_000.0, -0.001, 50_000_000.0);
        a.bid = Some(59_900.0);
        a.ask = Some(60_100.0); // ~33 bps on its own
        let b = perp(Venue::Bybit, "BTC", 60_010.0, 0.001, 50_000_000.0);
        let view = view(vec![], vec![a, b]);
        assert!(detect(&view).is_empty());
    }
}
