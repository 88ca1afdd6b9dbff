//! Cross-exchange spot spread detector.
//!
//! Groups fresh spot tickers by pair, buys the cheapest ask and sells the
//! richest bid when the gap survives the fee gate. Legs are sized to equal
//! USD notional so the pair is delta-neutral.

use std::collections::HashMap;

use serde_json::{json, Map};

use crate::models::{
    format_price, Instrument, Opportunity, OpportunityKind, OpportunityLeg, Side, Ticker,
    VenueKind,
};

use super::{usd_price, DetectCtx};

pub(super) fn detect(ctx: &DetectCtx) -> Vec<Opportunity> {
    let now = ctx.view.taken_at;
    let max_age = ctx.max_age();

    let mut groups: HashMap<Instrument, Vec<&Ticker>> = HashMap::new();
    for ticker in &ctx.view.tickers {
        if ticker.kind != VenueKind::Spot || ticker.last <= 0.0 {
            continue;
        }
        if !ticker.is_fresh(now, max_age) {
            continue;
        }
        groups
            .entry(Instrument::new(ticker.base.as_str(), ticker.quote.as_str(), VenueKind::Spot))
            .or_default()
            .push(ticker);
    }

    let mut opportunities = Vec::new();
    for (instrument, tickers) in groups {
        if tickers.len() < 2 {
            continue;
        }
        let Some(buy) = tickers.iter().min_by(|a, b| a.buy_price().total_cmp(&b.buy_price()))
        else {
            continue;
        };
        let Some(sell) = tickers.iter().max_by(|a, b| a.sell_price().total_cmp(&b.sell_price()))
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
        let symbol = instrument.pair();
        let legs = vec![
            OpportunityLeg {
                exchange: buy.venue,
                venue_type: VenueKind::Spot,
                side: Side::Buy,
                symbol: symbol.clone(),
                price: buy_px,
                quantity: notional / usd_price(buy_px, &instrument.quote, ctx.fx),
            },
            OpportunityLeg {
                exchange: sell.venue,
                venue_type: VenueKind::Spot,
                side: Side::Sell,
                symbol: symbol.clone(),
                price: sell_px,
                quantity: notional / usd_price(sell_px, &instrument.quote, ctx.fx),
            },
        ];

        let mut metadata = Map::new();
        metadata.insert("buy_exchange".into(), json!(buy.venue.as_str()));
        metadata.insert("sell_exchange".into(), json!(sell.venue.as_str()));
        metadata.insert("gross_spread_bps".into(), json!(round3(spread_bps)));

        opportunities.push(Opportunity {
            id: Opportunity::content_id(OpportunityKind::SpotCross, &symbol, &legs),
            kind: OpportunityKind::SpotCross,
            symbol: symbol.clone(),
            spread_bps: round3(spread_bps),
            expected_pnl_pct: round3(net_bps / 100.0),
            notional,
            timestamp: now,
            description: format!(
                "Buy {symbol} on {} @{} / sell on {} @{}",
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

pub(super) fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::config::Config;
    use crate::engine::testutil::*;
    use crate::engine::{DetectCtx, OpportunityEngine};
    use crate::models::{OpportunityKind, Side, Venue};
    use crate::wallet::WalletOracle;

    fn detect(view: &crate::snapshot::SnapshotView, config: &Config) -> Vec<crate::models::Opportunity> {
        let wallet = WalletOracle::new(config);
        let rate = fx(1450.0);
        let ctx = DetectCtx { cfg: config, view, fx: &rate, wallet: &wallet };
        super::detect(&ctx)
    }

    #[test]
    fn prefers_book_prices_over_last() {
        let view = view(
            vec![
                spot_with_book(Venue::Binance, "BTC", "USDT", 60_050.0, 59_990.0, 60_000.0),
                spot_with_book(Venue::Okx, "BTC", "USDT", 60_050.0, 60_150.0, 60_160.0),
            ],
            vec![],
        );
        let opps = detect(&view, &cfg());
        assert_eq!(opps.len(), 1);
        let opp = &opps[0];
        assert_eq!(opp.legs[0].side, Side::Buy);
        assert_eq!(opp.legs[0].price, 60_000.0);
        assert_eq!(opp.legs[1].price, 60_150.0);
    }

    #[test]
    fn spread_below_cost_gate_is_rejected() {
        // 8 bps gross spread cannot cover 20 bps of fees.
        let view = view(
            vec![
                spot(Venue::Binance, "BTC", "USDT", 60_000.0),
                spot(Venue::Okx, "BTC", "USDT", 60_048.0),
            ],
            vec![],
        );
        assert!(detect(&view, &cfg()).is_empty());
    }

    #[test]
    fn single_venue_groups_are_skipped() {
        let view = view(vec![spot(Venue::Binance, "BTC", "USDT", 60_000.0)], vec![]);
        assert!(detect(&view, &cfg()).is_empty());
    }

    #[test]
    fn krw_pairs_cross_between_korean_venues() {
        let view = view(
            vec![
                spot(Venue::Upbit, "BTC", "KRW", 88_000_000.0),
                spot(Venue::Bithumb, "BTC", "KRW", 88_500_000.0),
            ],
            vec![],
        );
        let config = cfg();
        let opps = detect(&view, &config);
        assert_eq!(opps.len(), 1);
        // ~56.8 bps gross
        assert!(opps[0].spread_bps > 50.0);
        // Legs sized to equal USD notional despite KRW prices.
        let net = crate::engine::net_notional_usd(&opps[0], &fx(1450.0));
        assert!(net.abs() < 1e-6);
    }

    #[test]
    fn engine_dedups_per_venue_set() {
        let view = view(
            vec![
                spot(Venue::Binance, "BTC", "USDT", 60_000.0),
                spot(Venue::Okx, "BTC", "USDT", 60_150.0),
            ],
            vec![],
        );
        let config = cfg();
        let engine = OpportunityEngine::new(config.clone(), Arc::new(WalletOracle::new(&config)));
        let opps = engine.detect(&view, &fx(1450.0));
        let cross = opps.iter().filter(|o| o.kind == OpportunityKind::SpotCross).count();
        assert_eq!(cross, 1);
    }
}
