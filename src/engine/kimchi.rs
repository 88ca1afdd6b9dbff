//! Kimchi premium detector.
//!
//! Compares KRW-quoted Korean spot markets against USD(T)-quoted foreign
//! markets through the resolved fx rate. The foreign side may be a spot
//! ticker or a perp (new listings often trade perp-first); the Korean side
//! is spot only. Each candidate consults the allocation curve for sizing
//! and the wallet oracle for end-to-end tradeability.

use std::collections::HashMap;

use serde_json::{json, Map};

use crate::allocator;
use crate::models::{
    format_price, Opportunity, OpportunityKind, OpportunityLeg, Side, Ticker, Venue, VenueKind,
};

use super::spot_cross::round3;
use super::{usd_price, DetectCtx};

struct ForeignQuote {
    venue: Venue,
    kind: VenueKind,
    quote: String,
    last: f64,
    buy_price: f64,
    sell_price: f64,
    funding_8h: Option<f64>,
}

struct Candidate<'a> {
    base: &'a str,
    korean: &'a Ticker,
    foreign: ForeignQuote,
    premium_pct: f64,
}

pub(super) fn detect(ctx: &DetectCtx) -> Vec<Opportunity> {
    let now = ctx.view.taken_at;
    let max_age = ctx.max_age();
    let fx = ctx.fx.krw_per_usd;
    if fx <= 0.0 {
        return Vec::new();
    }

    let mut korean: HashMap<&str, Vec<&Ticker>> = HashMap::new();
    for ticker in &ctx.view.tickers {
        if ticker.kind == VenueKind::Spot
            && ticker.quote == "KRW"
            && ticker.venue.is_korean()
            && ticker.last > 0.0
            && ticker.is_fresh(now, max_age)
        {
            korean.entry(ticker.base.as_str()).or_default().push(ticker);
        }
    }
    if korean.is_empty() {
        return Vec::new();
    }

    let mut foreign: HashMap<&str, Vec<ForeignQuote>> = HashMap::new();
    for ticker in &ctx.view.tickers {
        if ticker.kind == VenueKind::Spot
            && matches!(ticker.quote.as_str(), "USDT" | "USD")
            && !ticker.venue.is_korean()
            && ticker.last > 0.0
            && ticker.is_fresh(now, max_age)
        {
            foreign.entry(ticker.base.as_str()).or_default().push(ForeignQuote {
                venue: ticker.venue,
                kind: VenueKind::Spot,
                quote: ticker.quote.clone(),
                last: ticker.last,
                buy_price: ticker.buy_price(),
                sell_price: ticker.sell_price(),
                funding_8h: None,
            });
        }
    }
    for perp in &ctx.view.perps {
        if perp.last > 0.0 && perp.is_fresh(now, max_age) {
            foreign.entry(perp.base.as_str()).or_default().push(ForeignQuote {
                venue: perp.venue,
                kind: VenueKind::Perp,
                quote: perp.quote.clone(),
                last: perp.last,
                buy_price: perp.buy_price(),
                sell_price: perp.sell_price(),
                funding_8h: Some(perp.funding_rate_8h()),
            });
        }
    }

    // First pass collects premiums so each emission can carry the tick-wide
    // average for context.
    let mut candidates = Vec::new();
    for (base, krw_tickers) in &korean {
        let Some(foreign_quotes) = foreign.get(base) else {
            continue;
        };
        for krw in krw_tickers {
            for fq in foreign_quotes {
                if fq.last <= 0.0 {
                    continue;
                }
                let premium_pct = ((krw.last / fx) - fq.last) / fq.last * 100.0;
                // Outsized premiums mean a halted or stale market, not money.
                if premium_pct.abs() > ctx.cfg.max_kimchi_abs_pct {
                    continue;
                }
                candidates.push(Candidate {
                    base: *base,
                    korean: *krw,
                    foreign: ForeignQuote {
                        venue: fq.venue,
                        kind: fq.kind,
                        quote: fq.quote.clone(),
                        last: fq.last,
                        buy_price: fq.buy_price,
                        sell_price: fq.sell_price,
                        funding_8h: fq.funding_8h,
                    },
                    premium_pct,
                });
            }
        }
    }
    if candidates.is_empty() {
        return Vec::new();
    }
    let avg_premium =
        candidates.iter().map(|c| c.premium_pct).sum::<f64>() / candidates.len() as f64;

    let mut opportunities = Vec::new();
    for candidate in &candidates {
        let premium = candidate.premium_pct;
        if premium.abs() < ctx.cfg.min_kimchi_pct {
            continue;
        }

        let alloc = allocator::evaluate(
            &ctx.cfg.allocation_curve,
            premium,
            ctx.cfg.tether_total_equity_usd,
        );
        if alloc.target_allocation_pct < ctx.cfg.min_kimchi_allocation_pct {
            continue;
        }

        let korean = candidate.korean;
        let fq = &candidate.foreign;
        let positive = premium >= 0.0;
        let (tradeable, deposit_status) =
            ctx.wallet.kimchi_tradeable(fq.venue, korean.venue, candidate.base, positive);

        let notional = ctx.cfg.base_notional_usd;
        let krw_symbol = format!("{}/KRW", candidate.base);
        let foreign_symbol = format!("{}/{}", candidate.base, fq.quote);
        let legs = if positive {
            vec![
                OpportunityLeg {
                    exchange: fq.venue,
                    venue_type: fq.kind,
                    side: Side::Buy,
                    symbol: foreign_symbol.clone(),
                    price: fq.buy_price,
                    quantity: notional / fq.buy_price,
                },
                OpportunityLeg {
                    exchange: korean.venue,
                    venue_type: VenueKind::Spot,
                    side: Side::Sell,
                    symbol: krw_symbol.clone(),
                    price: korean.sell_price(),
                    quantity: notional / usd_price(korean.sell_price(), "KRW", ctx.fx),
                },
            ]
        } else {
            vec![
                OpportunityLeg {
                    exchange: korean.venue,
                    venue_type: VenueKind::Spot,
                    side: Side::Buy,
                    symbol: krw_symbol.clone(),
                    price: korean.buy_price(),
                    quantity: notional / usd_price(korean.buy_price(), "KRW", ctx.fx),
                },
                OpportunityLeg {
                    exchange: fq.venue,
                    venue_type: fq.kind,
                    side: Side::Sell,
                    symbol: foreign_symbol.clone(),
                    price: fq.sell_price,
                    quantity: notional / fq.sell_price,
                },
            ]
        };

        let mut metadata = Map::new();
        metadata.insert("premium_pct".into(), json!(round3(premium)));
        metadata.insert("avg_premium_pct".into(), json!(round3(avg_premium)));
        metadata.insert(
            "deviation_from_avg".into(),
            json!(round3((premium - avg_premium).abs())),
        );
        metadata.insert("fx_rate".into(), json!((fx * 10_000.0).round() / 10_000.0));
        metadata.insert(
            "target_allocation_pct".into(),
            json!(round3(alloc.target_allocation_pct)),
        );
        metadata.insert(
            "recommended_notional".into(),
            json!((alloc.recommended_notional_usd * 100.0).round() / 100.0),
        );
        metadata.insert("recommended_action".into(), json!(alloc.action.as_str()));
        if let Some(funding_8h) = fq.funding_8h {
            metadata.insert("funding_rate_8h_pct".into(), json!(round4(funding_8h * 100.0)));
            metadata
                .insert("funding_rate_24h_pct".into(), json!(round4(funding_8h * 3.0 * 100.0)));
        }

        let symbol = format!("{krw_symbol} vs {foreign_symbol}");
        let strategy = if fq.kind == VenueKind::Spot { "Kimchi premium" } else { "Price diff" };
        let description = format!(
            "{strategy} {premium:.2}% (avg {avg_premium:.2}%) - {}({}) vs {}({}) @{} / @{}",
            korean.venue,
            VenueKind::Spot.as_str(),
            fq.venue,
            fq.kind.as_str(),
            format_price(korean.last),
            format_price(fq.last),
        );

        opportunities.push(Opportunity {
            id: Opportunity::content_id(OpportunityKind::KimchiPremium, &symbol, &legs),
            kind: OpportunityKind::KimchiPremium,
            symbol,
            spread_bps: round3(premium * 100.0),
            expected_pnl_pct: round3(premium),
            notional,
            timestamp: now,
            description,
            legs,
            metadata: Some(metadata),
            tradeable: Some(tradeable),
            deposit_status: Some(deposit_status),
        });
    }
    opportunities
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

#[cfg(test)]
mod tests {
    use crate::allocator::{AllocAction, CurvePoint};
    use crate::config::Config;
    use crate::engine::testutil::*;
    use crate::engine::DetectCtx;
    use crate::models::{Tradeable, Venue, WalletEntry};
    use crate::wallet::WalletOracle;

    fn tether_curve() -> Vec<CurvePoint> {
        vec![
            CurvePoint { premium_pct: 0.0, allocation_pct: 0.0, action: AllocAction::Flat },
            CurvePoint { premium_pct: 2.0, allocation_pct: 25.0, action: AllocAction::SellKrw },
            CurvePoint { premium_pct: 5.0, allocation_pct: 75.0, action: AllocAction::SellKrw },
        ]
    }

    fn detect_with(
        view: &crate::snapshot::SnapshotView,
        config: &Config,
        wallet: &WalletOracle,
    ) -> Vec<crate::models::Opportunity> {
        let rate = fx(1450.0);
        let ctx = DetectCtx { cfg: config, view, fx: &rate, wallet };
        super::detect(&ctx)
    }

    #[test]
    fn positive_premium_with_allocation_metadata() {
        // Upbit 88,500,000 KRW, Binance 60,000 USDT, fx 1450: premium ~1.72%.
        let view = view(
            vec![
                spot(Venue::Upbit, "BTC", "KRW", 88_500_000.0),
                spot(Venue::Binance, "BTC", "USDT", 60_000.0),
            ],
            vec![],
        );
        let mut config = cfg();
        config.allocation_curve = tether_curve();
        config.tether_total_equity_usd = 100_000.0;
        let wallet = WalletOracle::new(&config);

        let opps = detect_with(&view, &config, &wallet);
        assert_eq!(opps.len(), 1);
        let opp = &opps[0];
        let meta = opp.metadata.as_ref().unwrap();

        let premium = meta["premium_pct"].as_f64().unwrap();
        assert!((premium - 1.724).abs() < 0.01);
        assert!((meta["target_allocation_pct"].as_f64().unwrap() - 21.5).abs() < 0.2);
        assert!((meta["recommended_notional"].as_f64().unwrap() - 21_500.0).abs() < 200.0);
        assert_eq!(meta["recommended_action"].as_str().unwrap(), "sell_krw");

        // Wallet tables are empty, so tradeability is unknown, not false.
        assert_eq!(opp.tradeable, Some(Tradeable::Unknown));
    }

    #[test]
    fn premium_sign_matches_price_relation() {
        let mut config = cfg();
        config.allocation_curve = tether_curve();

        // Korean side richer: positive premium, sell KRW.
        let rich = view(
            vec![
                spot(Venue::Upbit, "BTC", "KRW", 88_500_000.0),
                spot(Venue::Binance, "BTC", "USDT", 60_000.0),
            ],
            vec![],
        );
        let wallet = WalletOracle::new(&config);
        let opps = detect_with(&rich, &config, &wallet);
        assert!(opps[0].spread_bps > 0.0);
        assert_eq!(opps[0].legs[0].exchange, Venue::Binance); // buy foreign

        // Foreign side richer: negative premium, legs invert.
        let cheap = view(
            vec![
                spot(Venue::Upbit, "BTC", "KRW", 85_000_000.0),
                spot(Venue::Binance, "BTC", "USDT", 60_000.0),
            ],
            vec![],
        );
        let opps = detect_with(&cheap, &config, &wallet);
        assert_eq!(opps.len(), 1);
        assert!(opps[0].spread_bps < 0.0);
        assert_eq!(opps[0].legs[0].exchange, Venue::Upbit); // buy korean
    }

    #[test]
    fn absurd_premium_is_dropped_as_halted() {
        // 70% premium: trading halt or stale market, not an opportunity.
        let view = view(
            vec![
                spot(Venue::Upbit, "XYZ", "KRW", 148_000_000.0),
                spot(Venue::Binance, "XYZ", "USDT", 60_000.0),
            ],
            vec![],
        );
        let config = cfg();
        let wallet = WalletOracle::new(&config);
        assert!(detect_with(&view, &config, &wallet).is_empty());
    }

    #[test]
    fn wallet_flags_stamp_tradeability() {
        let view = view(
            vec![
                spot(Venue::Upbit, "BTC", "KRW", 88_500_000.0),
                spot(Venue::Binance, "BTC", "USDT", 60_000.0),
            ],
            vec![],
        );
        let mut config = cfg();
        config.allocation_curve = tether_curve();
        let wallet = WalletOracle::new(&config);
        wallet.set(Venue::Binance, "BTC", WalletEntry { deposit: Some(true), withdraw: Some(true) });
        wallet.set(Venue::Upbit, "BTC", WalletEntry { deposit: Some(true), withdraw: Some(true) });

        let opps = detect_with(&view, &config, &wallet);
        assert_eq!(opps[0].tradeable, Some(Tradeable::Yes));
        let status = opps[0].deposit_status.unwrap();
        assert_eq!(status.buy, Some(true));
        assert_eq!(status.sell, Some(true));

        // A disabled Korean deposit blocks the positive-premium flow.
        wallet.set(Venue::Upbit, "BTC", WalletEntry { deposit: Some(false), withdraw: Some(true) });
        let opps = detect_with(&view, &config, &wallet);
        assert_eq!(opps[0].tradeable, Some(Tradeable::No));
    }

    #[test]
    fn perp_foreign_side_carries_funding_metadata() {
        let view = view(
            vec![spot(Venue::Upbit, "BTC", "KRW", 88_500_000.0)],
            vec![perp(Venue::Hyperliquid, "BTC", 60_000.0, 0.0016, 50_000_000.0)],
        );
        let mut config = cfg();
        config.allocation_curve = tether_curve();
        let wallet = WalletOracle::new(&config);
        let opps = detect_with(&view, &config, &wallet);
        assert_eq!(opps.len(), 1);
        let meta = opps[0].metadata.as_ref().unwrap();
        assert!((meta["funding_rate_8h_pct"].as_f64().unwrap() - 0.16).abs() < 1e-9);
        assert!((meta["funding_rate_24h_pct"].as_f64().unwrap() - 0.48).abs() < 1e-9);
    }
}
