//! Opportunity engine.
//!
//! One detection pass reads a consistent snapshot view, runs every enabled
//! detector, then concatenates, deduplicates, ranks and truncates the
//! results. Detectors are pure with respect to the view: running the engine
//! twice on the same view yields the same opportunity set, ids included.

pub mod alerts;
mod basis;
mod funding;
mod kimchi;
mod perp_perp;
mod spot_cross;

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Duration;
use tracing::{debug, error};

use crate::config::Config;
use crate::models::{FxRate, Opportunity};
use crate::snapshot::SnapshotView;
use crate::wallet::WalletOracle;

/// Everything a detector needs for one pass.
pub struct DetectCtx<'a> {
    pub cfg: &'a Config,
    pub view: &'a SnapshotView,
    pub fx: &'a FxRate,
    pub wallet: &'a WalletOracle,
}

impl DetectCtx<'_> {
    /// Freshness window for tickers entering detection.
    pub fn max_age(&self) -> Duration {
        Duration::from_std(self.cfg.max_ticker_age).unwrap_or_else(|_| Duration::seconds(10))
    }

    /// Round-trip cost estimate in bps: taker fee on both legs plus
    /// configured slippage.
    pub fn round_trip_cost_bps(&self) -> f64 {
        self.cfg.fee_bps * 2.0 + self.cfg.slippage_bps
    }
}

pub struct OpportunityEngine {
    cfg: Config,
    wallet: Arc<WalletOracle>,
}

impl OpportunityEngine {
    pub fn new(cfg: Config, wallet: Arc<WalletOracle>) -> Self {
        Self { cfg, wallet }
    }

    /// Run all detectors over one snapshot view and rank the results.
    pub fn detect(&self, view: &SnapshotView, fx: &FxRate) -> Vec<Opportunity> {
        let ctx = DetectCtx { cfg: &self.cfg, view, fx, wallet: &self.wallet };

        let mut opportunities = spot_cross::detect(&ctx);
        opportunities.extend(kimchi::detect(&ctx));
        opportunities.extend(funding::detect(&ctx));
        opportunities.extend(basis::detect(&ctx));
        opportunities.extend(perp_perp::detect(&ctx));

        // Candidates violating the leg-balance invariant are dropped, not
        // propagated; the tick continues.
        opportunities.retain(|opp| {
            let tolerance = 1e-6
                * opp
                    .legs
                    .iter()
                    .map(|l| (l.price * l.quantity).abs())
                    .fold(0.0_f64, f64::max)
                    .max(1.0);
            let net = net_notional_usd(opp, fx);
            if net.abs() > tolerance {
                error!(
                    kind = opp.kind.as_str(),
                    symbol = %opp.symbol,
                    net_notional = net,
                    "dropping opportunity with unbalanced legs"
                );
                return false;
            }
            true
        });

        // Rank by spread magnitude, then keep the best entry per
        // (kind, symbol, venue set).
        opportunities.sort_by(|a, b| b.spread_bps.abs().total_cmp(&a.spread_bps.abs()));
        let mut seen = HashSet::new();
        opportunities.retain(|opp| {
            let mut venues: Vec<&'static str> =
                opp.legs.iter().map(|l| l.exchange.as_str()).collect();
            venues.sort_unstable();
            seen.insert((opp.kind, opp.symbol.clone(), venues))
        });

        if opportunities.len() > self.cfg.max_opportunities {
            debug!(
                dropped = opportunities.len() - self.cfg.max_opportunities,
                "truncating opportunity list"
            );
            opportunities.truncate(self.cfg.max_opportunities);
        }
        opportunities
    }
}

/// Venue-native price expressed in USD; KRW quotes convert through fx.
pub(crate) fn usd_price(price: f64, quote: &str, fx: &FxRate) -> f64 {
    if quote == "KRW" {
        price / fx.krw_per_usd
    } else {
        price
    }
}

/// Signed leg notional sum in USD; KRW-quoted legs convert through the fx
/// rate so the balance check is currency-consistent.
pub fn net_notional_usd(opp: &Opportunity, fx: &FxRate) -> f64 {
    opp.legs
        .iter()
        .map(|leg| {
            let usd_price = if leg.symbol.ends_with("/KRW") {
                leg.price / fx.krw_per_usd
            } else {
                leg.price
            };
            leg.side.sign() * usd_price * leg.quantity
        })
        .sum()
}

#[cfg(test)]
pub(crate) mod testutil {
    use chrono::{Duration, Utc};

    use crate::config::Config;
    use crate::models::{FxRate, PerpMarket, Ticker, Venue, VenueKind};
    use crate::snapshot::SnapshotView;

    pub fn fx(rate: f64) -> FxRate {
        FxRate {
            krw_per_usd: rate,
            source: "test".into(),
            is_fallback: false,
            fetched_at: Utc::now(),
        }
    }

    pub fn cfg() -> Config {
        Config::default()
    }

    pub fn spot(venue: Venue, base: &str, quote: &str, last: f64) -> Ticker {
        Ticker {
            venue,
            kind: VenueKind::Spot,
            base: base.into(),
            quote: quote.into(),
            last,
            bid: None,
            ask: None,
            timestamp: Utc::now(),
        }
    }

    pub fn spot_with_book(
        venue: Venue,
        base: &str,
        quote: &str,
        last: f64,
        bid: f64,
        ask: f64,
    ) -> Ticker {
        Ticker { bid: Some(bid), ask: Some(ask), ..spot(venue, base, quote, last) }
    }

    pub fn aged(ticker: Ticker, age_secs: i64) -> Ticker {
        Ticker { timestamp: Utc::now() - Duration::seconds(age_secs), ..ticker }
    }

    pub fn perp(venue: Venue, base: &str, last: f64, funding_8h: f64, oi_usd: f64) -> PerpMarket {
        PerpMarket {
            venue,
            base: base.into(),
            quote: "USDT".into(),
            last,
            bid: Some(last * 0.9998),
            ask: Some(last * 1.0002),
            funding_rate: funding_8h,
            funding_interval_hours: 8.0,
            next_funding_time: None,
            open_interest_usd: oi_usd,
            timestamp: Utc::now(),
        }
    }

    pub fn view(tickers: Vec<Ticker>, perps: Vec<PerpMarket>) -> SnapshotView {
        SnapshotView { tickers, perps, taken_at: Utc::now() }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::testutil::*;
    use super::*;
    use crate::models::{OpportunityKind, Venue};

    fn engine(cfg: Config) -> OpportunityEngine {
        OpportunityEngine::new(cfg.clone(), Arc::new(WalletOracle::new(&cfg)))
    }

    #[test]
    fn cross_exchange_spot_scenario() {
        // Binance 60000 vs OKX 60150, both fresh, fees 10 bps per side.
        let view = view(
            vec![
                spot(Venue::Binance, "BTC", "USDT", 60_000.0),
                spot(Venue::Okx, "BTC", "USDT", 60_150.0),
            ],
            vec![],
        );
        let eng = engine(cfg());
        let opps = eng.detect(&view, &fx(1450.0));

        let cross: Vec<_> =
            opps.iter().filter(|o| o.kind == OpportunityKind::SpotCross).collect();
        assert_eq!(cross.len(), 1);
        let opp = cross[0];
        assert!((opp.spread_bps - 25.0).abs() < 0.01);
        assert!((opp.expected_pnl_pct - 0.05).abs() < 0.001);
        assert_eq!(opp.legs.len(), 2);
        assert_eq!(opp.legs[0].exchange, Venue::Binance);
        assert_eq!(opp.legs[1].exchange, Venue::Okx);
    }

    #[test]
    fn stale_ticker_produces_nothing() {
        // Bithumb is 30s old with max_age 10s: no kimchi opportunity even
        // though the nominal premium is large.
        let view = view(
            vec![
                aged(spot(Venue::Bithumb, "BTC", "KRW", 92_000_000.0), 30),
                spot(Venue::Binance, "BTC", "USDT", 60_000.0),
            ],
            vec![],
        );
        let eng = engine(cfg());
        let opps = eng.detect(&view, &fx(1450.0));
        assert!(opps.iter().all(|o| o.kind != OpportunityKind::KimchiPremium));
    }

    #[test]
    fn detection_is_deterministic_per_snapshot() {
        let view = view(
            vec![
                spot(Venue::Binance, "BTC", "USDT", 60_000.0),
                spot(Venue::Okx, "BTC", "USDT", 60_150.0),
                spot(Venue::Upbit, "BTC", "KRW", 88_500_000.0),
            ],
            vec![
                perp(Venue::BinanceFutures, "BTC", 60_010.0, 0.0001, 50_000_000.0),
                perp(Venue::Hyperliquid, "BTC", 60_020.0, 0.0016, 50_000_000.0),
            ],
        );
        let eng = engine(cfg());
        let rate = fx(1450.0);

        let first = eng.detect(&view, &rate);
        let second = eng.detect(&view, &rate);
        assert_eq!(first.len(), second.len());
        for (a, b) in first.iter().zip(second.iter()) {
            assert_eq!(a.id, b.id);
            assert_eq!(a.kind, b.kind);
            assert_eq!(a.symbol, b.symbol);
            assert_eq!(a.spread_bps, b.spread_bps);
        }
    }

    #[test]
    fn every_emitted_opportunity_is_delta_neutral() {
        let view = view(
            vec![
                spot_with_book(Venue::Binance, "BTC", "USDT", 60_000.0, 59_995.0, 60_005.0),
                spot_with_book(Venue::Okx, "BTC", "USDT", 60_150.0, 60_145.0, 60_155.0),
                spot(Venue::Upbit, "BTC", "KRW", 88_500_000.0),
                spot(Venue::Gate, "ETH", "USDT", 3_000.0),
                spot(Venue::Bitget, "ETH", "USDT", 3_004.0),
            ],
            vec![
                perp(Venue::BinanceFutures, "BTC", 60_010.0, 0.0001, 50_000_000.0),
                perp(Venue::Hyperliquid, "BTC", 60_080.0, 0.0016, 50_000_000.0),
            ],
        );
        let eng = engine(cfg());
        let rate = fx(1450.0);
        let opps = eng.detect(&view, &rate);
        assert!(!opps.is_empty());
        for opp in &opps {
            let tolerance = 1e-6
                * opp
                    .legs
                    .iter()
                    .map(|l| (l.price * l.quantity).abs())
                    .fold(0.0_f64, f64::max)
                    .max(1.0);
            assert!(
                net_notional_usd(opp, &rate).abs() <= tolerance,
                "unbalanced legs for {} {}",
                opp.kind.as_str(),
                opp.symbol
            );
            assert!(opp.legs.len() >= 2);
        }
    }

    #[test]
    fn venue_swap_inverts_legs_with_same_spread() {
        let a = view(
            vec![
                spot(Venue::Binance, "BTC", "USDT", 60_000.0),
                spot(Venue::Okx, "BTC", "USDT", 60_150.0),
            ],
            vec![],
        );
        let b = view(
            vec![
                spot(Venue::Okx, "BTC", "USDT", 60_000.0),
                spot(Venue::Binance, "BTC", "USDT", 60_150.0),
            ],
            vec![],
        );
        let eng = engine(cfg());
        let rate = fx(1450.0);
        let first = eng.detect(&a, &rate);
        let second = eng.detect(&b, &rate);
        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), 1);
        assert!((first[0].spread_bps.abs() - second[0].spread_bps.abs()).abs() < 1e-9);
        assert_eq!(first[0].legs[0].exchange, second[0].legs[1].exchange);
        assert_eq!(first[0].legs[1].exchange, second[0].legs[0].exchange);
    }

    #[test]
    fn list_is_ranked_and_truncated() {
        let mut config = cfg();
        config.max_opportunities = 1;
        let view = view(
            vec![
                spot(Venue::Binance, "BTC", "USDT", 60_000.0),
                spot(Venue::Okx, "BTC", "USDT", 60_150.0),
                spot(Venue::Gate, "ETH", "USDT", 3_000.0),
                spot(Venue::Bitget, "ETH", "USDT", 3_030.0),
            ],
            vec![],
        );
        let eng = engine(config);
        let opps = eng.detect(&view, &fx(1450.0));
        assert_eq!(opps.len(), 1);
        // ETH spread (100 bps) outranks BTC (25 bps).
        assert!(opps[0].symbol.starts_with("ETH"));
    }
}
